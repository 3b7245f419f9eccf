use thiserror::Error;

/// Taxonomía de errores del núcleo de reproducción.
///
/// Los fallos por canción (`Resolution`, `Voice`) se contienen y se
/// registran: nunca abortan el loop de reproducción ni una importación
/// de playlist completa. `QueueTimeout` dispara el teardown de la sesión.
#[derive(Debug, Error)]
pub enum MusicError {
    /// El proveedor no encontró nada que coincida con la búsqueda.
    #[error("no se encontró nada que coincida con `{0}`")]
    Resolution(String),

    /// Se agotó la espera por una nueva canción en la cola.
    #[error("tiempo de espera agotado esperando la siguiente canción")]
    QueueTimeout,

    /// El sink de audio reportó un fallo de reproducción.
    #[error("fallo de reproducción: {0}")]
    Voice(String),

    /// Fallo al conectar o mover la conexión de voz.
    #[error("fallo de conexión de voz: {0}")]
    Connection(String),

    /// Índice fuera de rango en una operación sobre la cola.
    #[error("índice {0} fuera de rango")]
    IndexOutOfRange(usize),
}
