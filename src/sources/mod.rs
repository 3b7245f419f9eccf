pub mod spotify;
pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;
use std::collections::HashMap;

use crate::error::MusicError;

pub use spotify::{PlaylistEntry, PlaylistProvider, SpotifyClient};
pub use ytdlp::YtDlpResolver;

#[cfg(test)]
pub use spotify::MockPlaylistProvider;

/// Un track resuelto y reproducible, con metadatos del proveedor.
///
/// Inmutable salvo dos campos: `volume` (ajustable por sesión) y el par
/// `stream_url` / `stream_headers`, que se reemplaza completo en cada
/// refresh porque las URLs de stream que emite el proveedor caducan en
/// minutos u horas.
#[derive(Debug, Clone)]
pub struct Track {
    pub title: String,
    pub uploader: String,
    /// Duración en segundos; 0 para transmisiones en vivo.
    pub duration: u64,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// URL estable de la página, usada para re-resolver el stream.
    pub url: String,
    /// URL temporal del audio crudo. Caduca: refrescar antes de reproducir.
    pub stream_url: String,
    /// Cabeceras que el extractor usó al emitir la URL de stream. Algunos
    /// hosts devuelven 403 si la petición no lleva las mismas cabeceras.
    pub stream_headers: HashMap<String, String>,
    pub requested_by: UserId,
    /// Volumen por track, entre 0.0 y 1.0.
    pub volume: f32,
}

impl Track {
    /// Produce una copia con el stream renovado, conservando el volumen
    /// y el solicitante del track original.
    pub fn with_refreshed_stream(
        &self,
        stream_url: String,
        stream_headers: HashMap<String, String>,
    ) -> Self {
        Self {
            stream_url,
            stream_headers,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "**{}** de **{}**", self.title, self.uploader)
    }
}

/// Resolutor de medios: convierte búsquedas o URLs en tracks reproducibles.
///
/// `refresh` debe invocarse inmediatamente antes de entregar un track al
/// sink, nunca al encolar: un track que esperó en cola tendría un stream
/// caducado.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resuelve un término de búsqueda (un mejor resultado) o una URL de
    /// playlist nativa del proveedor (todos sus miembros).
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Vec<Track>, MusicError>;

    /// Re-resuelve solo el stream de un track cuya URL estable ya se
    /// conoce, conservando volumen y solicitante.
    async fn refresh(&self, track: &Track) -> Result<Track, MusicError>;
}

#[cfg(test)]
pub(crate) fn test_track(title: &str) -> Track {
    Track {
        title: title.to_string(),
        uploader: "Tester".to_string(),
        duration: 200,
        thumbnail: None,
        description: None,
        tags: Vec::new(),
        url: format!("https://example.com/watch?v={title}"),
        stream_url: format!("https://cdn.example.com/{title}.m4a"),
        stream_headers: HashMap::new(),
        requested_by: UserId::new(1),
        volume: 0.3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_refreshed_stream_keeps_volume_and_requester() {
        let mut track = test_track("cancion");
        track.volume = 0.7;

        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), "curl".to_string());
        let fresh = track.with_refreshed_stream("https://cdn.example.com/nueva".to_string(), headers);

        assert_eq!(fresh.volume, 0.7);
        assert_eq!(fresh.requested_by, track.requested_by);
        assert_eq!(fresh.url, track.url);
        assert_eq!(fresh.stream_url, "https://cdn.example.com/nueva");
    }
}
