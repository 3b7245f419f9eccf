use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::MusicError;
use crate::sources::Track;

/// Cola de reproducción de una sesión.
///
/// FIFO para el consumo, pero mutable por comandos: mezcla aleatoria,
/// borrado por índice y vaciado. `push` nunca bloquea; `next` suspende al
/// consumidor hasta que llegue un item o venza el plazo. La sincronización
/// interna hace atómicas las operaciones de un solo paso; las escrituras
/// por lotes del importador se serializan además con el candado de la
/// sesión.
#[derive(Debug, Default)]
pub struct TrackQueue {
    items: Mutex<VecDeque<Track>>,
    notify: Notify,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final. Nunca bloquea ni falla.
    pub async fn push(&self, track: Track) {
        let mut items = self.items.lock().await;
        debug!("➕ Agregado a la cola: {}", track.title);
        items.push_back(track);
        drop(items);
        self.notify.notify_one();
    }

    /// Agrega un lote completo bajo un solo candado, para que un borrado
    /// por índice concurrente nunca vea el lote a medias.
    pub async fn push_all(&self, tracks: Vec<Track>) {
        if tracks.is_empty() {
            return;
        }
        let mut items = self.items.lock().await;
        let count = tracks.len();
        items.extend(tracks);
        drop(items);
        info!("➕ Agregados {} tracks a la cola", count);
        self.notify.notify_one();
    }

    /// Saca el primer track, esperando hasta `wait` si la cola está vacía.
    pub async fn next(&self, wait: Duration) -> Result<Track, MusicError> {
        let deadline = Instant::now() + wait;

        loop {
            // Armar la espera antes de mirar la cola, para no perder una
            // notificación entre la comprobación y el await.
            let notified = self.notify.notified();

            if let Some(track) = self.items.lock().await.pop_front() {
                return Ok(track);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MusicError::QueueTimeout);
            }

            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Err(MusicError::QueueTimeout);
            }
        }
    }

    /// Copia de solo lectura de un rango, para mostrar páginas.
    pub async fn peek_range(&self, start: usize, end: usize) -> Vec<Track> {
        let items = self.items.lock().await;
        items
            .iter()
            .skip(start)
            .take(end.saturating_sub(start))
            .cloned()
            .collect()
    }

    /// Permutación aleatoria uniforme, en el sitio.
    pub async fn shuffle(&self) {
        let mut items = self.items.lock().await;
        items.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada ({} tracks)", items.len());
    }

    /// Elimina y devuelve el track en `index`.
    pub async fn remove(&self, index: usize) -> Result<Track, MusicError> {
        let mut items = self.items.lock().await;
        items
            .remove(index)
            .ok_or(MusicError::IndexOutOfRange(index))
    }

    /// Vacía la cola de inmediato. Los `next` en vuelo siguen esperando.
    pub async fn clear(&self) {
        let mut items = self.items.lock().await;
        let cleared = items.len();
        items.clear();
        if cleared > 0 {
            info!("🗑️ Cola vaciada: {} tracks", cleared);
        }
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::test_track;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order_matches_push_order() {
        let queue = TrackQueue::new();
        for name in ["uno", "dos", "tres"] {
            queue.push(test_track(name)).await;
        }

        let mut titles = Vec::new();
        for _ in 0..3 {
            titles.push(queue.next(Duration::from_millis(10)).await.unwrap().title);
        }
        assert_eq!(titles, vec!["uno", "dos", "tres"]);
    }

    #[tokio::test]
    async fn test_next_times_out_on_empty_queue() {
        let queue = TrackQueue::new();
        let result = queue.next(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(MusicError::QueueTimeout)));
    }

    #[tokio::test]
    async fn test_next_wakes_on_push() {
        let queue = Arc::new(TrackQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(test_track("despertador")).await;

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.title, "despertador");
    }

    #[tokio::test]
    async fn test_clear_leaves_waiters_waiting() {
        let queue = Arc::new(TrackQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.clear().await;
        assert!(!waiter.is_finished());

        queue.push(test_track("tras-clear")).await;
        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.title, "tras-clear");
    }

    #[tokio::test]
    async fn test_remove_out_of_bounds_fails() {
        let queue = TrackQueue::new();
        queue.push(test_track("solo")).await;

        assert!(matches!(
            queue.remove(5).await,
            Err(MusicError::IndexOutOfRange(5))
        ));
        assert_eq!(queue.remove(0).await.unwrap().title, "solo");
    }

    #[tokio::test]
    async fn test_peek_range_does_not_consume() {
        let queue = TrackQueue::new();
        for i in 0..5 {
            queue.push(test_track(&format!("t{i}"))).await;
        }

        let slice = queue.peek_range(1, 3).await;
        assert_eq!(
            slice.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(),
            vec!["t1", "t2"]
        );
        assert_eq!(queue.len().await, 5);
    }

    #[tokio::test]
    async fn test_shuffle_preserves_contents() {
        let queue = TrackQueue::new();
        for i in 0..10 {
            queue.push(test_track(&format!("t{i}"))).await;
        }

        queue.shuffle().await;

        let mut titles: Vec<String> = queue
            .peek_range(0, 10)
            .await
            .into_iter()
            .map(|t| t.title)
            .collect();
        titles.sort();
        let expected: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
        assert_eq!(titles, expected);
    }
}
