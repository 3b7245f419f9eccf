use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use songbird::input::{HttpRequest, Input};
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::error::MusicError;
use crate::sources::Track;

/// Salida de audio de una sesión: la conexión viva al canal de voz.
///
/// La costura existe para que el núcleo no dependa de songbird: las
/// pruebas usan un mock y la implementación real envuelve un `Call`.
/// El callback de fin de track puede dispararse desde un hilo ajeno al
/// scheduler, por eso su único trabajo es publicar en una señal
/// thread-safe (`Notify`), nunca tocar estado compartido.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Inicia la reproducción del stream del track y registra `finished`
    /// para que se notifique al terminar, con o sin error.
    async fn play(&self, track: &Track, finished: Arc<Notify>) -> Result<(), MusicError>;

    async fn pause(&self) -> Result<(), MusicError>;
    async fn resume(&self) -> Result<(), MusicError>;

    /// Detiene el track actual; el callback de fin avanza el loop.
    async fn stop_current(&self);

    async fn set_volume(&self, volume: f32);

    async fn is_playing(&self) -> bool;
    async fn is_paused(&self) -> bool;

    /// Corta la conexión de voz. Idempotente.
    async fn disconnect(&self);
}

/// Implementación real sobre songbird.
pub struct SongbirdSink {
    call: Arc<Mutex<Call>>,
    handle: parking_lot::Mutex<Option<TrackHandle>>,
    http: reqwest::Client,
}

impl SongbirdSink {
    pub fn new(call: Arc<Mutex<Call>>) -> Self {
        Self {
            call,
            handle: parking_lot::Mutex::new(None),
            http: reqwest::Client::new(),
        }
    }

    fn current_handle(&self) -> Option<TrackHandle> {
        self.handle.lock().clone()
    }

    /// Cabeceras del extractor, filtrando las que no son representables.
    fn header_map(track: &Track) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (key, value) in &track.stream_headers {
            let name = match HeaderName::from_bytes(key.as_bytes()) {
                Ok(name) => name,
                Err(_) => continue,
            };
            let value = match HeaderValue::from_str(value) {
                Ok(value) => value,
                Err(_) => continue,
            };
            headers.insert(name, value);
        }
        headers
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(&self, track: &Track, finished: Arc<Notify>) -> Result<(), MusicError> {
        let request = HttpRequest {
            client: self.http.clone(),
            request: track.stream_url.clone(),
            headers: Self::header_map(track),
            content_length: None,
        };

        let mut call = self.call.lock().await;
        let handle = call.play_input(Input::from(request));
        drop(call);

        handle
            .set_volume(track.volume)
            .map_err(|e| MusicError::Voice(e.to_string()))?;

        // Fin o error: ambos publican la misma señal para que el loop
        // avance pase lo que pase.
        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackFinished {
                    finished: Arc::clone(&finished),
                },
            )
            .map_err(|e| MusicError::Voice(e.to_string()))?;
        handle
            .add_event(Event::Track(TrackEvent::Error), TrackFinished { finished })
            .map_err(|e| MusicError::Voice(e.to_string()))?;

        debug!("▶️ Reproduciendo stream de: {}", track.title);
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<(), MusicError> {
        if let Some(handle) = self.current_handle() {
            handle.pause().map_err(|e| MusicError::Voice(e.to_string()))?;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), MusicError> {
        if let Some(handle) = self.current_handle() {
            handle.play().map_err(|e| MusicError::Voice(e.to_string()))?;
        }
        Ok(())
    }

    async fn stop_current(&self) {
        if let Some(handle) = self.current_handle() {
            let _ = handle.stop();
        }
    }

    async fn set_volume(&self, volume: f32) {
        if let Some(handle) = self.current_handle() {
            let _ = handle.set_volume(volume);
        }
    }

    async fn is_playing(&self) -> bool {
        match self.current_handle() {
            Some(handle) => match handle.get_info().await {
                Ok(info) => info.playing == PlayMode::Play,
                Err(_) => false,
            },
            None => false,
        }
    }

    async fn is_paused(&self) -> bool {
        match self.current_handle() {
            Some(handle) => match handle.get_info().await {
                Ok(info) => info.playing == PlayMode::Pause,
                Err(_) => false,
            },
            None => false,
        }
    }

    async fn disconnect(&self) {
        self.handle.lock().take();
        let mut call = self.call.lock().await;
        if let Err(e) = call.leave().await {
            warn!("⚠️ Error al salir del canal de voz: {}", e);
        }
    }
}

/// Handler de songbird cuyo único trabajo es publicar la señal de fin.
struct TrackFinished {
    finished: Arc<Notify>,
}

#[async_trait]
impl VoiceEventHandler for TrackFinished {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(..) = ctx {
            debug!("🏁 Track terminado, señalando al loop de reproducción");
        }
        self.finished.notify_one();
        None
    }
}
