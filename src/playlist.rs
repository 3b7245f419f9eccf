use futures::future::join_all;
use serenity::model::id::UserId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::audio::Session;
use crate::error::MusicError;
use crate::sources::{MediaResolver, PlaylistProvider, SpotifyClient, Track};
use crate::ui::{embeds, post_or_edit, MessageRef, MessageSurface};

/// Parámetros del importador, inyectados desde la configuración global.
#[derive(Debug, Clone)]
pub struct ImporterConfig {
    /// Referencias procesadas por lote; entre lotes se re-verifica el sink.
    pub batch_size: usize,
    /// Resoluciones simultáneas como máximo dentro de un lote.
    pub concurrency: usize,
    /// Espaciado mínimo entre peticiones al extractor.
    pub spacing: Duration,
    /// Throttle de las ediciones del mensaje de progreso.
    pub progress_every: Duration,
}

impl From<&crate::config::Config> for ImporterConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            batch_size: config.playlist_batch_size,
            concurrency: config.playlist_concurrency,
            spacing: Duration::from_millis(config.playlist_spacing_ms),
            progress_every: Duration::from_millis(config.playlist_progress_ms),
        }
    }
}

/// Resultado de una importación, para el comando que la lanzó.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub playlist: String,
    pub imported: usize,
    pub failed: usize,
    pub aborted: bool,
}

/// Importador de playlists externas hacia la cola de una sesión.
///
/// Resuelve las referencias con concurrencia acotada y un espaciado
/// mínimo compartido entre peticiones, para respetar los umbrales de
/// abuso del proveedor de video. Los resultados de cada lote se
/// reordenan por índice original antes de encolarse: el orden final
/// siempre coincide con el de la playlist, termine quien termine
/// primero.
pub struct PlaylistImporter {
    provider: Arc<dyn PlaylistProvider>,
    resolver: Arc<dyn MediaResolver>,
    surface: Arc<dyn MessageSurface>,
    /// Compuerta global de espaciado, compartida por todas las
    /// importaciones del proceso.
    gate: Arc<Mutex<Instant>>,
    cfg: ImporterConfig,
}

impl PlaylistImporter {
    pub fn new(
        provider: Arc<dyn PlaylistProvider>,
        resolver: Arc<dyn MediaResolver>,
        surface: Arc<dyn MessageSurface>,
        cfg: ImporterConfig,
    ) -> Self {
        Self {
            provider,
            resolver,
            surface,
            gate: Arc::new(Mutex::new(Instant::now())),
            cfg,
        }
    }

    pub async fn import(
        &self,
        session: &Arc<Session>,
        playlist_url: &str,
        requested_by: UserId,
    ) -> Result<ImportReport, MusicError> {
        let id = SpotifyClient::playlist_id_from_url(playlist_url)
            .ok_or_else(|| MusicError::Resolution(playlist_url.to_string()))?;

        // Una importación a la vez por sesión; además, sus escrituras por
        // lotes no pueden entrelazarse con las de otra importación.
        let _import_guard = session.import_lock().lock_owned().await;

        let (name, entries) = self.provider.fetch_playlist(&id).await?;
        let total = entries.len();
        info!("📥 Importando `{}`: {} referencias", name, total);

        let mut status: Option<MessageRef> = None;
        post_or_edit(
            self.surface.as_ref(),
            session.channel_id(),
            &mut status,
            embeds::playlist_progress(&name, 0, total),
        )
        .await;

        let mut imported = 0usize;
        let mut failed = 0usize;
        let mut aborted = false;
        let mut last_progress = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.cfg.concurrency));

        for (batch_index, batch) in entries.chunks(self.cfg.batch_size).enumerate() {
            // Entre lotes: si el sink se desconectó, abortar el resto en
            // vez de resolver una playlist entera hacia una sesión muerta.
            // Lo ya encolado se queda.
            if !session.is_alive() || !session.has_sink().await {
                warn!("⚠️ Sink desconectado, abortando importación de `{}`", name);
                aborted = true;
                break;
            }

            let lookups = batch.iter().enumerate().map(|(offset, entry)| {
                let index = batch_index * self.cfg.batch_size + offset;
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let _permit = semaphore.acquire().await.ok()?;
                    self.wait_spacing().await;

                    let query = format!("{} {} Audio", entry.name, entry.artist);
                    match self.resolver.resolve(&query, requested_by).await {
                        Ok(mut tracks) if !tracks.is_empty() => Some((index, tracks.remove(0))),
                        Ok(_) => None,
                        Err(e) => {
                            // El fallo de un track no aborta el lote ni la
                            // importación.
                            warn!("❌ No se pudo resolver {} de {}: {}", entry.name, entry.artist, e);
                            None
                        }
                    }
                }
            });

            let mut resolved: Vec<(usize, Track)> =
                join_all(lookups).await.into_iter().flatten().collect();
            // Dentro del lote el orden de finalización no está
            // garantizado; reordenar por índice original de la playlist.
            resolved.sort_by_key(|(index, _)| *index);

            failed += batch.len() - resolved.len();
            imported += resolved.len();
            session
                .enqueue_batch(resolved.into_iter().map(|(_, track)| track).collect())
                .await;

            if last_progress.elapsed() >= self.cfg.progress_every {
                post_or_edit(
                    self.surface.as_ref(),
                    session.channel_id(),
                    &mut status,
                    embeds::playlist_progress(&name, imported + failed, total),
                )
                .await;
                last_progress = Instant::now();
            }
        }

        let final_embed = if aborted {
            embeds::playlist_aborted(&name, imported)
        } else {
            embeds::playlist_done(&name, imported, failed)
        };
        post_or_edit(
            self.surface.as_ref(),
            session.channel_id(),
            &mut status,
            final_embed,
        )
        .await;

        info!(
            "📥 Importación de `{}` finalizada: {} agregadas, {} fallidas{}",
            name,
            imported,
            failed,
            if aborted { " (abortada)" } else { "" }
        );

        Ok(ImportReport {
            playlist: name,
            imported,
            failed,
            aborted,
        })
    }

    /// Reserva el próximo hueco de la compuerta de espaciado y duerme
    /// hasta entonces. El candado se suelta antes de dormir.
    async fn wait_spacing(&self) {
        let wait = {
            let mut next_at = self.gate.lock().await;
            let now = Instant::now();
            if *next_at <= now {
                *next_at = now + self.cfg.spacing;
                Duration::ZERO
            } else {
                let wait = *next_at - now;
                *next_at += self.cfg.spacing;
                wait
            }
        };

        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}
