use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::queue::TrackQueue;
use crate::audio::sink::AudioSink;
use crate::sources::{MediaResolver, Track};
use crate::ui::{embeds, post_or_edit, MessageRef, MessageSurface};

/// Estado explícito de la sesión, con transiciones vigiladas.
///
/// Sustituye al viejo par "flag de existencia + lookup en diccionario":
/// una sesión `Terminated` no admite transiciones de salida, así que los
/// bugs de "sesión rancia" son inalcanzables por construcción.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Sin track actual; el loop puede estar esperando cola o sink.
    Idle,
    /// Un comando está estableciendo la conexión de voz.
    Connecting,
    Playing,
    Paused,
    /// Removida del registro; no se reutiliza jamás.
    Terminated,
}

/// Parámetros de una sesión, inyectados desde la configuración global.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub default_volume: f32,
    /// Máximo que el loop espera por una nueva canción antes de cerrarse.
    pub idle_timeout: Duration,
    /// Intervalo del monitor de inactividad.
    pub inactivity_interval: Duration,
    /// Pausa entre reintentos cuando aún no hay sink conectado.
    pub sink_retry: Duration,
    pub page_size: usize,
}

impl From<&crate::config::Config> for SessionConfig {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            default_volume: config.default_volume,
            idle_timeout: config.queue_idle_timeout(),
            inactivity_interval: config.inactivity_interval(),
            sink_retry: config.sink_retry(),
            page_size: config.page_size,
        }
    }
}

/// La sesión de voz de un servidor: dueña de su cola, del track actual,
/// del sink y del loop de reproducción en segundo plano.
///
/// Todas las operaciones concurrentes (comandos, importador, loop) pasan
/// por aquí. La sesión es dueña estructural de sus tareas de fondo y las
/// cancela explícitamente en `stop()`.
pub struct Session {
    guild_id: GuildId,
    channel_id: ChannelId,
    cfg: SessionConfig,

    queue: Arc<TrackQueue>,
    state: parking_lot::Mutex<SessionState>,
    current: Mutex<Option<Track>>,
    sink: RwLock<Option<Arc<dyn AudioSink>>>,

    loop_enabled: AtomicBool,
    volume: parking_lot::Mutex<f32>,
    // Mantenido pero inerte: un solo skip detiene el track, sin quórum.
    skip_votes: parking_lot::Mutex<HashSet<UserId>>,
    first_track_played: AtomicBool,

    now_playing_msg: Mutex<Option<MessageRef>>,
    queue_msg: Mutex<Option<MessageRef>>,
    action_message: parking_lot::Mutex<String>,

    /// Serializa importaciones de playlist: una a la vez por sesión, y
    /// sus escrituras por lotes no se entrelazan con otra importación.
    import_lock: Arc<Mutex<()>>,

    resolver: Arc<dyn MediaResolver>,
    surface: Arc<dyn MessageSurface>,

    player_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    monitor_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(
        guild_id: GuildId,
        channel_id: ChannelId,
        resolver: Arc<dyn MediaResolver>,
        surface: Arc<dyn MessageSurface>,
        cfg: SessionConfig,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            guild_id,
            channel_id,
            volume: parking_lot::Mutex::new(cfg.default_volume),
            cfg,
            queue: Arc::new(TrackQueue::new()),
            state: parking_lot::Mutex::new(SessionState::Idle),
            current: Mutex::new(None),
            sink: RwLock::new(None),
            loop_enabled: AtomicBool::new(false),
            skip_votes: parking_lot::Mutex::new(HashSet::new()),
            first_track_played: AtomicBool::new(false),
            now_playing_msg: Mutex::new(None),
            queue_msg: Mutex::new(None),
            action_message: parking_lot::Mutex::new(String::new()),
            import_lock: Arc::new(Mutex::new(())),
            resolver,
            surface,
            player_task: parking_lot::Mutex::new(None),
            monitor_task: parking_lot::Mutex::new(None),
        });

        session.spawn_inactivity_monitor();
        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn queue(&self) -> &Arc<TrackQueue> {
        &self.queue
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_alive(&self) -> bool {
        self.state() != SessionState::Terminated
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled.load(Ordering::SeqCst)
    }

    pub fn import_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.import_lock)
    }

    pub async fn current(&self) -> Option<Track> {
        self.current.lock().await.clone()
    }

    pub async fn has_sink(&self) -> bool {
        self.sink.read().await.is_some()
    }

    /// Transición vigilada: de `Terminated` no se sale nunca.
    fn transition(&self, to: SessionState) {
        let mut state = self.state.lock();
        if *state == SessionState::Terminated {
            return;
        }
        debug!("🔁 Sesión {}: {:?} -> {:?}", self.guild_id, *state, to);
        *state = to;
    }

    pub fn mark_connecting(&self) {
        self.transition(SessionState::Connecting);
    }

    /// Conecta el sink a la sesión. El loop, si ya corre, lo recoge en su
    /// siguiente reintento: conexión y reproducción están desacopladas.
    pub async fn attach_sink(&self, sink: Arc<dyn AudioSink>) {
        *self.sink.write().await = Some(sink);
        if self.state() == SessionState::Connecting {
            self.transition(SessionState::Idle);
        }
        info!("🔌 Sink de audio conectado a la sesión {}", self.guild_id);
    }

    /// Encola un track y arranca el loop si no está corriendo (primer
    /// track, o el loop anterior terminó por inactividad).
    pub async fn enqueue(self: &Arc<Self>, track: Track) {
        self.queue.push(track).await;
        self.ensure_playback_loop();
    }

    /// Escritura por lotes del importador: visible atómicamente frente a
    /// un borrado por índice concurrente.
    pub async fn enqueue_batch(self: &Arc<Self>, tracks: Vec<Track>) {
        self.queue.push_all(tracks).await;
        self.ensure_playback_loop();
    }

    pub fn ensure_playback_loop(self: &Arc<Self>) {
        if !self.is_alive() {
            return;
        }

        let mut slot = self.player_task.lock();
        let running = slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        if !running {
            let session = Arc::clone(self);
            *slot = Some(tokio::spawn(session.playback_loop()));
        }
    }

    /// ¿Hay audio sonando de verdad ahora mismo?
    pub async fn is_playing(&self) -> bool {
        if self.current.lock().await.is_none() {
            return false;
        }
        match self.sink.read().await.clone() {
            Some(sink) => sink.is_playing().await,
            None => false,
        }
    }

    /// Salta el track actual. No-op si no suena nada: no se toca el sink.
    pub async fn skip(&self) {
        self.skip_votes.lock().clear();

        if self.current.lock().await.is_none() {
            return;
        }

        if let Some(sink) = self.sink.read().await.clone() {
            if sink.is_playing().await {
                info!("⏭️ Saltando el track actual en {}", self.guild_id);
                // El callback de fin del sink es el que avanza el loop.
                sink.stop_current().await;
            }
        }
    }

    pub async fn pause(&self) -> bool {
        if self.state() != SessionState::Playing {
            return false;
        }
        if let Some(sink) = self.sink.read().await.clone() {
            if sink.pause().await.is_ok() {
                self.transition(SessionState::Paused);
                info!("⏸️ Reproducción pausada en {}", self.guild_id);
                return true;
            }
        }
        false
    }

    pub async fn resume(&self) -> bool {
        if self.state() != SessionState::Paused {
            return false;
        }
        if let Some(sink) = self.sink.read().await.clone() {
            if sink.resume().await.is_ok() {
                self.transition(SessionState::Playing);
                info!("▶️ Reproducción reanudada en {}", self.guild_id);
                return true;
            }
        }
        false
    }

    pub fn toggle_loop(&self) -> bool {
        let enabled = !self.loop_enabled.load(Ordering::SeqCst);
        self.loop_enabled.store(enabled, Ordering::SeqCst);
        info!(
            "{} Loop {} en {}",
            if enabled { "🔁" } else { "➡️" },
            if enabled { "activado" } else { "desactivado" },
            self.guild_id
        );
        enabled
    }

    /// Ajusta el volumen por un delta en puntos porcentuales, acotado a
    /// [0,1]; un delta fuera de rango se recorta, nunca se rechaza.
    pub async fn change_volume(&self, delta_percent: i64, who: &str) -> f32 {
        let new_volume = {
            let mut volume = self.volume.lock();
            *volume = (*volume + delta_percent as f32 / 100.0).clamp(0.0, 1.0);
            *volume
        };

        if let Some(track) = self.current.lock().await.as_mut() {
            track.volume = new_volume;
        }
        if let Some(sink) = self.sink.read().await.clone() {
            sink.set_volume(new_volume).await;
        }

        let percent = (new_volume * 100.0).round() as u32;
        self.set_action_message(format!("**{who} cambió el volumen a {percent}%**"));
        self.refresh_now_playing().await;

        new_volume
    }

    /// Anotación de un solo uso que se funde en el próximo refresco de la
    /// vista "Reproduciendo Ahora".
    pub fn set_action_message(&self, text: String) {
        *self.action_message.lock() = text;
    }

    /// Termina la sesión: vacía la cola, desconecta el sink y cancela las
    /// tareas de fondo. Idempotente: la segunda llamada no hace nada.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Terminated {
                return;
            }
            *state = SessionState::Terminated;
        }

        self.queue.clear().await;
        *self.current.lock().await = None;

        if let Some(sink) = self.sink.write().await.take() {
            sink.disconnect().await;
        }

        // Ambas vistas publicadas se funden en el aviso de despedida:
        // ni la cola ni "Reproduciendo Ahora" quedan mostrando un track
        // que ya no suena.
        if let Some(target) = self.now_playing_msg.lock().await.take() {
            let _ = self
                .surface
                .edit(target, embeds::notice("Bot desconectado del canal de voz."))
                .await;
        }
        if let Some(target) = self.queue_msg.lock().await.take() {
            let _ = self
                .surface
                .edit(target, embeds::notice("Bot desconectado del canal de voz."))
                .await;
        }

        // Propiedad estructurada: la sesión cancela sus propias tareas.
        // Si `stop` corre dentro de una de ellas, el abort surte efecto
        // en su siguiente punto de suspensión.
        if let Some(handle) = self.monitor_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.player_task.lock().take() {
            handle.abort();
        }

        info!("⏹️ Sesión de {} terminada", self.guild_id);
    }

    /// Loop de reproducción: corre una vez por sesión hasta terminarla.
    async fn playback_loop(self: Arc<Self>) {
        info!("🎶 Loop de reproducción iniciado para {}", self.guild_id);

        loop {
            if !self.is_alive() {
                return;
            }

            // Señal nueva en cada vuelta: equivale a limpiar la señal de
            // fin antes de reproducir.
            let finished = Arc::new(Notify::new());

            let keep_current = self.loop_enabled() && self.current.lock().await.is_some();
            if !keep_current {
                *self.current.lock().await = None;

                match self.queue.next(self.cfg.idle_timeout).await {
                    Ok(track) => {
                        *self.current.lock().await = Some(track);
                    }
                    Err(_) => {
                        info!(
                            "💤 Cola inactiva demasiado tiempo, cerrando sesión de {}",
                            self.guild_id
                        );
                        self.stop().await;
                        return;
                    }
                }
            }

            // Si todavía no hay sink, esperar a que un comando lo conecte
            // en vez de fallar: conexión y reproducción van desacopladas.
            let sink = loop {
                if !self.is_alive() {
                    return;
                }
                if let Some(sink) = self.sink.read().await.clone() {
                    break sink;
                }
                tokio::time::sleep(self.cfg.sink_retry).await;
            };

            let Some(mut track) = self.current.lock().await.clone() else {
                continue;
            };

            // Renovar el stream justo antes de reproducir: las URLs del
            // proveedor caducan. Si falla, se intenta con el guardado.
            match self.resolver.refresh(&track).await {
                Ok(fresh) => track = fresh,
                Err(e) => warn!(
                    "⚠️ No se pudo renovar el stream de {}: {}; usando el guardado",
                    track.title, e
                ),
            }

            track.volume = self.volume();
            *self.current.lock().await = Some(track.clone());

            if let Err(e) = sink.play(&track, Arc::clone(&finished)).await {
                // El fallo de un track nunca aborta el loop completo.
                error!("❌ Fallo de reproducción de {}: {}", track.title, e);
                *self.current.lock().await = None;
                continue;
            }

            self.transition(SessionState::Playing);
            self.first_track_played.store(true, Ordering::SeqCst);
            info!("🎵 Reproduciendo: {}", track.title);

            self.refresh_now_playing().await;
            self.refresh_queue_view().await;

            finished.notified().await;

            if !self.is_alive() {
                return;
            }
            self.transition(SessionState::Idle);
            if !self.loop_enabled() {
                *self.current.lock().await = None;
            }
        }
    }

    /// Re-renderiza la vista "Reproduciendo Ahora" y la edita en el
    /// sitio, fundiendo la anotación de acción pendiente.
    pub async fn refresh_now_playing(&self) {
        let Some(track) = self.current.lock().await.clone() else {
            return;
        };

        let action = std::mem::take(&mut *self.action_message.lock());
        let embed = embeds::now_playing(&track, self.volume(), &action);

        let mut slot = self.now_playing_msg.lock().await;
        post_or_edit(self.surface.as_ref(), self.channel_id, &mut slot, embed).await;
    }

    /// Refresco automático de la vista de cola; no publica nada hasta que
    /// sonó el primer track.
    pub async fn refresh_queue_view(&self) {
        if !self.first_track_played.load(Ordering::SeqCst) {
            return;
        }
        self.show_queue_page(1).await;
    }

    /// Muestra una página de la cola, editando la vista previa si existe.
    pub async fn show_queue_page(&self, page: usize) {
        let total = self.queue.len().await;
        let pages = embeds::page_count(total, self.cfg.page_size);
        let page = page.clamp(1, pages);

        let (start, end) = embeds::page_bounds(page, self.cfg.page_size, total);
        let items = self.queue.peek_range(start, end).await;
        let embed = embeds::queue_page(&items, total, page, self.cfg.page_size);

        let mut slot = self.queue_msg.lock().await;
        post_or_edit(self.surface.as_ref(), self.channel_id, &mut slot, embed).await;
    }

    /// Monitor de inactividad: revisa cada intervalo si no suena nada y
    /// la cola está vacía; con sink conectado, se despide y termina la
    /// sesión. Tolera que la sesión ya haya sido detenida desde fuera.
    fn spawn_inactivity_monitor(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            debug!("⏲️ Monitor de inactividad iniciado para {}", session.guild_id);
            loop {
                tokio::time::sleep(session.cfg.inactivity_interval).await;

                if !session.is_alive() {
                    debug!("⏲️ Sesión ya terminada, monitor de {} sale", session.guild_id);
                    return;
                }

                if session.is_playing().await || !session.queue.is_empty().await {
                    debug!("⏲️ Sesión {} activa, monitor sigue", session.guild_id);
                    continue;
                }

                if !session.has_sink().await {
                    continue;
                }

                info!("💤 Inactividad sostenida en {}, cerrando sesión", session.guild_id);
                let _ = session
                    .surface
                    .post(
                        session.channel_id,
                        embeds::notice("👋 Me salgo del canal de voz por inactividad."),
                    )
                    .await;
                session.stop().await;
                return;
            }
        });
        *self.monitor_task.lock() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sink::MockAudioSink;
    use crate::error::MusicError;
    use crate::sources::{test_track, MockMediaResolver};
    use crate::ui::MockMessageSurface;
    use pretty_assertions::assert_eq;
    use serenity::model::id::MessageId;

    fn test_cfg() -> SessionConfig {
        SessionConfig {
            default_volume: 0.3,
            idle_timeout: Duration::from_secs(5),
            inactivity_interval: Duration::from_secs(60),
            sink_retry: Duration::from_millis(10),
            page_size: 10,
        }
    }

    fn lenient_surface() -> Arc<MockMessageSurface> {
        let mut surface = MockMessageSurface::new();
        surface.expect_post().returning(|channel, _| {
            Ok(MessageRef {
                channel,
                message: MessageId::new(1),
            })
        });
        surface.expect_edit().returning(|_, _| Ok(()));
        Arc::new(surface)
    }

    fn passthrough_resolver() -> Arc<MockMediaResolver> {
        let mut resolver = MockMediaResolver::new();
        resolver.expect_refresh().returning(|track| Ok(track.clone()));
        Arc::new(resolver)
    }

    fn new_session(cfg: SessionConfig, resolver: Arc<MockMediaResolver>) -> Arc<Session> {
        Session::new(
            GuildId::new(7),
            ChannelId::new(42),
            resolver,
            lenient_surface(),
            cfg,
        )
    }

    /// Sink que apunta lo reproducido y termina cada track al instante.
    fn instant_sink(played: Arc<parking_lot::Mutex<Vec<String>>>) -> MockAudioSink {
        let mut sink = MockAudioSink::new();
        sink.expect_play().returning(move |track, finished| {
            played.lock().push(track.title.clone());
            finished.notify_one();
            Ok(())
        });
        sink.expect_is_playing().returning(|| false);
        sink.expect_is_paused().returning(|| false);
        sink.expect_set_volume().returning(|_| ());
        sink.expect_disconnect().returning(|| ());
        sink
    }

    #[tokio::test]
    async fn test_tracks_wait_for_sink_then_autoplay_in_order() {
        let session = new_session(test_cfg(), passthrough_resolver());

        for name in ["uno", "dos", "tres"] {
            session.enqueue(test_track(name)).await;
        }

        // Sin sink el loop espera en vez de fallar
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.is_alive());

        let played = Arc::new(parking_lot::Mutex::new(Vec::new()));
        session
            .attach_sink(Arc::new(instant_sink(Arc::clone(&played))))
            .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*played.lock(), vec!["uno", "dos", "tres"]);
        assert!(session.queue().is_empty().await);
    }

    #[tokio::test]
    async fn test_stop_twice_is_noop() {
        let session = new_session(test_cfg(), passthrough_resolver());

        session.stop().await;
        assert!(!session.is_alive());
        assert_eq!(session.state(), SessionState::Terminated);

        // La segunda llamada no hace nada ni falla
        session.stop().await;
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[tokio::test]
    async fn test_stop_clears_both_published_views() {
        use std::sync::atomic::AtomicU64;

        let posted = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let edited = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut surface = MockMessageSurface::new();
        {
            let posted = Arc::clone(&posted);
            let counter = Arc::new(AtomicU64::new(1));
            surface.expect_post().returning(move |channel, _| {
                let target = MessageRef {
                    channel,
                    message: MessageId::new(counter.fetch_add(1, Ordering::SeqCst)),
                };
                posted.lock().push(target);
                Ok(target)
            });
        }
        {
            let edited = Arc::clone(&edited);
            surface.expect_edit().returning(move |target, _| {
                edited.lock().push(target);
                Ok(())
            });
        }

        let session = Session::new(
            GuildId::new(7),
            ChannelId::new(42),
            passthrough_resolver(),
            Arc::new(surface),
            test_cfg(),
        );

        let played = Arc::new(parking_lot::Mutex::new(Vec::new()));
        session
            .attach_sink(Arc::new(instant_sink(Arc::clone(&played))))
            .await;
        session.enqueue(test_track("fugaz")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Sonó un track: existen la vista "Reproduciendo Ahora" y la de cola
        assert_eq!(posted.lock().len(), 2);

        session.stop().await;

        // Las dos vistas publicadas se editan al aviso de desconexión
        let edited = edited.lock();
        for target in posted.lock().iter() {
            assert!(edited.contains(target));
        }
    }

    #[tokio::test]
    async fn test_skip_with_nothing_playing_touches_no_sink() {
        let session = new_session(test_cfg(), passthrough_resolver());

        // Mock sin expectativas: cualquier llamada al sink haría panic
        session.attach_sink(Arc::new(MockAudioSink::new())).await;
        session.skip().await;
        assert!(session.is_alive());
    }

    #[tokio::test]
    async fn test_change_volume_clamps_to_bounds() {
        let session = new_session(test_cfg(), passthrough_resolver());

        assert_eq!(session.change_volume(20, "tester").await, 0.5);
        assert_eq!(session.change_volume(200, "tester").await, 1.0);
        // Volver a aplicar un delta desbordado deja exactamente 1.0
        assert_eq!(session.change_volume(50, "tester").await, 1.0);
        assert_eq!(session.change_volume(-500, "tester").await, 0.0);
        assert_eq!(session.change_volume(-1, "tester").await, 0.0);
    }

    #[tokio::test]
    async fn test_inactivity_terminates_idle_session_with_sink() {
        let cfg = SessionConfig {
            inactivity_interval: Duration::from_millis(30),
            ..test_cfg()
        };
        let session = new_session(cfg, passthrough_resolver());

        let mut sink = MockAudioSink::new();
        sink.expect_is_playing().returning(|| false);
        sink.expect_disconnect().times(1).returning(|| ());
        session.attach_sink(Arc::new(sink)).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn test_activity_suppresses_inactivity_teardown() {
        let cfg = SessionConfig {
            inactivity_interval: Duration::from_millis(20),
            ..test_cfg()
        };
        let session = new_session(cfg, passthrough_resolver());

        // Cola con contenido pero sin loop consumiéndola
        session.queue().push(test_track("pendiente")).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(session.is_alive());
    }

    #[tokio::test]
    async fn test_failed_refresh_plays_stored_stream() {
        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_refresh()
            .returning(|_| Err(MusicError::Resolution("sin red".to_string())));
        let session = new_session(test_cfg(), Arc::new(resolver));

        let played = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let streams = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut sink = MockAudioSink::new();
        {
            let played = Arc::clone(&played);
            let streams = Arc::clone(&streams);
            sink.expect_play().returning(move |track, finished| {
                played.lock().push(track.title.clone());
                streams.lock().push(track.stream_url.clone());
                finished.notify_one();
                Ok(())
            });
        }
        sink.expect_is_playing().returning(|| false);
        sink.expect_disconnect().returning(|| ());

        session.attach_sink(Arc::new(sink)).await;
        let track = test_track("rancio");
        let stored_stream = track.stream_url.clone();
        session.enqueue(track).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Se reprodujo con el stream guardado y el loop sigue vivo
        assert_eq!(*played.lock(), vec!["rancio"]);
        assert_eq!(*streams.lock(), vec![stored_stream]);
        assert!(session.is_alive());
    }

    #[tokio::test]
    async fn test_loop_mode_replays_current_track() {
        let session = new_session(test_cfg(), passthrough_resolver());
        session.toggle_loop();

        let played = Arc::new(parking_lot::Mutex::new(Vec::new()));
        session
            .attach_sink(Arc::new(instant_sink(Arc::clone(&played))))
            .await;
        session.enqueue(test_track("repetida")).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let played = played.lock();
        assert!(played.len() >= 2, "esperaba al menos 2 reproducciones, hubo {}", played.len());
        assert!(played.iter().all(|t| t == "repetida"));
    }

    #[tokio::test]
    async fn test_queue_idle_timeout_terminates_session() {
        let cfg = SessionConfig {
            idle_timeout: Duration::from_millis(30),
            ..test_cfg()
        };
        let session = new_session(cfg, passthrough_resolver());

        let played = Arc::new(parking_lot::Mutex::new(Vec::new()));
        session
            .attach_sink(Arc::new(instant_sink(Arc::clone(&played))))
            .await;
        session.enqueue(test_track("unica")).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*played.lock(), vec!["unica"]);
        assert!(!session.is_alive());
    }
}
