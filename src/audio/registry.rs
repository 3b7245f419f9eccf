use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::audio::session::{Session, SessionConfig};
use crate::sources::MediaResolver;
use crate::ui::MessageSurface;

/// Registro de sesiones: una por servidor, creada al primer comando de
/// voz y descartada al terminar. Una referencia a una sesión terminada
/// nunca se reutiliza: se recrea.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<Session>>,
    resolver: Arc<dyn MediaResolver>,
    surface: Arc<dyn MessageSurface>,
    cfg: SessionConfig,
}

impl SessionRegistry {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        surface: Arc<dyn MessageSurface>,
        cfg: SessionConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            resolver,
            surface,
            cfg,
        }
    }

    /// Devuelve la sesión viva del servidor, o crea una nueva si no hay
    /// o la registrada ya terminó.
    ///
    /// `entry` retiene el candado del shard durante el chequeo y la
    /// inserción: dos comandos simultáneos nunca crean dos sesiones para
    /// el mismo servidor.
    pub fn get_or_create(&self, guild_id: GuildId, channel_id: ChannelId) -> Arc<Session> {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_alive() {
                    return Arc::clone(occupied.get());
                }
                debug!("♻️ Sesión de {} estaba terminada, recreando", guild_id);
                let session = self.new_session(guild_id, channel_id);
                occupied.insert(Arc::clone(&session));
                session
            }
            Entry::Vacant(vacant) => {
                let session = self.new_session(guild_id, channel_id);
                vacant.insert(Arc::clone(&session));
                session
            }
        }
    }

    fn new_session(&self, guild_id: GuildId, channel_id: ChannelId) -> Arc<Session> {
        info!("✨ Creando sesión de voz para {}", guild_id);
        Session::new(
            guild_id,
            channel_id,
            Arc::clone(&self.resolver),
            Arc::clone(&self.surface),
            self.cfg.clone(),
        )
    }

    /// Sesión viva del servidor, si existe. No crea nada.
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Session>> {
        self.sessions
            .get(&guild_id)
            .filter(|s| s.is_alive())
            .map(|s| Arc::clone(&s))
    }

    /// Termina y descarta la sesión del servidor.
    pub async fn remove(&self, guild_id: GuildId) {
        if let Some((_, session)) = self.sessions.remove(&guild_id) {
            session.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockMediaResolver;
    use crate::ui::MockMessageSurface;
    use std::time::Duration;

    fn registry() -> SessionRegistry {
        let mut resolver = MockMediaResolver::new();
        resolver.expect_refresh().returning(|t| Ok(t.clone()));
        let surface = MockMessageSurface::new();
        SessionRegistry::new(
            Arc::new(resolver),
            Arc::new(surface),
            SessionConfig {
                default_volume: 0.3,
                idle_timeout: Duration::from_secs(5),
                inactivity_interval: Duration::from_secs(60),
                sink_retry: Duration::from_millis(10),
                page_size: 10,
            },
        )
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_live_session() {
        let registry = registry();
        let a = registry.get_or_create(GuildId::new(1), ChannelId::new(2));
        let b = registry.get_or_create(GuildId::new(1), ChannelId::new(2));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_terminated_session_is_recreated() {
        let registry = registry();
        let a = registry.get_or_create(GuildId::new(1), ChannelId::new(2));
        a.stop().await;

        let b = registry.get_or_create(GuildId::new(1), ChannelId::new(2));
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(b.is_alive());
        assert!(registry.get(GuildId::new(1)).is_some());
    }

    #[tokio::test]
    async fn test_remove_terminates_session() {
        let registry = registry();
        let session = registry.get_or_create(GuildId::new(3), ChannelId::new(4));
        registry.remove(GuildId::new(3)).await;

        assert!(!session.is_alive());
        assert!(registry.get(GuildId::new(3)).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_yields_one_session() {
        let registry = Arc::new(registry());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.get_or_create(GuildId::new(1), ChannelId::new(2))
            }));
        }

        // Todas las tareas reciben exactamente la misma sesión; ninguna
        // queda con una copia huérfana fuera del registro.
        let first = handles.remove(0).await.unwrap();
        for handle in handles {
            let session = handle.await.unwrap();
            assert!(Arc::ptr_eq(&first, &session));
        }
        assert!(Arc::ptr_eq(
            &first,
            &registry.get(GuildId::new(1)).unwrap()
        ));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let registry = registry();
        let a = registry.get_or_create(GuildId::new(1), ChannelId::new(2));
        let b = registry.get_or_create(GuildId::new(9), ChannelId::new(8));

        a.stop().await;
        assert!(b.is_alive());
    }
}
