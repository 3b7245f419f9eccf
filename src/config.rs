use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,

    // Sesión
    pub queue_idle_timeout_secs: u64,
    pub inactivity_interval_secs: u64,
    pub sink_retry_ms: u64,

    // Cola / UI
    pub page_size: usize,

    // Resolución (yt-dlp)
    pub ytdlp_timeout_secs: u64,
    pub search_cache_cap: usize,

    // Importación de playlists
    pub playlist_batch_size: usize,
    pub playlist_concurrency: usize,
    pub playlist_spacing_ms: u64,
    pub playlist_progress_ms: u64,

    // Spotify
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio (30% por defecto, igual que siempre)
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.3".to_string())
                .parse()?,

            // Sesión
            queue_idle_timeout_secs: std::env::var("QUEUE_IDLE_TIMEOUT")
                .unwrap_or_else(|_| "300".to_string()) // 5 minutos esperando cola
                .parse()?,
            inactivity_interval_secs: std::env::var("INACTIVITY_INTERVAL")
                .unwrap_or_else(|_| "1800".to_string()) // 30 minutos
                .parse()?,
            sink_retry_ms: std::env::var("SINK_RETRY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Cola / UI
            page_size: std::env::var("PAGE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Resolución
            ytdlp_timeout_secs: std::env::var("YTDLP_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            search_cache_cap: std::env::var("SEARCH_CACHE_CAP")
                .unwrap_or_else(|_| "256".to_string())
                .parse()?,

            // Importación
            playlist_batch_size: std::env::var("PLAYLIST_BATCH_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            playlist_concurrency: std::env::var("PLAYLIST_CONCURRENCY")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            playlist_spacing_ms: std::env::var("PLAYLIST_SPACING_MS")
                .unwrap_or_else(|_| "1500".to_string())
                .parse()?,
            playlist_progress_ms: std::env::var("PLAYLIST_PROGRESS_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,

            // Spotify (credenciales inyectadas, nunca singleton global)
            spotify_client_id: std::env::var("SPOTIFY_CLIENT_ID").unwrap_or_default(),
            spotify_client_secret: std::env::var("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Valida los valores de configuración antes de arrancar.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "El volumen por defecto debe estar entre 0.0 y 1.0, se recibió: {}",
                self.default_volume
            );
        }

        if self.page_size == 0 {
            anyhow::bail!("El tamaño de página debe ser mayor que 0");
        }

        if self.playlist_batch_size == 0 {
            anyhow::bail!("El tamaño de lote de playlist debe ser mayor que 0");
        }

        if self.playlist_concurrency == 0 {
            anyhow::bail!("La concurrencia de playlist debe ser mayor que 0");
        }

        if self.queue_idle_timeout_secs == 0 {
            anyhow::bail!("El timeout de inactividad de cola debe ser mayor que 0");
        }

        if self.search_cache_cap == 0 {
            anyhow::bail!("El límite del caché de búsquedas debe ser mayor que 0");
        }

        Ok(())
    }

    pub fn queue_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_idle_timeout_secs)
    }

    pub fn inactivity_interval(&self) -> Duration {
        Duration::from_secs(self.inactivity_interval_secs)
    }

    pub fn sink_retry(&self) -> Duration {
        Duration::from_millis(self.sink_retry_ms)
    }

    /// Resumen seguro de la configuración para los logs (sin token).
    pub fn summary(&self) -> String {
        format!(
            "Config: app {} (guild: {}), vol {}%, página {}, idle {}s, inactividad {}s, lote {} x{} cada {}ms",
            self.application_id,
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.page_size,
            self.queue_idle_timeout_secs,
            self.inactivity_interval_secs,
            self.playlist_batch_size,
            self.playlist_concurrency,
            self.playlist_spacing_ms,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.3,

            queue_idle_timeout_secs: 300,
            inactivity_interval_secs: 1800,
            sink_retry_ms: 1000,

            page_size: 10,

            ytdlp_timeout_secs: 30,
            search_cache_cap: 256,

            playlist_batch_size: 10,
            playlist_concurrency: 3,
            playlist_spacing_ms: 1500,
            playlist_progress_ms: 2000,

            spotify_client_id: String::new(),
            spotify_client_secret: String::new(),
        }
    }
}
