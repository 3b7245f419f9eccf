use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod playlist;
mod sources;
mod ui;

use crate::audio::{SessionConfig, SessionRegistry};
use crate::bot::CadenceBot;
use crate::config::Config;
use crate::playlist::{ImporterConfig, PlaylistImporter};
use crate::sources::{MediaResolver, PlaylistProvider, SpotifyClient, YtDlpResolver};
use crate::ui::{DiscordSurface, MessageSurface};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cadence=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Cadence v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);
    info!("⚙️ {}", config.summary());

    // Todas las dependencias se arman aquí y viajan por constructores;
    // no hay estado global.
    let resolver: Arc<dyn MediaResolver> = Arc::new(YtDlpResolver::new(
        Duration::from_secs(config.ytdlp_timeout_secs),
        config.default_volume,
        config.search_cache_cap,
    ));
    let spotify: Arc<dyn PlaylistProvider> = Arc::new(SpotifyClient::new(
        config.spotify_client_id.clone(),
        config.spotify_client_secret.clone(),
    ));

    // Http propio para las vistas: solo publica y edita mensajes
    let surface: Arc<dyn MessageSurface> = Arc::new(DiscordSurface::new(Arc::new(Http::new(
        &config.discord_token,
    ))));

    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&resolver),
        Arc::clone(&surface),
        SessionConfig::from(config.as_ref()),
    ));
    let importer = Arc::new(PlaylistImporter::new(
        spotify,
        Arc::clone(&resolver),
        Arc::clone(&surface),
        ImporterConfig::from(config.as_ref()),
    ));

    let handler = CadenceBot::new(Arc::clone(&config), registry, importer, resolver);

    // Intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Shutdown graceful
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("❌ Error al registrar Ctrl+C");
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        std::process::exit(0);
    });

    info!("🚀 Bot iniciado");
    if let Err(why) = client.start().await {
        error!("❌ Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
