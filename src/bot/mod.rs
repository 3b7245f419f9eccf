use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage},
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::SessionRegistry, config::Config, playlist::PlaylistImporter, sources::MediaResolver,
};

/// Handler principal del bot: recibe los eventos del gateway y los
/// despacha hacia las sesiones de voz.
///
/// Todas sus dependencias llegan por el constructor; no hay estado
/// global. El registro de sesiones es el único punto de entrada al
/// estado por servidor.
pub struct CadenceBot {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    importer: Arc<PlaylistImporter>,
    resolver: Arc<dyn MediaResolver>,
}

impl CadenceBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SessionRegistry>,
        importer: Arc<PlaylistImporter>,
        resolver: Arc<dyn MediaResolver>,
    ) -> Self {
        Self {
            config,
            registry,
            importer,
            resolver,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn importer(&self) -> &Arc<PlaylistImporter> {
        &self.importer
    }

    pub fn resolver(&self) -> &Arc<dyn MediaResolver> {
        &self.resolver
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Registra los comandos slash, por guild en desarrollo o globales
    /// en producción.
    async fn register_commands(&self, ctx: &Context) -> anyhow::Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for CadenceBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            let name = command.data.name.clone();
            if let Err(e) = handlers::handle_command(&ctx, command.clone(), self).await {
                // Frontera genérica: un handler que falla nunca tumba el
                // bot; el usuario recibe un aviso y el detalle va al log.
                error!("❌ Error manejando /{}: {:?}", name, e);

                let notice = CreateInteractionResponseMessage::new()
                    .content("❌ Algo salió mal procesando el comando")
                    .ephemeral(true);
                if command
                    .create_response(&ctx.http, CreateInteractionResponse::Message(notice))
                    .await
                    .is_err()
                {
                    // El comando ya respondió o hizo Defer: editar en su lugar
                    let _ = command
                        .edit_response(
                            &ctx.http,
                            serenity::builder::EditInteractionResponse::new()
                                .content("❌ Algo salió mal procesando el comando"),
                        )
                        .await;
                }
            }
        }
    }

    /// Si alguien desconecta el bot a mano desde Discord, la sesión del
    /// servidor se termina para no dejar un loop huérfano.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;
        if new.user_id != bot_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                warn!("🔌 Bot desconectado externamente en guild {}", guild_id);
                self.registry.remove(guild_id).await;
            }
        }
    }
}
