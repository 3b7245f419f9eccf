use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    audio::{Session, SongbirdSink},
    bot::CadenceBot,
    error::MusicError,
    sources::SpotifyClient,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &CadenceBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot).await?,
        "pause" => handle_pause(ctx, command, bot).await?,
        "resume" => handle_resume(ctx, command, bot).await?,
        "skip" => handle_skip(ctx, command, bot).await?,
        "stop" => handle_stop(ctx, command, bot).await?,
        "queue" => handle_queue(ctx, command, bot).await?,
        "nowplaying" => handle_nowplaying(ctx, command, bot).await?,
        "shuffle" => handle_shuffle(ctx, command, bot).await?,
        "loop" => handle_loop(ctx, command, bot).await?,
        "remove" => handle_remove(ctx, command, bot).await?,
        "clear" => handle_clear(ctx, command, bot).await?,
        "volume" => handle_volume(ctx, command, bot).await?,
        "join" => handle_join(ctx, command, bot).await?,
        "leave" => handle_leave(ctx, command, bot).await?,
        _ => {
            respond_text(ctx, &command, "❌ Comando no reconocido").await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer la respuesta: resolver puede tardar varios segundos
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let session = bot.registry().get_or_create(guild_id, command.channel_id);
    if let Err(e) = ensure_connected(ctx, &command, guild_id, &session).await {
        edit_embed(ctx, &command, embeds::error_notice(&e.to_string())).await?;
        return Ok(());
    }

    if SpotifyClient::is_playlist_url(&query) {
        // La importación corre en segundo plano; ella misma publica el
        // progreso en el canal.
        let importer = Arc::clone(bot.importer());
        let session = Arc::clone(&session);
        let requested_by = command.user.id;
        tokio::spawn(async move {
            if let Err(e) = importer.import(&session, &query, requested_by).await {
                error!("❌ Importación de playlist falló: {}", e);
            }
        });

        edit_embed(
            ctx,
            &command,
            embeds::notice("📥 Importando playlist, las canciones irán apareciendo en la cola..."),
        )
        .await?;
        return Ok(());
    }

    let tracks = match bot.resolver().resolve(&query, command.user.id).await {
        Ok(tracks) => tracks,
        Err(e) => {
            edit_embed(ctx, &command, embeds::error_notice(&e.to_string())).await?;
            return Ok(());
        }
    };

    match tracks.len() {
        0 => {
            edit_embed(
                ctx,
                &command,
                embeds::error_notice("No se encontraron resultados para esa búsqueda."),
            )
            .await?;
        }
        1 => {
            let track = tracks.into_iter().next().unwrap();
            session.set_action_message(format!(
                "**{} agregó:** {}",
                command.user.name, track.title
            ));
            let embed = embeds::track_added(&track);
            session.enqueue(track).await;
            session.refresh_queue_view().await;
            edit_embed(ctx, &command, embed).await?;
        }
        n => {
            // Playlist nativa del proveedor: todos sus miembros de una vez
            session.enqueue_batch(tracks).await;
            session.refresh_queue_view().await;
            edit_embed(
                ctx,
                &command,
                embeds::notice(&format!("➕ Se agregaron {n} canciones a la cola.")),
            )
            .await?;
        }
    }

    Ok(())
}

async fn handle_pause(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let Some(session) = bot.registry().get(guild_id) else {
        return respond_text(ctx, &command, "❌ No hay ninguna sesión activa").await;
    };

    if session.pause().await {
        respond_text(ctx, &command, "⏸️ Reproducción pausada").await
    } else {
        respond_text(ctx, &command, "❌ No hay nada reproduciéndose").await
    }
}

async fn handle_resume(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let Some(session) = bot.registry().get(guild_id) else {
        return respond_text(ctx, &command, "❌ No hay ninguna sesión activa").await;
    };

    if session.resume().await {
        respond_text(ctx, &command, "▶️ Reproducción reanudada").await
    } else {
        respond_text(ctx, &command, "❌ No hay nada pausado").await
    }
}

async fn handle_skip(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let Some(session) = bot.registry().get(guild_id) else {
        return respond_text(ctx, &command, "❌ No hay ninguna sesión activa").await;
    };

    session.set_action_message(format!("**{} saltó la canción**", command.user.name));
    session.skip().await;
    respond_text(ctx, &command, "⏭️ Canción saltada").await
}

async fn handle_stop(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    bot.registry().remove(guild_id).await;
    if let Some(manager) = songbird::get(ctx).await {
        let _ = manager.remove(guild_id).await;
    }

    respond_text(ctx, &command, "⏹️ Reproducción detenida y cola limpiada").await
}

async fn handle_queue(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let page = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "page")
        .and_then(|opt| opt.value.as_i64())
        .unwrap_or(1)
        .max(1) as usize;

    let Some(session) = bot.registry().get(guild_id) else {
        return respond_embed(ctx, &command, embeds::queue_page(&[], 0, 1, 1)).await;
    };

    let per_page = bot.page_size();
    let total = session.queue().len().await;
    let pages = embeds::page_count(total, per_page);
    let page = page.clamp(1, pages);
    let (start, end) = embeds::page_bounds(page, per_page, total);
    let items = session.queue().peek_range(start, end).await;

    respond_embed(ctx, &command, embeds::queue_page(&items, total, page, per_page)).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: CommandInteraction,
    bot: &CadenceBot,
) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let current = match bot.registry().get(guild_id) {
        Some(session) => session.current().await.map(|t| (t, session.volume())),
        None => None,
    };

    match current {
        Some((track, volume)) => {
            respond_embed(ctx, &command, embeds::now_playing(&track, volume, "")).await
        }
        None => respond_text(ctx, &command, "❌ No hay nada reproduciéndose").await,
    }
}

async fn handle_shuffle(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let Some(session) = bot.registry().get(guild_id) else {
        return respond_text(ctx, &command, "❌ No hay ninguna sesión activa").await;
    };

    session.queue().shuffle().await;
    session.refresh_queue_view().await;
    respond_text(ctx, &command, "🔀 Cola mezclada").await
}

async fn handle_loop(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let Some(session) = bot.registry().get(guild_id) else {
        return respond_text(ctx, &command, "❌ No hay ninguna sesión activa").await;
    };

    if session.toggle_loop() {
        respond_text(ctx, &command, "🔁 Repetición activada para la canción actual").await
    } else {
        respond_text(ctx, &command, "➡️ Repetición desactivada").await
    }
}

async fn handle_remove(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let index = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "index")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Índice no proporcionado"))?;

    let Some(session) = bot.registry().get(guild_id) else {
        return respond_text(ctx, &command, "❌ No hay ninguna sesión activa").await;
    };

    // El usuario ve la cola numerada desde 1; nada por debajo de 1 es
    // un índice válido, nunca se redondea al primer track.
    let Some(index) = queue_index(index) else {
        return respond_embed(
            ctx,
            &command,
            embeds::error_notice("Ese número no está en la cola."),
        )
        .await;
    };

    match session.queue().remove(index).await {
        Ok(track) => {
            session.refresh_queue_view().await;
            respond_text(ctx, &command, &format!("🗑️ Eliminada: **{}**", track.title)).await
        }
        Err(e) => respond_embed(ctx, &command, embeds::error_notice(&e.to_string())).await,
    }
}

async fn handle_clear(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let Some(session) = bot.registry().get(guild_id) else {
        return respond_text(ctx, &command, "❌ No hay ninguna sesión activa").await;
    };

    session.queue().clear().await;
    session.refresh_queue_view().await;
    respond_text(ctx, &command, "🗑️ Cola limpiada").await
}

async fn handle_volume(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let delta = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "delta")
        .and_then(|opt| opt.value.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Delta no proporcionado"))?;

    let Some(session) = bot.registry().get(guild_id) else {
        return respond_text(ctx, &command, "❌ No hay ninguna sesión activa").await;
    };

    let volume = session.change_volume(delta, &command.user.name).await;
    let percent = (volume * 100.0).round() as u32;
    respond_text(ctx, &command, &format!("🔊 Volumen: {percent}%")).await
}

async fn handle_join(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();
    let session = bot.registry().get_or_create(guild_id, command.channel_id);

    match ensure_connected(ctx, &command, guild_id, &session).await {
        Ok(()) => respond_text(ctx, &command, "🔊 Conectado a tu canal de voz").await,
        Err(e) => respond_embed(ctx, &command, embeds::error_notice(&e.to_string())).await,
    }
}

async fn handle_leave(ctx: &Context, command: CommandInteraction, bot: &CadenceBot) -> Result<()> {
    let guild_id = command.guild_id.unwrap();

    bot.registry().remove(guild_id).await;
    if let Some(manager) = songbird::get(ctx).await {
        let _ = manager.remove(guild_id).await;
    }

    respond_text(ctx, &command, "👋 Desconectado del canal de voz").await
}

// Helpers

/// Conecta la sesión al canal de voz del usuario si aún no tiene sink.
/// Un join fallido deshace la conexión a medias en el manager para no
/// dejar un sink colgante.
async fn ensure_connected(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    session: &Arc<Session>,
) -> Result<(), MusicError> {
    if session.has_sink().await {
        return Ok(());
    }

    let channel_id = user_voice_channel(ctx, guild_id, command.user.id)?;
    session.mark_connecting();

    let manager = songbird::get(ctx)
        .await
        .ok_or_else(|| MusicError::Connection("Songbird no inicializado".to_string()))?;

    match manager.join(guild_id, channel_id).await {
        Ok(call) => {
            session.attach_sink(Arc::new(SongbirdSink::new(call))).await;
            Ok(())
        }
        Err(e) => {
            let _ = manager.remove(guild_id).await;
            Err(MusicError::Connection(e.to_string()))
        }
    }
}

/// Índice 1-based del comando al índice interno de la cola.
fn queue_index(index: i64) -> Option<usize> {
    usize::try_from(index - 1).ok()
}

/// Canal de voz donde está el usuario, según la caché del gateway.
fn user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId, MusicError> {
    ctx.cache
        .guild(guild_id)
        .and_then(|guild| {
            guild
                .voice_states
                .get(&user_id)
                .and_then(|voice_state| voice_state.channel_id)
        })
        .ok_or_else(|| MusicError::Voice("Debes estar en un canal de voz".to_string()))
}

async fn respond_text(ctx: &Context, command: &CommandInteraction, text: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(text),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embed),
            ),
        )
        .await?;
    Ok(())
}

/// Respuesta final de un comando que ya hizo Defer.
async fn edit_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_queue_index_rejects_below_one() {
        assert_eq!(queue_index(0), None);
        assert_eq!(queue_index(-3), None);
        assert_eq!(queue_index(1), Some(0));
        assert_eq!(queue_index(7), Some(6));
    }
}
