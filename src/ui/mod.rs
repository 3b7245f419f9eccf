pub mod embeds;

use async_trait::async_trait;
use serenity::all::{ChannelId, MessageId};
use serenity::builder::{CreateEmbed, CreateMessage, EditMessage};
use serenity::http::Http;
use std::sync::Arc;

/// Referencia a un mensaje ya publicado, para editarlo en el sitio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel: ChannelId,
    pub message: MessageId,
}

/// Superficie de mensajería: publicar o editar vistas renderizadas.
///
/// El núcleo la invoca tras cada cambio de estado relevante y guarda el
/// `MessageRef` devuelto para ediciones futuras. Si una edición falla
/// (mensaje borrado, referencia caducada), el que llama descarta la
/// referencia y vuelve a publicar en lugar de propagar el error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSurface: Send + Sync {
    async fn post(&self, channel: ChannelId, embed: CreateEmbed) -> anyhow::Result<MessageRef>;
    async fn edit(&self, target: MessageRef, embed: CreateEmbed) -> anyhow::Result<()>;
}

/// Superficie real sobre la REST API de Discord.
pub struct DiscordSurface {
    http: Arc<Http>,
}

impl DiscordSurface {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl MessageSurface for DiscordSurface {
    async fn post(&self, channel: ChannelId, embed: CreateEmbed) -> anyhow::Result<MessageRef> {
        let message = channel
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(MessageRef {
            channel,
            message: message.id,
        })
    }

    async fn edit(&self, target: MessageRef, embed: CreateEmbed) -> anyhow::Result<()> {
        target
            .channel
            .edit_message(&self.http, target.message, EditMessage::new().embed(embed))
            .await?;
        Ok(())
    }
}

/// Edita la vista guardada en `slot` o publica una nueva si no existe.
/// Una referencia caducada se descarta y se re-publica.
pub async fn post_or_edit(
    surface: &dyn MessageSurface,
    channel: ChannelId,
    slot: &mut Option<MessageRef>,
    embed: CreateEmbed,
) {
    if let Some(target) = *slot {
        if surface.edit(target, embed.clone()).await.is_ok() {
            return;
        }
        tracing::warn!("⚠️ Referencia de mensaje caducada, re-publicando vista");
        *slot = None;
    }

    match surface.post(channel, embed).await {
        Ok(target) => *slot = Some(target),
        Err(e) => tracing::error!("❌ No se pudo publicar la vista: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn embed() -> CreateEmbed {
        CreateEmbed::new().description("prueba")
    }

    #[tokio::test]
    async fn test_post_or_edit_posts_when_empty() {
        let mut surface = MockMessageSurface::new();
        let target = MessageRef {
            channel: ChannelId::new(1),
            message: MessageId::new(10),
        };
        surface
            .expect_post()
            .times(1)
            .returning(move |_, _| Ok(target));

        let mut slot = None;
        post_or_edit(&surface, ChannelId::new(1), &mut slot, embed()).await;
        assert_eq!(slot, Some(target));
    }

    #[tokio::test]
    async fn test_post_or_edit_reposts_on_stale_reference() {
        let mut surface = MockMessageSurface::new();
        let stale = MessageRef {
            channel: ChannelId::new(1),
            message: MessageId::new(10),
        };
        let fresh = MessageRef {
            channel: ChannelId::new(1),
            message: MessageId::new(11),
        };

        surface
            .expect_edit()
            .with(eq(stale), always())
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("Unknown Message")));
        surface
            .expect_post()
            .times(1)
            .returning(move |_, _| Ok(fresh));

        let mut slot = Some(stale);
        post_or_edit(&surface, ChannelId::new(1), &mut slot, embed()).await;
        assert_eq!(slot, Some(fresh));
    }

    #[tokio::test]
    async fn test_post_or_edit_edits_in_place() {
        let mut surface = MockMessageSurface::new();
        let target = MessageRef {
            channel: ChannelId::new(1),
            message: MessageId::new(10),
        };
        surface
            .expect_edit()
            .with(eq(target), always())
            .times(1)
            .returning(|_, _| Ok(()));

        let mut slot = Some(target);
        post_or_edit(&surface, ChannelId::new(1), &mut slot, embed()).await;
        assert_eq!(slot, Some(target));
    }
}
