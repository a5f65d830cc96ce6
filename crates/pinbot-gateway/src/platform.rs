use std::sync::Arc;

use anyhow::Result;
use serenity::all::{
    Cache, Channel as DiscordChannel, ChannelId as DiscordChannelId, CreateAllowedMentions,
    CreateAttachment, CreateEmbed, CreateMessage, GuildChannel, Http, UserId as DiscordUserId,
};
use serenity::async_trait;
use tracing::debug;

use pinbot_core::{OutboundFile, Platform};
use pinbot_types::{Attachment, Channel, ChannelId, Embed, UserId};

use crate::convert;

/// [`Platform`] backed by the Discord REST API and the gateway cache.
pub struct SerenityPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
    downloads: reqwest::Client,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, downloads: reqwest::Client) -> Self {
        Self {
            http,
            cache,
            downloads,
        }
    }

    fn discord_channel(id: ChannelId) -> DiscordChannelId {
        DiscordChannelId::new(id.get())
    }

    /// Parent of a thread, from the cache when it is there.
    async fn parent_of(&self, thread: &GuildChannel) -> Result<Option<GuildChannel>> {
        let Some(parent_id) = thread.parent_id else {
            return Ok(None);
        };
        let cached = self.cache.channel(parent_id).map(|parent| (*parent).clone());
        if cached.is_some() {
            return Ok(cached);
        }
        Ok(parent_id.to_channel(&self.http).await?.guild())
    }
}

#[async_trait]
impl Platform for SerenityPlatform {
    async fn channel(&self, id: ChannelId) -> Result<Option<Channel>> {
        match Self::discord_channel(id).to_channel(&self.http).await {
            Ok(DiscordChannel::Guild(gc)) if convert::is_thread(gc.kind) => {
                let parent_nsfw = self.parent_of(&gc).await?.map(|parent| parent.nsfw);
                Ok(Some(convert::guild_channel(&gc, parent_nsfw)))
            },
            Ok(channel) => Ok(Some(convert::channel(&channel))),
            Err(serenity::Error::Http(e)) if e.status_code().map(|s| s.as_u16()) == Some(404) => {
                debug!(channel = %id, "channel no longer exists");
                Ok(None)
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn can_send(&self, channel: ChannelId) -> Result<bool> {
        let DiscordChannel::Guild(target) =
            Self::discord_channel(channel).to_channel(&self.http).await?
        else {
            return Ok(false);
        };
        let kind = target.kind;
        // Thread permissions are decided by the parent's overwrites.
        let scope = if convert::is_thread(kind) {
            match self.parent_of(&target).await? {
                Some(parent) => parent,
                None => return Ok(false),
            }
        } else {
            target
        };
        let me = self.cache.current_user().id;
        let permissions = scope.permissions_for_user(&self.cache, me)?;
        Ok(convert::can_post(kind, permissions))
    }

    async fn send_direct(&self, user: UserId, text: &str) -> Result<()> {
        let dm = DiscordUserId::new(user.get())
            .create_dm_channel(&self.http)
            .await?;
        dm.id.send_message(&self.http, outgoing(text)).await?;
        Ok(())
    }

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<()> {
        Self::discord_channel(channel)
            .send_message(&self.http, outgoing(text))
            .await?;
        Ok(())
    }

    async fn send_files(
        &self,
        channel: ChannelId,
        caption: &str,
        files: Vec<OutboundFile>,
    ) -> Result<()> {
        let attachments = files
            .into_iter()
            .map(|f| CreateAttachment::bytes(f.data, f.filename));
        let builder = outgoing(caption).add_files(attachments);
        Self::discord_channel(channel)
            .send_message(&self.http, builder)
            .await?;
        Ok(())
    }

    async fn send_embed(&self, channel: ChannelId, caption: &str, embed: &Embed) -> Result<()> {
        let builder = outgoing(caption).embed(create_embed(embed));
        Self::discord_channel(channel)
            .send_message(&self.http, builder)
            .await?;
        Ok(())
    }

    async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        let response = self
            .downloads
            .get(&attachment.url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Every message the bot sends has mention parsing switched off, so text
/// echoed from users cannot ping anyone.
fn outgoing(content: &str) -> CreateMessage {
    CreateMessage::new()
        .content(content)
        .allowed_mentions(CreateAllowedMentions::new())
}

fn create_embed(embed: &Embed) -> CreateEmbed {
    let mut builder = CreateEmbed::new();
    if let Some(title) = &embed.title {
        builder = builder.title(title);
    }
    if let Some(description) = &embed.description {
        builder = builder.description(description);
    }
    if let Some(url) = &embed.url {
        builder = builder.url(url);
    }
    if let Some(image) = &embed.image_url {
        builder = builder.image(image);
    }
    if let Some(thumbnail) = &embed.thumbnail_url {
        builder = builder.thumbnail(thumbnail);
    }
    if let Some(colour) = embed.colour {
        builder = builder.colour(colour);
    }
    builder
}
