use anyhow::Result;
use async_trait::async_trait;

use pinbot_types::{Attachment, Channel, ChannelId, Embed, UserId};

/// A file to upload alongside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Everything the registry and relay need from the chat platform.
/// The gateway crate provides the concrete implementation.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Resolve a channel. `None` if it does not exist or is not visible.
    async fn channel(&self, id: ChannelId) -> Result<Option<Channel>>;

    /// Whether the bot may post in `channel`.
    async fn can_send(&self, channel: ChannelId) -> Result<bool>;

    /// Private message to a user.
    async fn send_direct(&self, user: UserId, text: &str) -> Result<()>;

    async fn send_text(&self, channel: ChannelId, text: &str) -> Result<()>;

    /// One message carrying every file.
    async fn send_files(
        &self,
        channel: ChannelId,
        caption: &str,
        files: Vec<OutboundFile>,
    ) -> Result<()>;

    async fn send_embed(&self, channel: ChannelId, caption: &str, embed: &Embed) -> Result<()>;

    /// Fetch the bytes behind an attachment.
    async fn download(&self, attachment: &Attachment) -> Result<Vec<u8>>;
}
