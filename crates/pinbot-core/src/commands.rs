use std::sync::Arc;

use tracing::debug;

use pinbot_types::{ChannelId, UserId};

use crate::error::{Error, Rejection, Result};
use crate::platform::Platform;
use crate::registry::{PinRegistration, Registry, SourceRegistration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RegisterSourceChannel,
    /// `key` is `None` when the argument was left off.
    RegisterPinChannel { key: Option<String> },
}

/// Parse `content` as a bot command. Anything that is not one of ours is
/// `None`, including unknown commands under the same prefix.
pub fn parse_command(prefix: &str, content: &str) -> Option<Command> {
    let rest = content.trim().strip_prefix(prefix)?;
    let mut parts = rest.split_whitespace();
    match parts.next()? {
        "register_source_channel" => Some(Command::RegisterSourceChannel),
        "register_pin_channel" => Some(Command::RegisterPinChannel {
            key: parts.next().map(str::to_string),
        }),
        _ => None,
    }
}

/// Where a command was invoked and by whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub channel: ChannelId,
    pub user: UserId,
}

/// Runs commands against the registry and writes the replies.
pub struct Commands {
    registry: Arc<Registry>,
    platform: Arc<dyn Platform>,
    prefix: String,
}

impl Commands {
    pub fn new(registry: Arc<Registry>, platform: Arc<dyn Platform>, prefix: String) -> Self {
        Self {
            registry,
            platform,
            prefix,
        }
    }

    pub async fn dispatch(&self, ctx: CommandContext, command: Command) -> Result<()> {
        debug!(channel = %ctx.channel, user = %ctx.user, ?command, "dispatching command");
        match command {
            Command::RegisterSourceChannel => self.register_source_channel(ctx).await,
            Command::RegisterPinChannel { key: Some(key) } => {
                self.register_pin_channel(ctx, &key).await
            }
            Command::RegisterPinChannel { key: None } => {
                let usage = format!("Usage: `{}register_pin_channel <key>`", self.prefix);
                self.reply(ctx.channel, &usage).await
            }
        }
    }

    async fn register_source_channel(&self, ctx: CommandContext) -> Result<()> {
        let channel = self.resolve(ctx.channel).await?;
        match self.registry.register_source(&channel, ctx.user).await? {
            // The key itself goes out privately from the registry.
            SourceRegistration::Issued { .. } => Ok(()),
            SourceRegistration::Rejected(rejection) => {
                self.reply(ctx.channel, &rejection.to_string()).await
            }
        }
    }

    async fn register_pin_channel(&self, ctx: CommandContext, key: &str) -> Result<()> {
        let channel = self.resolve(ctx.channel).await?;
        match self.registry.register_pin(key, &channel, ctx.user).await? {
            PinRegistration::Confirmed { source, pin } => {
                let text = format!("Registered pinning `{}` -> `{}`", source.name, pin.name);
                self.reply(pin.id, &text).await
            }
            // We can't post in the channel, so tell the user directly.
            PinRegistration::Rejected(Rejection::InsufficientPermission) => self
                .platform
                .send_direct(ctx.user, &Rejection::InsufficientPermission.to_string())
                .await
                .map_err(Error::Platform),
            PinRegistration::Rejected(Rejection::UnknownKey) => {
                let text = format!(
                    "No pending channel registrations with key `{}`",
                    key.replace('`', "")
                );
                self.reply(ctx.channel, &text).await
            }
            PinRegistration::Rejected(rejection) => {
                self.reply(ctx.channel, &rejection.to_string()).await
            }
        }
    }

    async fn resolve(&self, id: ChannelId) -> Result<pinbot_types::Channel> {
        self.platform
            .channel(id)
            .await
            .map_err(Error::Platform)?
            .ok_or(Error::ChannelNotFound(id))
    }

    async fn reply(&self, channel: ChannelId, text: &str) -> Result<()> {
        self.platform
            .send_text(channel, text)
            .await
            .map_err(Error::Platform)
    }
}
