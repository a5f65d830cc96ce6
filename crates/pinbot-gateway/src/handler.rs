//! Gateway event handler: routes commands to the registry and pin reactions
//! to the relay engine.

use std::sync::{Arc, OnceLock};

use anyhow::{Context as _, Result};
use serenity::all::{Context, EventHandler, GatewayIntents, Message, Reaction, Ready};
use serenity::async_trait;
use tracing::{debug, error, info, warn};

use pinbot_core::{CommandContext, PinBot, RelayOutcome, Settings, parse_command};
use pinbot_db::Database;
use pinbot_types::{ChannelId, ReactionEvent, Reactor, UserId};

use crate::{SerenityPlatform, convert};

pub struct Handler {
    db: Arc<Database>,
    settings: Settings,
    downloads: reqwest::Client,
    // Built from the first event's context, which carries the http client and cache.
    bot: OnceLock<Arc<PinBot>>,
}

impl Handler {
    pub fn new(db: Arc<Database>, settings: Settings) -> Self {
        Self {
            db,
            settings,
            downloads: reqwest::Client::new(),
            bot: OnceLock::new(),
        }
    }

    /// Gateway intents needed for commands and reactions.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::GUILD_MESSAGE_REACTIONS
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
    }

    fn bot(&self, ctx: &Context) -> Arc<PinBot> {
        let bot = self.bot.get_or_init(|| {
            let platform = Arc::new(SerenityPlatform::new(
                Arc::clone(&ctx.http),
                Arc::clone(&ctx.cache),
                self.downloads.clone(),
            ));
            Arc::new(PinBot::new(
                Arc::clone(&self.db),
                platform,
                self.settings.clone(),
            ))
        });
        Arc::clone(bot)
    }

    async fn reaction_event(&self, ctx: &Context, reaction: &Reaction, emoji: String) -> Result<ReactionEvent> {
        let user_id = reaction
            .user_id
            .context("reaction arrived without a user")?;
        let message = reaction
            .message(&ctx.http)
            .await
            .context("fetch reacted message")?;
        let display_name = match &reaction.member {
            Some(member) => member.display_name().to_string(),
            None => reaction
                .user(ctx)
                .await
                .context("fetch reacting user")?
                .display_name()
                .to_string(),
        };

        Ok(ReactionEvent {
            emoji,
            message: convert::message(&message),
            reactor: Reactor {
                id: UserId(user_id.get()),
                display_name,
            },
        })
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            bot_name = %ready.user.name,
            bot_id = %ready.user.id,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );
        self.bot(&ctx);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(command) = parse_command(&self.settings.command_prefix, &msg.content) else {
            return;
        };

        let cmd_ctx = CommandContext {
            channel: ChannelId(msg.channel_id.get()),
            user: UserId(msg.author.id.get()),
        };
        debug!(channel = %cmd_ctx.channel, user = %cmd_ctx.user, ?command, "command received");

        if let Err(e) = self.bot(&ctx).commands.dispatch(cmd_ctx, command).await {
            error!(error = %e, channel = %cmd_ctx.channel, "command failed");
        }
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        // Filter on the glyph before spending requests on the message.
        let emoji = convert::emoji_text(&reaction.emoji);
        if emoji != self.settings.pin_emoji {
            return;
        }

        let event = match self.reaction_event(&ctx, &reaction, emoji).await {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %format!("{e:#}"), message_id = %reaction.message_id, "dropping pin reaction");
                return;
            },
        };

        match self.bot(&ctx).relay.on_pin_reaction(&event).await {
            Ok(RelayOutcome::Relayed(relays)) => {
                let posted: usize = relays.iter().map(|r| r.posted).sum();
                info!(
                    message_id = %event.message.id,
                    connections = relays.len(),
                    posted,
                    "pin reaction handled"
                );
            },
            Ok(outcome) => debug!(message_id = %event.message.id, ?outcome, "pin reaction skipped"),
            Err(e) => error!(error = %e, message_id = %event.message.id, "relay failed"),
        }
    }
}
