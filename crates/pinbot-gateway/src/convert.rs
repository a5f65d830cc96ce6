//! Mapping between serenity models and the platform-neutral pinbot types.

use serenity::all::{
    Attachment as DiscordAttachment, Channel as DiscordChannel, ChannelType,
    Embed as DiscordEmbed, GuildChannel, Message as DiscordMessage, Permissions, ReactionType,
};

use pinbot_types::{
    Attachment, AttachmentId, Channel, ChannelId, ChannelKind, Embed, Message, MessageId,
};

/// Map a channel fetched without thread context; threads come out as
/// [`ChannelKind::Other`]. Use [`guild_channel`] with the parent's flag.
pub fn channel(channel: &DiscordChannel) -> Channel {
    match channel {
        DiscordChannel::Guild(gc) => guild_channel(gc, None),
        DiscordChannel::Private(pc) => Channel {
            id: ChannelId(pc.id.get()),
            name: pc.recipient.name.clone(),
            kind: ChannelKind::Direct,
        },
        other => Channel {
            id: ChannelId(other.id().get()),
            name: String::new(),
            kind: ChannelKind::Other,
        },
    }
}

/// `parent_nsfw` is the age-restriction flag of a thread's parent channel;
/// ignored for anything that is not a thread.
pub fn guild_channel(gc: &GuildChannel, parent_nsfw: Option<bool>) -> Channel {
    Channel {
        id: ChannelId(gc.id.get()),
        name: gc.name.clone(),
        kind: guild_kind(gc.kind, gc.nsfw, parent_nsfw),
    }
}

pub fn is_thread(kind: ChannelType) -> bool {
    matches!(
        kind,
        ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread
    )
}

/// Only channels that carry ordinary messages can take part in a link.
/// Threads carry no age restriction of their own and inherit the parent's;
/// a thread whose parent is unknown is not linkable.
pub fn guild_kind(kind: ChannelType, nsfw: bool, parent_nsfw: Option<bool>) -> ChannelKind {
    match kind {
        ChannelType::Text | ChannelType::News => ChannelKind::Guild { sensitive: nsfw },
        thread if is_thread(thread) => match parent_nsfw {
            Some(sensitive) => ChannelKind::Guild { sensitive },
            None => ChannelKind::Other,
        },
        _ => ChannelKind::Other,
    }
}

/// Whether `permissions` allow posting into a channel of `kind`.
pub fn can_post(kind: ChannelType, permissions: Permissions) -> bool {
    if is_thread(kind) {
        permissions.send_messages_in_threads()
    } else {
        permissions.send_messages()
    }
}

pub fn message(msg: &DiscordMessage) -> Message {
    Message {
        id: MessageId(msg.id.get()),
        channel_id: ChannelId(msg.channel_id.get()),
        jump_url: msg.link(),
        attachments: msg.attachments.iter().map(attachment).collect(),
        embeds: msg.embeds.iter().map(embed).collect(),
    }
}

fn attachment(a: &DiscordAttachment) -> Attachment {
    Attachment {
        id: AttachmentId(a.id.get()),
        filename: a.filename.clone(),
        size: u64::from(a.size),
        url: a.url.clone(),
        content_type: a.content_type.clone(),
    }
}

fn embed(e: &DiscordEmbed) -> Embed {
    Embed {
        title: e.title.clone(),
        description: e.description.clone(),
        url: e.url.clone(),
        image_url: e.image.as_ref().map(|i| i.url.clone()),
        thumbnail_url: e.thumbnail.as_ref().map(|t| t.url.clone()),
        colour: e.colour.map(|c| c.0),
    }
}

/// Text form of a reaction, comparable against the configured pin glyph.
pub fn emoji_text(emoji: &ReactionType) -> String {
    match emoji {
        ReactionType::Unicode(glyph) => glyph.clone(),
        other => other.to_string(),
    }
}
