pub mod events;
pub mod models;

pub use events::{ReactionEvent, Reactor};
pub use models::{
    Attachment, AttachmentId, Channel, ChannelId, ChannelKind, ConnectionKey, Embed, Message,
    MessageId, UserId,
};
