use serde::{Deserialize, Serialize};

use crate::models::{Message, UserId};

/// The user who added a reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactor {
    pub id: UserId,
    pub display_name: String,
}

/// A reaction was added to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEvent {
    /// Unicode emoji, or the `name:id` form for custom emoji.
    pub emoji: String,
    pub message: Message,
    pub reactor: Reactor,
}
