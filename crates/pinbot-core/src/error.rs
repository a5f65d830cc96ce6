use pinbot_types::ChannelId;

/// Reasons a registration or pin request is turned down. These are reported
/// to the user who asked; they never propagate as faults. The `Display` text
/// is what the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Only server text channels can be connected, not direct messages or other channel types")]
    UnsupportedChannelKind,

    #[error("I don't have permission to send messages in that channel")]
    InsufficientPermission,

    #[error("No pending channel registration matches that key")]
    UnknownKey,

    #[error("Only the user who registered the source channel can confirm this key")]
    NotOwner,

    #[error("These channels are already connected")]
    DuplicateConnection,

    #[error("Will not pin messages from an age-restricted channel into one that isn't")]
    UnsafeContentLeak,

    #[error("Will not pin messages to the same chat")]
    SelfLoop,

    #[error("Cannot pin a message without media to pin")]
    NoMedia,

    #[error("Will not pin something with attachments and embeds, separate them")]
    MixedMedia,
}

impl Rejection {
    /// Whether a pending registration is removed when `register_pin` fails
    /// with this reason.
    pub fn discards_pending(self) -> bool {
        matches!(
            self,
            Self::UnsupportedChannelKind
                | Self::InsufficientPermission
                | Self::DuplicateConnection
                | Self::UnsafeContentLeak
                | Self::SelfLoop
        )
    }
}

/// Data-integrity findings. Logged, never returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityWarning {
    #[error("relay multiplicity anomaly: {count} confirmed connections link {source_channel} -> {pin_channel}")]
    RelayMultiplicityAnomaly {
        source_channel: ChannelId,
        pin_channel: ChannelId,
        count: usize,
    },
}

impl IntegrityWarning {
    /// `count` confirmed connections join `source_channel` to `pin_channel`;
    /// at most one may.
    pub fn check_multiplicity(
        source_channel: ChannelId,
        pin_channel: ChannelId,
        count: usize,
    ) -> Option<Self> {
        (count > 1).then_some(Self::RelayMultiplicityAnomaly {
            source_channel,
            pin_channel,
            count,
        })
    }
}

/// Faults that abort a single operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0:#}")]
    Store(anyhow::Error),

    #[error("platform error: {0:#}")]
    Platform(anyhow::Error),

    #[error("channel {0} could not be resolved")]
    ChannelNotFound(ChannelId),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
