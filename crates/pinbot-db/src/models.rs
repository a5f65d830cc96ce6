use chrono::{DateTime, NaiveDateTime, Utc};
use pinbot_types::{ChannelId, ConnectionKey, UserId};

/// A row of `channel_connections`. `pin_channel` is `None` while the
/// registration is pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub key: ConnectionKey,
    pub source_channel: ChannelId,
    pub pin_channel: Option<ChannelId>,
    pub registering_user: UserId,
    pub created_at: DateTime<Utc>,
}

impl ConnectionRecord {
    pub fn is_confirmed(&self) -> bool {
        self.pin_channel.is_some()
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
pub(crate) fn parse_sqlite_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    raw.parse::<DateTime<Utc>>().or_else(|_| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
    })
}
