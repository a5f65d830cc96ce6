#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use pinbot_core::{OutboundFile, PinBot, PinRegistration, Platform, Settings, SourceRegistration};
use pinbot_db::Database;
use pinbot_types::{
    Attachment, AttachmentId, Channel, ChannelId, ChannelKind, ConnectionKey, Embed, Message,
    MessageId, ReactionEvent, Reactor, UserId,
};

pub const NEWS: ChannelId = ChannelId(100);
pub const PINS: ChannelId = ChannelId(200);
pub const PINS_TOO: ChannelId = ChannelId(210);
pub const NSFW_SOURCE: ChannelId = ChannelId(300);
pub const NSFW_PINS: ChannelId = ChannelId(400);
pub const DM: ChannelId = ChannelId(500);
pub const LOCKED: ChannelId = ChannelId(600);

pub const ALICE: UserId = UserId(1);
pub const BOB: UserId = UserId(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Direct {
        user: UserId,
        text: String,
    },
    Text {
        channel: ChannelId,
        text: String,
    },
    Files {
        channel: ChannelId,
        caption: String,
        files: Vec<OutboundFile>,
    },
    Embed {
        channel: ChannelId,
        caption: String,
        embed: Embed,
    },
}

/// Records every outbound call instead of talking to a platform.
pub struct FakePlatform {
    channels: HashMap<ChannelId, Channel>,
    locked: HashSet<ChannelId>,
    downloads: Mutex<HashMap<String, Vec<u8>>>,
    sent: Mutex<Vec<Sent>>,
    fail_sends: AtomicBool,
    unreachable: Mutex<HashSet<ChannelId>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let channels = [
            (NEWS, "news", ChannelKind::Guild { sensitive: false }),
            (PINS, "pins", ChannelKind::Guild { sensitive: false }),
            (PINS_TOO, "more-pins", ChannelKind::Guild { sensitive: false }),
            (NSFW_SOURCE, "spicy", ChannelKind::Guild { sensitive: true }),
            (NSFW_PINS, "spicy-pins", ChannelKind::Guild { sensitive: true }),
            (DM, "dm", ChannelKind::Direct),
            (LOCKED, "read-only", ChannelKind::Guild { sensitive: false }),
        ]
        .into_iter()
        .map(|(id, name, kind)| {
            (
                id,
                Channel {
                    id,
                    name: name.to_string(),
                    kind,
                },
            )
        })
        .collect();

        Self {
            channels,
            locked: HashSet::from([LOCKED]),
            downloads: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            unreachable: Mutex::new(HashSet::new()),
        }
    }

    pub fn channel_info(&self, id: ChannelId) -> Channel {
        self.channels[&id].clone()
    }

    pub fn serve(&self, url: &str, data: Vec<u8>) {
        self.downloads.lock().unwrap().insert(url.to_string(), data);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Posts to `channel` fail as if it had been deleted.
    pub fn set_unreachable(&self, channel: ChannelId, unreachable: bool) {
        let mut set = self.unreachable.lock().unwrap();
        if unreachable {
            set.insert(channel);
        } else {
            set.remove(&channel);
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn posts_to(&self, channel: ChannelId) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| match s {
                Sent::Files { channel: c, .. } | Sent::Embed { channel: c, .. } => *c == channel,
                _ => false,
            })
            .collect()
    }

    pub fn directs_to(&self, user: UserId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Direct { user: u, text } if u == user => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) -> anyhow::Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("simulated send failure");
        }
        let target = match &sent {
            Sent::Text { channel, .. } | Sent::Files { channel, .. } | Sent::Embed { channel, .. } => {
                Some(*channel)
            }
            Sent::Direct { .. } => None,
        };
        if target.is_some_and(|c| self.unreachable.lock().unwrap().contains(&c)) {
            anyhow::bail!("404 Unknown Channel");
        }
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn channel(&self, id: ChannelId) -> anyhow::Result<Option<Channel>> {
        Ok(self.channels.get(&id).cloned())
    }

    async fn can_send(&self, channel: ChannelId) -> anyhow::Result<bool> {
        Ok(!self.locked.contains(&channel))
    }

    async fn send_direct(&self, user: UserId, text: &str) -> anyhow::Result<()> {
        self.record(Sent::Direct {
            user,
            text: text.to_string(),
        })
    }

    async fn send_text(&self, channel: ChannelId, text: &str) -> anyhow::Result<()> {
        self.record(Sent::Text {
            channel,
            text: text.to_string(),
        })
    }

    async fn send_files(
        &self,
        channel: ChannelId,
        caption: &str,
        files: Vec<OutboundFile>,
    ) -> anyhow::Result<()> {
        self.record(Sent::Files {
            channel,
            caption: caption.to_string(),
            files,
        })
    }

    async fn send_embed(&self, channel: ChannelId, caption: &str, embed: &Embed) -> anyhow::Result<()> {
        self.record(Sent::Embed {
            channel,
            caption: caption.to_string(),
            embed: embed.clone(),
        })
    }

    async fn download(&self, attachment: &Attachment) -> anyhow::Result<Vec<u8>> {
        let served = self.downloads.lock().unwrap().get(&attachment.url).cloned();
        Ok(served.unwrap_or_else(|| vec![0u8; attachment.size as usize]))
    }
}

pub struct Harness {
    pub bot: PinBot,
    pub db: Arc<Database>,
    pub platform: Arc<FakePlatform>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let platform = Arc::new(FakePlatform::new());
        let bot = PinBot::new(Arc::clone(&db), platform.clone(), settings);
        Self { bot, db, platform }
    }

    pub async fn register_source(&self, source: ChannelId, user: UserId) -> ConnectionKey {
        let channel = self.platform.channel_info(source);
        match self.bot.registry.register_source(&channel, user).await.unwrap() {
            SourceRegistration::Issued { key, .. } => key,
            other => panic!("source registration failed: {:?}", other),
        }
    }

    pub async fn register_pin(&self, key: &str, pin: ChannelId, user: UserId) -> PinRegistration {
        let channel = self.platform.channel_info(pin);
        self.bot.registry.register_pin(key, &channel, user).await.unwrap()
    }

    /// Register and confirm `source -> pin` in one go.
    pub async fn connect(&self, source: ChannelId, pin: ChannelId, user: UserId) -> ConnectionKey {
        let key = self.register_source(source, user).await;
        let outcome = self.register_pin(&key.to_string(), pin, user).await;
        assert!(
            matches!(outcome, PinRegistration::Confirmed { .. }),
            "expected confirmation, got {:?}",
            outcome
        );
        key
    }
}

pub fn reactor() -> Reactor {
    Reactor {
        id: BOB,
        display_name: "Bob".to_string(),
    }
}

pub fn attachment(id: u64, size: u64) -> Attachment {
    Attachment {
        id: AttachmentId(id),
        filename: format!("file-{}.png", id),
        size,
        url: format!("https://cdn.example/attachments/{}/file-{}.png", id, id),
        content_type: Some("image/png".to_string()),
    }
}

pub fn embed(url: &str) -> Embed {
    Embed {
        title: Some("A link".to_string()),
        url: Some(url.to_string()),
        ..Embed::default()
    }
}

pub fn message_in(channel: ChannelId, id: u64, attachments: Vec<Attachment>, embeds: Vec<Embed>) -> Message {
    Message {
        id: MessageId(id),
        channel_id: channel,
        jump_url: format!("https://chat.example/channels/1/{}/{}", channel, id),
        attachments,
        embeds,
    }
}

pub fn pin_reaction(message: Message) -> ReactionEvent {
    ReactionEvent {
        emoji: "📌".to_string(),
        message,
        reactor: reactor(),
    }
}
