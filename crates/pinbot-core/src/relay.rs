//! Relay engine: reposts the media of a pinned message into every pin
//! channel connected to its source channel, once per connection.
//!
//! Dedup state lives in the store and is written only after a successful
//! post. An in-process claim on each `(connection, media)` pair covers the
//! gap between the dedup read and the record write, so two reactions racing
//! on the same message cannot both post. A crash between post and record can
//! still repost on a later reaction.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use pinbot_db::{ConnectionRecord, Database, queries};
use pinbot_types::{
    Attachment, AttachmentId, ChannelId, ConnectionKey, Message, ReactionEvent, Reactor,
};

use crate::config::Settings;
use crate::error::{Error, IntegrityWarning, Rejection, Result};
use crate::platform::{OutboundFile, Platform};
use crate::store::blocking;

/// What a pin reaction led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The reaction was not the pin glyph.
    NotPinGlyph,
    /// The message's channel is not the source of any confirmed connection.
    NoConnections,
    /// The message has no media, or mixed media; the reactor was told why.
    Rejected(Rejection),
    Relayed(Vec<ConnectionRelay>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRelay {
    pub key: ConnectionKey,
    pub pin_channel: ChannelId,
    /// Attachments or embeds posted; 0 if everything was already pinned.
    pub posted: usize,
}

enum MediaShape {
    Attachments,
    Embeds,
}

fn media_shape(message: &Message) -> std::result::Result<MediaShape, Rejection> {
    match (message.attachments.is_empty(), message.embeds.is_empty()) {
        (false, false) => Err(Rejection::MixedMedia),
        (true, true) => Err(Rejection::NoMedia),
        (false, true) => Ok(MediaShape::Attachments),
        (true, false) => Ok(MediaShape::Embeds),
    }
}

pub fn caption(reactor: &Reactor, message: &Message) -> String {
    format!("Pinned by [{}]\n{}", reactor.display_name, message.jump_url)
}

pub struct RelayEngine {
    db: Arc<Database>,
    platform: Arc<dyn Platform>,
    pin_emoji: String,
    upload_ceiling: usize,
    claims: Claims,
}

impl RelayEngine {
    pub fn new(db: Arc<Database>, platform: Arc<dyn Platform>, settings: &Settings) -> Self {
        Self {
            db,
            platform,
            pin_emoji: settings.pin_emoji.clone(),
            upload_ceiling: settings.upload_ceiling,
            claims: Claims::default(),
        }
    }

    /// Handle one reaction-add event. Every connection is attempted; if any
    /// of them failed, the first failure is returned afterwards.
    pub async fn on_pin_reaction(&self, event: &ReactionEvent) -> Result<RelayOutcome> {
        if event.emoji != self.pin_emoji {
            return Ok(RelayOutcome::NotPinGlyph);
        }

        let message = &event.message;
        let source = message.channel_id;
        let connections = blocking(&self.db, move |db| db.confirmed_for_source(source)).await?;
        if connections.is_empty() {
            debug!(source = %source, "channel has no pin connections");
            return Ok(RelayOutcome::NoConnections);
        }
        for warning in shared_pin_channels(source, &connections) {
            error!("{}", warning);
        }

        let shape = match media_shape(message) {
            Ok(shape) => shape,
            Err(rejection) => {
                warn!(message = %message.id, reactor = %event.reactor.id, ?rejection, "refusing to pin");
                self.platform
                    .send_direct(event.reactor.id, &rejection.to_string())
                    .await
                    .map_err(Error::Platform)?;
                return Ok(RelayOutcome::Rejected(rejection));
            }
        };

        let caption = caption(&event.reactor, message);
        let mut downloads = HashMap::new();
        let mut relayed = Vec::with_capacity(connections.len());
        let mut first_failure = None;

        // A failing pin channel must not starve the connections after it.
        for connection in connections {
            let Some(pin_channel) = connection.pin_channel else {
                continue;
            };
            let result = match shape {
                MediaShape::Attachments => {
                    self.relay_attachments(connection.key, pin_channel, message, &caption, &mut downloads)
                        .await
                }
                MediaShape::Embeds => {
                    self.relay_embeds(connection.key, pin_channel, message, &caption)
                        .await
                }
            };
            match result {
                Ok(posted) => relayed.push(ConnectionRelay {
                    key: connection.key,
                    pin_channel,
                    posted,
                }),
                Err(e) => {
                    error!(key = %connection.key, pin = %pin_channel, message = %message.id, error = %e, "relay to pin channel failed");
                    first_failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_failure {
            return Err(e);
        }
        Ok(RelayOutcome::Relayed(relayed))
    }

    async fn relay_attachments(
        &self,
        key: ConnectionKey,
        pin_channel: ChannelId,
        message: &Message,
        caption: &str,
        downloads: &mut HashMap<AttachmentId, OutboundFile>,
    ) -> Result<usize> {
        let claim = self.claims.claim(
            key,
            message.attachments.iter().map(|a| MediaRef::Attachment(a.id)),
        );
        let claimed: Vec<AttachmentId> = claim
            .items()
            .iter()
            .filter_map(|item| match item {
                MediaRef::Attachment(id) => Some(*id),
                MediaRef::Embed(_) => None,
            })
            .collect();

        let fresh: Vec<AttachmentId> = blocking(&self.db, move |db| {
            db.with_conn(|conn| {
                let mut fresh = Vec::with_capacity(claimed.len());
                for id in claimed {
                    if !queries::is_attachment_pinned(conn, key, id)? {
                        fresh.push(id);
                    }
                }
                Ok(fresh)
            })
        })
        .await?;

        if fresh.is_empty() {
            debug!(%key, message = %message.id, "attachments already pinned");
            return Ok(0);
        }

        let mut files = Vec::with_capacity(fresh.len());
        for attachment in message.attachments.iter().filter(|a| fresh.contains(&a.id)) {
            if !downloads.contains_key(&attachment.id) {
                let file = self.prepare(attachment).await?;
                downloads.insert(attachment.id, file);
            }
            if let Some(file) = downloads.get(&attachment.id) {
                files.push(file.clone());
            }
        }

        debug!(%key, pin = %pin_channel, count = files.len(), "posting attachments");
        self.platform
            .send_files(pin_channel, caption, files)
            .await
            .map_err(Error::Platform)?;

        let posted = fresh.len();
        blocking(&self.db, move |db| {
            db.with_tx(|tx| {
                for id in fresh {
                    queries::record_pinned_attachment(tx, key, id)?;
                }
                Ok(())
            })
        })
        .await?;

        info!(%key, pin = %pin_channel, message = %message.id, posted, "attachments relayed");
        drop(claim);
        Ok(posted)
    }

    async fn relay_embeds(
        &self,
        key: ConnectionKey,
        pin_channel: ChannelId,
        message: &Message,
        caption: &str,
    ) -> Result<usize> {
        let url = message.jump_url.clone();
        let claim = self
            .claims
            .claim(key, std::iter::once(MediaRef::Embed(url.clone())));
        if claim.items().is_empty() {
            debug!(%key, message = %message.id, "embed relay already in flight");
            return Ok(0);
        }

        let lookup = url.clone();
        let pinned =
            blocking(&self.db, move |db| db.with_conn(|conn| queries::is_embed_pinned(conn, key, &lookup)))
                .await?;
        if pinned {
            debug!(%key, message = %message.id, "embeds already pinned");
            return Ok(0);
        }

        for embed in &message.embeds {
            self.platform
                .send_embed(pin_channel, caption, embed)
                .await
                .map_err(Error::Platform)?;
        }

        blocking(&self.db, move |db| {
            db.with_conn(|conn| queries::record_pinned_embed(conn, key, &url))
        })
        .await?;

        let posted = message.embeds.len();
        info!(%key, pin = %pin_channel, message = %message.id, posted, "embeds relayed");
        drop(claim);
        Ok(posted)
    }

    /// Download an attachment and bring it under the upload ceiling when it
    /// is an image. Anything that cannot be shrunk is sent as is.
    async fn prepare(&self, attachment: &Attachment) -> Result<OutboundFile> {
        let data = self
            .platform
            .download(attachment)
            .await
            .map_err(Error::Platform)?;

        if data.len() <= self.upload_ceiling {
            return Ok(OutboundFile {
                filename: attachment.filename.clone(),
                data,
            });
        }

        let ceiling = self.upload_ceiling;
        let original_len = data.len();
        let (data, shrunk) = tokio::task::spawn_blocking(move || {
            match pinbot_media::shrink_to_fit(&data, ceiling) {
                Ok(shrunk) => (shrunk.data, Ok((shrunk.passes, shrunk.fits))),
                Err(e) => (data, Err(e)),
            }
        })
        .await?;

        match shrunk {
            Ok((passes, true)) => {
                debug!(attachment = %attachment.id, original_len, len = data.len(), passes, "attachment shrunk")
            }
            Ok((passes, false)) => {
                warn!(attachment = %attachment.id, original_len, len = data.len(), passes, "attachment still over ceiling, posting anyway")
            }
            Err(e) => {
                warn!(attachment = %attachment.id, original_len, error = %e, "attachment could not be shrunk, posting as is")
            }
        }

        Ok(OutboundFile {
            filename: attachment.filename.clone(),
            data,
        })
    }
}

/// Pin channels fed more than once from `source`.
fn shared_pin_channels(source: ChannelId, connections: &[ConnectionRecord]) -> Vec<IntegrityWarning> {
    let mut counts: HashMap<ChannelId, usize> = HashMap::new();
    for pin in connections.iter().filter_map(|c| c.pin_channel) {
        *counts.entry(pin).or_default() += 1;
    }
    counts
        .into_iter()
        .filter_map(|(pin, count)| IntegrityWarning::check_multiplicity(source, pin, count))
        .collect()
}

// -- In-flight claims --

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MediaRef {
    Attachment(AttachmentId),
    Embed(String),
}

#[derive(Default)]
struct Claims {
    inflight: Arc<Mutex<HashSet<(ConnectionKey, MediaRef)>>>,
}

impl Claims {
    /// Claim every item not already claimed by another relay. Claims are
    /// released when the returned guard drops.
    fn claim(&self, key: ConnectionKey, items: impl IntoIterator<Item = MediaRef>) -> ClaimGuard {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        let items = items
            .into_iter()
            .filter(|item| inflight.insert((key, item.clone())))
            .collect();
        ClaimGuard {
            inflight: Arc::clone(&self.inflight),
            key,
            items,
        }
    }
}

struct ClaimGuard {
    inflight: Arc<Mutex<HashSet<(ConnectionKey, MediaRef)>>>,
    key: ConnectionKey,
    items: Vec<MediaRef>,
}

impl ClaimGuard {
    fn items(&self) -> &[MediaRef] {
        &self.items
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        for item in self.items.drain(..) {
            inflight.remove(&(self.key, item));
        }
    }
}
