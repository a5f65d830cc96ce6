//! Connection registry: the two-step handshake that links a source channel
//! to a pin channel.
//!
//! `register_source` hands the caller a key; `register_pin`, run in the
//! destination channel with that key, walks the gates below in order and
//! either confirms the link or reports why not:
//!
//! 1. pin channel is a guild text channel
//! 2. the bot can post in the pin channel
//! 3. the key names a pending registration
//! 4. the caller is the user who started it
//! 5. no other confirmed link exists for the same pair
//! 6. an age-restricted source only feeds an age-restricted pin channel
//! 7. source and pin differ
//!
//! Gates 3 to 7 and the confirming write share one store transaction.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use pinbot_db::{Database, queries};
use pinbot_types::{Channel, ConnectionKey, UserId};

use crate::error::{Error, IntegrityWarning, Rejection, Result};
use crate::platform::Platform;
use crate::store::blocking;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRegistration {
    /// `reused` is true when an existing pending key was handed out again.
    Issued { key: ConnectionKey, reused: bool },
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinRegistration {
    Confirmed { source: Channel, pin: Channel },
    Rejected(Rejection),
}

pub struct Registry {
    db: Arc<Database>,
    platform: Arc<dyn Platform>,
    command_prefix: String,
}

impl Registry {
    pub fn new(db: Arc<Database>, platform: Arc<dyn Platform>, command_prefix: String) -> Self {
        Self {
            db,
            platform,
            command_prefix,
        }
    }

    /// Start a registration from `source`. Sends the key to `user` privately.
    pub async fn register_source(
        &self,
        source: &Channel,
        user: UserId,
    ) -> Result<SourceRegistration> {
        if !source.kind.is_guild() {
            warn!(source = %source.id, user = %user, "refusing non-guild source channel");
            return Ok(SourceRegistration::Rejected(Rejection::UnsupportedChannelKind));
        }

        let source_id = source.id;
        let (key, reused) = blocking(&self.db, move |db| {
            db.with_tx(|tx| {
                if let Some(existing) = queries::find_pending(tx, source_id, user)? {
                    return Ok((existing.key, true));
                }
                let key = ConnectionKey::generate();
                queries::insert_pending(tx, key, source_id, user)?;
                Ok((key, false))
            })
        })
        .await?;

        if reused {
            debug!(%key, source = %source_id, user = %user, "reissuing pending registration");
        } else {
            info!(%key, source = %source_id, user = %user, "pending registration created");
        }

        let notice = format!(
            "Register pin channel with `{}register_pin_channel {}`",
            self.command_prefix, key
        );
        self.platform
            .send_direct(user, &notice)
            .await
            .map_err(Error::Platform)?;

        Ok(SourceRegistration::Issued { key, reused })
    }

    /// Confirm the registration named by `key` with `pin` as its destination.
    pub async fn register_pin(
        &self,
        key: &str,
        pin: &Channel,
        user: UserId,
    ) -> Result<PinRegistration> {
        let key = key.parse::<ConnectionKey>().ok();

        // Gate 1
        if !pin.kind.is_guild() {
            return self.reject(key, Rejection::UnsupportedChannelKind).await;
        }

        // Gate 2
        let can_send = self
            .platform
            .can_send(pin.id)
            .await
            .map_err(Error::Platform)?;
        if !can_send {
            return self.reject(key, Rejection::InsufficientPermission).await;
        }

        // Gates 3 and 4, ahead of the transaction, to find the source channel.
        let Some(key) = key else {
            return Ok(PinRegistration::Rejected(Rejection::UnknownKey));
        };
        let record = match blocking(&self.db, move |db| db.get_connection(key)).await? {
            Some(record) if !record.is_confirmed() => record,
            _ => return Ok(PinRegistration::Rejected(Rejection::UnknownKey)),
        };
        if record.registering_user != user {
            warn!(%key, owner = %record.registering_user, user = %user, "registration confirmed by non-owner");
            return Ok(PinRegistration::Rejected(Rejection::NotOwner));
        }

        let source = self
            .platform
            .channel(record.source_channel)
            .await
            .map_err(Error::Platform)?
            .ok_or(Error::ChannelNotFound(record.source_channel))?;

        // Gates 3 to 7 again, atomically with the write.
        let pin_for_tx = pin.clone();
        let source_for_tx = source.clone();
        let verdict = blocking(&self.db, move |db| {
            db.with_tx(|tx| {
                match queries::get_connection(tx, key)? {
                    Some(current) if !current.is_confirmed() => {
                        if current.registering_user != user {
                            return Ok(Err(Rejection::NotOwner));
                        }
                    }
                    _ => return Ok(Err(Rejection::UnknownKey)),
                }

                let duplicates =
                    queries::count_confirmed_pair(tx, source_for_tx.id, pin_for_tx.id, key)?;
                if let Some(warning) =
                    IntegrityWarning::check_multiplicity(source_for_tx.id, pin_for_tx.id, duplicates)
                {
                    error!(%key, "{}", warning);
                }

                match link_verdict(duplicates, &source_for_tx, &pin_for_tx) {
                    Ok(()) => {
                        queries::confirm_connection(tx, key, pin_for_tx.id)?;
                        Ok(Ok(()))
                    }
                    Err(rejection) => {
                        if rejection.discards_pending() {
                            queries::delete_connection(tx, key)?;
                        }
                        Ok(Err(rejection))
                    }
                }
            })
        })
        .await?;

        match verdict {
            Ok(()) => {
                info!(%key, source = %source.id, pin = %pin.id, "connection confirmed");
                Ok(PinRegistration::Confirmed {
                    source,
                    pin: pin.clone(),
                })
            }
            Err(rejection) => {
                warn!(%key, source = %source.id, pin = %pin.id, ?rejection, "registration rejected");
                Ok(PinRegistration::Rejected(rejection))
            }
        }
    }

    /// Remove a record by key, cascading to its pinned media. Returns whether
    /// the record existed.
    pub async fn delete_record(&self, key: ConnectionKey) -> Result<bool> {
        let existed = blocking(&self.db, move |db| db.delete_connection(key)).await?;
        debug!(%key, existed, "connection record deleted");
        Ok(existed)
    }

    async fn reject(
        &self,
        key: Option<ConnectionKey>,
        rejection: Rejection,
    ) -> Result<PinRegistration> {
        if let Some(key) = key {
            // Only pending records are discarded; a confirmed link is permanent.
            let discarded = blocking(&self.db, move |db| {
                db.with_tx(|tx| match queries::get_connection(tx, key)? {
                    Some(record) if !record.is_confirmed() => queries::delete_connection(tx, key),
                    _ => Ok(false),
                })
            })
            .await?;
            debug!(%key, discarded, "pending registration discarded");
        }
        warn!(?rejection, "registration rejected");
        Ok(PinRegistration::Rejected(rejection))
    }
}

/// Gates 5 to 7 for a link from `source` to `pin`, given the number of other
/// confirmed links already joining them.
pub(crate) fn link_verdict(
    duplicates: usize,
    source: &Channel,
    pin: &Channel,
) -> std::result::Result<(), Rejection> {
    if duplicates > 0 {
        return Err(Rejection::DuplicateConnection);
    }
    if source.kind.is_sensitive() && !pin.kind.is_sensitive() {
        return Err(Rejection::UnsafeContentLeak);
    }
    if source.id == pin.id {
        return Err(Rejection::SelfLoop);
    }
    Ok(())
}
