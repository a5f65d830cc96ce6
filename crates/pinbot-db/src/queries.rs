use std::str::FromStr;

use anyhow::Result;
use pinbot_types::{AttachmentId, ChannelId, ConnectionKey, UserId};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};

use crate::Database;
use crate::models::{ConnectionRecord, parse_sqlite_timestamp};

const CONNECTION_COLUMNS: &str =
    "channel_key, source_channel, pin_channel, registering_user, created_at";

impl Database {
    // -- Connections --

    pub fn get_connection(&self, key: ConnectionKey) -> Result<Option<ConnectionRecord>> {
        self.with_conn(|conn| get_connection(conn, key))
    }

    /// Confirmed connections whose source is `source`.
    pub fn confirmed_for_source(&self, source: ChannelId) -> Result<Vec<ConnectionRecord>> {
        self.with_conn(|conn| confirmed_for_source(conn, source))
    }

    /// Removes a connection and, by cascade, everything pinned through it.
    /// Returns whether a row existed.
    pub fn delete_connection(&self, key: ConnectionKey) -> Result<bool> {
        self.with_conn(|conn| delete_connection(conn, key))
    }
}

// Free functions take a `&Connection` so callers can compose them inside
// `Database::with_tx` (a `Transaction` derefs to `Connection`).

pub fn insert_pending(
    conn: &Connection,
    key: ConnectionKey,
    source: ChannelId,
    user: UserId,
) -> Result<()> {
    conn.execute(
        "INSERT INTO channel_connections (channel_key, source_channel, pin_channel, registering_user)
         VALUES (?1, ?2, NULL, ?3)",
        params![key.to_string(), source.to_string(), user.to_string()],
    )?;
    Ok(())
}

pub fn find_pending(
    conn: &Connection,
    source: ChannelId,
    user: UserId,
) -> Result<Option<ConnectionRecord>> {
    let sql = format!(
        "SELECT {CONNECTION_COLUMNS} FROM channel_connections
         WHERE source_channel = ?1 AND registering_user = ?2 AND pin_channel IS NULL
         ORDER BY created_at
         LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row(params![source.to_string(), user.to_string()], map_connection)
        .optional()?;
    Ok(row)
}

pub fn get_connection(conn: &Connection, key: ConnectionKey) -> Result<Option<ConnectionRecord>> {
    let sql = format!("SELECT {CONNECTION_COLUMNS} FROM channel_connections WHERE channel_key = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([key.to_string()], map_connection).optional()?;
    Ok(row)
}

pub fn confirmed_for_source(conn: &Connection, source: ChannelId) -> Result<Vec<ConnectionRecord>> {
    let sql = format!(
        "SELECT {CONNECTION_COLUMNS} FROM channel_connections
         WHERE source_channel = ?1 AND pin_channel IS NOT NULL
         ORDER BY created_at, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([source.to_string()], map_connection)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Confirmed connections linking `source` to `pin`, other than `except`.
pub fn count_confirmed_pair(
    conn: &Connection,
    source: ChannelId,
    pin: ChannelId,
    except: ConnectionKey,
) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM channel_connections
         WHERE source_channel = ?1 AND pin_channel = ?2 AND channel_key != ?3",
        params![source.to_string(), pin.to_string(), except.to_string()],
        |r| r.get(0),
    )?;
    Ok(count as usize)
}

/// Sets the pin channel on a pending record. Returns false if the record
/// was already confirmed or no longer exists.
pub fn confirm_connection(conn: &Connection, key: ConnectionKey, pin: ChannelId) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE channel_connections SET pin_channel = ?1
         WHERE channel_key = ?2 AND pin_channel IS NULL",
        params![pin.to_string(), key.to_string()],
    )?;
    Ok(changed == 1)
}

pub fn delete_connection(conn: &Connection, key: ConnectionKey) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM channel_connections WHERE channel_key = ?1",
        [key.to_string()],
    )?;
    Ok(changed > 0)
}

// -- Pinned media --

pub fn is_attachment_pinned(
    conn: &Connection,
    key: ConnectionKey,
    attachment: AttachmentId,
) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM pinned_attachments WHERE attachment_id = ?1 AND channel_key = ?2",
            params![attachment.to_string(), key.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Returns false if the attachment was already recorded for this connection.
pub fn record_pinned_attachment(
    conn: &Connection,
    key: ConnectionKey,
    attachment: AttachmentId,
) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO pinned_attachments (attachment_id, channel_key) VALUES (?1, ?2)",
        params![attachment.to_string(), key.to_string()],
    )?;
    Ok(changed == 1)
}

pub fn is_embed_pinned(conn: &Connection, key: ConnectionKey, url: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM pinned_embeds WHERE embed_url = ?1 AND channel_key = ?2",
            params![url, key.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Returns false if the embed url was already recorded for this connection.
pub fn record_pinned_embed(conn: &Connection, key: ConnectionKey, url: &str) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO pinned_embeds (embed_url, channel_key) VALUES (?1, ?2)",
        params![url, key.to_string()],
    )?;
    Ok(changed == 1)
}

fn map_connection(row: &Row<'_>) -> rusqlite::Result<ConnectionRecord> {
    let pin_channel = match row.get::<_, Option<String>>(2)? {
        Some(raw) => Some(parse_text(2, &raw)?),
        None => None,
    };
    let created_at: String = row.get(4)?;

    Ok(ConnectionRecord {
        key: parse_text(0, &row.get::<_, String>(0)?)?,
        source_channel: parse_text(1, &row.get::<_, String>(1)?)?,
        pin_channel,
        registering_user: parse_text(3, &row.get::<_, String>(3)?)?,
        created_at: parse_sqlite_timestamp(&created_at).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?,
    })
}

fn parse_text<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    const SOURCE: ChannelId = ChannelId(10);
    const PIN: ChannelId = ChannelId(20);
    const ALICE: UserId = UserId(1);

    #[test]
    fn pending_record_is_found_by_source_and_user() {
        let db = db();
        let key = ConnectionKey::generate();
        db.with_conn(|conn| insert_pending(conn, key, SOURCE, ALICE)).unwrap();

        let found = db.with_conn(|conn| find_pending(conn, SOURCE, ALICE)).unwrap().unwrap();
        assert_eq!(found.key, key);
        assert_eq!(found.pin_channel, None);
        assert!(!found.is_confirmed());

        let other = db.with_conn(|conn| find_pending(conn, SOURCE, UserId(2))).unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn confirm_only_applies_to_pending_records() {
        let db = db();
        let key = ConnectionKey::generate();
        db.with_conn(|conn| insert_pending(conn, key, SOURCE, ALICE)).unwrap();

        assert!(db.with_conn(|conn| confirm_connection(conn, key, PIN)).unwrap());
        assert!(!db.with_conn(|conn| confirm_connection(conn, key, ChannelId(30))).unwrap());

        let record = db.get_connection(key).unwrap().unwrap();
        assert_eq!(record.pin_channel, Some(PIN));
        assert_eq!(db.confirmed_for_source(SOURCE).unwrap().len(), 1);
    }

    #[test]
    fn confirmed_pair_is_unique_at_storage_level() {
        let db = db();
        let first = ConnectionKey::generate();
        let second = ConnectionKey::generate();
        db.with_conn(|conn| insert_pending(conn, first, SOURCE, ALICE)).unwrap();
        db.with_conn(|conn| insert_pending(conn, second, SOURCE, UserId(2))).unwrap();
        db.with_conn(|conn| confirm_connection(conn, first, PIN)).unwrap();

        assert_eq!(
            db.with_conn(|conn| count_confirmed_pair(conn, SOURCE, PIN, second)).unwrap(),
            1
        );
        assert!(db.with_conn(|conn| confirm_connection(conn, second, PIN)).is_err());
    }

    #[test]
    fn deleting_a_connection_cascades_to_pinned_media() {
        let db = db();
        let key = ConnectionKey::generate();
        db.with_conn(|conn| insert_pending(conn, key, SOURCE, ALICE)).unwrap();
        db.with_conn(|conn| confirm_connection(conn, key, PIN)).unwrap();
        db.with_conn(|conn| record_pinned_attachment(conn, key, AttachmentId(99))).unwrap();
        db.with_conn(|conn| record_pinned_embed(conn, key, "https://example.test/m/1")).unwrap();

        assert!(db.delete_connection(key).unwrap());
        assert!(!db.delete_connection(key).unwrap());

        let leftover: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM pinned_attachments) + (SELECT COUNT(*) FROM pinned_embeds)",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn pinned_media_is_tracked_per_connection() {
        let db = db();
        let first = ConnectionKey::generate();
        let second = ConnectionKey::generate();
        db.with_conn(|conn| insert_pending(conn, first, SOURCE, ALICE)).unwrap();
        db.with_conn(|conn| insert_pending(conn, second, SOURCE, UserId(2))).unwrap();

        let attachment = AttachmentId(7);
        assert!(db.with_conn(|conn| record_pinned_attachment(conn, first, attachment)).unwrap());
        assert!(!db.with_conn(|conn| record_pinned_attachment(conn, first, attachment)).unwrap());
        assert!(db.with_conn(|conn| is_attachment_pinned(conn, first, attachment)).unwrap());
        assert!(!db.with_conn(|conn| is_attachment_pinned(conn, second, attachment)).unwrap());
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = db();
        let key = ConnectionKey::generate();
        let result: Result<()> = db.with_tx(|tx| {
            insert_pending(tx, key, SOURCE, ALICE)?;
            anyhow::bail!("abort");
        });
        assert!(result.is_err());
        assert!(db.get_connection(key).unwrap().is_none());
    }
}
