use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (channel connections + pinned media)");
        conn.execute_batch(
            "
            CREATE TABLE channel_connections (
                channel_key       TEXT NOT NULL UNIQUE,
                source_channel    TEXT NOT NULL,
                pin_channel       TEXT,
                registering_user  TEXT NOT NULL,
                created_at        TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_connections_source
                ON channel_connections(source_channel);

            -- Backstop for the duplicate-connection gate
            CREATE UNIQUE INDEX idx_connections_confirmed_pair
                ON channel_connections(source_channel, pin_channel)
                WHERE pin_channel IS NOT NULL;

            -- One live pending registration per (source, user)
            CREATE UNIQUE INDEX idx_connections_pending_owner
                ON channel_connections(source_channel, registering_user)
                WHERE pin_channel IS NULL;

            CREATE TABLE pinned_attachments (
                attachment_id   TEXT NOT NULL,
                channel_key     TEXT NOT NULL REFERENCES channel_connections(channel_key) ON DELETE CASCADE,
                pinned_at       TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(attachment_id, channel_key)
            );

            CREATE TABLE pinned_embeds (
                embed_url       TEXT NOT NULL,
                channel_key     TEXT NOT NULL REFERENCES channel_connections(channel_key) ON DELETE CASCADE,
                pinned_at       TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(embed_url, channel_key)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
