use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            member_a    TEXT NOT NULL,
            member_b    TEXT NOT NULL,
            seed_b64    TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            UNIQUE(member_a, member_b),
            CHECK(member_a < member_b)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_member_b
            ON conversations(member_b, created_at);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL,
            iv_b64          TEXT NOT NULL,
            ciphertext_b64  TEXT NOT NULL,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS handles (
            handle      TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_handles_user
            ON handles(user_id);

        -- Client-local read watermarks, key = lastSeen:<conversation id>
        CREATE TABLE IF NOT EXISTS watermarks (
            key         TEXT PRIMARY KEY,
            last_seen   INTEGER NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
