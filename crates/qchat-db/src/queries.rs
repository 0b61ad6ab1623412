use crate::Database;
use crate::models::{ConversationRow, MessageRow};
use anyhow::Result;
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rusqlite::Connection;
use tracing::debug;

use qchat_types::{Members, MessageBatch, Subscription, UserId, store::watermark_key};

/// Result of a handle claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    Taken,
}

impl Database {
    // -- Conversations --

    /// Insert the conversation for `members` unless one already exists for
    /// that pair; either way return the stored row.
    pub fn create_conversation(
        &self,
        id: &str,
        members: &Members,
        seed: &[u8],
        now: i64,
    ) -> Result<ConversationRow> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO conversations (id, member_a, member_b, seed_b64, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    id,
                    members.first().as_str(),
                    members.second().as_str(),
                    B64.encode(seed),
                    now
                ],
            )?;
            if inserted == 0 {
                debug!(
                    "Conversation for {} / {} already exists",
                    members.first(),
                    members.second()
                );
            }

            let row = conn.query_row(
                "SELECT id, member_a, member_b, seed_b64, created_at
                 FROM conversations WHERE member_a = ?1 AND member_b = ?2",
                [members.first().as_str(), members.second().as_str()],
                conversation_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Conversations `member` belongs to, newest first.
    pub fn conversations_for(&self, member: &UserId) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, member_a, member_b, seed_b64, created_at
                 FROM conversations
                 WHERE member_a = ?1 OR member_b = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([member.as_str()], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message and publish it to live subscribers. `created_at` is
    /// `now`, bumped if needed so it stays strictly increasing within the
    /// conversation. Returns `None` if the conversation does not exist.
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &UserId,
        iv: &[u8],
        ciphertext: &[u8],
        now: i64,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            if query_conversation(conn, conversation_id)?.is_none() {
                return Ok(None);
            }

            let last: Option<i64> = conn.query_row(
                "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )?;
            let created_at = match last {
                Some(last) if last >= now => last + 1,
                _ => now,
            };

            let row = MessageRow {
                id: id.to_string(),
                conversation_id: conversation_id.to_string(),
                sender_id: sender_id.as_str().to_string(),
                iv_b64: B64.encode(iv),
                ciphertext_b64: B64.encode(ciphertext),
                created_at,
            };
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, iv_b64, ciphertext_b64, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.id,
                    row.conversation_id,
                    row.sender_id,
                    row.iv_b64,
                    row.ciphertext_b64,
                    row.created_at
                ],
            )?;

            self.feed.publish(&row.clone().into_message()?);
            Ok(Some(row))
        })
    }

    /// The latest `limit` messages, returned oldest first.
    pub fn get_messages(&self, conversation_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut rows = query_messages(conn, conversation_id, Some(limit))?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Open a live feed on a conversation: its full history as the first
    /// batch, then every later append. `None` if the conversation is absent.
    pub fn subscribe_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Subscription<MessageBatch>>> {
        self.with_conn(|conn| {
            if query_conversation(conn, conversation_id)?.is_none() {
                return Ok(None);
            }
            let mut rows = query_messages(conn, conversation_id, None)?;
            rows.reverse();
            let snapshot = rows
                .into_iter()
                .map(MessageRow::into_message)
                .collect::<Result<Vec<_>>>()?;

            Ok(Some(self.feed.register(conversation_id, snapshot)))
        })
    }

    // -- Handles --

    /// Atomically claim `handle`. Re-claiming one's own handle succeeds.
    pub fn claim_handle(&self, handle: &str, user_id: &UserId) -> Result<Claim> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO handles (handle, user_id) VALUES (?1, ?2)",
                [handle, user_id.as_str()],
            )?;
            if inserted == 1 {
                return Ok(Claim::Claimed);
            }
            let owner: String = conn.query_row(
                "SELECT user_id FROM handles WHERE handle = ?1",
                [handle],
                |row| row.get(0),
            )?;
            Ok(if owner == user_id.as_str() {
                Claim::Claimed
            } else {
                Claim::Taken
            })
        })
    }

    pub fn resolve_handle(&self, handle: &str) -> Result<Option<UserId>> {
        self.with_conn(|conn| {
            let owner: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM handles WHERE handle = ?1",
                    [handle],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(owner.map(UserId::new))
        })
    }

    /// Most recently claimed handle of `user_id`.
    pub fn handle_of(&self, user_id: &UserId) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let handle = conn
                .query_row(
                    "SELECT handle FROM handles WHERE user_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    [user_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(handle)
        })
    }

    // -- Watermarks --

    pub fn last_seen(&self, conversation_id: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let at = conn
                .query_row(
                    "SELECT last_seen FROM watermarks WHERE key = ?1",
                    [watermark_key(conversation_id)],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(at)
        })
    }

    /// Raise the watermark to `at`. Never moves it backward.
    pub fn set_last_seen(&self, conversation_id: &str, at: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO watermarks (key, last_seen) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET last_seen = MAX(last_seen, excluded.last_seen)",
                rusqlite::params![watermark_key(conversation_id), at],
            )?;
            Ok(())
        })
    }
}

fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        member_a: row.get(1)?,
        member_b: row.get(2)?,
        seed_b64: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    let row = conn
        .query_row(
            "SELECT id, member_a, member_b, seed_b64, created_at FROM conversations WHERE id = ?1",
            [id],
            conversation_from_row,
        )
        .optional()?;
    Ok(row)
}

/// Newest first; `limit = None` returns everything.
fn query_messages(conn: &Connection, conversation_id: &str, limit: Option<u32>) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_id, iv_b64, ciphertext_b64, created_at
         FROM messages
         WHERE conversation_id = ?1
         ORDER BY created_at DESC
         LIMIT ?2",
    )?;

    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.map_or(-1, i64::from);
    let rows = stmt
        .query_map(rusqlite::params![conversation_id, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                sender_id: row.get(2)?,
                iv_b64: row.get(3)?,
                ciphertext_b64: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
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
