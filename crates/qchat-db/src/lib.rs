pub mod feed;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod store;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::feed::Feed;

pub use store::SqliteStore;

pub struct Database {
    conn: Mutex<Connection>,
    feed: Feed,
}

impl Database {
    /// Open (or create) the database file, in WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Conversation store opened at {}", path.display());
        Ok(db)
    }

    /// Private to this process; gone when dropped.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            feed: Feed::new(),
        })
    }

    /// Run `f` with the connection locked. Feed registration and
    /// publication also happen under this lock, so subscribers observe
    /// appends in `created_at` order with no gap after their snapshot.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Number of live message subscriptions. Each one is a realtime
    /// connection that must eventually be released.
    pub fn active_subscriptions(&self) -> usize {
        self.feed.active()
    }
}
