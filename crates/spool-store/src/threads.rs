use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use spool_core::ids::ThreadKey;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreadRow {
    pub key: ThreadKey,
    pub created_at: String,
    pub updated_at: String,
}

/// What a reset removed, for caller-side reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResetStats {
    pub messages_deleted: u32,
    pub snapshots_deleted: u32,
}

pub struct ThreadRepo {
    db: Database,
}

impl ThreadRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get or create a thread for the given key. Threads come into being
    /// implicitly on first use.
    #[instrument(skip(self), fields(thread_key = %key))]
    pub fn get_or_create(&self, key: &ThreadKey) -> Result<ThreadRow, StoreError> {
        self.db.with_conn(|conn| {
            let existing = conn
                .query_row(
                    "SELECT key, created_at, updated_at FROM threads WHERE key = ?1",
                    [key.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .ok();

            if let Some((raw, created_at, updated_at)) = existing {
                let key = row_helpers::parse_enum(&raw, "threads", "key")?;
                return Ok(ThreadRow {
                    key,
                    created_at,
                    updated_at,
                });
            }

            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO threads (key, created_at, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key.as_str(), now, now],
            )?;

            Ok(ThreadRow {
                key: key.clone(),
                created_at: now.clone(),
                updated_at: now,
            })
        })
    }

    /// Delete all messages and snapshots for a key in one transaction.
    /// The thread row survives so the key keeps its identity.
    #[instrument(skip(self), fields(thread_key = %key))]
    pub fn reset(&self, key: &ThreadKey) -> Result<ResetStats, StoreError> {
        self.db.with_tx(|tx| {
            let messages_deleted = tx.execute(
                "DELETE FROM messages WHERE thread_key = ?1",
                [key.as_str()],
            )? as u32;
            let snapshots_deleted = tx.execute(
                "DELETE FROM snapshots WHERE thread_key = ?1",
                [key.as_str()],
            )? as u32;
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "UPDATE threads SET updated_at = ?1 WHERE key = ?2",
                rusqlite::params![now, key.as_str()],
            )?;
            Ok(ResetStats {
                messages_deleted,
                snapshots_deleted,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::in_memory().unwrap()
    }

    fn key(raw: &str) -> ThreadKey {
        ThreadKey::parse(raw).unwrap()
    }

    #[test]
    fn create_thread() {
        let repo = ThreadRepo::new(test_db());
        let thread = repo.get_or_create(&key("t1")).unwrap();
        assert_eq!(thread.key.as_str(), "t1");
        assert_eq!(thread.created_at, thread.updated_at);
    }

    #[test]
    fn get_or_create_returns_existing() {
        let repo = ThreadRepo::new(test_db());
        let first = repo.get_or_create(&key("t1")).unwrap();
        let second = repo.get_or_create(&key("t1")).unwrap();
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn different_keys_are_distinct_threads() {
        let db = test_db();
        let repo = ThreadRepo::new(db.clone());
        repo.get_or_create(&key("a")).unwrap();
        repo.get_or_create(&key("b")).unwrap();

        let count: u32 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn reset_on_empty_thread_deletes_nothing() {
        let repo = ThreadRepo::new(test_db());
        repo.get_or_create(&key("t1")).unwrap();
        let stats = repo.reset(&key("t1")).unwrap();
        assert_eq!(stats.messages_deleted, 0);
        assert_eq!(stats.snapshots_deleted, 0);
    }
}
