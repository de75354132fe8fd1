use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use spool_core::ids::{MessageId, ThreadKey};
use spool_core::messages::Role;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: MessageId,
    pub thread_key: ThreadKey,
    pub role: Role,
    pub content: String,
    pub estimated_tokens: u32,
    pub archived: bool,
    pub created_at: String,
}

/// Aggregates over a thread's active (non-archived) messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActiveStats {
    pub message_count: u32,
    pub total_tokens: u64,
}

pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a message to a thread. Messages are immutable once created.
    /// Bumps the thread's updated_at in the same transaction.
    #[instrument(skip(self, content), fields(thread_key = %thread_key, role = %role))]
    pub fn append(
        &self,
        thread_key: &ThreadKey,
        role: Role,
        content: &str,
        estimated_tokens: u32,
    ) -> Result<MessageRow, StoreError> {
        let id = MessageId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO messages (id, thread_key, role, content, estimated_tokens, archived, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                rusqlite::params![
                    id.as_str(),
                    thread_key.as_str(),
                    role.to_string(),
                    content,
                    estimated_tokens,
                    now,
                ],
            )?;
            tx.execute(
                "UPDATE threads SET updated_at = ?1 WHERE key = ?2",
                rusqlite::params![now, thread_key.as_str()],
            )?;
            Ok(())
        })?;

        Ok(MessageRow {
            id,
            thread_key: thread_key.clone(),
            role,
            content: content.to_string(),
            estimated_tokens,
            archived: false,
            created_at: now,
        })
    }

    /// Active messages for a thread in creation order.
    #[instrument(skip(self), fields(thread_key = %thread_key))]
    pub fn list_active(&self, thread_key: &ThreadKey) -> Result<Vec<MessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, thread_key, role, content, estimated_tokens, archived, created_at
                 FROM messages WHERE thread_key = ?1 AND archived = 0
                 ORDER BY created_at ASC, id ASC",
            )?;
            let mut rows = stmt.query([thread_key.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_message(row)?);
            }
            Ok(results)
        })
    }

    /// Count and token sum over active messages, in one query.
    #[instrument(skip(self), fields(thread_key = %thread_key))]
    pub fn active_stats(&self, thread_key: &ThreadKey) -> Result<ActiveStats, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(estimated_tokens), 0)
                 FROM messages WHERE thread_key = ?1 AND archived = 0",
                [thread_key.as_str()],
                |row| {
                    Ok(ActiveStats {
                        message_count: row.get::<_, u32>(0)?,
                        total_tokens: row.get::<_, i64>(1)? as u64,
                    })
                },
            )
            .map_err(StoreError::from)
        })
    }

    /// Total messages ever stored for a thread, archived included.
    #[instrument(skip(self), fields(thread_key = %thread_key))]
    pub fn count_all(&self, thread_key: &ThreadKey) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE thread_key = ?1",
                [thread_key.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(StoreError::from)
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<MessageRow, StoreError> {
    let key_raw: String = row_helpers::get(row, 1, "messages", "thread_key")?;
    let role_raw: String = row_helpers::get(row, 2, "messages", "role")?;

    Ok(MessageRow {
        id: MessageId::from_raw(row_helpers::get::<String>(row, 0, "messages", "id")?),
        thread_key: row_helpers::parse_enum(&key_raw, "messages", "thread_key")?,
        role: row_helpers::parse_enum(&role_raw, "messages", "role")?,
        content: row_helpers::get(row, 3, "messages", "content")?,
        estimated_tokens: row_helpers::get(row, 4, "messages", "estimated_tokens")?,
        archived: row_helpers::get::<i64>(row, 5, "messages", "archived")? != 0,
        created_at: row_helpers::get(row, 6, "messages", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::ThreadRepo;

    fn setup() -> (Database, ThreadKey) {
        let db = Database::in_memory().unwrap();
        let key = ThreadKey::parse("t1").unwrap();
        ThreadRepo::new(db.clone()).get_or_create(&key).unwrap();
        (db, key)
    }

    #[test]
    fn append_message() {
        let (db, key) = setup();
        let repo = MessageRepo::new(db);
        let msg = repo.append(&key, Role::User, "hello", 6).unwrap();
        assert!(msg.id.as_str().starts_with("msg_"));
        assert_eq!(msg.estimated_tokens, 6);
        assert!(!msg.archived);
    }

    #[test]
    fn list_active_in_creation_order() {
        let (db, key) = setup();
        let repo = MessageRepo::new(db);
        repo.append(&key, Role::User, "first", 5).unwrap();
        repo.append(&key, Role::Assistant, "second", 5).unwrap();
        repo.append(&key, Role::User, "third", 5).unwrap();

        let active = repo.list_active(&key).unwrap();
        let contents: Vec<&str> = active.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn active_stats_sums_tokens() {
        let (db, key) = setup();
        let repo = MessageRepo::new(db);
        repo.append(&key, Role::User, "a", 10).unwrap();
        repo.append(&key, Role::Assistant, "b", 30).unwrap();

        let stats = repo.active_stats(&key).unwrap();
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.total_tokens, 40);
    }

    #[test]
    fn active_stats_on_unknown_thread_is_zero() {
        let (db, _) = setup();
        let repo = MessageRepo::new(db);
        let other = ThreadKey::parse("nope").unwrap();
        let stats = repo.active_stats(&other).unwrap();
        assert_eq!(stats, ActiveStats::default());
    }

    #[test]
    fn archived_messages_excluded_from_active() {
        let (db, key) = setup();
        let repo = MessageRepo::new(db.clone());
        let msg = repo.append(&key, Role::User, "old", 8).unwrap();
        repo.append(&key, Role::User, "new", 8).unwrap();

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET archived = 1 WHERE id = ?1",
                [msg.id.as_str()],
            )?;
            Ok(())
        })
        .unwrap();

        let active = repo.list_active(&key).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].content, "new");

        let stats = repo.active_stats(&key).unwrap();
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.total_tokens, 8);
    }

    #[test]
    fn count_all_includes_archived() {
        let (db, key) = setup();
        let repo = MessageRepo::new(db.clone());
        let msg = repo.append(&key, Role::User, "old", 8).unwrap();
        repo.append(&key, Role::User, "new", 8).unwrap();

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET archived = 1 WHERE id = ?1",
                [msg.id.as_str()],
            )?;
            Ok(())
        })
        .unwrap();

        assert_eq!(repo.count_all(&key).unwrap(), 2);
    }

    #[test]
    fn append_bumps_thread_updated_at() {
        let (db, key) = setup();
        let before: String = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT updated_at FROM threads WHERE key = 't1'",
                    [],
                    |row| row.get(0),
                )
                .map_err(StoreError::from)
            })
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));
        MessageRepo::new(db.clone())
            .append(&key, Role::User, "hello", 6)
            .unwrap();

        let after: String = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT updated_at FROM threads WHERE key = 't1'",
                    [],
                    |row| row.get(0),
                )
                .map_err(StoreError::from)
            })
            .unwrap();
        assert!(after > before, "{after} <= {before}");
    }
}
