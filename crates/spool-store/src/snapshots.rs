use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use spool_core::ids::{MessageId, SnapshotId, ThreadKey};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A compaction result ready to persist. The covered message range is
/// described by the creation timestamps of its first and last message.
#[derive(Clone, Debug)]
pub struct NewSnapshot {
    pub thread_key: ThreadKey,
    pub summary: String,
    pub key_points: Vec<String>,
    pub entities: Vec<String>,
    pub message_count: u32,
    pub token_count: u64,
    pub compressed_tokens: u32,
    pub first_message_at: String,
    pub last_message_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRow {
    pub id: SnapshotId,
    #[serde(rename = "threadId")]
    pub thread_key: ThreadKey,
    pub summary: String,
    pub key_points: Vec<String>,
    pub entities: Vec<String>,
    pub message_count: u32,
    pub token_count: u64,
    pub compressed_tokens: u32,
    pub first_message_at: String,
    pub last_message_at: String,
    pub created_at: String,
}

/// Per-thread snapshot aggregates for status reporting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub snapshot_count: u32,
    pub oldest_snapshot_at: Option<String>,
    pub latest_snapshot_at: Option<String>,
}

pub struct SnapshotRepo {
    db: Database,
}

impl SnapshotRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a snapshot and archive the messages it covers, as one
    /// transaction. Enforces the shrink invariant
    /// (compressed_tokens < token_count), range ordering, non-overlap with
    /// existing snapshots, and that every covered message was still active.
    /// Any violation rolls the whole write back.
    #[instrument(skip(self, snapshot, covered), fields(thread_key = %snapshot.thread_key, messages = covered.len()))]
    pub fn create_and_archive(
        &self,
        snapshot: &NewSnapshot,
        covered: &[MessageId],
    ) -> Result<SnapshotRow, StoreError> {
        if covered.is_empty() {
            return Err(StoreError::Conflict("snapshot covers no messages".into()));
        }
        if covered.len() as u32 != snapshot.message_count {
            return Err(StoreError::Conflict(format!(
                "message_count {} does not match covered ids {}",
                snapshot.message_count,
                covered.len()
            )));
        }
        if (snapshot.compressed_tokens as u64) >= snapshot.token_count {
            return Err(StoreError::Conflict(format!(
                "snapshot does not shrink: {} >= {}",
                snapshot.compressed_tokens, snapshot.token_count
            )));
        }
        if snapshot.first_message_at > snapshot.last_message_at {
            return Err(StoreError::Conflict(format!(
                "inverted range: {} > {}",
                snapshot.first_message_at, snapshot.last_message_at
            )));
        }

        let id = SnapshotId::new();
        let now = Utc::now().to_rfc3339();
        let key_points = serde_json::to_string(&snapshot.key_points)?;
        let entities = serde_json::to_string(&snapshot.entities)?;

        self.db.with_tx(|tx| {
            let prior_latest: Option<String> = tx
                .query_row(
                    "SELECT MAX(last_message_at) FROM snapshots WHERE thread_key = ?1",
                    [snapshot.thread_key.as_str()],
                    |row| row.get(0),
                )
                .map_err(StoreError::from)?;

            if let Some(prior) = prior_latest {
                if snapshot.first_message_at <= prior {
                    return Err(StoreError::Conflict(format!(
                        "snapshot range overlaps existing coverage: {} <= {}",
                        snapshot.first_message_at, prior
                    )));
                }
            }

            tx.execute(
                "INSERT INTO snapshots (id, thread_key, summary, key_points, entities,
                    message_count, token_count, compressed_tokens,
                    first_message_at, last_message_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    id.as_str(),
                    snapshot.thread_key.as_str(),
                    snapshot.summary,
                    key_points,
                    entities,
                    snapshot.message_count,
                    snapshot.token_count as i64,
                    snapshot.compressed_tokens,
                    snapshot.first_message_at,
                    snapshot.last_message_at,
                    now,
                ],
            )?;

            let mut stmt = tx.prepare(
                "UPDATE messages SET archived = 1
                 WHERE id = ?1 AND thread_key = ?2 AND archived = 0",
            )?;
            for message_id in covered {
                let changed = stmt.execute(rusqlite::params![
                    message_id.as_str(),
                    snapshot.thread_key.as_str(),
                ])?;
                if changed != 1 {
                    return Err(StoreError::Conflict(format!(
                        "message {message_id} is missing or already archived"
                    )));
                }
            }
            Ok(())
        })?;

        Ok(SnapshotRow {
            id,
            thread_key: snapshot.thread_key.clone(),
            summary: snapshot.summary.clone(),
            key_points: snapshot.key_points.clone(),
            entities: snapshot.entities.clone(),
            message_count: snapshot.message_count,
            token_count: snapshot.token_count,
            compressed_tokens: snapshot.compressed_tokens,
            first_message_at: snapshot.first_message_at.clone(),
            last_message_at: snapshot.last_message_at.clone(),
            created_at: now,
        })
    }

    /// Snapshots for a thread, oldest first. Append-only: there is no
    /// update or delete here.
    #[instrument(skip(self), fields(thread_key = %thread_key))]
    pub fn list(&self, thread_key: &ThreadKey) -> Result<Vec<SnapshotRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, thread_key, summary, key_points, entities,
                        message_count, token_count, compressed_tokens,
                        first_message_at, last_message_at, created_at
                 FROM snapshots WHERE thread_key = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let mut rows = stmt.query([thread_key.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_snapshot(row)?);
            }
            Ok(results)
        })
    }

    #[instrument(skip(self), fields(thread_key = %thread_key))]
    pub fn counts_for_thread(&self, thread_key: &ThreadKey) -> Result<SnapshotCounts, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*), MIN(created_at), MAX(created_at)
                 FROM snapshots WHERE thread_key = ?1",
                [thread_key.as_str()],
                |row| {
                    Ok(SnapshotCounts {
                        snapshot_count: row.get(0)?,
                        oldest_snapshot_at: row.get(1)?,
                        latest_snapshot_at: row.get(2)?,
                    })
                },
            )
            .map_err(StoreError::from)
        })
    }
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> Result<SnapshotRow, StoreError> {
    let key_raw: String = row_helpers::get(row, 1, "snapshots", "thread_key")?;
    let key_points_raw: String = row_helpers::get(row, 3, "snapshots", "key_points")?;
    let entities_raw: String = row_helpers::get(row, 4, "snapshots", "entities")?;

    Ok(SnapshotRow {
        id: SnapshotId::from_raw(row_helpers::get::<String>(row, 0, "snapshots", "id")?),
        thread_key: row_helpers::parse_enum(&key_raw, "snapshots", "thread_key")?,
        summary: row_helpers::get(row, 2, "snapshots", "summary")?,
        key_points: row_helpers::parse_string_list(&key_points_raw, "snapshots", "key_points")?,
        entities: row_helpers::parse_string_list(&entities_raw, "snapshots", "entities")?,
        message_count: row_helpers::get(row, 5, "snapshots", "message_count")?,
        token_count: row_helpers::get::<i64>(row, 6, "snapshots", "token_count")? as u64,
        compressed_tokens: row_helpers::get(row, 7, "snapshots", "compressed_tokens")?,
        first_message_at: row_helpers::get(row, 8, "snapshots", "first_message_at")?,
        last_message_at: row_helpers::get(row, 9, "snapshots", "last_message_at")?,
        created_at: row_helpers::get(row, 10, "snapshots", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageRepo;
    use crate::threads::ThreadRepo;
    use spool_core::messages::Role;

    fn setup() -> (Database, ThreadKey, MessageRepo, SnapshotRepo) {
        let db = Database::in_memory().unwrap();
        let key = ThreadKey::parse("t1").unwrap();
        ThreadRepo::new(db.clone()).get_or_create(&key).unwrap();
        let messages = MessageRepo::new(db.clone());
        let snapshots = SnapshotRepo::new(db.clone());
        (db, key, messages, snapshots)
    }

    fn new_snapshot(key: &ThreadKey, window: &[crate::messages::MessageRow]) -> NewSnapshot {
        NewSnapshot {
            thread_key: key.clone(),
            summary: "compact summary".into(),
            key_points: vec!["point".into()],
            entities: vec!["Alice".into()],
            message_count: window.len() as u32,
            token_count: window.iter().map(|m| m.estimated_tokens as u64).sum(),
            compressed_tokens: 5,
            first_message_at: window.first().unwrap().created_at.clone(),
            last_message_at: window.last().unwrap().created_at.clone(),
        }
    }

    fn append_n(messages: &MessageRepo, key: &ThreadKey, n: usize) -> Vec<crate::messages::MessageRow> {
        (0..n)
            .map(|i| {
                messages
                    .append(key, Role::User, &format!("message {i}"), 20)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn create_and_archive_covers_window() {
        let (_, key, messages, snapshots) = setup();
        let rows = append_n(&messages, &key, 4);
        let window = &rows[..2];
        let covered: Vec<MessageId> = window.iter().map(|m| m.id.clone()).collect();

        let snap = snapshots
            .create_and_archive(&new_snapshot(&key, window), &covered)
            .unwrap();
        assert!(snap.id.as_str().starts_with("snap_"));
        assert_eq!(snap.message_count, 2);
        assert_eq!(snap.token_count, 40);

        let active = messages.list_active(&key).unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].content, "message 2");
    }

    #[test]
    fn rejects_non_shrinking_snapshot() {
        let (_, key, messages, snapshots) = setup();
        let rows = append_n(&messages, &key, 2);
        let covered: Vec<MessageId> = rows.iter().map(|m| m.id.clone()).collect();
        let mut snap = new_snapshot(&key, &rows);
        snap.compressed_tokens = snap.token_count as u32;

        let result = snapshots.create_and_archive(&snap, &covered);
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        // Nothing archived
        assert_eq!(messages.list_active(&key).unwrap().len(), 2);
    }

    #[test]
    fn rejects_mismatched_covered_count() {
        let (_, key, messages, snapshots) = setup();
        let rows = append_n(&messages, &key, 3);
        let covered: Vec<MessageId> = rows[..1].iter().map(|m| m.id.clone()).collect();
        let snap = new_snapshot(&key, &rows[..2]);

        assert!(matches!(
            snapshots.create_and_archive(&snap, &covered),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn rejects_already_archived_message_and_rolls_back() {
        let (_, key, messages, snapshots) = setup();
        let rows = append_n(&messages, &key, 4);
        let window = &rows[..2];
        let covered: Vec<MessageId> = window.iter().map(|m| m.id.clone()).collect();
        snapshots
            .create_and_archive(&new_snapshot(&key, window), &covered)
            .unwrap();

        // Second snapshot tries to re-cover an archived message
        let overlap = &rows[1..3];
        let covered: Vec<MessageId> = overlap.iter().map(|m| m.id.clone()).collect();
        let result = snapshots.create_and_archive(&new_snapshot(&key, overlap), &covered);
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        // The failed attempt wrote nothing
        assert_eq!(snapshots.list(&key).unwrap().len(), 1);
        assert_eq!(messages.list_active(&key).unwrap().len(), 2);
    }

    #[test]
    fn sequential_snapshots_do_not_overlap() {
        let (_, key, messages, snapshots) = setup();
        let rows = append_n(&messages, &key, 6);

        let first = &rows[..2];
        let covered: Vec<MessageId> = first.iter().map(|m| m.id.clone()).collect();
        snapshots
            .create_and_archive(&new_snapshot(&key, first), &covered)
            .unwrap();

        let second = &rows[2..4];
        let covered: Vec<MessageId> = second.iter().map(|m| m.id.clone()).collect();
        snapshots
            .create_and_archive(&new_snapshot(&key, second), &covered)
            .unwrap();

        let all = snapshots.list(&key).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].last_message_at < all[1].first_message_at);
    }

    #[test]
    fn list_returns_chronological_order() {
        let (_, key, messages, snapshots) = setup();
        let rows = append_n(&messages, &key, 6);

        for window in [&rows[..2], &rows[2..4]] {
            let covered: Vec<MessageId> = window.iter().map(|m| m.id.clone()).collect();
            snapshots
                .create_and_archive(&new_snapshot(&key, window), &covered)
                .unwrap();
        }

        let all = snapshots.list(&key).unwrap();
        assert!(all[0].created_at <= all[1].created_at);
        assert!(all[0].first_message_at < all[1].first_message_at);
    }

    #[test]
    fn counts_for_thread_empty() {
        let (_, key, _, snapshots) = setup();
        let counts = snapshots.counts_for_thread(&key).unwrap();
        assert_eq!(counts, SnapshotCounts::default());
    }

    #[test]
    fn counts_for_thread_tracks_dates() {
        let (_, key, messages, snapshots) = setup();
        let rows = append_n(&messages, &key, 4);

        for window in [&rows[..2], &rows[2..3]] {
            let covered: Vec<MessageId> = window.iter().map(|m| m.id.clone()).collect();
            snapshots
                .create_and_archive(&new_snapshot(&key, window), &covered)
                .unwrap();
        }

        let counts = snapshots.counts_for_thread(&key).unwrap();
        assert_eq!(counts.snapshot_count, 2);
        assert!(counts.oldest_snapshot_at.is_some());
        assert!(counts.latest_snapshot_at >= counts.oldest_snapshot_at);
    }

    #[test]
    fn key_points_and_entities_roundtrip() {
        let (_, key, messages, snapshots) = setup();
        let rows = append_n(&messages, &key, 2);
        let covered: Vec<MessageId> = rows.iter().map(|m| m.id.clone()).collect();
        let mut snap = new_snapshot(&key, &rows);
        snap.key_points = vec!["shipped v2".into(), "rollback planned".into()];
        snap.entities = vec!["Alice".into(), "Q3 roadmap".into()];

        snapshots.create_and_archive(&snap, &covered).unwrap();
        let stored = &snapshots.list(&key).unwrap()[0];
        assert_eq!(stored.key_points, snap.key_points);
        assert_eq!(stored.entities, snap.entities);
    }
}
