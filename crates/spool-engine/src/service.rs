use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use spool_core::config::ContextConfig;
use spool_core::context::ContextState;
use spool_core::ids::{MessageId, ThreadKey};
use spool_core::messages::{PromptEntry, Role};
use spool_core::provider::SummaryProvider;
use spool_core::summary::SummaryRequest;
use spool_core::tokens::estimate_message_tokens;
use spool_store::messages::{MessageRepo, MessageRow};
use spool_store::snapshots::{NewSnapshot, SnapshotRepo, SnapshotRow};
use spool_store::threads::{ResetStats, ThreadRepo};
use spool_store::Database;

use crate::compactor;
use crate::error::EngineError;
use crate::policy;

/// Status view combining derived state with snapshot history aggregates.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextStatus {
    #[serde(flatten)]
    pub state: ContextState,
    pub snapshot_count: u32,
    pub oldest_snapshot_date: Option<String>,
    pub latest_snapshot_date: Option<String>,
    /// Total messages ever stored for the thread, archived included.
    pub estimated_conversation_length: u64,
}

/// Result of an auto-summarize call. Skips are normal outcomes, not errors.
#[derive(Debug)]
pub enum CompactionOutcome {
    Compacted(SnapshotRow),
    Skipped(SkipReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Utilization is below threshold and the message cap is not hit.
    NotNeeded,
    /// Not enough active history to compact.
    TooFewMessages { active: u32, required: u32 },
    /// No summary could be produced strictly smaller than the window.
    NoShrink,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotNeeded => write!(f, "context utilization below threshold"),
            Self::TooFewMessages { active, required } => {
                write!(f, "only {active} active messages, need {required}")
            }
            Self::NoShrink => write!(f, "summary would not shrink the window"),
        }
    }
}

/// Facade over the context engine: message ingestion, derived state, the
/// compaction policy, summarization, and prompt assembly. One instance
/// serves all threads; compaction is serialized per thread key.
pub struct ContextService {
    db: Database,
    threads: ThreadRepo,
    messages: MessageRepo,
    snapshots: SnapshotRepo,
    provider: Arc<dyn SummaryProvider>,
    config: ContextConfig,
    compaction_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl ContextService {
    pub fn new(db: Database, provider: Arc<dyn SummaryProvider>, config: ContextConfig) -> Self {
        Self {
            threads: ThreadRepo::new(db.clone()),
            messages: MessageRepo::new(db.clone()),
            snapshots: SnapshotRepo::new(db.clone()),
            db,
            provider,
            config: config.normalized(),
            compaction_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Store liveness, for health reporting.
    pub fn ping(&self) -> Result<(), EngineError> {
        self.db.ping().map_err(EngineError::from)
    }

    fn validate_key(&self, raw: &str) -> Result<ThreadKey, EngineError> {
        ThreadKey::parse(raw).map_err(|e| EngineError::Validation(e.to_string()))
    }

    fn lock_for(&self, key: &ThreadKey) -> Arc<tokio::sync::Mutex<()>> {
        self.compaction_locks
            .entry(key.as_str().to_owned())
            .or_default()
            .clone()
    }

    /// Append a turn to a thread, creating the thread on first use.
    /// Token estimation happens once, at insert.
    #[instrument(skip(self, content), fields(thread = raw_key, role = %role))]
    pub fn append_message(
        &self,
        raw_key: &str,
        role: Role,
        content: &str,
    ) -> Result<MessageRow, EngineError> {
        let key = self.validate_key(raw_key)?;
        if content.trim().is_empty() {
            return Err(EngineError::Validation("message content is empty".into()));
        }

        self.threads.get_or_create(&key)?;
        let estimated = estimate_message_tokens(content);
        let row = self.messages.append(&key, role, content, estimated)?;
        Ok(row)
    }

    /// Derived state for a thread. A key with no data reads as an empty
    /// thread; store failures surface as errors, never as zeroed state.
    #[instrument(skip(self), fields(thread = raw_key))]
    pub fn context_state(&self, raw_key: &str) -> Result<ContextState, EngineError> {
        let key = self.validate_key(raw_key)?;
        let stats = self.messages.active_stats(&key)?;
        Ok(ContextState::compute(
            stats.total_tokens,
            stats.message_count,
            self.config.token_budget,
        ))
    }

    #[instrument(skip(self), fields(thread = raw_key))]
    pub fn context_status(&self, raw_key: &str) -> Result<ContextStatus, EngineError> {
        let key = self.validate_key(raw_key)?;
        let stats = self.messages.active_stats(&key)?;
        let counts = self.snapshots.counts_for_thread(&key)?;
        let conversation_length = self.messages.count_all(&key)?;

        Ok(ContextStatus {
            state: ContextState::compute(
                stats.total_tokens,
                stats.message_count,
                self.config.token_budget,
            ),
            snapshot_count: counts.snapshot_count,
            oldest_snapshot_date: counts.oldest_snapshot_at,
            latest_snapshot_date: counts.latest_snapshot_at,
            estimated_conversation_length: conversation_length,
        })
    }

    /// Pure read: whether the thread has crossed the compaction threshold.
    #[instrument(skip(self), fields(thread = raw_key))]
    pub fn needs_summarization(&self, raw_key: &str) -> Result<bool, EngineError> {
        let state = self.context_state(raw_key)?;
        Ok(policy::needs_summarization(&state, &self.config))
    }

    /// Compact the oldest window of active messages into a snapshot, if the
    /// policy calls for it. At most one compaction runs per thread at a
    /// time; the policy is re-checked under the lock so queued callers
    /// observe the previous compaction's effect and skip.
    ///
    /// All-or-nothing: a provider failure or timeout leaves the thread
    /// exactly as it was, and retrying is safe.
    #[instrument(skip(self), fields(thread = raw_key))]
    pub async fn auto_summarize(&self, raw_key: &str) -> Result<CompactionOutcome, EngineError> {
        let key = self.validate_key(raw_key)?;
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let stats = self.messages.active_stats(&key)?;
        let state =
            ContextState::compute(stats.total_tokens, stats.message_count, self.config.token_budget);
        if !policy::needs_summarization(&state, &self.config) {
            return Ok(CompactionOutcome::Skipped(SkipReason::NotNeeded));
        }

        let active = self.messages.list_active(&key)?;
        let Some(window) = compactor::select_window(&active, &self.config) else {
            return Ok(CompactionOutcome::Skipped(SkipReason::TooFewMessages {
                active: active.len() as u32,
                required: self.config.min_compactable,
            }));
        };

        let request = SummaryRequest {
            lines: window.transcript(),
            max_summary_tokens: self.config.max_summary_tokens,
        };
        let outline = match tokio::time::timeout(
            self.config.summary_timeout,
            self.provider.summarize(&request),
        )
        .await
        {
            Ok(Ok(outline)) => outline.normalized(),
            Ok(Err(e)) => {
                warn!(thread = %key, error = %e, kind = e.error_kind(), "summary generation failed");
                return Err(EngineError::SummarizationFailed(e));
            }
            Err(_) => {
                warn!(thread = %key, timeout = ?self.config.summary_timeout, "summary generation timed out");
                return Err(EngineError::SummarizationTimeout(self.config.summary_timeout));
            }
        };

        let Some((summary, compressed_tokens)) =
            compactor::fit_summary(&outline.summary, window.token_count)
        else {
            return Ok(CompactionOutcome::Skipped(SkipReason::NoShrink));
        };

        let covered: Vec<MessageId> = window.messages.iter().map(|m| m.id.clone()).collect();
        let snapshot = NewSnapshot {
            thread_key: key.clone(),
            summary,
            key_points: outline.key_points,
            entities: outline.entities,
            message_count: covered.len() as u32,
            token_count: window.token_count,
            compressed_tokens,
            first_message_at: window.first_message_at().to_owned(),
            last_message_at: window.last_message_at().to_owned(),
        };
        let row = self.snapshots.create_and_archive(&snapshot, &covered)?;

        info!(
            thread = %key,
            snapshot = %row.id,
            messages = row.message_count,
            original_tokens = row.token_count,
            compressed_tokens = row.compressed_tokens,
            "thread compacted"
        );
        Ok(CompactionOutcome::Compacted(row))
    }

    /// The downstream-facing read path: every snapshot rendered as one
    /// synthetic context entry (chronological), then every active message in
    /// creation order. Raw archived content never appears here.
    #[instrument(skip(self), fields(thread = raw_key))]
    pub fn assemble_prompt(&self, raw_key: &str) -> Result<Vec<PromptEntry>, EngineError> {
        let key = self.validate_key(raw_key)?;
        let snapshots = self.snapshots.list(&key)?;
        let active = self.messages.list_active(&key)?;

        let mut entries = Vec::with_capacity(snapshots.len() + active.len());
        for snapshot in &snapshots {
            entries.push(PromptEntry::context(snapshot.summary.clone()));
        }
        for message in &active {
            entries.push(PromptEntry::message(message.role, message.content.clone()));
        }
        Ok(entries)
    }

    /// Delete all messages and snapshots for a key.
    #[instrument(skip(self), fields(thread = raw_key))]
    pub fn reset_thread(&self, raw_key: &str) -> Result<ResetStats, EngineError> {
        let key = self.validate_key(raw_key)?;
        let stats = self.threads.reset(&key)?;
        info!(
            thread = %key,
            messages = stats.messages_deleted,
            snapshots = stats.snapshots_deleted,
            "thread reset"
        );
        Ok(stats)
    }
}
