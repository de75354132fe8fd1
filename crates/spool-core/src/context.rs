use serde::{Deserialize, Serialize};

/// Derived view of a thread's active window against the configured budget.
/// Recomputed on demand from the active message set, never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextState {
    pub total_tokens: u64,
    pub active_message_count: u32,
    /// Percentage of budget consumed. Values above 100 are meaningful:
    /// they signal overflow before compaction has run.
    pub context_utilization: f64,
}

impl ContextState {
    pub fn compute(total_tokens: u64, active_message_count: u32, token_budget: u32) -> Self {
        let budget = token_budget.max(1) as f64;
        Self {
            total_tokens,
            active_message_count,
            context_utilization: 100.0 * total_tokens as f64 / budget,
        }
    }

    pub fn empty() -> Self {
        Self {
            total_tokens: 0,
            active_message_count: 0,
            context_utilization: 0.0,
        }
    }
}
