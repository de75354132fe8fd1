use std::time::Duration;

/// Tuning knobs for context budgeting and compaction.
#[derive(Clone, Debug)]
pub struct ContextConfig {
    /// Token budget for a thread's active window.
    pub token_budget: u32,
    /// Utilization percentage at which compaction triggers.
    pub threshold_percent: f64,
    /// Hard cap on active messages, independent of token estimates.
    pub max_active_messages: u32,
    /// Minimum active messages before a window is worth compacting.
    pub min_compactable: u32,
    /// Fraction of active tokens a compaction window targets.
    pub window_fraction: f64,
    /// Newest active messages never pulled into a window.
    pub min_retained: u32,
    /// Upper bound on a single summary-generation call.
    pub summary_timeout: Duration,
    /// Size hint passed to the summary provider.
    pub max_summary_tokens: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: 200_000,
            threshold_percent: 70.0,
            max_active_messages: 200,
            min_compactable: 4,
            window_fraction: 0.5,
            min_retained: 2,
            summary_timeout: Duration::from_secs(30),
            max_summary_tokens: 512,
        }
    }
}

impl ContextConfig {
    /// Clamp fields into workable ranges. Applied once at construction so
    /// the rest of the engine can assume sane values.
    pub fn normalized(mut self) -> Self {
        self.token_budget = self.token_budget.max(1);
        self.threshold_percent = self.threshold_percent.clamp(1.0, 100.0);
        self.max_active_messages = self.max_active_messages.max(2);
        self.window_fraction = self.window_fraction.clamp(0.1, 0.9);
        self.min_retained = self.min_retained.max(1);
        self.min_compactable = self.min_compactable.max(self.min_retained + 1);
        if self.summary_timeout.is_zero() {
            self.summary_timeout = Duration::from_secs(1);
        }
        self.max_summary_tokens = self.max_summary_tokens.max(16);
        self
    }
}
