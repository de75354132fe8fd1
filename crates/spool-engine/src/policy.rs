use spool_core::config::ContextConfig;
use spool_core::context::ContextState;

/// Whether a thread needs compaction. Pure: repeated calls without new
/// messages give the same answer. Triggers on utilization crossing the
/// threshold, or on the message-count cap — the cap bounds compaction
/// latency even when token estimates are off.
pub fn needs_summarization(state: &ContextState, config: &ContextConfig) -> bool {
    state.context_utilization >= config.threshold_percent
        || state.active_message_count >= config.max_active_messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ContextConfig {
        ContextConfig {
            token_budget: 1000,
            threshold_percent: 70.0,
            max_active_messages: 50,
            ..Default::default()
        }
        .normalized()
    }

    #[test]
    fn below_threshold_not_needed() {
        let state = ContextState::compute(600, 10, 1000);
        assert!(!needs_summarization(&state, &config()));
    }

    #[test]
    fn at_threshold_needed() {
        let state = ContextState::compute(700, 10, 1000);
        assert!(needs_summarization(&state, &config()));
    }

    #[test]
    fn over_budget_needed() {
        let state = ContextState::compute(1500, 10, 1000);
        assert!(needs_summarization(&state, &config()));
    }

    #[test]
    fn message_cap_triggers_independently_of_tokens() {
        let state = ContextState::compute(10, 50, 1000);
        assert!(needs_summarization(&state, &config()));
    }

    #[test]
    fn empty_thread_not_needed() {
        assert!(!needs_summarization(&ContextState::empty(), &config()));
    }

    #[test]
    fn pure_read_is_stable() {
        let state = ContextState::compute(800, 10, 1000);
        let cfg = config();
        let first = needs_summarization(&state, &cfg);
        let second = needs_summarization(&state, &cfg);
        assert_eq!(first, second);
    }
}
