use spool_core::config::ContextConfig;
use spool_core::messages::TranscriptLine;
use spool_core::tokens::estimate_text_tokens;
use spool_store::messages::MessageRow;

/// A contiguous oldest-prefix of active messages chosen for compaction.
#[derive(Debug)]
pub struct Window<'a> {
    pub messages: &'a [MessageRow],
    pub token_count: u64,
}

impl Window<'_> {
    pub fn transcript(&self) -> Vec<TranscriptLine> {
        self.messages
            .iter()
            .map(|m| TranscriptLine::new(m.role, m.content.clone()))
            .collect()
    }

    pub fn first_message_at(&self) -> &str {
        &self.messages[0].created_at
    }

    pub fn last_message_at(&self) -> &str {
        &self.messages[self.messages.len() - 1].created_at
    }
}

/// Select the oldest-prefix window to compact, or None when the thread has
/// too little history to be worth it. The window accumulates messages until
/// it holds roughly `window_fraction` of the active tokens, but always
/// leaves the newest `min_retained` messages untouched so the conversational
/// tail stays directly available.
pub fn select_window<'a>(active: &'a [MessageRow], config: &ContextConfig) -> Option<Window<'a>> {
    if (active.len() as u32) < config.min_compactable {
        return None;
    }

    let total: u64 = active.iter().map(|m| m.estimated_tokens as u64).sum();
    let target = (total as f64 * config.window_fraction).ceil() as u64;

    let max_len = active.len().saturating_sub(config.min_retained as usize);
    if max_len == 0 {
        return None;
    }

    let mut len = 0;
    let mut token_count = 0u64;
    for msg in &active[..max_len] {
        len += 1;
        token_count += msg.estimated_tokens as u64;
        if token_count >= target {
            break;
        }
    }

    Some(Window {
        messages: &active[..len],
        token_count,
    })
}

/// Enforce the shrink invariant: the stored summary must estimate strictly
/// smaller than the window it replaces. Oversized summaries are truncated
/// to fit; returns None when no non-empty summary can satisfy the bound.
pub fn fit_summary(summary: &str, window_tokens: u64) -> Option<(String, u32)> {
    let summary = summary.trim();
    if summary.is_empty() || window_tokens <= 1 {
        return None;
    }

    let estimated = estimate_text_tokens(summary) as u64;
    if estimated < window_tokens {
        return Some((summary.to_owned(), estimated as u32));
    }

    // ceil(len / 4) <= window_tokens - 1  ⇔  len <= (window_tokens - 1) * 4
    let max_bytes = ((window_tokens - 1) * 4) as usize;
    let mut cut = max_bytes.min(summary.len());
    while cut > 0 && !summary.is_char_boundary(cut) {
        cut -= 1;
    }
    if cut == 0 {
        return None;
    }

    let truncated = summary[..cut].to_owned();
    let estimated = estimate_text_tokens(&truncated);
    Some((truncated, estimated))
}
