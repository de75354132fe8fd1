use crate::messages::TranscriptLine;

/// Fixed framing overhead charged per stored message.
pub const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Estimate token count for text content.
/// Approximation: chars / 4, rounded up. Longer text never estimates fewer
/// tokens than any prefix of it.
pub fn estimate_text_tokens(text: &str) -> u32 {
    (text.len() as u32).div_ceil(4)
}

/// Estimate tokens for a single message body, including framing overhead.
pub fn estimate_message_tokens(content: &str) -> u32 {
    MESSAGE_OVERHEAD_TOKENS + estimate_text_tokens(content)
}

/// Estimate total tokens across a transcript.
pub fn estimate_transcript_tokens(lines: &[TranscriptLine]) -> u64 {
    lines
        .iter()
        .map(|l| estimate_message_tokens(&l.content) as u64)
        .sum()
}
