//! Observation Trimming
//!
//! Tool outputs are appended to every later prompt, so each one is capped to a
//! token budget before it enters the scratchpad or the worker log. Tokens are
//! counted with the provider's own estimator.

/// Rough token estimate: ~4 characters per token.
pub fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.len() / 4).unwrap_or(u32::MAX)
}

/// Keep the leading words of `text` that fit in `max_tokens`.
///
/// Cuts on a space boundary. A single word longer than the budget is cut at
/// the last char boundary that fits. `estimate` must not decrease as text
/// grows.
pub fn trim_to_tokens(text: &str, max_tokens: usize, estimate: impl Fn(&str) -> u32) -> String {
    let budget = u32::try_from(max_tokens).unwrap_or(u32::MAX);
    let fits = |end: usize| estimate(&text[..end]) <= budget;
    if fits(text.len()) {
        return text.to_string();
    }

    let spaces: Vec<usize> = text.match_indices(' ').map(|(idx, _)| idx).filter(|idx| *idx > 0).collect();
    let kept = spaces.partition_point(|end| fits(*end));
    let end = if kept > 0 {
        spaces[kept - 1]
    } else {
        let bounds: Vec<usize> = text.char_indices().map(|(idx, _)| idx).skip(1).collect();
        let kept = bounds.partition_point(|end| fits(*end));
        if kept > 0 { bounds[kept - 1] } else { 0 }
    };

    let trimmed = &text[..end];
    tracing::debug!(
        original = text.len(),
        trimmed = trimmed.len(),
        "Trimmed observation to token budget"
    );
    trimmed.to_string()
}
