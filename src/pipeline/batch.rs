//! Token-aware batching of texts into upstream requests.
//!
//! Token counts are estimated as `chars / 4`, the usual rule of thumb for
//! English under GPT-style BPE tokenisers. It is an approximation, not a
//! tokenizer: the budget is advisory and exists to keep requests well below
//! the provider's context limit.

use std::ops::Range;

/// Estimated token count of `text` (`chars / 4`, rounded down).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Split `texts` into consecutive index ranges under `budget` estimated
/// tokens each.
///
/// Texts are packed greedily in order. A batch is closed when adding the next
/// text would push it over the budget; a text that alone exceeds the budget
/// gets a batch of its own. The ranges cover `0..texts.len()` exactly once,
/// in order, so concatenating per-batch results restores the input order.
pub fn plan_batches<S: AsRef<str>>(texts: &[S], budget: usize) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut tokens = 0;

    for (i, text) in texts.iter().enumerate() {
        let cost = estimate_tokens(text.as_ref());
        if i > start && tokens + cost > budget {
            batches.push(start..i);
            start = i;
            tokens = 0;
        }
        tokens += cost;
    }
    if start < texts.len() {
        batches.push(start..texts.len());
    }
    batches
}
