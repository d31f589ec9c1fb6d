//! Content-similarity signatures for diversity selection.

use std::collections::BTreeSet;

/// Build a token signature for a sample's content: sorted unique lowercase
/// alphanumeric tokens, space-joined. Stable across runs for identical
/// content, which keeps batch selection reproducible.
pub fn token_signature(content: &str) -> String {
    let tokens: BTreeSet<String> = content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();
    tokens.into_iter().collect::<Vec<_>>().join(" ")
}

/// Jaccard similarity between two token signatures.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}
