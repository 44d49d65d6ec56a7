//! Unicode-safe helpers for working with UTF-8 strings.

/// Convert a character index (0-based) to a byte index in the given string.
/// If `n` exceeds the number of characters, returns `s.len()`.
pub fn char_to_byte_index(s: &str, n: usize) -> usize {
    match s.char_indices().nth(n) {
        Some((i, _)) => i,
        None => s.len(),
    }
}

/// Shorten `s` to at most `limit` characters, replacing the tail with `...`
/// when it is longer. Strings that already fit are returned unchanged.
pub fn clip(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let keep = limit.saturating_sub(3);
    format!("{}...", &s[..char_to_byte_index(s, keep)])
}
