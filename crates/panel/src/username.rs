//! Panel username derivation.
//!
//! The panel requires lowercase alphanumeric/underscore usernames. We
//! derive one from the user's display name and resolve collisions with
//! numeric suffixes, falling back to a random suffix after a bounded
//! number of attempts. The search never loops unbounded.

use rand::Rng;

/// Maximum username length the panel accepts.
pub const MAX_USERNAME_LEN: usize = 32;

/// Numeric suffixes tried before falling back to a random one.
pub const MAX_NUMERIC_SUFFIXES: u32 = 5;

/// Normalize a display name into a panel-safe username base.
///
/// Lowercases, collapses every run of non-alphanumeric characters into
/// a single underscore, trims leading/trailing underscores, and
/// truncates. An input with no usable characters yields `"user"`.
pub fn normalize_username(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = true; // suppress leading underscore

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }

    while out.ends_with('_') {
        out.pop();
    }
    out.truncate(MAX_USERNAME_LEN);
    while out.ends_with('_') {
        out.pop();
    }

    if out.is_empty() {
        "user".to_string()
    } else {
        out
    }
}

/// Candidate username for the n-th collision attempt.
///
/// Attempt 0 is the base itself; attempts 1..=MAX_NUMERIC_SUFFIXES get
/// numeric suffixes; anything past that gets a random 4-digit hex
/// suffix. The suffix always fits within [`MAX_USERNAME_LEN`].
pub fn candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        return base.to_string();
    }

    let suffix = if attempt <= MAX_NUMERIC_SUFFIXES {
        attempt.to_string()
    } else {
        format!("{:04x}", rand::thread_rng().gen_range(0u32..0x10000))
    };

    let keep = MAX_USERNAME_LEN.saturating_sub(suffix.len() + 1);
    let mut out = base.chars().take(keep).collect::<String>();
    while out.ends_with('_') {
        out.pop();
    }
    format!("{}_{}", out, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_collapses_separators() {
        assert_eq!(normalize_username("Jane Doe"), "jane_doe");
        assert_eq!(normalize_username("jane--doe!!"), "jane_doe");
        assert_eq!(normalize_username("  spaced   out  "), "spaced_out");
    }

    #[test]
    fn strips_edge_underscores() {
        assert_eq!(normalize_username("!!jane!!"), "jane");
    }

    #[test]
    fn truncates_long_names() {
        let long = "a".repeat(100);
        assert_eq!(normalize_username(&long).len(), MAX_USERNAME_LEN);
    }

    #[test]
    fn empty_input_falls_back() {
        assert_eq!(normalize_username("!!!"), "user");
        assert_eq!(normalize_username(""), "user");
    }

    #[test]
    fn first_candidate_is_the_base() {
        assert_eq!(candidate("jane_doe", 0), "jane_doe");
    }

    #[test]
    fn numeric_suffixes_then_random() {
        assert_eq!(candidate("jane", 1), "jane_1");
        assert_eq!(candidate("jane", 5), "jane_5");
        let random = candidate("jane", 6);
        assert!(random.starts_with("jane_"));
        assert_eq!(random.len(), "jane_".len() + 4);
        assert_ne!(random, "jane_6");
    }

    #[test]
    fn suffixed_candidates_respect_max_length() {
        let long = "a".repeat(MAX_USERNAME_LEN);
        for attempt in 0..10 {
            assert!(candidate(&long, attempt).len() <= MAX_USERNAME_LEN);
        }
    }
}
