//! Identifier validation shared by naming and filesystem code.

/// Returns true when `id` is safe to embed in container names, labels
/// and filesystem paths.
///
/// Workload and run ids namespace both container names and config
/// directories, so they are restricted to `[A-Za-z0-9_-]` and must be
/// non-empty. Anything else (path separators, dots, whitespace) is
/// rejected before it can escape the per-workload namespace.
pub fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_ids() {
        assert!(is_safe_id("bot-1"));
        assert!(is_safe_id("a"));
        assert!(is_safe_id("bt_7f3a2c"));
        assert!(is_safe_id("UPPER-case-9"));
    }

    #[test]
    fn test_rejects_path_escapes() {
        assert!(!is_safe_id(""));
        assert!(!is_safe_id("../etc"));
        assert!(!is_safe_id("a/b"));
        assert!(!is_safe_id("a\\b"));
        assert!(!is_safe_id("dot.dot"));
        assert!(!is_safe_id("white space"));
    }

    #[test]
    fn test_rejects_oversized_ids() {
        let long = "a".repeat(129);
        assert!(!is_safe_id(&long));
        let max = "a".repeat(128);
        assert!(is_safe_id(&max));
    }
}
