//! Strategy name sanitization.

/// Fallback class name for empty or fully-stripped inputs.
const DEFAULT_STRATEGY_NAME: &str = "MyStrategy";

/// Collapse a display name into a class-like identifier.
///
/// Alphanumeric runs are title-cased and concatenated; everything
/// between them is dropped, so the result never contains spaces or
/// path separators. "RSI Test Strategy" becomes "RsiTestStrategy".
pub fn sanitize_strategy_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for run in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = run.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(|c| c.to_lowercase()));
        }
    }

    if out.is_empty() {
        DEFAULT_STRATEGY_NAME.to_string()
    } else {
        out
    }
}

/// Sanitized python source filename for a strategy.
pub fn strategy_filename(name: &str) -> String {
    format!("{}.py", sanitize_strategy_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spaces_collapse_and_title_case() {
        assert_eq!(strategy_filename("RSI Test Strategy"), "RsiTestStrategy.py");
    }

    #[test]
    fn test_repeated_spaces() {
        assert_eq!(strategy_filename("My   Super   Strategy"), "MySuperStrategy.py");
    }

    #[test]
    fn test_empty_falls_back_to_default() {
        assert_eq!(strategy_filename(""), "MyStrategy.py");
        assert_eq!(strategy_filename("!!! ***"), "MyStrategy.py");
    }

    #[test]
    fn test_underscores_and_digits() {
        assert_eq!(sanitize_strategy_name("macd_crossover_v2"), "MacdCrossoverV2");
    }

    #[test]
    fn test_no_spaces_or_separators_survive() {
        let hostile = "../../etc/passwd \\ evil strategy";
        let sanitized = sanitize_strategy_name(hostile);
        assert!(!sanitized.contains(' '));
        assert!(!sanitized.contains('/'));
        assert!(!sanitized.contains('\\'));
        assert!(!sanitized.contains('.'));
    }
}
