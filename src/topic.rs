//! Topic pattern matching
//!
//! Patterns are dot-separated topic names where `*` matches any run of
//! characters, including dots. A bare `*` matches every topic, so
//! `orders.*` behaves as a prefix glob and `*.filled` as a suffix glob.
//! There is no single-segment wildcard.

/// Returns true if `topic` matches `pattern`
pub fn pattern_matches(pattern: &str, topic: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == topic;
    }
    glob_match(pattern.as_bytes(), topic.as_bytes())
}

/// Iterative `*`-only glob with greedy star and backtracking
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let mut p = 0;
    let mut t = 0;
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while t < text.len() {
        if p < pattern.len() && pattern[p] != b'*' && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            // Last star absorbs one more byte, retry the tail
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(pattern_matches("orders.created", "orders.created"));
        assert!(!pattern_matches("orders.created", "orders.cancelled"));
        assert!(!pattern_matches("orders.created", "orders.created.v2"));
    }

    #[test]
    fn test_match_all() {
        assert!(pattern_matches("*", "orders.created"));
        assert!(pattern_matches("*", "a"));
        assert!(pattern_matches("*", ""));
    }

    #[test]
    fn test_prefix_glob() {
        assert!(pattern_matches("orders.*", "orders.created"));
        assert!(pattern_matches("orders.*", "orders.eu.created"));
        assert!(!pattern_matches("orders.*", "orders"));
        assert!(!pattern_matches("orders.*", "payments.created"));
    }

    #[test]
    fn test_suffix_glob() {
        assert!(pattern_matches("*.filled", "orders.filled"));
        assert!(pattern_matches("*.filled", "orders.eu.filled"));
        assert!(!pattern_matches("*.filled", "filled"));
        assert!(!pattern_matches("*.filled", "orders.cancelled"));
    }

    #[test]
    fn test_wildcard_spans_dots() {
        assert!(pattern_matches("orders.*.created", "orders.eu.created"));
        assert!(pattern_matches("orders.*.created", "orders.eu.west.created"));
        assert!(!pattern_matches("orders.*.created", "orders.created"));
    }

    #[test]
    fn test_interior_wildcard() {
        assert!(pattern_matches("or*rs", "orders"));
        assert!(pattern_matches("or*rs", "orrs"));
        assert!(!pattern_matches("or*rs", "orders.created"));
    }

    #[test]
    fn test_multiple_wildcards() {
        assert!(pattern_matches("*.orders.*", "eu.orders.created"));
        assert!(pattern_matches("a*b*c", "axxbyyc"));
        assert!(pattern_matches("a*b*c", "abc"));
        assert!(!pattern_matches("a*b*c", "acb"));
    }

    #[test]
    fn test_trailing_star_matches_empty() {
        assert!(pattern_matches("orders*", "orders"));
        assert!(pattern_matches("orders*", "orders.created"));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(pattern_matches("", ""));
        assert!(!pattern_matches("", "orders"));
        assert!(!pattern_matches("orders", ""));
    }
}
