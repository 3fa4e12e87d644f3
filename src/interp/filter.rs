//! Regex-set matching for the interpreter filters
//!
//! Each filter is a set of regex strings; a name matches the set if any
//! pattern finds a match anywhere in it. Patterns compile once per thread
//! and stay cached; an invalid pattern never matches and is reported once.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use regex::Regex;

thread_local! {
    static REGEX_CACHE: RefCell<HashMap<String, Option<Regex>>> = RefCell::new(HashMap::new());
}

fn compiled(pattern: &str) -> Option<Regex> {
    REGEX_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .entry(pattern.to_string())
            .or_insert_with(|| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    tracing::warn!(pattern, "invalid filter pattern: {err}");
                    None
                }
            })
            .clone()
    })
}

/// Whether `name` matches any pattern in the set
pub fn find_matching(patterns: &BTreeSet<String>, name: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| compiled(pattern).is_some_and(|regex| regex.is_match(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::config::{default_exclude_filenames, default_exclude_functions};

    fn set(patterns: &[&str]) -> BTreeSet<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        assert!(!find_matching(&BTreeSet::new(), "anything"));
    }

    #[test]
    fn test_search_semantics() {
        // patterns match anywhere in the name unless anchored
        assert!(find_matching(&set(&["main"]), "run_main_loop"));
        assert!(find_matching(&set(&["^main$"]), "main"));
        assert!(!find_matching(&set(&["^main$"]), "run_main_loop"));
    }

    #[test]
    fn test_any_pattern_suffices() {
        let patterns = set(&["^alpha$", "^beta$"]);
        assert!(find_matching(&patterns, "beta"));
        assert!(!find_matching(&patterns, "gamma"));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        let patterns = set(&["([unclosed"]);
        assert!(!find_matching(&patterns, "([unclosed"));
        // and does not poison valid patterns in the same set
        let mixed = set(&["([unclosed", "^ok$"]);
        assert!(find_matching(&mixed, "ok"));
    }

    #[test]
    fn test_default_excludes() {
        assert!(find_matching(&default_exclude_functions(), "<module>"));
        assert!(find_matching(&default_exclude_functions(), "<lambda>"));
        assert!(!find_matching(&default_exclude_functions(), "work"));

        assert!(find_matching(&default_exclude_filenames(), "threading.py"));
        assert!(find_matching(&default_exclude_filenames(), "json/encoder.py"));
        assert!(find_matching(&default_exclude_filenames(), "<string>"));
        assert!(!find_matching(&default_exclude_filenames(), "app.py"));
    }

    #[test]
    fn test_match_everything_pattern() {
        assert!(find_matching(&set(&["^.*$"]), "anything_at_all"));
        assert!(find_matching(&set(&["^.*$"]), ""));
    }
}
