//! Deterministic fingerprint derivation for test failures.
//!
//! A fingerprint is the canonical identity of a failure: the same logical
//! failure observed across many test runs (different timestamps, URLs,
//! stack line numbers) must normalize to the same fingerprint so the
//! mapping table can guarantee at-most-one external issue per failure.
//!
//! The algorithm is fixed and published rather than configurable: any hash
//! of comparable width would do, but callers (and anyone auditing a
//! `create_issue` dedupe decision) need one implementation to reason about.

use std::sync::LazyLock;

use regex::Regex;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("static pattern"));

static STACK_FRAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"at \S+:\d+:\d+").expect("static pattern"));

static DIGIT_RUN_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("static pattern"));

/// Normalize an error message so that runs differing only in timestamps,
/// URLs, or stack-frame locations collapse to the same text.
///
/// Order matters: URLs are replaced before stack frames so a URL embedded
/// right after `at ` (e.g. `at https://host/path`) is swallowed by the URL
/// pattern rather than partially matched as a stack frame; digit runs are
/// replaced last so `LOCATION`/`URL` themselves are never touched.
#[must_use]
pub fn normalize_error_message(message: &str) -> String {
    let replaced_urls = URL_PATTERN.replace_all(message, "URL");
    let replaced_frames = STACK_FRAME_PATTERN.replace_all(&replaced_urls, "at LOCATION");
    let replaced_digits = DIGIT_RUN_PATTERN.replace_all(&replaced_frames, "N");
    replaced_digits.trim().to_lowercase()
}

/// Compute the canonical fingerprint for `(test_name, error_message, selector)`.
///
/// An absent selector and an empty-string selector are treated identically
/// — both become `""` in the concatenated key — preserving the source
/// system's behavior of not distinguishing the two.
#[must_use]
pub fn fingerprint(test_name: &str, error_message: &str, selector: Option<&str>) -> String {
    let normalized_error = normalize_error_message(error_message);
    let selector = selector.unwrap_or("");
    let key = format!("{test_name}|{normalized_error}|{selector}");
    format!("{:x}", md5::compute(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_digits_urls_and_stack_frames() {
        let normalized = normalize_error_message(
            "Timeout at https://x.y/z after 3000 ms at app.ts:12:7",
        );
        assert_eq!(normalized, "timeout at url after n ms at location");
    }

    #[test]
    fn fingerprint_seed_case_matches_published_algorithm() {
        let fp = fingerprint(
            "login test",
            "Timeout at https://x.y/z after 3000 ms at app.ts:12:7",
            None,
        );
        let expected = format!(
            "{:x}",
            md5::compute(b"login test|timeout at url after n ms at location|")
        );
        assert_eq!(fp, expected);
    }

    #[test]
    fn absent_and_empty_selector_are_equivalent() {
        let with_none = fingerprint("t", "boom", None);
        let with_empty = fingerprint("t", "boom", Some(""));
        assert_eq!(with_none, with_empty);
    }

    #[test]
    fn differing_only_in_digits_urls_or_locations_collapses() {
        let a = fingerprint("t", "failed after 100 ms at https://a.com/x at f.ts:1:2", None);
        let b = fingerprint("t", "failed after 999 ms at https://b.com/y at g.ts:9:9", None);
        assert_eq!(a, b);
    }

    #[test]
    fn differing_text_yields_different_fingerprint() {
        let a = fingerprint("t", "assertion failed: expected true", None);
        let b = fingerprint("t", "assertion failed: expected false", None);
        assert_ne!(a, b);
    }
}
