//! Domain matching and repair heuristics used by the classifier.
//!
//! A message names a site when it matches, from start to end:
//! - optional `http://` / `https://`
//! - optional `www.`
//! - one or more `label.` segments (alphanumeric, inner hyphens, 1-63 chars)
//! - a top-level domain of two or more ASCII letters
//! - an optional whitespace-free `/path`
//! - optional whitespace followed by a free-text question

use std::sync::LazyLock;

use regex::Regex;

/// Top-level domain appended when a single bare word is widened into a domain.
pub(crate) const DEFAULT_TLD: &str = ".com";

/// Scheme prepended to sites written without one.
pub(crate) const DEFAULT_SCHEME: &str = "https://";

/// Single tokens must be longer than this before they are widened.
const MIN_WIDEN_LEN: usize = 3;

static SITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?:https?://)?(?:www\.)?(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}(?:/\S*)?)(?:\s+((?s:.*)))?$",
    )
    .expect("site regex")
});

/// A successful site match: the site span and the raw trailing text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SiteMatch<'a> {
    pub site: &'a str,
    pub trailing: Option<&'a str>,
}

/// Match `text` against the site pattern.
pub(crate) fn match_site(text: &str) -> Option<SiteMatch<'_>> {
    let caps = SITE_RE.captures(text)?;
    let site = caps.get(1)?.as_str();
    let trailing = caps.get(2).map(|m| m.as_str());
    Some(SiteMatch { site, trailing })
}

/// Rewrite `wikilect_com rest` into `wikilect.com rest`.
///
/// Some clients suppress literal dots in commands, so users type underscores
/// instead. Applies only when the text has an underscore and no period.
/// Returns `None` when the rule does not fire.
pub(crate) fn repair_underscore_domain(text: &str) -> Option<String> {
    if !text.contains('_') || text.contains('.') {
        return None;
    }

    let trimmed = text.trim_start();
    let split_at = trimmed
        .find(char::is_whitespace)
        .unwrap_or(trimmed.len());
    let (head, tail) = trimmed.split_at(split_at);
    if head.is_empty() {
        return None;
    }

    let domain = head.replace('_', ".");
    let rest = tail.trim();
    if rest.is_empty() {
        Some(domain)
    } else {
        Some(format!("{domain} {rest}"))
    }
}

/// Turn a single bare word into a domain candidate for one more match attempt.
///
/// Only whitespace-free text longer than three characters qualifies; `.com`
/// is appended when the word has no period.
pub(crate) fn widen_bare_word(text: &str) -> Option<String> {
    if text.chars().any(char::is_whitespace) || text.chars().count() <= MIN_WIDEN_LEN {
        return None;
    }

    if text.contains('.') {
        Some(text.to_string())
    } else {
        Some(format!("{text}{DEFAULT_TLD}"))
    }
}

/// Prefix the default scheme unless the site already carries one.
pub(crate) fn with_scheme(site: &str) -> String {
    if site.starts_with("http://") || site.starts_with("https://") {
        site.to_string()
    } else {
        format!("{DEFAULT_SCHEME}{site}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_bare_domain() {
        let m = match_site("example.com").unwrap();
        assert_eq!(m.site, "example.com");
        assert_eq!(m.trailing, None);
    }

    #[test]
    fn matches_scheme_www_and_path() {
        let m = match_site("https://www.shop.example.co.uk/catalog?page=2").unwrap();
        assert_eq!(m.site, "https://www.shop.example.co.uk/catalog?page=2");
    }

    #[test]
    fn captures_trailing_question() {
        let m = match_site("example.com   what do you sell?").unwrap();
        assert_eq!(m.site, "example.com");
        assert_eq!(m.trailing, Some("what do you sell?"));
    }

    #[test]
    fn trailing_question_may_span_lines() {
        let m = match_site("example.com first line\nsecond line").unwrap();
        assert_eq!(m.trailing, Some("first line\nsecond line"));
    }

    #[test]
    fn rejects_hyphen_edges_and_short_tld() {
        assert!(match_site("-bad.com").is_none());
        assert!(match_site("bad-.com").is_none());
        assert!(match_site("example.c").is_none());
        assert!(match_site("example.c0m").is_none());
    }

    #[test]
    fn rejects_overlong_label() {
        let label = "a".repeat(64);
        assert!(match_site(&format!("{label}.com")).is_none());
        let label = "a".repeat(63);
        assert!(match_site(&format!("{label}.com")).is_some());
    }

    #[test]
    fn scheme_without_structure_fails() {
        assert!(match_site("https://").is_none());
        assert!(match_site("https://localhost").is_none());
    }

    #[test]
    fn rejects_text_before_domain() {
        assert!(match_site("look at example.com").is_none());
    }

    #[test]
    fn repair_rewrites_first_token_only() {
        assert_eq!(
            repair_underscore_domain("wikilect_com").as_deref(),
            Some("wikilect.com")
        );
        assert_eq!(
            repair_underscore_domain("my_shop_ru   сколько стоит  ").as_deref(),
            Some("my.shop.ru сколько стоит")
        );
        assert_eq!(
            repair_underscore_domain("site_com what_is_new").as_deref(),
            Some("site.com what_is_new")
        );
    }

    #[test]
    fn repair_skips_text_with_periods_or_no_underscores() {
        assert!(repair_underscore_domain("wikilect.com_x").is_none());
        assert!(repair_underscore_domain("plain words").is_none());
    }

    #[test]
    fn widen_rules() {
        assert_eq!(widen_bare_word("google").as_deref(), Some("google.com"));
        assert_eq!(widen_bare_word("sub.x").as_deref(), Some("sub.x"));
        assert!(widen_bare_word("hi").is_none());
        assert!(widen_bare_word("abc").is_none());
        assert!(widen_bare_word("two words").is_none());
    }

    #[test]
    fn widen_counts_characters_not_bytes() {
        // three Cyrillic letters are six bytes
        assert!(widen_bare_word("абв").is_none());
    }

    #[test]
    fn scheme_is_preserved_or_added() {
        assert_eq!(with_scheme("example.com"), "https://example.com");
        assert_eq!(with_scheme("http://example.com"), "http://example.com");
    }
}
