//! Block pattern utilities
//!
//! Turns whatever the user typed into the options page (bare domain, full
//! URL, existing wildcard pattern) into the canonical `*://host/*` form, and
//! slices the host segment back out of a pattern for the rule generator.

use std::borrow::Cow;

use url::Url;

/// Scheme wildcard that marks a canonical block pattern.
pub const SCHEME_WILDCARD: &str = "*://";

/// Path wildcard that closes a canonical block pattern.
pub const PATH_WILDCARD: &str = "/*";

/// Prefix toggled by the www companion rule.
pub const WWW_PREFIX: &str = "www.";

// =============================================================================
// Normalization
// =============================================================================

/// Normalize free-form site input into a `*://host/*` pattern.
///
/// Empty input, input already containing a wildcard, and input without a dot
/// are returned unchanged. Anything that fails to parse as a URL is returned
/// unchanged as well; the platform rejects it later if it is invalid.
pub fn normalize(input: &str) -> String {
    if input.is_empty() || input.contains('*') || !input.contains('.') {
        return input.to_string();
    }

    let candidate = if has_http_scheme(input) {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("https://{input}"))
    };

    match Url::parse(&candidate) {
        Ok(url) => match url.host_str() {
            Some(host) if !host.is_empty() => format!("{SCHEME_WILDCARD}{host}{PATH_WILDCARD}"),
            _ => input.to_string(),
        },
        Err(_) => input.to_string(),
    }
}

#[inline]
fn has_http_scheme(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Split a free-form list on newlines and commas, trimming each entry.
pub fn split_site_input(text: &str) -> Vec<&str> {
    text.split(['\n', ','])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect()
}

// =============================================================================
// Host Segment
// =============================================================================

/// Position right after the scheme wildcard, if the pattern has one.
#[inline]
pub fn host_start(pattern: &str) -> Option<usize> {
    pattern
        .find(SCHEME_WILDCARD)
        .map(|pos| pos + SCHEME_WILDCARD.len())
}

/// Text between the scheme wildcard and the trailing `/*`.
///
/// Returns `None` for patterns without a scheme wildcard.
pub fn host_segment(pattern: &str) -> Option<&str> {
    let start = host_start(pattern)?;
    let rest = &pattern[start..];
    Some(rest.strip_suffix(PATH_WILDCARD).unwrap_or(rest))
}

/// Whether the input is already in canonical `*://host/*` form.
pub fn is_block_pattern(pattern: &str) -> bool {
    pattern.starts_with(SCHEME_WILDCARD)
        && pattern.ends_with(PATH_WILDCARD)
        && pattern.len() > SCHEME_WILDCARD.len() + PATH_WILDCARD.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_bare_domain() {
        assert_eq!(normalize("example.com"), "*://example.com/*");
        assert_eq!(normalize("news.ycombinator.com"), "*://news.ycombinator.com/*");
        assert_eq!(normalize("Example.COM"), "*://example.com/*");
    }

    #[test]
    fn test_normalize_full_url() {
        assert_eq!(normalize("https://www.youtube.com/watch?v=1"), "*://www.youtube.com/*");
        assert_eq!(normalize("http://reddit.com/r/rust"), "*://reddit.com/*");
        assert_eq!(normalize("example.com:8080/path"), "*://example.com/*");
        assert_eq!(normalize("user@example.com"), "*://example.com/*");
    }

    #[test]
    fn test_normalize_passthrough() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("*://example.com/*"), "*://example.com/*");
        assert_eq!(normalize("||ads.*"), "||ads.*");
        assert_eq!(normalize("localhost"), "localhost");
        // Unparseable host falls back to the raw input
        assert_eq!(normalize("exa mple.com"), "exa mple.com");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "",
            "example.com",
            "https://www.example.com/a/b",
            "*://x.com/*",
            "localhost",
            "exa mple.com",
            "http://192.168.0.1:8080",
            "bbc.co.uk/news",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_split_site_input() {
        let entries = split_site_input("facebook.com, twitter.com\n\n  reddit.com ,\r\nx.com");
        assert_eq!(entries, vec!["facebook.com", "twitter.com", "reddit.com", "x.com"]);
        assert!(split_site_input(" ,\n ").is_empty());
    }

    #[test]
    fn test_host_segment() {
        assert_eq!(host_segment("*://example.com/*"), Some("example.com"));
        assert_eq!(host_segment("*://www.example.com/*"), Some("www.example.com"));
        assert_eq!(host_segment("*://bbc.co.uk/news/*"), Some("bbc.co.uk/news"));
        assert_eq!(host_segment("*://example.com"), Some("example.com"));
        assert_eq!(host_segment("google.com"), None);
    }

    #[test]
    fn test_is_block_pattern() {
        assert!(is_block_pattern("*://example.com/*"));
        assert!(!is_block_pattern("*:///*"));
        assert!(!is_block_pattern("example.com"));
    }
}
