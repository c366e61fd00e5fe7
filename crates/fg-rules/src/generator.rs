//! Block pattern expansion
//!
//! Every `*://host/*` pattern yields two rules: the pattern itself and a
//! companion for the `www.` variant of the host (added when missing, stripped
//! when present). Patterns without the scheme wildcard are passed through as
//! a single verbatim rule so advanced users can write their own filters.
//!
//! Output order is primary then companion, in input order, with ids
//! numbered from 1. The reconciler relies on this to truncate
//! deterministically.

use fg_core::pattern::{host_segment, host_start, WWW_PREFIX};
use fg_core::BlockRule;

/// Expand block patterns into rules targeting the blocked-page placeholder.
pub fn generate<P: AsRef<str>>(patterns: &[P]) -> Vec<BlockRule> {
    let mut rules = Vec::with_capacity(patterns.len() * 2);
    let mut next_id: u32 = 1;

    let mut push = |rules: &mut Vec<BlockRule>, filter: String| {
        rules.push(BlockRule::new(next_id, filter));
        next_id = next_id.saturating_add(1);
    };

    for pattern in patterns {
        let pattern = pattern.as_ref();
        push(&mut rules, pattern.to_string());
        if let Some(companion) = companion(pattern) {
            push(&mut rules, companion);
        }
    }

    rules
}

/// The `www.` toggled variant of a wildcard pattern.
///
/// Only the text right after the scheme wildcard changes, so any path or
/// port in the pattern is preserved. Returns `None` for verbatim filters and
/// for patterns whose host would end up empty.
fn companion(pattern: &str) -> Option<String> {
    let start = host_start(pattern)?;
    let host = host_segment(pattern)?;
    if host.is_empty() {
        return None;
    }

    let (scheme, rest) = pattern.split_at(start);
    match rest.strip_prefix(WWW_PREFIX) {
        Some(bare) if host.len() > WWW_PREFIX.len() => Some(format!("{scheme}{bare}")),
        Some(_) => None,
        None => Some(format!("{scheme}{WWW_PREFIX}{rest}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_core::{RedirectTarget, ResourceType};

    fn filters(rules: &[BlockRule]) -> Vec<(u32, &str)> {
        rules.iter().map(|r| (r.id, r.url_filter.as_str())).collect()
    }

    #[test]
    fn test_generate_empty() {
        let none: [&str; 0] = [];
        assert!(generate(&none).is_empty());
    }

    #[test]
    fn test_generate_adds_www_companion() {
        let rules = generate(&["*://example.com/*"]);
        assert_eq!(
            filters(&rules),
            vec![(1, "*://example.com/*"), (2, "*://www.example.com/*")]
        );
    }

    #[test]
    fn test_generate_strips_www_companion() {
        let rules = generate(&["*://www.example.com/*"]);
        assert_eq!(
            filters(&rules),
            vec![(1, "*://www.example.com/*"), (2, "*://example.com/*")]
        );
    }

    #[test]
    fn test_generate_verbatim_filter() {
        let rules = generate(&["google.com"]);
        assert_eq!(filters(&rules), vec![(1, "google.com")]);
    }

    #[test]
    fn test_generate_order_and_ids() {
        let patterns = vec![
            "*://a.com/*".to_string(),
            "||ads^".to_string(),
            "*://www.b.org/*".to_string(),
        ];
        let rules = generate(&patterns);
        assert_eq!(
            filters(&rules),
            vec![
                (1, "*://a.com/*"),
                (2, "*://www.a.com/*"),
                (3, "||ads^"),
                (4, "*://www.b.org/*"),
                (5, "*://b.org/*"),
            ]
        );
    }

    #[test]
    fn test_generate_rule_shape() {
        for rule in generate(&["*://a.com/*", "b"]) {
            assert_eq!(rule.redirect, RedirectTarget::BlockedPage);
            assert_eq!(rule.resource_types, ResourceType::MAIN_FRAME);
        }
    }

    #[test]
    fn test_companion_keeps_path() {
        assert_eq!(
            companion("*://bbc.co.uk/news/*").as_deref(),
            Some("*://www.bbc.co.uk/news/*")
        );
        assert_eq!(companion("*:///*"), None);
        assert_eq!(companion("*://www./*"), None);
        assert_eq!(companion("plain"), None);
    }
}
