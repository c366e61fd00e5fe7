//! declarativeNetRequest encoding
//!
//! Serializes [`BlockRule`]s into the JSON objects accepted by
//! `chrome.declarativeNetRequest.updateDynamicRules`.

use serde::{Deserialize, Serialize};

use fg_core::{BlockRule, RuleUpdate};

/// Every FocusGuard rule has the same priority.
pub const RULE_PRIORITY: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnrRule {
    pub id: u32,
    pub priority: u32,
    pub action: DnrAction,
    pub condition: DnrCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DnrAction {
    Redirect { redirect: DnrRedirect },
}

/// Exactly one of the two fields is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnrRedirect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnrCondition {
    pub url_filter: String,
    pub resource_types: Vec<String>,
}

/// Options object for `updateDynamicRules`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnrUpdate {
    pub remove_rule_ids: Vec<u32>,
    pub add_rules: Vec<DnrRule>,
}

impl DnrUpdate {
    pub fn from_update(update: &RuleUpdate, base_url: Option<&str>) -> Self {
        Self {
            remove_rule_ids: update.remove_ids.clone(),
            add_rules: encode_all(&update.add_rules, base_url),
        }
    }
}

/// Encode one rule.
///
/// With a `base_url` (the extension origin, e.g. `chrome-extension://<id>/`)
/// the redirect is an absolute URL; without one it is an extension path.
pub fn encode(rule: &BlockRule, base_url: Option<&str>) -> DnrRule {
    let page = rule.redirect.page();
    let redirect = match base_url {
        Some(base) => DnrRedirect {
            url: Some(format!("{}/{page}", base.trim_end_matches('/'))),
            extension_path: None,
        },
        None => DnrRedirect {
            url: None,
            extension_path: Some(format!("/{page}")),
        },
    };

    DnrRule {
        id: rule.id,
        priority: RULE_PRIORITY,
        action: DnrAction::Redirect { redirect },
        condition: DnrCondition {
            url_filter: rule.url_filter.clone(),
            resource_types: rule
                .resource_types
                .names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        },
    }
}

pub fn encode_all(rules: &[BlockRule], base_url: Option<&str>) -> Vec<DnrRule> {
    rules.iter().map(|rule| encode(rule, base_url)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_core::RedirectTarget;
    use serde_json::json;

    #[test]
    fn test_encode_extension_path() {
        let rule = BlockRule::new(3, "*://a.com/*");
        let json = serde_json::to_value(encode(&rule, None)).expect("serialize");
        assert_eq!(
            json,
            json!({
                "id": 3,
                "priority": 1,
                "action": { "type": "redirect", "redirect": { "extensionPath": "/blocked.html" } },
                "condition": { "urlFilter": "*://a.com/*", "resourceTypes": ["main_frame"] }
            })
        );
    }

    #[test]
    fn test_encode_absolute_url() {
        let mut rule = BlockRule::new(1, "*://a.com/*");
        rule.redirect = RedirectTarget::SprintBlockedPage;
        let encoded = encode(&rule, Some("chrome-extension://abcdef/"));
        let DnrAction::Redirect { redirect } = encoded.action;
        assert_eq!(
            redirect.url.as_deref(),
            Some("chrome-extension://abcdef/sprint-blocked.html")
        );
        assert_eq!(redirect.extension_path, None);
    }

    #[test]
    fn test_update_layout() {
        let update = RuleUpdate {
            remove_ids: vec![1, 2],
            add_rules: vec![BlockRule::new(1, "x")],
        };
        let json = serde_json::to_value(DnrUpdate::from_update(&update, None)).expect("serialize");
        assert_eq!(json["removeRuleIds"], json!([1, 2]));
        assert_eq!(json["addRules"][0]["condition"]["urlFilter"], "x");
    }
}
