//! Tunables
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};

use crate::error::FocusError;
use crate::rule_table::PLATFORM_RULE_CAP;

/// Longest sprint the UI offers, in minutes.
pub const MAX_SPRINT_MINUTES: u32 = 180;

/// Period of the badge refresh alarm, in minutes.
pub const TICK_PERIOD_MINUTES: u32 = 1;

/// Sites blocked on first install and after "reset to defaults".
pub const DEFAULT_BLOCKED_SITES: &[&str] = &[
    "*://facebook.com/*",
    "*://www.facebook.com/*",
    "*://twitter.com/*",
    "*://www.twitter.com/*",
    "*://x.com/*",
    "*://www.x.com/*",
    "*://reddit.com/*",
    "*://www.reddit.com/*",
    "*://news.ycombinator.com/*",
    "*://cnn.com/*",
    "*://www.cnn.com/*",
    "*://bbc.co.uk/*",
    "*://www.bbc.co.uk/*",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FocusConfig {
    pub max_sprint_minutes: u32,
    pub tick_period_minutes: u32,
    /// May be lowered below the platform cap, never raised above it
    pub rule_capacity: usize,
    pub default_blocked_sites: Vec<String>,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            max_sprint_minutes: MAX_SPRINT_MINUTES,
            tick_period_minutes: TICK_PERIOD_MINUTES,
            rule_capacity: PLATFORM_RULE_CAP,
            default_blocked_sites: DEFAULT_BLOCKED_SITES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FocusConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(text: &str) -> Result<Self, FocusError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| FocusError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FocusError> {
        if self.max_sprint_minutes == 0 {
            return Err(FocusError::InvalidConfig(
                "maxSprintMinutes must be at least 1".to_string(),
            ));
        }
        if self.tick_period_minutes == 0 {
            return Err(FocusError::InvalidConfig(
                "tickPeriodMinutes must be at least 1".to_string(),
            ));
        }
        if self.rule_capacity == 0 || self.rule_capacity > PLATFORM_RULE_CAP {
            return Err(FocusError::InvalidConfig(format!(
                "ruleCapacity must be between 1 and {PLATFORM_RULE_CAP}, got {}",
                self.rule_capacity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        let config = FocusConfig::from_json("{}").expect("valid config");
        assert_eq!(config, FocusConfig::default());
        assert_eq!(config.max_sprint_minutes, 180);
        assert_eq!(config.rule_capacity, 50);
        assert_eq!(config.default_blocked_sites.len(), 13);
    }

    #[test]
    fn test_partial_override() {
        let config = FocusConfig::from_json(r#"{ "maxSprintMinutes": 90, "ruleCapacity": 20 }"#)
            .expect("valid config");
        assert_eq!(config.max_sprint_minutes, 90);
        assert_eq!(config.rule_capacity, 20);
        assert_eq!(config.tick_period_minutes, 1);
    }

    #[test]
    fn test_capacity_above_platform_cap_rejected() {
        let err = FocusConfig::from_json(r#"{ "ruleCapacity": 51 }"#).unwrap_err();
        assert_eq!(err.code(), "invalidConfig");
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(FocusConfig::from_json("{ maxSprintMinutes: }").is_err());
        assert!(FocusConfig::from_json(r#"{ "maxSprintMinutes": 0 }"#).is_err());
    }
}
