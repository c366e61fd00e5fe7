//! Error taxonomy
//!
//! Collaborator failures keep their own types so callers can tell a storage
//! outage from a rejected rule update; [`FocusError`] is what operations
//! return.

use crate::rule_table::RuleTableError;
use crate::storage::StorageError;
use crate::timer::TimerError;

/// More rules were generated than the rule table can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Rule capacity exceeded: {requested} rules generated, table holds {cap}")]
pub struct CapacityExceeded {
    pub requested: usize,
    pub cap: usize,
}

/// Error type for FocusGuard operations.
#[derive(Debug, thiserror::Error)]
pub enum FocusError {
    #[error("A sprint is already active")]
    AlreadyActive,
    #[error("Invalid sprint duration: {minutes} minutes (expected 1 to {max})")]
    InvalidDuration { minutes: i64, max: u32 },
    #[error("Please enter at least one site")]
    EmptyInput,
    #[error("Site index {index} out of range ({len} sites)")]
    SiteIndexOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    CapacityExceeded(#[from] CapacityExceeded),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),
    #[error("Rule table error: {0}")]
    RuleTable(#[from] RuleTableError),
}

impl FocusError {
    /// Stable machine-readable code used in command replies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyActive => "alreadyActive",
            Self::InvalidDuration { .. } => "invalidDuration",
            Self::EmptyInput => "emptyInput",
            Self::SiteIndexOutOfRange { .. } => "siteIndexOutOfRange",
            Self::CapacityExceeded(_) => "capacityExceeded",
            Self::InvalidConfig(_) => "invalidConfig",
            Self::Storage(_) => "storage",
            Self::Timer(_) => "timer",
            Self::RuleTable(_) => "ruleTable",
        }
    }

    /// Validation failures are the caller's to fix; retrying will not help.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidDuration { .. } | Self::EmptyInput | Self::SiteIndexOutOfRange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_messages() {
        let err = FocusError::InvalidDuration { minutes: 0, max: 180 };
        assert_eq!(err.code(), "invalidDuration");
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Invalid sprint duration: 0 minutes (expected 1 to 180)"
        );

        let err: FocusError = CapacityExceeded { requested: 60, cap: 50 }.into();
        assert_eq!(err.code(), "capacityExceeded");
        assert!(!err.is_validation());

        let err: FocusError = StorageError::new("quota").into();
        assert_eq!(err.to_string(), "Storage error: quota");
    }
}
