//! Dynamic rule table seam

use std::rc::Rc;
use std::sync::Arc;

use crate::types::BlockRule;

/// Hard cap on distinct dynamic rule ids the platform accepts.
pub const PLATFORM_RULE_CAP: usize = 50;

/// Bulk replace request: drop `remove_ids`, then install `add_rules`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleUpdate {
    pub remove_ids: Vec<u32>,
    pub add_rules: Vec<BlockRule>,
}

impl RuleUpdate {
    /// Ids `1..=cap`, removing whatever an earlier pass installed.
    pub fn full_id_range(cap: usize) -> Vec<u32> {
        let cap = u32::try_from(cap).unwrap_or(u32::MAX);
        (1..=cap).collect()
    }

    /// Remove everything, add nothing.
    pub fn clear_all(cap: usize) -> Self {
        Self {
            remove_ids: Self::full_id_range(cap),
            add_rules: Vec::new(),
        }
    }
}

/// Failure reported by the rule table collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RuleTableError {
    pub message: String,
}

impl RuleTableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// The platform's dynamic redirect rule table.
#[allow(async_fn_in_trait)]
pub trait RuleTable {
    async fn replace(&self, update: &RuleUpdate) -> Result<(), RuleTableError>;
}

impl<T: RuleTable + ?Sized> RuleTable for &T {
    async fn replace(&self, update: &RuleUpdate) -> Result<(), RuleTableError> {
        (**self).replace(update).await
    }
}

impl<T: RuleTable + ?Sized> RuleTable for Rc<T> {
    async fn replace(&self, update: &RuleUpdate) -> Result<(), RuleTableError> {
        (**self).replace(update).await
    }
}

impl<T: RuleTable + ?Sized> RuleTable for Arc<T> {
    async fn replace(&self, update: &RuleUpdate) -> Result<(), RuleTableError> {
        (**self).replace(update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_all_covers_full_range() {
        let update = RuleUpdate::clear_all(PLATFORM_RULE_CAP);
        assert_eq!(update.remove_ids.len(), 50);
        assert_eq!(update.remove_ids.first(), Some(&1));
        assert_eq!(update.remove_ids.last(), Some(&50));
        assert!(update.add_rules.is_empty());
    }
}
