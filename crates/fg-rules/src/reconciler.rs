//! Rule table reconciliation
//!
//! Every pass removes the whole id range and installs the freshly generated
//! rules. Passes are idempotent and order-independent, so rapid settings
//! changes can each trigger one without coordination.

use log::{info, warn};

use fg_core::settings::SettingsStore;
use fg_core::{CapacityExceeded, FocusError, RedirectTarget, RuleTable, RuleUpdate, Storage};

use crate::generator::generate;

/// Bulk replace to issue, plus whether rules had to be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub update: RuleUpdate,
    /// Set when the generated rules did not fit; the first `cap` were kept
    pub truncated: Option<CapacityExceeded>,
}

/// What a [`sync_rules`] pass installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub installed: usize,
    pub redirect: RedirectTarget,
    pub truncated: Option<CapacityExceeded>,
}

/// Compute the bulk replace for the desired patterns.
pub fn reconcile<P: AsRef<str>>(
    patterns: &[P],
    is_enabled: bool,
    is_sprint_active: bool,
    cap: usize,
) -> Reconciliation {
    if !is_enabled || patterns.is_empty() {
        return Reconciliation {
            update: RuleUpdate::clear_all(cap),
            truncated: None,
        };
    }

    let redirect = RedirectTarget::for_sprint(is_sprint_active);
    let mut rules = generate(patterns);
    for rule in &mut rules {
        rule.redirect = redirect;
    }

    let truncated = if rules.len() > cap {
        let exceeded = CapacityExceeded {
            requested: rules.len(),
            cap,
        };
        rules.truncate(cap);
        Some(exceeded)
    } else {
        None
    };

    Reconciliation {
        update: RuleUpdate {
            remove_ids: RuleUpdate::full_id_range(cap),
            add_rules: rules,
        },
        truncated,
    }
}

/// Rebuild the rule table from the persisted settings.
///
/// A failed settings read leaves the table untouched; clearing it on a
/// transient storage error would silently unblock every site.
pub async fn sync_rules<S, R>(
    settings: &SettingsStore<S>,
    is_sprint_active: bool,
    cap: usize,
    table: &R,
) -> Result<SyncReport, FocusError>
where
    S: Storage,
    R: RuleTable,
{
    let current = settings.try_load().await?;
    let Reconciliation { update, truncated } = reconcile(
        &current.blocked_sites,
        current.is_enabled,
        is_sprint_active,
        cap,
    );

    table.replace(&update).await?;

    if let Some(exceeded) = truncated {
        warn!("{exceeded}; only the first {} rules are active", exceeded.cap);
    }

    let redirect = RedirectTarget::for_sprint(is_sprint_active);
    info!(
        "Installed {} blocking rules (redirect to {})",
        update.add_rules.len(),
        redirect.page()
    );

    Ok(SyncReport {
        installed: update.add_rules.len(),
        redirect,
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fg_core::rule_table::PLATFORM_RULE_CAP;
    use fg_core::testing::{MemoryRuleTable, MemoryStorage};
    use fg_core::StorageArea;
    use serde_json::json;

    const CAP: usize = PLATFORM_RULE_CAP;

    #[test]
    fn test_disabled_clears_everything() {
        let patterns = ["*://a.com/*", "*://b.com/*"];
        for sprint in [false, true] {
            let result = reconcile(&patterns, false, sprint, CAP);
            assert_eq!(result.update.remove_ids, (1..=50).collect::<Vec<u32>>());
            assert!(result.update.add_rules.is_empty());
            assert!(result.truncated.is_none());
        }
    }

    #[test]
    fn test_empty_list_clears_everything() {
        let patterns: Vec<String> = Vec::new();
        let result = reconcile(&patterns, true, false, CAP);
        assert_eq!(result.update, RuleUpdate::clear_all(CAP));
    }

    #[test]
    fn test_redirect_follows_sprint() {
        let idle = reconcile(&["*://a.com/*"], true, false, CAP);
        assert!(idle
            .update
            .add_rules
            .iter()
            .all(|r| r.redirect == RedirectTarget::BlockedPage));

        let sprint = reconcile(&["*://a.com/*"], true, true, CAP);
        assert_eq!(sprint.update.add_rules.len(), 2);
        assert!(sprint
            .update
            .add_rules
            .iter()
            .all(|r| r.redirect == RedirectTarget::SprintBlockedPage));
        assert_eq!(sprint.update.remove_ids.len(), CAP);
    }

    #[test]
    fn test_overflow_truncates_in_order() {
        let patterns: Vec<String> = (0..30).map(|i| format!("*://site{i}.com/*")).collect();
        let result = reconcile(&patterns, true, false, CAP);

        assert_eq!(
            result.truncated,
            Some(CapacityExceeded { requested: 60, cap: 50 })
        );
        assert_eq!(result.update.add_rules.len(), 50);
        assert_eq!(result.update.add_rules[0].url_filter, "*://site0.com/*");
        assert_eq!(result.update.add_rules[49].url_filter, "*://www.site24.com/*");
        assert_eq!(result.update.add_rules[49].id, 50);
    }

    #[test]
    fn test_lowered_capacity() {
        let result = reconcile(&["*://a.com/*", "*://b.com/*"], true, false, 3);
        assert_eq!(result.update.remove_ids, vec![1, 2, 3]);
        assert_eq!(result.update.add_rules.len(), 3);
        assert_eq!(result.truncated.map(|e| e.requested), Some(4));
    }

    #[tokio::test]
    async fn test_sync_rules_installs_table() {
        let storage = MemoryStorage::new();
        storage.seed(
            StorageArea::Sync,
            json!({ "blockedSites": ["*://a.com/*", "b.com"], "isEnabled": true }),
        );
        let settings = SettingsStore::new(&storage);
        let table = MemoryRuleTable::new();

        let report = sync_rules(&settings, false, CAP, &table).await.expect("sync");
        assert_eq!(report.installed, 3);
        assert_eq!(report.redirect, RedirectTarget::BlockedPage);

        // A second pass replaces rather than accumulates
        sync_rules(&settings, true, CAP, &table).await.expect("sync");
        let rules = table.rules();
        assert_eq!(rules.len(), 3);
        assert!(rules.iter().all(|r| r.redirect == RedirectTarget::SprintBlockedPage));
        assert_eq!(table.updates().len(), 2);
    }

    #[tokio::test]
    async fn test_sync_rules_read_failure_leaves_table() {
        let storage = MemoryStorage::new();
        storage.seed(StorageArea::Sync, json!({ "blockedSites": ["*://a.com/*"] }));
        let settings = SettingsStore::new(&storage);
        let table = MemoryRuleTable::new();
        sync_rules(&settings, false, CAP, &table).await.expect("sync");

        storage.fail_reads(true);
        let err = sync_rules(&settings, false, CAP, &table).await.unwrap_err();
        assert_eq!(err.code(), "storage");
        assert_eq!(table.rules().len(), 2);
        assert_eq!(table.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_rules_propagates_table_error() {
        let storage = MemoryStorage::new();
        storage.seed(StorageArea::Sync, json!({ "blockedSites": ["*://a.com/*"] }));
        let table = MemoryRuleTable::new();
        table.fail(true);

        let err = sync_rules(&SettingsStore::new(&storage), false, CAP, &table)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ruleTable");
    }
}
