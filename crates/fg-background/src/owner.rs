//! The owner process
//!
//! [`Background`] holds one handle per collaborator and is passed by
//! reference to whatever host glue receives browser events. It never panics
//! on bad input; every failure ends up in a log line or an error reply.

use log::{debug, info, warn};
use serde_json::Value;

use fg_core::settings::{SettingsStore, RULE_KEYS};
use fg_core::sprint::{InitOutcome, SprintManager, TickOutcome};
use fg_core::{
    BadgeSink, Clock, Event, FocusConfig, FocusError, Notifier, RuleTable, Scheduler, Storage,
    StorageArea, StorageChanges,
};
use fg_rules::SyncReport;

use crate::command::{Command, Reply, Warning, INVALID_COMMAND};

pub struct Background<S, T, R, B, N, C> {
    sprint: SprintManager<S, T, B, C>,
    rules: R,
    notifier: N,
    config: FocusConfig,
}

impl<S, T, R, B, N, C> Background<S, T, R, B, N, C>
where
    S: Storage,
    T: Scheduler,
    R: RuleTable,
    B: BadgeSink,
    N: Notifier,
    C: Clock,
{
    pub fn new(
        storage: S,
        scheduler: T,
        rules: R,
        badge: B,
        notifier: N,
        clock: C,
        config: FocusConfig,
    ) -> Self {
        let sprint = SprintManager::new(SettingsStore::new(storage), scheduler, badge, clock, &config);
        Self {
            sprint,
            rules,
            notifier,
            config,
        }
    }

    pub fn sprint(&self) -> &SprintManager<S, T, B, C> {
        &self.sprint
    }

    pub fn settings(&self) -> &SettingsStore<S> {
        self.sprint.settings()
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// First install or update: seed defaults, then run the startup path.
    pub async fn on_installed(&self) -> Result<InitOutcome, FocusError> {
        self.settings()
            .install_defaults(&self.config.default_blocked_sites)
            .await?;
        self.on_startup().await
    }

    /// Process start: restore the sprint and rebuild the rule table.
    ///
    /// Rules are synced even when the sprint record could not be restored.
    pub async fn on_startup(&self) -> Result<InitOutcome, FocusError> {
        let outcome = self.sprint.initialize().await;
        match &outcome {
            Ok(InitOutcome::CompletedWhileAway) => self.announce_completion().await,
            Ok(_) => {}
            Err(e) => warn!("Failed to restore sprint: {e}"),
        }
        self.sync_rules().await?;
        outcome
    }

    // =========================================================================
    // Rule sync
    // =========================================================================

    /// Rebuild the rule table. Truncation is pushed to open surfaces as
    /// [`Event::RulesTruncated`] and reported in the returned [`SyncReport`].
    pub async fn sync_rules(&self) -> Result<SyncReport, FocusError> {
        let report = fg_rules::sync_rules(
            self.settings(),
            self.sprint.is_active(),
            self.config.rule_capacity,
            &self.rules,
        )
        .await?;

        if let Some(exceeded) = report.truncated {
            let event = Event::RulesTruncated {
                requested: exceeded.requested,
                cap: exceeded.cap,
            };
            if let Err(e) = self.notifier.notify(&event).await {
                warn!("Failed to announce rule truncation: {e}");
            }
        }
        Ok(report)
    }

    /// Warning for a blocked list that no longer fits the rule table.
    async fn capacity_warning(&self) -> Option<Warning> {
        let current = self.settings().load().await;
        let exceeded = fg_rules::reconcile(&current.blocked_sites, true, false, self.config.rule_capacity)
            .truncated?;
        Some(Warning::from(&FocusError::from(exceeded)))
    }

    /// Sync after a sprint transition so the redirect target follows it.
    async fn resync(&self) {
        if let Err(e) = self.sync_rules().await {
            warn!("Failed to sync blocking rules: {e}");
        }
    }

    /// React to a storage change notification.
    ///
    /// Returns `Ok(None)` when no rule-relevant key changed.
    pub async fn handle_storage_change(
        &self,
        area: StorageArea,
        changes: &StorageChanges,
    ) -> Result<Option<SyncReport>, FocusError> {
        let relevant = area == StorageArea::Sync && RULE_KEYS.iter().any(|key| changes.contains_key(*key));
        if !relevant {
            return Ok(None);
        }
        debug!("Rule settings changed, syncing");
        self.sync_rules().await.map(Some)
    }

    // =========================================================================
    // Alarms
    // =========================================================================

    pub async fn handle_alarm(&self, name: &str) -> Result<TickOutcome, FocusError> {
        let outcome = self.sprint.handle_timer(name).await?;
        if outcome == TickOutcome::Completed {
            self.announce_completion().await;
            self.resync().await;
        }
        Ok(outcome)
    }

    async fn announce_completion(&self) {
        let Some(sprint_data) = self.sprint.get_sprint_state().sprint_data else {
            return;
        };
        if let Err(e) = self.notifier.notify(&Event::SprintCompleted { sprint_data }).await {
            warn!("Failed to announce sprint completion: {e}");
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Handle a raw message from a UI surface.
    pub async fn handle_message(&self, message: Value) -> Reply {
        match Command::from_value(message) {
            Ok(command) => self.handle_command(command).await,
            Err(e) => {
                warn!("Rejected malformed command: {e}");
                Reply::error(INVALID_COMMAND, e.to_string())
            }
        }
    }

    pub async fn handle_command(&self, command: Command) -> Reply {
        let action = command.action();
        match self.dispatch(command).await {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_validation() || matches!(e, FocusError::AlreadyActive) {
                    debug!("{action} rejected: {e}");
                } else {
                    warn!("{action} failed: {e}");
                }
                e.into()
            }
        }
    }

    async fn dispatch(&self, command: Command) -> Result<Reply, FocusError> {
        let reply = match command {
            Command::StartSprint {
                duration_minutes,
                goal,
                success_criteria,
            } => {
                let sprint_data = self
                    .sprint
                    .start_sprint(duration_minutes, goal, success_criteria)
                    .await?;
                self.resync().await;
                Reply::SprintStarted { sprint_data }
            }
            Command::CancelSprint => {
                let cancelled = self.sprint.cancel_sprint().await?;
                if cancelled {
                    self.resync().await;
                }
                Reply::SprintCancelled { cancelled }
            }
            Command::GetSprintState => Reply::SprintState(self.sprint.get_sprint_state()),
            Command::RecordBypass => Reply::BypassRecorded {
                bypass_attempts: self.settings().record_bypass().await?,
            },
            Command::GetSettings => Reply::Settings(self.settings().load().await),
            Command::AddSites { text } => {
                let outcome = self.settings().add_sites(&text).await?;
                Reply::sites_added(outcome, self.capacity_warning().await)
            }
            Command::RemoveSite { index } => Reply::SiteRemoved {
                removed: self.settings().remove_site(index).await?,
            },
            Command::ResetSites => {
                let defaults = &self.config.default_blocked_sites;
                self.settings().reset_sites(defaults).await?;
                Reply::SitesReset {
                    count: defaults.len(),
                }
            }
            Command::SetEnabled { enabled } => {
                self.settings().set_enabled(enabled).await?;
                info!("Blocking {}", if enabled { "enabled" } else { "paused" });
                Reply::Enabled { is_enabled: enabled }
            }
            Command::ToggleEnabled => {
                let enabled = self.settings().toggle_enabled().await?;
                info!("Blocking {}", if enabled { "enabled" } else { "paused" });
                Reply::Enabled { is_enabled: enabled }
            }
        };
        Ok(reply)
    }
}
