//! Focus sprint lifecycle
//!
//! A sprint moves `Idle -> Active -> {Completed, Cancelled}`. Terminal
//! records are kept for display; starting again moves back to `Active`.
//!
//! The persisted record is the source of truth across restarts. Alarms are
//! treated as lost whenever the owner process restarts, so [`SprintManager::initialize`]
//! rebuilds them from the stored end time.
//!
//! The in-memory copy sits behind a `Mutex` that is only held for short,
//! synchronous sections and never across an `.await`.

use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};
use serde::Serialize;

use crate::badge::{present, Badge, BadgeSink};
use crate::clock::Clock;
use crate::config::FocusConfig;
use crate::error::FocusError;
use crate::settings::SettingsStore;
use crate::storage::Storage;
use crate::timer::{Schedule, Scheduler, TimerError, SPRINT_TICK, SPRINT_TIMER};
use crate::types::{SprintState, MS_PER_MINUTE};

// =============================================================================
// Outcomes
// =============================================================================

/// What [`SprintManager::initialize`] found in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// No sprint, or only a terminal record
    Idle,
    /// An active sprint was resumed and its alarms re-armed
    Resumed { remaining_minutes: u32 },
    /// The sprint ended while the process was unloaded and was completed now
    CompletedWhileAway,
}

/// Result of a tick or alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do
    Idle,
    /// Sprint still running with this many whole minutes left
    Remaining(u32),
    /// The sprint was completed by this call
    Completed,
}

/// Read-only projection for UI surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintView {
    pub is_active: bool,
    pub sprint_data: Option<SprintState>,
    pub remaining_ms: i64,
}

// =============================================================================
// Sprint Manager
// =============================================================================

pub struct SprintManager<S, T, B, C> {
    settings: SettingsStore<S>,
    scheduler: T,
    badge: B,
    clock: C,
    max_minutes: u32,
    tick_period_minutes: u32,
    state: Mutex<Option<SprintState>>,
}

impl<S, T, B, C> SprintManager<S, T, B, C>
where
    S: Storage,
    T: Scheduler,
    B: BadgeSink,
    C: Clock,
{
    pub fn new(settings: SettingsStore<S>, scheduler: T, badge: B, clock: C, config: &FocusConfig) -> Self {
        Self {
            settings,
            scheduler,
            badge,
            clock,
            max_minutes: config.max_sprint_minutes,
            tick_period_minutes: config.tick_period_minutes,
            state: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SettingsStore<S> {
        &self.settings
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Whether a sprint is running right now.
    pub fn is_active(&self) -> bool {
        self.lock_state().as_ref().is_some_and(|s| s.is_active)
    }

    /// Lock the in-memory state, recovering from poisoning if necessary
    fn lock_state(&self) -> MutexGuard<'_, Option<SprintState>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Sprint state mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    // -------------------------------------------------------------------------
    // Startup
    // -------------------------------------------------------------------------

    /// Restore the sprint after a process start.
    pub async fn initialize(&self) -> Result<InitOutcome, FocusError> {
        let stored = self.settings.load_sprint().await?;
        let now = self.clock.now_ms();

        let sprint = match stored {
            Some(sprint) if sprint.is_active => sprint,
            terminal => {
                *self.lock_state() = terminal;
                self.cancel_timers().await;
                self.show_badge(&Badge::cleared()).await;
                debug!("No active sprint to restore");
                return Ok(InitOutcome::Idle);
            }
        };

        let remaining_ms = sprint.remaining_ms(now);
        *self.lock_state() = Some(sprint.clone());

        if remaining_ms == 0 {
            info!("Sprint ended while unloaded, completing now");
            self.complete_sprint().await?;
            return Ok(InitOutcome::CompletedWhileAway);
        }

        self.arm_timers(remaining_ms as f64 / MS_PER_MINUTE as f64).await;
        let badge = present(Some(&sprint), now);
        self.show_badge(&badge).await;

        let remaining_minutes = sprint.remaining_minutes(now);
        info!("Resumed sprint with {remaining_minutes} minutes remaining");
        Ok(InitOutcome::Resumed { remaining_minutes })
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Start a sprint of `duration_minutes`.
    pub async fn start_sprint(
        &self,
        duration_minutes: i64,
        goal: Option<String>,
        success_criteria: Option<String>,
    ) -> Result<SprintState, FocusError> {
        let now = self.clock.now_ms();

        let (sprint, previous) = {
            let mut state = self.lock_state();
            if state.as_ref().is_some_and(|s| s.is_active) {
                return Err(FocusError::AlreadyActive);
            }
            let minutes = self.validate_duration(duration_minutes)?;
            let sprint = SprintState::begin(now, minutes, goal, success_criteria);
            let previous = state.replace(sprint.clone());
            (sprint, previous)
        };

        if let Err(e) = self.settings.save_sprint(&sprint).await {
            *self.lock_state() = previous;
            return Err(e);
        }

        self.arm_timers(f64::from(sprint.duration_minutes)).await;

        match self.settings.ensure_enabled().await {
            Ok(true) => info!("Blocking re-enabled for sprint"),
            Ok(false) => {}
            Err(e) => warn!("Failed to enable blocking for sprint: {e}"),
        }

        self.show_badge(&present(Some(&sprint), now)).await;
        info!("Started {} minute sprint", sprint.duration_minutes);
        Ok(sprint)
    }

    /// Cancel the running sprint. Returns `false` if none was running.
    pub async fn cancel_sprint(&self) -> Result<bool, FocusError> {
        let (cancelled, previous) = {
            let mut state = self.lock_state();
            match state.as_mut() {
                Some(sprint) if sprint.is_active => {
                    let previous = sprint.clone();
                    sprint.mark_cancelled();
                    (sprint.clone(), previous)
                }
                _ => return Ok(false),
            }
        };

        self.cancel_timers().await;
        if let Err(e) = self.settings.save_sprint(&cancelled).await {
            self.restore(previous).await;
            return Err(e);
        }

        self.show_badge(&Badge::cleared()).await;
        info!("Sprint cancelled");
        Ok(true)
    }

    /// Complete the running sprint. Returns `false` if none was running.
    pub async fn complete_sprint(&self) -> Result<bool, FocusError> {
        let now = self.clock.now_ms();
        let (completed, previous) = {
            let mut state = self.lock_state();
            match state.as_mut() {
                Some(sprint) if sprint.is_active => {
                    let previous = sprint.clone();
                    sprint.mark_completed(now);
                    (sprint.clone(), previous)
                }
                _ => return Ok(false),
            }
        };

        self.cancel_timers().await;
        if let Err(e) = self.settings.save_sprint(&completed).await {
            self.restore(previous).await;
            return Err(e);
        }

        self.show_badge(&Badge::cleared()).await;
        match self.settings.add_focus_time(completed.duration_minutes).await {
            Ok(total) => info!(
                "Sprint completed after {} minutes ({total} minutes focused in total)",
                completed.duration_minutes
            ),
            Err(e) => warn!(
                "Sprint completed after {} minutes, focus time not recorded: {e}",
                completed.duration_minutes
            ),
        }
        Ok(true)
    }

    /// Refresh the countdown; completes the sprint once no time is left.
    pub async fn update_sprint_timer(&self) -> Result<TickOutcome, FocusError> {
        let now = self.clock.now_ms();
        let snapshot = self.lock_state().clone();

        let Some(sprint) = snapshot.filter(|s| s.is_active) else {
            // Stray tick from a sprint that already ended
            if let Err(e) = self.scheduler.cancel(SPRINT_TICK).await {
                warn!("Failed to cancel stray tick alarm: {e}");
            }
            return Ok(TickOutcome::Idle);
        };

        let remaining = sprint.remaining_minutes(now);
        if remaining == 0 {
            return Ok(if self.complete_sprint().await? {
                TickOutcome::Completed
            } else {
                TickOutcome::Idle
            });
        }

        debug!("Sprint tick: {remaining} minutes remaining");
        self.show_badge(&Badge::counting(remaining)).await;
        Ok(TickOutcome::Remaining(remaining))
    }

    /// Route a fired alarm by name. Unknown names are ignored.
    pub async fn handle_timer(&self, name: &str) -> Result<TickOutcome, FocusError> {
        match name {
            SPRINT_TIMER => Ok(if self.complete_sprint().await? {
                TickOutcome::Completed
            } else {
                TickOutcome::Idle
            }),
            SPRINT_TICK => self.update_sprint_timer().await,
            other => {
                debug!("Ignoring alarm '{other}'");
                Ok(TickOutcome::Idle)
            }
        }
    }

    /// Current state for display. No side effects.
    pub fn get_sprint_state(&self) -> SprintView {
        let sprint = self.lock_state().clone();
        let now = self.clock.now_ms();
        SprintView {
            is_active: sprint.as_ref().is_some_and(|s| s.is_active),
            remaining_ms: sprint
                .as_ref()
                .filter(|s| s.is_active)
                .map_or(0, |s| s.remaining_ms(now)),
            sprint_data: sprint,
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn validate_duration(&self, minutes: i64) -> Result<u32, FocusError> {
        match u32::try_from(minutes) {
            Ok(m) if (1..=self.max_minutes).contains(&m) => Ok(m),
            _ => Err(FocusError::InvalidDuration {
                minutes,
                max: self.max_minutes,
            }),
        }
    }

    /// Put back the active record after a failed terminal write.
    async fn restore(&self, previous: SprintState) {
        let remaining_ms = previous.remaining_ms(self.clock.now_ms());
        *self.lock_state() = Some(previous);
        self.arm_timers(remaining_ms as f64 / MS_PER_MINUTE as f64).await;
    }

    async fn arm_timers(&self, completion_minutes: f64) {
        let timers = [
            (SPRINT_TIMER, Schedule::Delay(completion_minutes)),
            (SPRINT_TICK, Schedule::Period(f64::from(self.tick_period_minutes))),
        ];
        for (name, schedule) in timers {
            if let Err(e) = self.rearm(name, schedule).await {
                warn!("Failed to schedule '{name}' alarm: {e}");
            }
        }
    }

    async fn rearm(&self, name: &str, schedule: Schedule) -> Result<(), TimerError> {
        self.scheduler.cancel(name).await?;
        self.scheduler.schedule(name, schedule).await
    }

    async fn cancel_timers(&self) {
        for name in [SPRINT_TIMER, SPRINT_TICK] {
            if let Err(e) = self.scheduler.cancel(name).await {
                warn!("Failed to cancel '{name}' alarm: {e}");
            }
        }
    }

    async fn show_badge(&self, badge: &Badge) {
        if let Err(e) = self.badge.show(badge).await {
            warn!("Failed to update badge: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::BadgeIcon;
    use crate::settings::keys;
    use crate::storage::StorageArea;
    use crate::testing::{ManualClock, MemoryScheduler, MemoryStorage, RecordingBadge};
    use crate::types::SprintPhase;

    const T0: i64 = 1_700_000_000_000;

    struct Harness {
        storage: MemoryStorage,
        scheduler: MemoryScheduler,
        badge: RecordingBadge,
        clock: ManualClock,
    }

    type Manager<'a> =
        SprintManager<&'a MemoryStorage, &'a MemoryScheduler, &'a RecordingBadge, &'a ManualClock>;

    impl Harness {
        fn new() -> Self {
            Self {
                storage: MemoryStorage::new(),
                scheduler: MemoryScheduler::new(),
                badge: RecordingBadge::new(),
                clock: ManualClock::new(T0),
            }
        }

        fn manager(&self) -> Manager<'_> {
            SprintManager::new(
                SettingsStore::new(&self.storage),
                &self.scheduler,
                &self.badge,
                &self.clock,
                &FocusConfig::default(),
            )
        }

        fn persisted(&self) -> Option<SprintState> {
            self.storage
                .value(StorageArea::Local, keys::SPRINT_DATA)
                .and_then(|v| serde_json::from_value(v).ok())
        }
    }

    #[tokio::test]
    async fn test_start_sprint_persists_and_arms_timers() {
        let h = Harness::new();
        let manager = h.manager();

        let sprint = manager
            .start_sprint(25, Some("goal".into()), Some("criteria".into()))
            .await
            .expect("start");

        assert_eq!(sprint.end_time, T0 + 25 * 60_000);
        assert_eq!(h.persisted(), Some(sprint.clone()));
        assert!(h.storage.value(StorageArea::Sync, keys::SPRINT_STATE).is_some());
        assert_eq!(h.scheduler.pending(SPRINT_TIMER), Some(Schedule::Delay(25.0)));
        assert_eq!(h.scheduler.pending(SPRINT_TICK), Some(Schedule::Period(1.0)));

        let badge = h.badge.last().expect("badge");
        assert_eq!(badge.icon, BadgeIcon::Active);
        assert_eq!(badge.text, "25m");
    }

    #[tokio::test]
    async fn test_tick_reports_ceil_minutes() {
        let h = Harness::new();
        let manager = h.manager();
        manager
            .start_sprint(25, Some("goal".into()), Some("criteria".into()))
            .await
            .expect("start");

        h.clock.set(T0 + 20 * 60_000);
        let outcome = manager.update_sprint_timer().await.expect("tick");
        assert_eq!(outcome, TickOutcome::Remaining(5));
        assert_eq!(h.badge.last().expect("badge").text, "5m");

        h.clock.set(T0 + 20 * 60_000 + 1);
        assert_eq!(manager.update_sprint_timer().await.expect("tick"), TickOutcome::Remaining(5));
    }

    #[tokio::test]
    async fn test_tick_at_end_completes() {
        let h = Harness::new();
        let manager = h.manager();
        manager.start_sprint(10, None, None).await.expect("start");

        h.clock.advance_minutes(10);
        assert_eq!(manager.update_sprint_timer().await.expect("tick"), TickOutcome::Completed);
        assert!(!manager.is_active());
        assert_eq!(h.persisted().expect("record").phase(), SprintPhase::Completed);
    }

    #[tokio::test]
    async fn test_start_then_cancel() {
        let h = Harness::new();
        let manager = h.manager();
        manager.start_sprint(25, None, None).await.expect("start");

        assert!(manager.cancel_sprint().await.expect("cancel"));

        let record = h.persisted().expect("record");
        assert!(!record.is_active);
        assert!(record.cancelled);
        assert!(!record.completed);
        assert!(h.scheduler.pending_names().is_empty());
        assert!(h.badge.last().expect("badge").is_cleared());

        // A late completion alarm has no effect
        h.clock.advance_minutes(30);
        assert_eq!(manager.handle_timer(SPRINT_TIMER).await.expect("timer"), TickOutcome::Idle);
        let settings = manager.settings().load().await;
        assert_eq!(settings.focus_time, 0);
        assert!(h.persisted().expect("record").cancelled);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let h = Harness::new();
        let manager = h.manager();
        assert!(!manager.cancel_sprint().await.expect("cancel"));
        assert!(!manager.complete_sprint().await.expect("complete"));
        assert!(h.persisted().is_none());
    }

    #[tokio::test]
    async fn test_start_while_active_is_rejected() {
        let h = Harness::new();
        let manager = h.manager();
        let first = manager.start_sprint(25, Some("first".into()), None).await.expect("start");

        h.clock.advance_minutes(1);
        let err = manager.start_sprint(50, Some("second".into()), None).await.unwrap_err();
        assert!(matches!(err, FocusError::AlreadyActive));
        assert_eq!(h.persisted(), Some(first));
        assert_eq!(h.scheduler.scheduled_count(SPRINT_TIMER), 1);
    }

    #[tokio::test]
    async fn test_invalid_durations() {
        let h = Harness::new();
        let manager = h.manager();
        for minutes in [0, -5, 181, i64::MAX] {
            let err = manager.start_sprint(minutes, None, None).await.unwrap_err();
            assert_eq!(err.code(), "invalidDuration");
        }
        assert!(h.persisted().is_none());
        assert!(!manager.is_active());
        manager.start_sprint(180, None, None).await.expect("max is allowed");
    }

    #[tokio::test]
    async fn test_start_forces_blocking_on() {
        let h = Harness::new();
        let manager = h.manager();
        manager.settings().set_enabled(false).await.expect("disable");
        manager.start_sprint(5, None, None).await.expect("start");
        assert!(manager.settings().is_enabled().await.expect("read"));
    }

    #[tokio::test]
    async fn test_start_rolls_back_on_write_failure() {
        let h = Harness::new();
        let manager = h.manager();
        h.storage.fail_writes(true);

        let err = manager.start_sprint(25, None, None).await.unwrap_err();
        assert_eq!(err.code(), "storage");
        assert!(!manager.is_active());
        assert!(h.scheduler.pending_names().is_empty());

        h.storage.fail_writes(false);
        manager.start_sprint(25, None, None).await.expect("retry");
    }

    #[tokio::test]
    async fn test_cancel_write_failure_keeps_sprint_running() {
        let h = Harness::new();
        let manager = h.manager();
        manager.start_sprint(25, None, None).await.expect("start");

        h.storage.fail_writes(true);
        assert!(manager.cancel_sprint().await.is_err());
        assert!(manager.is_active());
        assert!(h.scheduler.pending(SPRINT_TIMER).is_some());
        assert!(h.persisted().expect("record").is_active);
    }

    #[tokio::test]
    async fn test_sync_mirror_failure_does_not_split_state() {
        let h = Harness::new();
        let manager = h.manager();
        h.storage.fail_writes_in(StorageArea::Sync);

        manager.start_sprint(25, None, None).await.expect("start");
        assert!(manager.is_active());
        assert!(h.persisted().expect("record").is_active);
        assert!(h.storage.value(StorageArea::Sync, keys::SPRINT_STATE).is_none());

        // A restart agrees with what the caller was told
        let restarted = h.manager();
        assert_eq!(
            restarted.initialize().await.expect("init"),
            InitOutcome::Resumed { remaining_minutes: 25 }
        );

        assert!(restarted.cancel_sprint().await.expect("cancel"));
        assert!(!restarted.is_active());
        assert!(h.persisted().expect("record").cancelled);
        assert!(h.scheduler.pending_names().is_empty());
    }

    #[tokio::test]
    async fn test_focus_time_failure_still_completes() {
        let h = Harness::new();
        let manager = h.manager();
        manager.start_sprint(25, None, None).await.expect("start");
        h.storage.fail_writes_of(keys::FOCUS_TIME);

        h.clock.advance_minutes(25);
        assert_eq!(manager.handle_timer(SPRINT_TIMER).await.expect("timer"), TickOutcome::Completed);
        assert!(!manager.is_active());
        assert!(h.persisted().expect("record").completed);
        assert!(h.scheduler.pending_names().is_empty());
        assert_eq!(manager.settings().load().await.focus_time, 0);
    }

    #[tokio::test]
    async fn test_timer_failures_do_not_fail_start() {
        let h = Harness::new();
        let manager = h.manager();
        h.scheduler.fail(true);
        h.badge.fail(true);

        manager.start_sprint(25, None, None).await.expect("start");
        assert!(manager.is_active());
        assert!(h.persisted().expect("record").is_active);
    }

    #[tokio::test]
    async fn test_complete_accumulates_focus_time() {
        let h = Harness::new();
        let manager = h.manager();
        manager.start_sprint(25, None, None).await.expect("start");

        h.clock.advance_minutes(25);
        assert_eq!(manager.handle_timer(SPRINT_TIMER).await.expect("timer"), TickOutcome::Completed);
        assert!(!manager.complete_sprint().await.expect("again"));

        let record = h.persisted().expect("record");
        assert!(record.completed);
        assert_eq!(record.completed_time, Some(T0 + 25 * 60_000));
        assert_eq!(manager.settings().load().await.focus_time, 25);
        assert!(h.scheduler.pending_names().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_completes_expired_sprint() {
        let h = Harness::new();
        {
            let manager = h.manager();
            manager.start_sprint(30, None, None).await.expect("start");
        }

        // Process restarts after the end time; alarms were lost
        let h2 = Harness {
            storage: h.storage,
            scheduler: MemoryScheduler::new(),
            badge: RecordingBadge::new(),
            clock: ManualClock::new(T0 + 45 * 60_000),
        };
        let manager = h2.manager();
        assert_eq!(manager.initialize().await.expect("init"), InitOutcome::CompletedWhileAway);

        let record = h2.persisted().expect("record");
        assert_eq!(record.phase(), SprintPhase::Completed);
        assert_eq!(manager.settings().load().await.focus_time, 30);
        assert!(!manager.is_active());
    }

    #[tokio::test]
    async fn test_initialize_resumes_active_sprint() {
        let h = Harness::new();
        h.manager().start_sprint(30, None, None).await.expect("start");

        let restarted = Harness {
            storage: h.storage,
            scheduler: MemoryScheduler::new(),
            badge: RecordingBadge::new(),
            clock: ManualClock::new(T0 + 10 * 60_000 + 30_000),
        };
        let manager = restarted.manager();
        assert_eq!(
            manager.initialize().await.expect("init"),
            InitOutcome::Resumed { remaining_minutes: 20 }
        );
        assert!(manager.is_active());
        assert_eq!(restarted.scheduler.pending(SPRINT_TIMER), Some(Schedule::Delay(19.5)));
        assert_eq!(restarted.scheduler.pending(SPRINT_TICK), Some(Schedule::Period(1.0)));
        assert_eq!(restarted.badge.last().expect("badge").text, "20m");
    }

    #[tokio::test]
    async fn test_initialize_idle_clears_presentation() {
        let h = Harness::new();
        let manager = h.manager();
        assert_eq!(manager.initialize().await.expect("init"), InitOutcome::Idle);
        assert!(h.badge.last().expect("badge").is_cleared());

        manager.start_sprint(5, None, None).await.expect("start");
        manager.cancel_sprint().await.expect("cancel");

        let manager = h.manager();
        assert_eq!(manager.initialize().await.expect("init"), InitOutcome::Idle);
        let view = manager.get_sprint_state();
        assert!(!view.is_active);
        assert!(view.sprint_data.expect("terminal record kept").cancelled);
    }

    #[tokio::test]
    async fn test_get_sprint_state_view() {
        let h = Harness::new();
        let manager = h.manager();
        let idle = manager.get_sprint_state();
        assert!(!idle.is_active && idle.sprint_data.is_none() && idle.remaining_ms == 0);

        manager.start_sprint(2, None, None).await.expect("start");
        h.clock.advance_minutes(1);
        let view = manager.get_sprint_state();
        assert!(view.is_active);
        assert_eq!(view.remaining_ms, 60_000);

        let json = serde_json::to_value(&view).expect("serialize");
        assert_eq!(json["isActive"], true);
        assert_eq!(json["sprintData"]["durationMinutes"], 2);
        assert_eq!(json["remainingMs"], 60_000);
    }

    #[tokio::test]
    async fn test_unknown_alarm_ignored() {
        let h = Harness::new();
        let manager = h.manager();
        assert_eq!(manager.handle_timer("somethingElse").await.expect("timer"), TickOutcome::Idle);
    }
}
