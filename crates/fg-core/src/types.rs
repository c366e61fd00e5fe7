//! Core type definitions for FocusGuard
//!
//! These types are shared by the rule pipeline, the sprint engine and the
//! bindings. Persisted types use the camelCase JSON layout the extension
//! pages read directly.

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, as reported by `Date.now()`.
pub type Timestamp = i64;

/// Milliseconds in one minute.
pub const MS_PER_MINUTE: i64 = 60_000;

// =============================================================================
// Redirect Targets
// =============================================================================

/// Extension page a blocked navigation is redirected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RedirectTarget {
    /// Regular blocked page with the bypass countdown
    #[default]
    BlockedPage,
    /// Sprint variant showing the goal and remaining time
    SprintBlockedPage,
}

impl RedirectTarget {
    /// Page path relative to the extension root.
    pub fn page(self) -> &'static str {
        match self {
            Self::BlockedPage => "blocked.html",
            Self::SprintBlockedPage => "sprint-blocked.html",
        }
    }

    /// Target for the current sprint status.
    pub fn for_sprint(is_sprint_active: bool) -> Self {
        if is_sprint_active {
            Self::SprintBlockedPage
        } else {
            Self::BlockedPage
        }
    }
}

// =============================================================================
// Resource Types (bit mask for rule conditions)
// =============================================================================

bitflags::bitflags! {
    /// Resource types a rule condition applies to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceType: u16 {
        const MAIN_FRAME = 1 << 0;
        const SUB_FRAME = 1 << 1;
    }
}

impl ResourceType {
    /// declarativeNetRequest names for the set bits, in a stable order.
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.contains(Self::MAIN_FRAME) {
            names.push("main_frame");
        }
        if self.contains(Self::SUB_FRAME) {
            names.push("sub_frame");
        }
        names
    }
}

// =============================================================================
// Block Rule
// =============================================================================

/// One entry of the dynamic rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRule {
    /// Rule id, unique within the table (1..=cap)
    pub id: u32,
    /// URL filter the platform matches navigations against
    pub url_filter: String,
    /// Page the navigation is redirected to
    pub redirect: RedirectTarget,
    /// Always top-level navigations only
    pub resource_types: ResourceType,
}

impl BlockRule {
    /// A main-frame rule redirecting to the blocked-page placeholder.
    pub fn new(id: u32, url_filter: impl Into<String>) -> Self {
        Self {
            id,
            url_filter: url_filter.into(),
            redirect: RedirectTarget::BlockedPage,
            resource_types: ResourceType::MAIN_FRAME,
        }
    }
}

// =============================================================================
// Sprint State
// =============================================================================

/// Persisted record of the current or most recent focus sprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintState {
    pub is_active: bool,
    pub start_time: Timestamp,
    #[serde(default)]
    pub end_time: Timestamp,
    #[serde(alias = "duration")]
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<Timestamp>,
}

/// Lifecycle phase derived from the stored flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprintPhase {
    Active,
    Completed,
    Cancelled,
}

impl SprintState {
    /// A freshly started sprint. Blank goal/criteria are stored as absent.
    pub fn begin(
        now: Timestamp,
        duration_minutes: u32,
        goal: Option<String>,
        success_criteria: Option<String>,
    ) -> Self {
        Self {
            is_active: true,
            start_time: now,
            end_time: now.saturating_add(i64::from(duration_minutes) * MS_PER_MINUTE),
            duration_minutes,
            goal: non_blank(goal),
            success_criteria: non_blank(success_criteria),
            completed: false,
            cancelled: false,
            completed_time: None,
        }
    }

    pub fn phase(&self) -> SprintPhase {
        if self.is_active {
            SprintPhase::Active
        } else if self.cancelled {
            SprintPhase::Cancelled
        } else {
            SprintPhase::Completed
        }
    }

    /// Milliseconds until the end time, floored at zero.
    pub fn remaining_ms(&self, now: Timestamp) -> i64 {
        self.end_time.saturating_sub(now).max(0)
    }

    /// Whole minutes until the end time, rounded up and floored at zero.
    pub fn remaining_minutes(&self, now: Timestamp) -> u32 {
        let ms = self.remaining_ms(now);
        let minutes = ms / MS_PER_MINUTE + i64::from(ms % MS_PER_MINUTE != 0);
        u32::try_from(minutes).unwrap_or(u32::MAX)
    }

    /// Records written by older builds carry no end time.
    pub(crate) fn repair_end_time(&mut self) {
        if self.end_time <= self.start_time {
            self.end_time = self
                .start_time
                .saturating_add(i64::from(self.duration_minutes) * MS_PER_MINUTE);
        }
    }

    pub(crate) fn mark_completed(&mut self, now: Timestamp) {
        self.is_active = false;
        self.completed = true;
        self.completed_time = Some(now);
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.is_active = false;
        self.cancelled = true;
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

// =============================================================================
// Settings
// =============================================================================

/// Process-wide persisted settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub blocked_sites: Vec<String>,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    #[serde(default)]
    pub bypass_attempts: u64,
    #[serde(default)]
    pub focus_time: u64,
}

fn default_enabled() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            blocked_sites: Vec::new(),
            is_enabled: true,
            bypass_attempts: 0,
            focus_time: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_derives_end_time() {
        let state = SprintState::begin(1_000, 25, Some("write".into()), Some("  ".into()));
        assert_eq!(state.end_time, 1_000 + 25 * MS_PER_MINUTE);
        assert_eq!(state.goal.as_deref(), Some("write"));
        assert_eq!(state.success_criteria, None);
        assert_eq!(state.phase(), SprintPhase::Active);
    }

    #[test]
    fn test_remaining_minutes_rounds_up() {
        let state = SprintState::begin(0, 25, None, None);
        assert_eq!(state.remaining_minutes(0), 25);
        assert_eq!(state.remaining_minutes(20 * MS_PER_MINUTE), 5);
        assert_eq!(state.remaining_minutes(20 * MS_PER_MINUTE + 1), 5);
        assert_eq!(state.remaining_minutes(24 * MS_PER_MINUTE + 59_999), 1);
        assert_eq!(state.remaining_minutes(30 * MS_PER_MINUTE), 0);
    }

    #[test]
    fn test_extreme_stored_times_saturate() {
        let mut state = SprintState::begin(i64::MAX - 1, 25, None, None);
        assert_eq!(state.end_time, i64::MAX);
        assert_eq!(state.remaining_ms(i64::MIN), i64::MAX);
        assert_eq!(state.remaining_minutes(i64::MIN), u32::MAX);
        assert_eq!(state.remaining_ms(i64::MAX), 0);

        state.end_time = i64::MIN;
        state.repair_end_time();
        assert_eq!(state.end_time, i64::MAX);
    }

    #[test]
    fn test_terminal_phases() {
        let mut cancelled = SprintState::begin(0, 10, None, None);
        cancelled.mark_cancelled();
        assert_eq!(cancelled.phase(), SprintPhase::Cancelled);

        let mut done = SprintState::begin(0, 10, None, None);
        done.mark_completed(42);
        assert_eq!(done.phase(), SprintPhase::Completed);
        assert_eq!(done.completed_time, Some(42));
    }

    #[test]
    fn test_sprint_state_json_layout() {
        let state = SprintState::begin(1_000, 1, Some("goal".into()), None);
        let json = serde_json::to_value(&state).expect("serialize");
        assert_eq!(json["isActive"], true);
        assert_eq!(json["startTime"], 1_000);
        assert_eq!(json["endTime"], 61_000);
        assert_eq!(json["durationMinutes"], 1);
        assert!(json.get("successCriteria").is_none());
    }

    #[test]
    fn test_legacy_record_without_end_time() {
        let json = serde_json::json!({
            "isActive": true,
            "startTime": 5_000,
            "duration": 2,
            "goal": "",
            "completed": false
        });
        let mut state: SprintState = serde_json::from_value(json).expect("deserialize");
        state.repair_end_time();
        assert_eq!(state.duration_minutes, 2);
        assert_eq!(state.end_time, 5_000 + 2 * MS_PER_MINUTE);
    }

    #[test]
    fn test_settings_defaults() {
        let settings: Settings = serde_json::from_str("{}").expect("deserialize");
        assert!(settings.is_enabled);
        assert!(settings.blocked_sites.is_empty());
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_resource_type_names() {
        assert_eq!(ResourceType::MAIN_FRAME.names(), vec!["main_frame"]);
        assert_eq!(
            (ResourceType::MAIN_FRAME | ResourceType::SUB_FRAME).names(),
            vec!["main_frame", "sub_frame"]
        );
    }
}
