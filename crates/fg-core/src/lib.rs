//! FocusGuard Core Library
//!
//! This crate provides the data model and the stateful engine behind the
//! FocusGuard site blocker: pattern normalization, the persisted settings,
//! the focus sprint state machine and the badge presentation.
//!
//! # Architecture
//!
//! Everything that touches the browser goes through a small set of
//! collaborator traits (storage, alarms, rule table, badge, notifications,
//! clock). The engine is written against those traits only, so the same code
//! runs inside the extension (via `fg-wasm`), in the developer CLI and in
//! tests with the in-memory doubles from [`testing`].
//!
//! # Modules
//!
//! - `types`: Shared type definitions (rules, sprint state, settings)
//! - `pattern`: Free-form site input to `*://host/*` block patterns
//! - `settings`: Typed view over the persisted settings and site list
//! - `sprint`: Focus sprint lifecycle (start, tick, complete, cancel)
//! - `badge`: Sprint state to icon/badge mapping
//! - `storage`, `timer`, `rule_table`, `notify`, `clock`: collaborator seams
//! - `config`: Tunables with defaults
//! - `error`: Error taxonomy

pub mod badge;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod pattern;
pub mod rule_table;
pub mod settings;
pub mod sprint;
pub mod storage;
pub mod timer;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use badge::{present, Badge, BadgeIcon, BadgeSink};
pub use clock::{Clock, SystemClock};
pub use config::FocusConfig;
pub use error::{CapacityExceeded, FocusError};
pub use notify::{Event, Notifier};
pub use pattern::{normalize, split_site_input};
pub use rule_table::{RuleTable, RuleUpdate};
pub use settings::SettingsStore;
pub use sprint::{InitOutcome, SprintManager, SprintView, TickOutcome};
pub use storage::{Storage, StorageArea, StorageChange, StorageChanges};
pub use timer::{Schedule, Scheduler, SPRINT_TICK, SPRINT_TIMER};
pub use types::{BlockRule, RedirectTarget, ResourceType, Settings, SprintState, Timestamp};
