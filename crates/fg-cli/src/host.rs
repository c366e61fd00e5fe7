//! File-backed browser host
//!
//! Emulates the extension APIs the owner talks to with a single JSON state
//! file, so the background logic can be driven from a shell across separate
//! invocations. Everything is kept in memory while a command runs and
//! written back by [`FileHost::save`].

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fg_core::notify::SurfaceError;
use fg_core::rule_table::RuleTableError;
use fg_core::storage::{diff_remove, diff_set, StorageError, StorageMap};
use fg_core::timer::TimerError;
use fg_core::types::MS_PER_MINUTE;
use fg_core::{
    Badge, BadgeSink, Clock, Event, Notifier, RuleTable, RuleUpdate, Schedule, Scheduler, Storage,
    StorageArea, StorageChanges, SystemClock, Timestamp,
};
use fg_rules::{encode, DnrRule};

/// A pending alarm, as `chrome.alarms.get` reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub scheduled_time: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_in_minutes: Option<f64>,
}

/// Contents of the state file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostState {
    pub local: StorageMap,
    pub sync: StorageMap,
    pub alarms: BTreeMap<String, Alarm>,
    pub dynamic_rules: Vec<DnrRule>,
    pub badge: Option<Value>,
    pub last_event: Option<Value>,
}

impl HostState {
    fn area_mut(&mut self, area: StorageArea) -> &mut StorageMap {
        match area {
            StorageArea::Local => &mut self.local,
            StorageArea::Sync => &mut self.sync,
        }
    }
}

/// System time, or a pinned instant for scripted runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostClock {
    pinned: Option<Timestamp>,
}

impl HostClock {
    pub fn new(pinned: Option<Timestamp>) -> Self {
        Self { pinned }
    }
}

impl Clock for HostClock {
    fn now_ms(&self) -> Timestamp {
        self.pinned.unwrap_or_else(|| SystemClock.now_ms())
    }
}

pub struct FileHost {
    path: PathBuf,
    fresh: bool,
    clock: HostClock,
    state: Mutex<HostState>,
    changes: Mutex<Vec<(StorageArea, StorageChanges)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FileHost {
    /// Load the state file; a missing file starts a fresh profile.
    pub async fn load(path: &Path, clock: HostClock) -> Result<Self, String> {
        let (state, fresh) = match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let state: HostState = serde_json::from_str(&text)
                    .map_err(|e| format!("Failed to parse '{}': {}", path.display(), e))?;
                (state, false)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state file at '{}', starting fresh", path.display());
                (HostState::default(), true)
            }
            Err(e) => return Err(format!("Failed to read '{}': {}", path.display(), e)),
        };

        Ok(Self {
            path: path.to_path_buf(),
            fresh,
            clock,
            state: Mutex::new(state),
            changes: Mutex::new(Vec::new()),
        })
    }

    pub async fn save(&self) -> Result<(), String> {
        let text = {
            let state = lock(&self.state);
            serde_json::to_string_pretty(&*state)
                .map_err(|e| format!("Failed to encode state: {}", e))?
        };
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| format!("Failed to write '{}': {}", self.path.display(), e))
    }

    /// Whether the state file did not exist yet (first install).
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn clock(&self) -> HostClock {
        self.clock
    }

    /// Drain change notifications produced since the last call.
    pub fn take_changes(&self) -> Vec<(StorageArea, StorageChanges)> {
        std::mem::take(&mut *lock(&self.changes))
    }

    pub fn alarms(&self) -> BTreeMap<String, Alarm> {
        lock(&self.state).alarms.clone()
    }

    pub fn dynamic_rules(&self) -> Vec<DnrRule> {
        lock(&self.state).dynamic_rules.clone()
    }

    pub fn badge(&self) -> Option<Value> {
        lock(&self.state).badge.clone()
    }

    /// Names of alarms due at `now`, earliest first.
    ///
    /// One-shot alarms are removed; repeating ones move to their next slot
    /// after `now`, so a long gap fires them once.
    pub fn take_due(&self, now: Timestamp) -> Vec<String> {
        let mut state = lock(&self.state);
        let mut due: Vec<(Timestamp, String)> = state
            .alarms
            .iter()
            .filter(|(_, alarm)| alarm.scheduled_time <= now)
            .map(|(name, alarm)| (alarm.scheduled_time, name.clone()))
            .collect();
        due.sort();

        for (_, name) in &due {
            let repeat = state
                .alarms
                .get(name)
                .and_then(|alarm| alarm.period_in_minutes);
            match repeat {
                Some(period) => {
                    let step = minutes_to_ms(period).max(1);
                    if let Some(alarm) = state.alarms.get_mut(name) {
                        while alarm.scheduled_time <= now {
                            alarm.scheduled_time += step;
                        }
                    }
                }
                None => {
                    state.alarms.remove(name);
                }
            }
        }

        due.into_iter().map(|(_, name)| name).collect()
    }
}

fn minutes_to_ms(minutes: f64) -> i64 {
    (minutes * MS_PER_MINUTE as f64).round() as i64
}

// =============================================================================
// Collaborators
// =============================================================================

impl Storage for FileHost {
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<StorageMap, StorageError> {
        let mut state = lock(&self.state);
        let map = state.area_mut(area);
        Ok(keys
            .iter()
            .filter_map(|key| map.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, area: StorageArea, items: StorageMap) -> Result<(), StorageError> {
        let changes = {
            let mut state = lock(&self.state);
            let map = state.area_mut(area);
            let changes = diff_set(map, &items);
            map.extend(items);
            changes
        };
        if !changes.is_empty() {
            lock(&self.changes).push((area, changes));
        }
        Ok(())
    }

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError> {
        let changes = {
            let mut state = lock(&self.state);
            let map = state.area_mut(area);
            let changes = diff_remove(map, keys);
            for key in keys {
                map.remove(*key);
            }
            changes
        };
        if !changes.is_empty() {
            lock(&self.changes).push((area, changes));
        }
        Ok(())
    }
}

impl Scheduler for FileHost {
    async fn schedule(&self, name: &str, schedule: Schedule) -> Result<(), TimerError> {
        let step = minutes_to_ms(schedule.minutes());
        if step < 0 {
            return Err(TimerError::new(format!("negative delay for alarm '{name}'")));
        }
        let alarm = Alarm {
            scheduled_time: self.clock.now_ms() + step,
            period_in_minutes: schedule.is_repeating().then(|| schedule.minutes()),
        };
        lock(&self.state).alarms.insert(name.to_string(), alarm);
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<bool, TimerError> {
        Ok(lock(&self.state).alarms.remove(name).is_some())
    }
}

impl RuleTable for FileHost {
    async fn replace(&self, update: &RuleUpdate) -> Result<(), RuleTableError> {
        let mut state = lock(&self.state);
        state
            .dynamic_rules
            .retain(|rule| !update.remove_ids.contains(&rule.id));
        for rule in &update.add_rules {
            if state.dynamic_rules.iter().any(|r| r.id == rule.id) {
                return Err(RuleTableError::new(format!("Rule with id {} already exists", rule.id)));
            }
            state.dynamic_rules.push(encode(rule, None));
        }
        Ok(())
    }
}

impl BadgeSink for FileHost {
    async fn show(&self, badge: &Badge) -> Result<(), SurfaceError> {
        let value = serde_json::to_value(badge).map_err(|e| SurfaceError::new(e.to_string()))?;
        lock(&self.state).badge = Some(value);
        Ok(())
    }
}

impl Notifier for FileHost {
    async fn notify(&self, event: &Event) -> Result<(), SurfaceError> {
        let value = serde_json::to_value(event).map_err(|e| SurfaceError::new(e.to_string()))?;
        info!("Event: {value}");
        lock(&self.state).last_event = Some(value);
        Ok(())
    }
}
