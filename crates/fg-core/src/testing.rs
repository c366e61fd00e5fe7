//! In-memory collaborators for tests
//!
//! Each double records what it was asked to do and can be told to fail, so
//! tests can assert on side effects and on the failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::badge::{Badge, BadgeSink};
use crate::clock::Clock;
use crate::notify::{Event, Notifier, SurfaceError};
use crate::rule_table::{RuleTable, RuleTableError, RuleUpdate};
use crate::storage::{diff_remove, diff_set, Storage, StorageArea, StorageChanges, StorageError, StorageMap};
use crate::timer::{Schedule, Scheduler, TimerError};
use crate::types::{BlockRule, Timestamp};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Storage
// =============================================================================

/// Two-area key-value store that records change notifications.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    areas: Mutex<HashMap<StorageArea, StorageMap>>,
    changes: Mutex<Vec<(StorageArea, StorageChanges)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    failing_areas: Mutex<Vec<StorageArea>>,
    failing_keys: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a JSON object into an area without recording changes.
    pub fn seed(&self, area: StorageArea, value: Value) {
        if let Value::Object(items) = value {
            lock(&self.areas).entry(area).or_default().extend(items);
        }
    }

    pub fn value(&self, area: StorageArea, key: &str) -> Option<Value> {
        lock(&self.areas).get(&area).and_then(|map| map.get(key).cloned())
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail every write to `area` only.
    pub fn fail_writes_in(&self, area: StorageArea) {
        lock(&self.failing_areas).push(area);
    }

    /// Fail any write that touches `key`.
    pub fn fail_writes_of(&self, key: &str) {
        lock(&self.failing_keys).push(key.to_string());
    }

    /// Drain recorded change notifications.
    pub fn take_changes(&self) -> Vec<(StorageArea, StorageChanges)> {
        std::mem::take(&mut *lock(&self.changes))
    }

    fn check_write<'a>(
        &self,
        area: StorageArea,
        mut keys: impl Iterator<Item = &'a str>,
    ) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::new("write failed"));
        }
        if lock(&self.failing_areas).contains(&area) {
            return Err(StorageError::new("area write failed"));
        }
        let failing = lock(&self.failing_keys);
        if keys.any(|key| failing.iter().any(|k| k == key)) {
            return Err(StorageError::new("key write failed"));
        }
        Ok(())
    }

    fn record(&self, area: StorageArea, changes: StorageChanges) {
        if !changes.is_empty() {
            lock(&self.changes).push((area, changes));
        }
    }
}

impl Storage for MemoryStorage {
    async fn get(&self, area: StorageArea, keys: &[&str]) -> Result<StorageMap, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::new("read failed"));
        }
        let areas = lock(&self.areas);
        let mut out = StorageMap::new();
        if let Some(map) = areas.get(&area) {
            for key in keys {
                if let Some(value) = map.get(*key) {
                    out.insert((*key).to_string(), value.clone());
                }
            }
        }
        Ok(out)
    }

    async fn set(&self, area: StorageArea, items: StorageMap) -> Result<(), StorageError> {
        self.check_write(area, items.keys().map(String::as_str))?;
        let changes = {
            let mut areas = lock(&self.areas);
            let map = areas.entry(area).or_default();
            let changes = diff_set(map, &items);
            map.extend(items);
            changes
        };
        self.record(area, changes);
        Ok(())
    }

    async fn remove(&self, area: StorageArea, keys: &[&str]) -> Result<(), StorageError> {
        self.check_write(area, keys.iter().copied())?;
        let changes = {
            let mut areas = lock(&self.areas);
            let map = areas.entry(area).or_default();
            let changes = diff_remove(map, keys);
            for key in keys {
                map.remove(*key);
            }
            changes
        };
        self.record(area, changes);
        Ok(())
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Alarm registry that never fires on its own; tests fire alarms explicitly.
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    pending: Mutex<BTreeMap<String, Schedule>>,
    scheduled_count: Mutex<HashMap<String, usize>>,
    fail: AtomicBool,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self, name: &str) -> Option<Schedule> {
        lock(&self.pending).get(name).copied()
    }

    pub fn pending_names(&self) -> Vec<String> {
        lock(&self.pending).keys().cloned().collect()
    }

    /// How many times `name` was scheduled.
    pub fn scheduled_count(&self, name: &str) -> usize {
        lock(&self.scheduled_count).get(name).copied().unwrap_or(0)
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Scheduler for MemoryScheduler {
    async fn schedule(&self, name: &str, schedule: Schedule) -> Result<(), TimerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TimerError::new("alarm create failed"));
        }
        lock(&self.pending).insert(name.to_string(), schedule);
        *lock(&self.scheduled_count).entry(name.to_string()).or_default() += 1;
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<bool, TimerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TimerError::new("alarm clear failed"));
        }
        Ok(lock(&self.pending).remove(name).is_some())
    }
}

// =============================================================================
// Rule Table
// =============================================================================

/// Rule table that applies updates to an in-memory id map.
#[derive(Debug, Default)]
pub struct MemoryRuleTable {
    rules: Mutex<BTreeMap<u32, BlockRule>>,
    updates: Mutex<Vec<RuleUpdate>>,
    fail: AtomicBool,
}

impl MemoryRuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed rules ordered by id.
    pub fn rules(&self) -> Vec<BlockRule> {
        lock(&self.rules).values().cloned().collect()
    }

    pub fn updates(&self) -> Vec<RuleUpdate> {
        lock(&self.updates).clone()
    }

    pub fn last_update(&self) -> Option<RuleUpdate> {
        lock(&self.updates).last().cloned()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl RuleTable for MemoryRuleTable {
    async fn replace(&self, update: &RuleUpdate) -> Result<(), RuleTableError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RuleTableError::new("rule update rejected"));
        }
        {
            let mut rules = lock(&self.rules);
            for id in &update.remove_ids {
                rules.remove(id);
            }
            for rule in &update.add_rules {
                if rules.contains_key(&rule.id) {
                    return Err(RuleTableError::new(format!("duplicate rule id {}", rule.id)));
                }
                rules.insert(rule.id, rule.clone());
            }
        }
        lock(&self.updates).push(update.clone());
        Ok(())
    }
}

// =============================================================================
// Surfaces
// =============================================================================

/// Badge surface that keeps every badge it was shown.
#[derive(Debug, Default)]
pub struct RecordingBadge {
    shown: Mutex<Vec<Badge>>,
    fail: AtomicBool,
}

impl RecordingBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Badge> {
        lock(&self.shown).last().cloned()
    }

    pub fn history(&self) -> Vec<Badge> {
        lock(&self.shown).clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl BadgeSink for RecordingBadge {
    async fn show(&self, badge: &Badge) -> Result<(), SurfaceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SurfaceError::new("badge update failed"));
        }
        lock(&self.shown).push(badge.clone());
        Ok(())
    }
}

/// Notifier that keeps every event it was sent.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.events).clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &Event) -> Result<(), SurfaceError> {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.now.fetch_add(minutes * crate::types::MS_PER_MINUTE, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
