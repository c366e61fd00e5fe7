//! Named alarm seam
//!
//! Alarms are identified by name. Scheduling a name that is already pending
//! replaces it on the platform, but the sprint engine still cancels first so
//! a stale alarm can never fire twice.

use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One-shot alarm that completes the running sprint.
pub const SPRINT_TIMER: &str = "sprintTimer";

/// Recurring alarm that refreshes the remaining-time badge.
pub const SPRINT_TICK: &str = "sprintTick";

/// When an alarm fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Schedule {
    /// Once, after the given number of minutes
    #[serde(rename = "delayInMinutes")]
    Delay(f64),
    /// Repeatedly, every given number of minutes
    #[serde(rename = "periodInMinutes")]
    Period(f64),
}

impl Schedule {
    pub fn minutes(self) -> f64 {
        match self {
            Self::Delay(minutes) | Self::Period(minutes) => minutes,
        }
    }

    pub fn is_repeating(self) -> bool {
        matches!(self, Self::Period(_))
    }
}

/// Failure reported by the alarm collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TimerError {
    pub message: String,
}

impl TimerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Scheduled-callback facility.
#[allow(async_fn_in_trait)]
pub trait Scheduler {
    /// Register (or replace) the named alarm.
    async fn schedule(&self, name: &str, schedule: Schedule) -> Result<(), TimerError>;

    /// Cancel the named alarm. Returns whether one was pending.
    async fn cancel(&self, name: &str) -> Result<bool, TimerError>;
}

impl<T: Scheduler + ?Sized> Scheduler for &T {
    async fn schedule(&self, name: &str, schedule: Schedule) -> Result<(), TimerError> {
        (**self).schedule(name, schedule).await
    }

    async fn cancel(&self, name: &str) -> Result<bool, TimerError> {
        (**self).cancel(name).await
    }
}

impl<T: Scheduler + ?Sized> Scheduler for Rc<T> {
    async fn schedule(&self, name: &str, schedule: Schedule) -> Result<(), TimerError> {
        (**self).schedule(name, schedule).await
    }

    async fn cancel(&self, name: &str) -> Result<bool, TimerError> {
        (**self).cancel(name).await
    }
}

impl<T: Scheduler + ?Sized> Scheduler for Arc<T> {
    async fn schedule(&self, name: &str, schedule: Schedule) -> Result<(), TimerError> {
        (**self).schedule(name, schedule).await
    }

    async fn cancel(&self, name: &str) -> Result<bool, TimerError> {
        (**self).cancel(name).await
    }
}
