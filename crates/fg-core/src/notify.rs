//! Unsolicited events pushed to listening surfaces

use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;

use crate::types::SprintState;

/// Event the owner pushes without a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Event {
    /// The sprint ran to its end time.
    #[serde(rename_all = "camelCase")]
    SprintCompleted { sprint_data: SprintState },
    /// The blocked list expands to more rules than the table holds; only
    /// the first `cap` are installed.
    RulesTruncated { requested: usize, cap: usize },
}

/// Failure of a display-only surface (badge, notification).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SurfaceError {
    pub message: String,
}

impl SurfaceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Notification facility and message broadcast to open pages.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn notify(&self, event: &Event) -> Result<(), SurfaceError>;
}

impl<T: Notifier + ?Sized> Notifier for &T {
    async fn notify(&self, event: &Event) -> Result<(), SurfaceError> {
        (**self).notify(event).await
    }
}

impl<T: Notifier + ?Sized> Notifier for Rc<T> {
    async fn notify(&self, event: &Event) -> Result<(), SurfaceError> {
        (**self).notify(event).await
    }
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn notify(&self, event: &Event) -> Result<(), SurfaceError> {
        (**self).notify(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_layout() {
        let sprint = SprintState::begin(0, 25, None, None);
        let event = Event::SprintCompleted { sprint_data: sprint };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["action"], "sprintCompleted");
        assert_eq!(json["sprintData"]["durationMinutes"], 25);

        let event = Event::RulesTruncated { requested: 52, cap: 50 };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json, serde_json::json!({ "action": "rulesTruncated", "requested": 52, "cap": 50 }));
    }
}
