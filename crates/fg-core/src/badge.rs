//! Toolbar badge presentation
//!
//! A pure mapping from sprint state to what the toolbar shows. The badge has
//! no state of its own; it is recomputed on every tick.

use std::rc::Rc;
use std::sync::Arc;

use serde::Serialize;

use crate::notify::SurfaceError;
use crate::types::{SprintState, Timestamp};

/// Badge background while a sprint runs.
pub const ACTIVE_COLOR: &str = "#27ae60";

/// Toolbar icon variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BadgeIcon {
    Default,
    Active,
}

impl BadgeIcon {
    /// Icon paths keyed by pixel size, as `action.setIcon` expects.
    pub fn paths(self) -> [(u32, &'static str); 3] {
        match self {
            Self::Default => [
                (16, "/icons/icon16.png"),
                (48, "/icons/icon48.png"),
                (128, "/icons/icon128.png"),
            ],
            Self::Active => [
                (16, "/icons/icon16-active.png"),
                (48, "/icons/icon48-active.png"),
                (128, "/icons/icon128-active.png"),
            ],
        }
    }
}

/// Everything the toolbar surface needs to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub icon: BadgeIcon,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
}

impl Badge {
    /// Default icon, no text.
    pub fn cleared() -> Self {
        Self {
            icon: BadgeIcon::Default,
            text: String::new(),
            color: None,
        }
    }

    /// Active icon with the remaining minutes.
    pub fn counting(minutes_remaining: u32) -> Self {
        Self {
            icon: BadgeIcon::Active,
            text: format!("{minutes_remaining}m"),
            color: Some(ACTIVE_COLOR),
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.icon == BadgeIcon::Default && self.text.is_empty()
    }
}

/// Badge for the given sprint state at `now`.
pub fn present(state: Option<&SprintState>, now: Timestamp) -> Badge {
    match state {
        Some(sprint) if sprint.is_active => Badge::counting(sprint.remaining_minutes(now)),
        _ => Badge::cleared(),
    }
}

/// Toolbar surface.
#[allow(async_fn_in_trait)]
pub trait BadgeSink {
    async fn show(&self, badge: &Badge) -> Result<(), SurfaceError>;
}

impl<T: BadgeSink + ?Sized> BadgeSink for &T {
    async fn show(&self, badge: &Badge) -> Result<(), SurfaceError> {
        (**self).show(badge).await
    }
}

impl<T: BadgeSink + ?Sized> BadgeSink for Rc<T> {
    async fn show(&self, badge: &Badge) -> Result<(), SurfaceError> {
        (**self).show(badge).await
    }
}

impl<T: BadgeSink + ?Sized> BadgeSink for Arc<T> {
    async fn show(&self, badge: &Badge) -> Result<(), SurfaceError> {
        (**self).show(badge).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MS_PER_MINUTE;

    #[test]
    fn test_present_active() {
        let sprint = SprintState::begin(0, 25, None, None);
        let badge = present(Some(&sprint), 0);
        assert_eq!(badge.icon, BadgeIcon::Active);
        assert_eq!(badge.text, "25m");
        assert_eq!(badge.color, Some(ACTIVE_COLOR));

        let badge = present(Some(&sprint), 20 * MS_PER_MINUTE + 30_000);
        assert_eq!(badge.text, "5m");
    }

    #[test]
    fn test_present_floors_at_zero() {
        let sprint = SprintState::begin(0, 1, None, None);
        let badge = present(Some(&sprint), 10 * MS_PER_MINUTE);
        assert_eq!(badge.text, "0m");
    }

    #[test]
    fn test_present_idle_and_terminal() {
        assert!(present(None, 0).is_cleared());

        let mut sprint = SprintState::begin(0, 25, None, None);
        sprint.mark_cancelled();
        let badge = present(Some(&sprint), 0);
        assert_eq!(badge, Badge::cleared());
        assert_eq!(badge.color, None);
    }

    #[test]
    fn test_icon_paths() {
        assert_eq!(BadgeIcon::Active.paths()[0], (16, "/icons/icon16-active.png"));
        assert_eq!(BadgeIcon::Default.paths()[2], (128, "/icons/icon128.png"));
    }
}
