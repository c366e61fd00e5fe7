//! Command channel messages
//!
//! UI surfaces send a [`Command`] tagged by `action`; the owner answers each
//! one with exactly one [`Reply`]. Failures are replies too, carrying the
//! stable error code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use fg_core::settings::AddSitesOutcome;
use fg_core::sprint::SprintView;
use fg_core::{FocusError, Settings, SprintState};

/// Code for messages that do not parse as a [`Command`].
pub const INVALID_COMMAND: &str = "invalidCommand";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    StartSprint {
        duration_minutes: i64,
        #[serde(default)]
        goal: Option<String>,
        #[serde(default)]
        success_criteria: Option<String>,
    },
    CancelSprint,
    GetSprintState,
    RecordBypass,
    GetSettings,
    AddSites {
        text: String,
    },
    RemoveSite {
        index: usize,
    },
    ResetSites,
    SetEnabled {
        enabled: bool,
    },
    ToggleEnabled,
}

impl Command {
    /// Decode a raw message.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::StartSprint { .. } => "startSprint",
            Self::CancelSprint => "cancelSprint",
            Self::GetSprintState => "getSprintState",
            Self::RecordBypass => "recordBypass",
            Self::GetSettings => "getSettings",
            Self::AddSites { .. } => "addSites",
            Self::RemoveSite { .. } => "removeSite",
            Self::ResetSites => "resetSites",
            Self::SetEnabled { .. } => "setEnabled",
            Self::ToggleEnabled => "toggleEnabled",
        }
    }
}

/// Condition the user should see next to an otherwise successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub code: String,
    pub message: String,
}

impl From<&FocusError> for Warning {
    fn from(err: &FocusError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Reply {
    #[serde(rename_all = "camelCase")]
    SprintStarted { sprint_data: SprintState },
    SprintCancelled { cancelled: bool },
    SprintState(SprintView),
    #[serde(rename_all = "camelCase")]
    BypassRecorded { bypass_attempts: u64 },
    Settings(Settings),
    SitesAdded {
        added: Vec<String>,
        duplicates: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<Warning>,
    },
    SiteRemoved { removed: String },
    SitesReset { count: usize },
    #[serde(rename_all = "camelCase")]
    Enabled { is_enabled: bool },
    Error { code: String, message: String },
}

impl Reply {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Error code, if this is an error reply.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<FocusError> for Reply {
    fn from(err: FocusError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}

impl Reply {
    pub fn sites_added(outcome: AddSitesOutcome, warning: Option<Warning>) -> Self {
        Self::SitesAdded {
            added: outcome.added,
            duplicates: outcome.duplicates,
            warning,
        }
    }
}
