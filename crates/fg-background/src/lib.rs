//! FocusGuard Background Owner
//!
//! The single long-lived owner of the sprint state and of rule-table
//! reconciliation. Host bindings forward four kinds of input here:
//!
//! - lifecycle hooks (`on_installed`, `on_startup`)
//! - commands from UI surfaces ([`Command`] -> [`Reply`])
//! - fired alarms
//! - storage change notifications

pub mod command;
pub mod owner;

pub use command::{Command, Reply, Warning, INVALID_COMMAND};
pub use owner::Background;
