//! FocusGuard Rule Pipeline
//!
//! This crate turns the persisted site list into the dynamic redirect rule
//! table: expansion of block patterns into rules, reconciliation against the
//! capacity-limited table, and the declarativeNetRequest JSON encoding.

pub mod dnr;
pub mod generator;
pub mod reconciler;

pub use dnr::{encode, encode_all, DnrRule, DnrUpdate};
pub use generator::generate;
pub use reconciler::{reconcile, sync_rules, Reconciliation, SyncReport};
