//! Data models for prefsync

mod category;
mod session;

pub use category::{EntityKind, MergePolicy, PreferenceCategory};
pub use session::SyncSession;
