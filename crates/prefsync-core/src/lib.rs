//! prefsync-core - Core library for prefsync
//!
//! This crate contains the sync session model, the preference merge engine,
//! and the session stores used by the prefsync API.

pub mod error;
pub mod merge;
pub mod models;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use merge::{merge_preferences, EmptyValuePolicy, MergeOptions};
pub use models::{MergePolicy, PreferenceCategory, SyncSession};
pub use store::{InMemorySessionStore, RestKvSessionStore, SessionStore, StoredSession};
pub use sync::{SyncError, SyncOptions, SyncService, UpdateOutcome, WriteMode};
