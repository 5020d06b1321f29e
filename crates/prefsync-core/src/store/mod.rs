//! Session storage
//!
//! One JSON-encoded [`SyncSession`] per sync token, kept under an absolute
//! TTL that every write resets. Expired and missing keys both read as absent.

mod kv_rest;
mod memory;

use std::time::Duration;

use async_trait::async_trait;

pub use kv_rest::RestKvSessionStore;
pub use memory::InMemorySessionStore;

use crate::error::Result;
use crate::models::SyncSession;

/// A session as read from the store, plus the version token for
/// [`SessionStore::put_if_unchanged`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub session: SyncSession,
    /// Raw stored payload; a later write is conditional on it being unchanged
    pub version: String,
}

/// Key-value backend holding sync sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Load the session for `sync_token`, or `None` when missing or expired.
    async fn get(&self, sync_token: &str) -> Result<Option<StoredSession>>;

    /// Store `session`, replacing any previous value and TTL.
    async fn put(&self, sync_token: &str, session: &SyncSession, ttl: Duration) -> Result<()>;

    /// Store `session` only if the stored payload still equals `expected_version`.
    ///
    /// Returns `false` when another writer got there first or the key expired.
    async fn put_if_unchanged(
        &self,
        sync_token: &str,
        expected_version: &str,
        session: &SyncSession,
        ttl: Duration,
    ) -> Result<bool>;
}

/// Namespaced store key for a sync token.
pub fn session_key(sync_token: &str) -> String {
    format!("sync_session_{sync_token}")
}

fn decode(raw: String) -> Result<StoredSession> {
    let session = serde_json::from_str(&raw)?;
    Ok(StoredSession {
        session,
        version: raw,
    })
}

fn encode(session: &SyncSession) -> Result<String> {
    Ok(serde_json::to_string(session)?)
}

/// Whole seconds for the store, never below one.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
