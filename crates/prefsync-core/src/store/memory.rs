//! Process-local session store for development and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{decode, encode, session_key, ttl_secs, SessionStore, StoredSession};
use crate::error::Result;
use crate::models::SyncSession;

/// In-memory TTL store. Clones share the same map.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

#[derive(Debug, Clone)]
struct Entry {
    raw: String,
    expires_at: Instant,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a session before its TTL runs out. Returns whether it was present.
    pub async fn evict(&self, sync_token: &str) -> bool {
        self.entries
            .lock()
            .await
            .remove(&session_key(sync_token))
            .is_some()
    }

    /// Number of sessions that have not expired yet. Expired entries are purged.
    pub async fn live_sessions(&self) -> usize {
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries);
        entries.len()
    }

    fn entry_for(raw: String, ttl: Duration) -> Entry {
        Entry {
            raw,
            expires_at: Instant::now() + Duration::from_secs(ttl_secs(ttl)),
        }
    }
}

/// Drop every expired entry, including keys that will never be read again.
fn purge_expired(entries: &mut HashMap<String, Entry>) {
    let now = Instant::now();
    entries.retain(|_, entry| entry.expires_at > now);
}

/// Remove `key` if it has expired and return the live payload, if any.
fn live_raw(entries: &mut HashMap<String, Entry>, key: &str) -> Option<String> {
    let expired = entries
        .get(key)
        .is_some_and(|entry| entry.expires_at <= Instant::now());
    if expired {
        entries.remove(key);
        return None;
    }
    entries.get(key).map(|entry| entry.raw.clone())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, sync_token: &str) -> Result<Option<StoredSession>> {
        let raw = {
            let mut entries = self.entries.lock().await;
            live_raw(&mut entries, &session_key(sync_token))
        };
        raw.map(decode).transpose()
    }

    async fn put(&self, sync_token: &str, session: &SyncSession, ttl: Duration) -> Result<()> {
        let raw = encode(session)?;
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries);
        entries.insert(session_key(sync_token), Self::entry_for(raw, ttl));
        Ok(())
    }

    async fn put_if_unchanged(
        &self,
        sync_token: &str,
        expected_version: &str,
        session: &SyncSession,
        ttl: Duration,
    ) -> Result<bool> {
        let raw = encode(session)?;
        let key = session_key(sync_token);
        let mut entries = self.entries.lock().await;
        if live_raw(&mut entries, &key).as_deref() != Some(expected_version) {
            return Ok(false);
        }
        entries.insert(key, Self::entry_for(raw, ttl));
        Ok(true)
    }
}
