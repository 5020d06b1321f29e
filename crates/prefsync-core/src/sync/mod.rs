//! Applying one device's preference update to a shared sync session.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::error::Error;
use crate::merge::{merge_preferences, MergeOptions};
use crate::models::SyncSession;
use crate::store::SessionStore;
use crate::util::{token_fingerprint, unix_millis_now};

/// Default session lifetime, refreshed on every successful update.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(900);

/// How the merged session is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Plain read-merge-write. Two devices updating the same session at the
    /// same time can interleave, and the later write drops the earlier merge.
    Overwrite,
    /// Conditional write against the version that was read; on a lost race
    /// the session is reloaded and the update merged again.
    CompareAndSwap { max_attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub session_ttl: Duration,
    pub write_mode: WriteMode,
    pub merge: MergeOptions,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            write_mode: WriteMode::Overwrite,
            merge: MergeOptions::default(),
        }
    }
}

/// Result of a successful update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub last_updated: i64,
    pub preference_count: usize,
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// No live session for the token (never paired, or expired)
    #[error("Sync session not found")]
    SessionNotFound,
    /// Every conditional write lost to a concurrent writer
    #[error("Sync session was modified concurrently ({attempts} attempts)")]
    Conflict { attempts: u32 },
    #[error(transparent)]
    Store(#[from] Error),
}

/// Loads, merges and persists sync sessions through a [`SessionStore`].
#[derive(Clone)]
pub struct SyncService {
    store: Arc<dyn SessionStore>,
    options: SyncOptions,
}

impl SyncService {
    pub fn new(store: Arc<dyn SessionStore>, options: SyncOptions) -> Self {
        Self { store, options }
    }

    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Merge `incoming` into the session for `sync_token` and persist it with a fresh TTL.
    pub async fn update_preferences(
        &self,
        sync_token: &str,
        incoming: &Value,
    ) -> Result<UpdateOutcome, SyncError> {
        match self.options.write_mode {
            WriteMode::Overwrite => self.overwrite(sync_token, incoming).await,
            WriteMode::CompareAndSwap { max_attempts } => {
                self.compare_and_swap(sync_token, incoming, max_attempts.max(1))
                    .await
            }
        }
    }

    async fn overwrite(
        &self,
        sync_token: &str,
        incoming: &Value,
    ) -> Result<UpdateOutcome, SyncError> {
        let stored = self
            .store
            .get(sync_token)
            .await?
            .ok_or(SyncError::SessionNotFound)?;

        let mut session = stored.session;
        apply_update(&mut session, incoming, unix_millis_now(), &self.options.merge);
        self.store
            .put(sync_token, &session, self.options.session_ttl)
            .await?;

        Ok(outcome(&session))
    }

    async fn compare_and_swap(
        &self,
        sync_token: &str,
        incoming: &Value,
        max_attempts: u32,
    ) -> Result<UpdateOutcome, SyncError> {
        for attempt in 1..=max_attempts {
            let stored = self
                .store
                .get(sync_token)
                .await?
                .ok_or(SyncError::SessionNotFound)?;

            let mut session = stored.session;
            apply_update(&mut session, incoming, unix_millis_now(), &self.options.merge);
            let written = self
                .store
                .put_if_unchanged(
                    sync_token,
                    &stored.version,
                    &session,
                    self.options.session_ttl,
                )
                .await?;
            if written {
                return Ok(outcome(&session));
            }

            tracing::debug!(
                session = token_fingerprint(sync_token),
                attempt,
                "Lost sync session write race, re-merging"
            );
        }

        Err(SyncError::Conflict {
            attempts: max_attempts,
        })
    }
}

/// Merge `incoming` into `session` and stamp it with `now_ms`.
pub fn apply_update(
    session: &mut SyncSession,
    incoming: &Value,
    now_ms: i64,
    options: &MergeOptions,
) {
    let existing = session.preferences_or_empty();
    session.preferences = merge_preferences(&existing, incoming, options);
    session.touch(now_ms);
}

fn outcome(session: &SyncSession) -> UpdateOutcome {
    UpdateOutcome {
        last_updated: session.last_updated,
        preference_count: session.preference_count(),
    }
}
