//! Sync session model

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Shared, short-lived record that paired devices merge their preferences into.
///
/// Created by the pairing flow; this crate only ever mutates `preferences` and
/// `last_updated`. Fields written by the pairing flow that this model does not
/// name are kept in `extra` and written back untouched.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    /// Opaque session identifier (primary key in the store); left out on
    /// write when the pairing record never carried one
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub sync_token: String,
    /// Preference bundle; `null` when nothing has been synced yet
    #[serde(default)]
    pub preferences: Value,
    /// Last successful merge (unix ms, server clock); `null` reads as 0
    #[serde(default, deserialize_with = "null_as_default")]
    pub last_updated: i64,
    /// Pairing-owned fields carried through verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncSession {
    /// Create an empty session, as the pairing flow would.
    #[must_use]
    pub fn new(sync_token: impl Into<String>) -> Self {
        Self {
            sync_token: sync_token.into(),
            preferences: Value::Object(Map::new()),
            last_updated: 0,
            extra: Map::new(),
        }
    }

    /// Stored preferences, with a missing or `null` bundle read as `{}`.
    #[must_use]
    pub fn preferences_or_empty(&self) -> Value {
        if self.preferences.is_null() {
            Value::Object(Map::new())
        } else {
            self.preferences.clone()
        }
    }

    /// Number of top-level categories in the preference bundle.
    #[must_use]
    pub fn preference_count(&self) -> usize {
        self.preferences.as_object().map_or(0, Map::len)
    }

    /// Stamp a successful merge. Never moves `last_updated` backwards.
    pub fn touch(&mut self, now_ms: i64) {
        self.last_updated = self.last_updated.max(now_ms);
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl fmt::Debug for SyncSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncSession")
            .field("sync_token", &"[REDACTED]")
            .field("preference_count", &self.preference_count())
            .field("last_updated", &self.last_updated)
            .field("extra_fields", &self.extra.len())
            .finish()
    }
}
