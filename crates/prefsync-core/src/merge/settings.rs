//! `userSettings` reconciliation.

use serde_json::Value;

use super::entity::merge_entities;
use super::timestamp::freshness_millis;
use super::EmptyValuePolicy;
use crate::models::EntityKind;

const UPDATED_AT: &str = "updated_at";
const CONTENT_PREFERENCES: &str = "content_preferences";

/// Reconcile a settings object that carries one coarse `updated_at`.
///
/// A strictly newer incoming object wins wholesale, dropping stored fields it
/// does not carry (`content_preferences` included). Otherwise the stored object
/// is kept and only `content_preferences` is entity-merged into it, or emptied
/// when `empty_values` reads the incoming list as a clear.
pub fn merge_user_settings(
    existing: Option<&Value>,
    incoming: &Value,
    empty_values: EmptyValuePolicy,
) -> Value {
    let Some(stored) = existing.filter(|value| value.is_object()) else {
        return incoming.clone();
    };
    if !incoming.is_object() {
        return incoming.clone();
    }

    if freshness_millis(incoming.get(UPDATED_AT)) > freshness_millis(stored.get(UPDATED_AT)) {
        return incoming.clone();
    }

    let mut kept = stored.clone();
    let Some(offered) = incoming.get(CONTENT_PREFERENCES) else {
        return kept;
    };
    if empty_values.clears(offered) {
        kept[CONTENT_PREFERENCES] = Value::Array(Vec::new());
    } else if let Some(preferences) = offered.as_array() {
        let merged = merge_entities(
            stored.get(CONTENT_PREFERENCES),
            preferences,
            EntityKind::ContentPreference,
        );
        kept[CONTENT_PREFERENCES] = Value::Array(merged);
    }
    kept
}
