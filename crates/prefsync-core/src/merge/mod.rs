//! Preference bundle merge engine.
//!
//! `merge_preferences` folds an incoming bundle into the stored one, one
//! top-level category at a time. Each category is reconciled according to its
//! [`MergePolicy`]; keys the engine does not recognize are replaced.

mod entity;
mod settings;
mod timestamp;

use serde_json::{Map, Value};

pub use entity::{merge_entities, merge_keyed};
pub use settings::merge_user_settings;
pub use timestamp::{freshness_millis, UNKNOWN_FRESHNESS};

use crate::models::{EntityKind, MergePolicy, PreferenceCategory};

/// Default cap on the merged search history.
pub const DEFAULT_SEARCH_HISTORY_LIMIT: usize = 50;

/// Which incoming values mean "no update offered for this category".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyValuePolicy {
    /// `null`, `false`, `0`, `""` and `[]` are all skipped, so a client can
    /// never clear a category by sending an empty value.
    #[default]
    SkipFalsy,
    /// Only `null` is skipped. Other empty values are applied, and an empty
    /// list or map clears a merged category instead of merging into it.
    SkipNullOnly,
}

impl EmptyValuePolicy {
    pub fn skips(self, value: &Value) -> bool {
        match self {
            Self::SkipFalsy => is_falsy(value),
            Self::SkipNullOnly => value.is_null(),
        }
    }

    /// Whether `value` asks for the stored category to be emptied.
    pub fn clears(self, value: &Value) -> bool {
        match self {
            Self::SkipFalsy => false,
            Self::SkipNullOnly => match value {
                Value::Array(items) => items.is_empty(),
                Value::Object(entries) => entries.is_empty(),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub empty_values: EmptyValuePolicy,
    /// Positional cap applied to `searchHistory` after merging
    pub search_history_limit: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            empty_values: EmptyValuePolicy::default(),
            search_history_limit: DEFAULT_SEARCH_HISTORY_LIMIT,
        }
    }
}

/// Merge `incoming` into `existing` and return the reconciled bundle.
///
/// When `existing` is not a JSON object there is nothing to merge into and
/// `incoming` is returned as is. The result is not commutative: unrecognized
/// keys and `gameProgress` entries take whatever arrived last.
pub fn merge_preferences(existing: &Value, incoming: &Value, options: &MergeOptions) -> Value {
    let Some(stored) = existing.as_object() else {
        return incoming.clone();
    };
    let Some(offered) = incoming.as_object() else {
        return existing.clone();
    };

    let mut merged = stored.clone();
    for (key, value) in offered {
        if options.empty_values.skips(value) {
            tracing::trace!(category = %key, "Skipping empty category");
            continue;
        }

        let current = merged.get(key);
        let next = match PreferenceCategory::from_key(key).merge_policy() {
            MergePolicy::EntityKeyed(_) | MergePolicy::ArrivalOrderOverlay
                if options.empty_values.clears(value) =>
            {
                value.clone()
            }
            MergePolicy::Settings => merge_user_settings(current, value, options.empty_values),
            MergePolicy::EntityKeyed(kind) => merge_entity_category(current, value, kind, options),
            MergePolicy::ArrivalOrderOverlay => overlay(current, value),
            MergePolicy::Replace => value.clone(),
        };
        merged.insert(key.clone(), next);
    }

    Value::Object(merged)
}

fn merge_entity_category(
    current: Option<&Value>,
    incoming: &Value,
    kind: EntityKind,
    options: &MergeOptions,
) -> Value {
    let Some(records) = incoming.as_array() else {
        return incoming.clone();
    };

    let mut merged = merge_entities(current, records, kind);
    if kind.is_bounded() {
        // Positional, not by recency: stale records early in the list survive
        // and fresh ones appended past the limit are dropped.
        merged.truncate(options.search_history_limit);
    }
    Value::Array(merged)
}

fn overlay(current: Option<&Value>, incoming: &Value) -> Value {
    let Some(entries) = incoming.as_object() else {
        return incoming.clone();
    };

    let mut merged = current
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);
    for (key, value) in entries {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn merge(existing: &Value, incoming: &Value) -> Value {
        merge_preferences(existing, incoming, &MergeOptions::default())
    }

    fn search(query: &str, searched_at: &str) -> Value {
        json!({ "query": query, "searched_at": searched_at })
    }

    #[test]
    fn watchlist_replaces_in_place_and_appends() {
        let existing = json!({
            "watchlist": [
                { "media_id": "1", "media_type": "movie", "updated_at": "2024-01-01T00:00:00Z" }
            ]
        });
        let incoming = json!({
            "watchlist": [
                { "media_id": "1", "media_type": "movie", "updated_at": "2024-01-02T00:00:00Z" },
                { "media_id": "2", "media_type": "tv", "updated_at": "2024-01-02T00:00:00Z" }
            ]
        });

        let merged = merge(&existing, &incoming);
        assert_eq!(
            merged["watchlist"],
            json!([
                { "media_id": "1", "media_type": "movie", "updated_at": "2024-01-02T00:00:00Z" },
                { "media_id": "2", "media_type": "tv", "updated_at": "2024-01-02T00:00:00Z" }
            ])
        );
    }

    #[test]
    fn unknown_keys_pass_through() {
        let existing = json!({ "customField": "old", "watchlist": [] });
        let merged = merge(&existing, &json!({ "customField": "x" }));
        assert_eq!(merged["customField"], "x");

        let merged = merge(&json!({}), &json!({ "customField": "x" }));
        assert_eq!(merged["customField"], "x");
    }

    #[test]
    fn null_category_leaves_stored_value() {
        let existing = json!({
            "watchlist": [{ "media_id": "1", "media_type": "movie", "updated_at": "2024-01-01T00:00:00Z" }]
        });
        let merged = merge(&existing, &json!({ "watchlist": null }));
        assert_eq!(merged, existing);
    }

    #[test]
    fn falsy_values_skip_by_default() {
        let existing = json!({
            "likedMovies": [1, 2],
            "searchHistory": [search("dune", "2024-01-01T00:00:00Z")],
            "customCount": 5,
            "customFlag": true
        });
        let incoming = json!({
            "likedMovies": [],
            "searchHistory": [],
            "customCount": 0,
            "customFlag": false,
            "customText": ""
        });

        assert_eq!(merge(&existing, &incoming), existing);
    }

    #[test]
    fn skip_null_only_lets_clients_clear_categories() {
        let existing = json!({ "likedMovies": [1, 2], "dislikedMovies": [3], "customCount": 5 });
        let incoming = json!({ "likedMovies": [], "customCount": 0, "dislikedMovies": null });

        let merged = merge_preferences(&existing, &incoming, &apply_empty_values());
        assert_eq!(
            merged,
            json!({ "likedMovies": [], "dislikedMovies": [3], "customCount": 0 })
        );
    }

    fn apply_empty_values() -> MergeOptions {
        MergeOptions {
            empty_values: EmptyValuePolicy::SkipNullOnly,
            ..MergeOptions::default()
        }
    }

    #[test]
    fn skip_null_only_clears_merged_categories() {
        let existing = json!({
            "watchlist": [
                { "media_id": "1", "media_type": "movie", "updated_at": "2024-01-01T00:00:00Z" }
            ],
            "searchHistory": [search("dune", "2024-01-01T00:00:00Z")],
            "gameProgress": { "trivia": { "level": 4 } }
        });
        let incoming = json!({ "watchlist": [], "searchHistory": [], "gameProgress": {} });

        let merged = merge_preferences(&existing, &incoming, &apply_empty_values());
        assert_eq!(
            merged,
            json!({ "watchlist": [], "searchHistory": [], "gameProgress": {} })
        );
    }

    #[test]
    fn empty_merged_categories_are_kept_by_default() {
        let existing = json!({
            "searchHistory": [search("dune", "2024-01-01T00:00:00Z")],
            "gameProgress": { "trivia": { "level": 4 } }
        });
        let incoming = json!({ "searchHistory": [], "gameProgress": {} });

        assert_eq!(merge(&existing, &incoming), existing);
    }

    #[test]
    fn non_object_existing_returns_incoming_verbatim() {
        let incoming = json!({ "watchlist": [{ "media_id": "1", "media_type": "movie" }] });
        assert_eq!(merge(&Value::Null, &incoming), incoming);
        assert_eq!(merge(&json!([1, 2, 3]), &incoming), incoming);
        assert_eq!(merge(&json!("legacy"), &incoming), incoming);
    }

    #[test]
    fn liked_movies_are_replaced_not_unioned() {
        let existing = json!({ "likedMovies": [1, 2], "dislikedMovies": [3] });
        let incoming = json!({ "likedMovies": [4] });

        let merged = merge(&existing, &incoming);
        assert_eq!(merged, json!({ "likedMovies": [4], "dislikedMovies": [3] }));
    }

    #[test]
    fn game_progress_overlays_without_comparing_timestamps() {
        let existing = json!({
            "gameProgress": {
                "trivia": { "score": 90, "updated_at": "2024-05-01T00:00:00Z" },
                "poster_guess": { "level": 3 }
            }
        });
        let incoming = json!({
            "gameProgress": {
                "trivia": { "score": 10, "updated_at": "2020-01-01T00:00:00Z" }
            }
        });

        let merged = merge(&existing, &incoming);
        assert_eq!(
            merged["gameProgress"],
            json!({
                "trivia": { "score": 10, "updated_at": "2020-01-01T00:00:00Z" },
                "poster_guess": { "level": 3 }
            })
        );
    }

    #[test]
    fn search_history_never_exceeds_limit() {
        let existing_history: Vec<Value> = (0..40)
            .map(|index| search(&format!("old-{index}"), "2024-01-01T00:00:00Z"))
            .collect();
        let incoming_history: Vec<Value> = (0..40)
            .map(|index| search(&format!("new-{index}"), "2024-02-01T00:00:00Z"))
            .collect();

        let merged = merge(
            &json!({ "searchHistory": existing_history }),
            &json!({ "searchHistory": incoming_history }),
        );
        let history = merged["searchHistory"].as_array().unwrap();
        assert_eq!(history.len(), DEFAULT_SEARCH_HISTORY_LIMIT);
    }

    #[test]
    fn search_history_truncates_by_position_not_recency() {
        let stale: Vec<Value> = (0..50)
            .map(|index| search(&format!("stale-{index}"), "2023-01-01T00:00:00Z"))
            .collect();
        let incoming = json!({ "searchHistory": [search("fresh", "2024-06-01T00:00:00Z")] });

        let merged = merge(&json!({ "searchHistory": stale.clone() }), &incoming);
        // The newest search lands at position 50 and is cut off.
        assert_eq!(merged["searchHistory"], Value::Array(stale));
    }

    #[test]
    fn search_history_limit_is_configurable() {
        let incoming: Vec<Value> = (0..5)
            .map(|index| search(&format!("q-{index}"), "2024-01-01T00:00:00Z"))
            .collect();
        let options = MergeOptions {
            search_history_limit: 3,
            ..MergeOptions::default()
        };

        let merged =
            merge_preferences(&json!({}), &json!({ "searchHistory": incoming }), &options);
        assert_eq!(merged["searchHistory"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn re_merging_the_same_bundle_is_stable() {
        let existing = json!({
            "watchlist": [{ "media_id": "1", "media_type": "movie", "updated_at": "2024-01-01T00:00:00Z" }],
            "searchHistory": [search("alien", "2024-01-01T00:00:00Z")],
            "userSettings": {
                "updated_at": "2024-05-01T00:00:00Z",
                "content_preferences": []
            }
        });
        let incoming = json!({
            "watchlist": [
                { "media_id": "1", "media_type": "movie", "updated_at": "2024-01-03T00:00:00Z" },
                { "media_id": "5", "media_type": "tv", "updated_at": "2024-01-03T00:00:00Z" }
            ],
            "searchHistory": [search("alien", "2024-01-02T00:00:00Z"), search("heat", "2024-01-02T00:00:00Z")],
            "userSettings": {
                "updated_at": "2024-01-01T00:00:00Z",
                "content_preferences": [
                    { "media_id": "5", "media_type": "tv", "preference": "like", "timestamp": "2024-01-03T00:00:00Z" }
                ]
            },
            "gameProgress": { "trivia": { "score": 3 } }
        });

        let once = merge(&existing, &incoming);
        let twice = merge(&once, &incoming);
        assert_eq!(once, twice);
        assert_eq!(once["watchlist"].as_array().unwrap().len(), 2);
        assert_eq!(once["searchHistory"].as_array().unwrap().len(), 2);
        assert_eq!(
            once["userSettings"]["content_preferences"]
                .as_array()
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn fresher_entity_fields_fully_replace_stale_ones() {
        let existing = json!({
            "watchlist": [{
                "media_id": "1", "media_type": "movie",
                "media_data": { "title": "Old title", "poster": "old.jpg" },
                "updated_at": "2024-01-01T00:00:00Z"
            }]
        });
        let incoming = json!({
            "watchlist": [{
                "media_id": "1", "media_type": "movie",
                "media_data": { "title": "New title" },
                "updated_at": "2024-01-02T00:00:00Z"
            }]
        });

        let merged = merge(&existing, &incoming);
        assert_eq!(merged["watchlist"][0]["media_data"], json!({ "title": "New title" }));
    }

    #[test]
    fn non_array_entity_payload_replaces_value() {
        let existing = json!({ "watchlist": [{ "media_id": "1", "media_type": "movie" }] });
        let merged = merge(&existing, &json!({ "watchlist": { "unexpected": true } }));
        assert_eq!(merged["watchlist"], json!({ "unexpected": true }));
    }
}
