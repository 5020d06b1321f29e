//! Entity-keyed, timestamp-compared list merge.

use serde_json::Value;

use super::timestamp::freshness_millis;
use crate::models::EntityKind;

/// Merge `incoming` records into `existing`, keyed by `key` and resolved by `freshness`.
///
/// A record whose key is not present yet is appended. A record whose key is
/// present replaces the stored copy in place only when it is strictly fresher.
/// Lookups run against the working list, so duplicate keys inside `incoming`
/// collapse by the same rule.
pub fn merge_keyed<K, F, T>(
    mut existing: Vec<Value>,
    incoming: &[Value],
    key: F,
    freshness: T,
) -> Vec<Value>
where
    K: PartialEq,
    F: Fn(&Value) -> K,
    T: Fn(&Value) -> i64,
{
    for record in incoming {
        let record_key = key(record);
        match existing
            .iter()
            .position(|candidate| key(candidate) == record_key)
        {
            None => existing.push(record.clone()),
            Some(index) => {
                if freshness(record) > freshness(&existing[index]) {
                    existing[index] = record.clone();
                }
            }
        }
    }
    existing
}

/// Merge two record lists of `kind`. A non-array `existing` side counts as empty.
pub fn merge_entities(
    existing: Option<&Value>,
    incoming: &[Value],
    kind: EntityKind,
) -> Vec<Value> {
    let existing = existing
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    merge_keyed(
        existing,
        incoming,
        |record| entity_key(record, kind),
        |record| freshness_millis(record.get(kind.freshness_field())),
    )
}

/// Identity of a record: the JSON values of its key fields, `null` when missing.
fn entity_key(record: &Value, kind: EntityKind) -> Vec<Value> {
    kind.key_fields()
        .iter()
        .map(|field| record.get(*field).cloned().unwrap_or(Value::Null))
        .collect()
}
