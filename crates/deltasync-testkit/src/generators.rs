//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::Value;

use deltasync_core::{Checksum, VersionedMap};

/// Generate a non-empty key, including the characters paths must escape.
pub fn key() -> impl Strategy<Value = String> {
    "[a-z0-9/~._-]{1,12}".prop_map(String::from)
}

/// Generate a key that needs no escaping.
pub fn plain_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}".prop_map(String::from)
}

/// Generate a JSON value without floats, nested up to three levels.
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Generate map contents with up to `max` keys.
pub fn entries(max: usize) -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map(key(), json_value(), 0..=max)
}

/// Generate a map with up to `max` keys.
pub fn map(max: usize) -> impl Strategy<Value = VersionedMap> {
    entries(max).prop_map(|entries| map_from(&entries))
}

/// Build a map from generated contents.
pub fn map_from(entries: &BTreeMap<String, Value>) -> VersionedMap {
    let mut editor = VersionedMap::new().edit();
    for (key, value) in entries {
        let raw = serde_json::to_vec(value).expect("json values serialize");
        editor.set(key, raw).expect("generated keys are non-empty");
    }
    editor.build()
}

/// One mutation of a map.
#[derive(Debug, Clone)]
pub enum Edit {
    Set(String, Value),
    Remove(String),
}

/// Generate a single edit.
pub fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (key(), json_value()).prop_map(|(k, v)| Edit::Set(k, v)),
        1 => key().prop_map(Edit::Remove),
    ]
}

/// Generate up to `max` edits.
pub fn edits(max: usize) -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(edit(), 0..=max)
}

/// Apply `edits` on top of `base`.
pub fn apply_edits(base: &VersionedMap, edits: &[Edit]) -> VersionedMap {
    let mut editor = base.edit();
    for edit in edits {
        match edit {
            Edit::Set(key, value) => {
                let raw = serde_json::to_vec(value).expect("json values serialize");
                editor.set(key, raw).expect("generated keys are non-empty");
            }
            Edit::Remove(key) => {
                editor.remove(key);
            }
        }
    }
    editor.build()
}

/// Checksum of `entries`, computed one key at a time in the given order.
pub fn checksum_in_order<'a, I>(entries: I) -> Checksum
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut checksum = Checksum::new();
    for (key, value) in entries {
        checksum.add(key, value);
    }
    checksum
}
