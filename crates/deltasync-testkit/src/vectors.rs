//! Named diff vectors.
//!
//! Each vector pins the exact wire form of the patch between two maps, so
//! any server computing the same diff must produce these bytes.

use deltasync_core::{diff, full_resync, VersionedMap};
use serde_json::Value;

/// A diff test vector.
#[derive(Debug, Clone)]
pub struct DiffVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Starting contents as a JSON object.
    pub from: &'static str,
    /// Target contents as a JSON object.
    pub to: &'static str,
    /// Expected compact JSON of the patch.
    pub expected_patch: &'static str,
    /// Expected checksum of `to`, or empty if unchecked.
    pub expected_checksum: &'static str,
}

/// Get all diff vectors.
pub fn all_vectors() -> Vec<DiffVector> {
    vec![
        DiffVector {
            name: "add to empty",
            from: r#"{}"#,
            to: r#"{"foo":"bar"}"#,
            expected_patch: r#"[{"op":"add","path":"/foo","value":"bar"}]"#,
            expected_checksum: "",
        },
        DiffVector {
            name: "replace, remove and add sorted by path",
            from: r#"{"foo":"bar","hot":"dog"}"#,
            to: r#"{"foo":"baz","mon":"key"}"#,
            expected_patch: r#"[{"op":"replace","path":"/foo","value":"baz"},{"op":"remove","path":"/hot"},{"op":"add","path":"/mon","value":"key"}]"#,
            expected_checksum: "",
        },
        DiffVector {
            name: "slash in key is escaped",
            from: r#"{}"#,
            to: r#"{"a/b":"x"}"#,
            expected_patch: r#"[{"op":"add","path":"/a~1b","value":"x"}]"#,
            expected_checksum: "",
        },
        DiffVector {
            name: "tilde in key is escaped",
            from: r#"{"m~n":1}"#,
            to: r#"{}"#,
            expected_patch: r#"[{"op":"remove","path":"/m~0n"}]"#,
            expected_checksum: "",
        },
        DiffVector {
            name: "nested change replaces whole key",
            from: r#"{"doc":{"a":[1,2],"b":true}}"#,
            to: r#"{"doc":{"a":[1,3],"b":true}}"#,
            expected_patch: r#"[{"op":"replace","path":"/doc","value":{"a":[1,3],"b":true}}]"#,
            expected_checksum: "",
        },
        DiffVector {
            name: "key order and whitespace are not changes",
            from: r#"{"k":{"x":1,"y":2}}"#,
            to: r#"{"k":{ "y":2, "x":1.0 }}"#,
            expected_patch: r#"[]"#,
            expected_checksum: "",
        },
        DiffVector {
            name: "identical maps",
            from: r#"{"a":1,"b":[null]}"#,
            to: r#"{"a":1,"b":[null]}"#,
            expected_patch: r#"[]"#,
            expected_checksum: "",
        },
        DiffVector {
            name: "empty map checksum",
            from: r#"{"gone":"soon"}"#,
            to: r#"{}"#,
            expected_patch: r#"[{"op":"remove","path":"/gone"}]"#,
            expected_checksum: "00000000",
        },
    ]
}

/// Build a map from a vector's JSON object text.
pub fn map_from_json(object: &str) -> VersionedMap {
    let value: Value = serde_json::from_str(object).expect("vector maps are valid json");
    let Value::Object(fields) = value else {
        panic!("vector maps are json objects");
    };
    let mut editor = VersionedMap::new().edit();
    for (key, value) in fields {
        let raw = serde_json::to_vec(&value).expect("json values serialize");
        editor.set(&key, raw).expect("vector keys are non-empty");
    }
    editor.build()
}

/// Compute the patch JSON for a vector.
pub fn compute_patch(vector: &DiffVector) -> String {
    let from = map_from_json(vector.from);
    let to = map_from_json(vector.to);
    let patch = diff(&from, &to).expect("vector values are valid");
    serde_json::to_string(&patch).expect("patches serialize")
}

/// Check every vector, returning the names of those that fail.
pub fn verify_all_vectors() -> Vec<&'static str> {
    all_vectors()
        .into_iter()
        .filter(|v| {
            let checksum_ok = v.expected_checksum.is_empty()
                || map_from_json(v.to).checksum().to_hex() == v.expected_checksum;
            compute_patch(v) != v.expected_patch || !checksum_ok
        })
        .map(|v| v.name)
        .collect()
}

/// The full resync patch for a vector's target, as JSON.
pub fn compute_full_resync(vector: &DiffVector) -> String {
    let to = map_from_json(vector.to);
    let patch = full_resync(&to).expect("vector values are valid");
    serde_json::to_string(&patch).expect("patches serialize")
}
