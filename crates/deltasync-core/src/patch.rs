//! Edit scripts: ordered add/remove/replace operations on top-level keys.
//!
//! Paths are `/` followed by the escaped key. `~` is written as `~0` and `/`
//! as `~1`, so any key survives the trip through a path. The path `/`
//! (the empty key) addresses the whole map; a `remove` at that path clears
//! everything and is only valid as the first operation of a script.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

use crate::error::{CoreError, Result};
use crate::map::VersionedMap;

/// Separator that starts every path.
pub const PATH_SEPARATOR: char = '/';

/// Escape character for keys embedded in paths.
pub const ESCAPE_CHAR: char = '~';

/// The path of the whole map.
pub const ROOT_PATH: &str = "/";

/// An ordered edit script.
pub type Patch = Vec<Operation>;

/// The kind of a patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Remove,
    Replace,
}

impl OpKind {
    /// Wire name of the operation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Replace => "replace",
        }
    }
}

impl FromStr for OpKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add" => Ok(OpKind::Add),
            "remove" => Ok(OpKind::Remove),
            "replace" => Ok(OpKind::Replace),
            other => Err(CoreError::UnknownOperation(other.to_string())),
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single patch operation as it appears on the wire.
///
/// `op` stays a string so that scripts with unknown operations still
/// deserialize and are rejected when applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub op: String,
    pub path: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub value: Option<Box<RawValue>>,
}

/// Keep an explicit JSON `null` as `Some("null")` rather than `None`.
fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<Box<RawValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Box::<RawValue>::deserialize(deserializer).map(Some)
}

impl Operation {
    /// Add `key` with a canonical JSON value.
    pub fn add(key: &str, value: &Bytes) -> Result<Self> {
        Ok(Self {
            op: OpKind::Add.as_str().to_string(),
            path: key_to_path(key),
            value: Some(raw_value(value)?),
        })
    }

    /// Replace the value of `key` with a canonical JSON value.
    pub fn replace(key: &str, value: &Bytes) -> Result<Self> {
        Ok(Self {
            op: OpKind::Replace.as_str().to_string(),
            path: key_to_path(key),
            value: Some(raw_value(value)?),
        })
    }

    /// Remove `key`.
    pub fn remove(key: &str) -> Self {
        Self {
            op: OpKind::Remove.as_str().to_string(),
            path: key_to_path(key),
            value: None,
        }
    }

    /// Remove every key. Only valid as the first operation of a script.
    pub fn remove_all() -> Self {
        Self {
            op: OpKind::Remove.as_str().to_string(),
            path: ROOT_PATH.to_string(),
            value: None,
        }
    }

    /// Parse the operation kind.
    pub fn kind(&self) -> Result<OpKind> {
        self.op.parse()
    }

    /// The key this operation targets; empty for the root path.
    pub fn key(&self) -> Result<String> {
        path_to_key(&self.path)
    }

    /// Whether this is the root removal.
    pub fn is_remove_all(&self) -> bool {
        self.op == OpKind::Remove.as_str() && self.path == ROOT_PATH
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op
            && self.path == other.path
            && self.value.as_ref().map(|v| v.get()) == other.value.as_ref().map(|v| v.get())
    }
}

impl Eq for Operation {}

fn raw_value(value: &Bytes) -> Result<Box<RawValue>> {
    let text = std::str::from_utf8(value).map_err(|e| CoreError::Encoding(e.to_string()))?;
    RawValue::from_string(text.to_string()).map_err(|e| CoreError::Encoding(e.to_string()))
}

/// Escape a key for embedding in a path.
pub fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            ESCAPE_CHAR => out.push_str("~0"),
            PATH_SEPARATOR => out.push_str("~1"),
            c => out.push(c),
        }
    }
    out
}

/// Reverse [`escape_key`].
pub fn unescape_key(escaped: &str) -> Result<String> {
    let invalid = |reason: &str| CoreError::InvalidPath {
        path: escaped.to_string(),
        reason: reason.to_string(),
    };

    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE_CHAR => match chars.next() {
                Some('0') => out.push(ESCAPE_CHAR),
                Some('1') => out.push(PATH_SEPARATOR),
                _ => return Err(invalid("bad escape sequence")),
            },
            PATH_SEPARATOR => return Err(invalid("nested paths are not supported")),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Build the path for a top-level key.
pub fn key_to_path(key: &str) -> String {
    let mut path = String::with_capacity(key.len() + 1);
    path.push(PATH_SEPARATOR);
    path.push_str(&escape_key(key));
    path
}

/// Extract the key from a top-level path.
pub fn path_to_key(path: &str) -> Result<String> {
    match path.strip_prefix(PATH_SEPARATOR) {
        Some(rest) => unescape_key(rest),
        None => Err(CoreError::InvalidPath {
            path: path.to_string(),
            reason: "path must begin with '/'".to_string(),
        }),
    }
}

/// Apply an edit script to a snapshot, producing a new snapshot.
///
/// Operations are applied in order through a single editor, so a failing
/// script leaves `onto` untouched and produces nothing.
pub fn apply(onto: &VersionedMap, script: &[Operation]) -> Result<VersionedMap> {
    let mut editor = onto.edit();

    for (index, op) in script.iter().enumerate() {
        let kind = op.kind()?;
        let key = op.key()?;

        match kind {
            OpKind::Remove if key.is_empty() => {
                if index != 0 {
                    return Err(CoreError::InvalidPath {
                        path: op.path.clone(),
                        reason: "root removal must be the first operation".to_string(),
                    });
                }
                editor.clear();
            }
            OpKind::Remove => {
                editor.remove(&key);
            }
            OpKind::Add | OpKind::Replace => {
                let value = op.value.as_ref().ok_or_else(|| CoreError::MalformedValue {
                    key: key.clone(),
                    reason: format!("{} requires a value", kind),
                })?;
                editor.set(&key, value.get())?;
            }
        }
    }

    Ok(editor.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> VersionedMap {
        let mut ed = VersionedMap::new().edit();
        for (k, v) in pairs {
            ed.set(k, v).unwrap();
        }
        ed.build()
    }

    fn ops(json: &str) -> Patch {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_escape_roundtrip() {
        for key in ["plain", "a/b", "~", "~1", "/~0/", "~~//", "ünïcødé/~"] {
            assert_eq!(unescape_key(&escape_key(key)).unwrap(), key);
        }
        assert_eq!(escape_key("a/b"), "a~1b");
        assert_eq!(escape_key("a~b"), "a~0b");
        assert_eq!(key_to_path("a/b"), "/a~1b");
    }

    #[test]
    fn test_path_errors() {
        assert!(matches!(path_to_key("foo"), Err(CoreError::InvalidPath { .. })));
        assert!(matches!(path_to_key(""), Err(CoreError::InvalidPath { .. })));
        assert!(matches!(path_to_key("/a/b"), Err(CoreError::InvalidPath { .. })));
        assert!(matches!(path_to_key("/a~2"), Err(CoreError::InvalidPath { .. })));
        assert!(matches!(path_to_key("/a~"), Err(CoreError::InvalidPath { .. })));
        assert_eq!(path_to_key("/").unwrap(), "");
    }

    #[test]
    fn test_apply_basic_ops() {
        let base = map(&[("foo", "\"bar\""), ("hot", "\"dog\"")]);
        let script = ops(
            r#"[
                {"op":"replace","path":"/foo","value":"baz"},
                {"op":"remove","path":"/hot"},
                {"op":"add","path":"/mon","value":"key"}
            ]"#,
        );
        let result = apply(&base, &script).unwrap();
        let expected = map(&[("foo", "\"baz\""), ("mon", "\"key\"")]);
        assert_eq!(result.checksum(), expected.checksum());
        assert_eq!(result.len(), 2);
        assert_eq!(base.len(), 2);
        assert!(base.contains_key("hot"));
    }

    #[test]
    fn test_apply_remove_all_first() {
        let base = map(&[("a", "1"), ("b", "2")]);
        let script = ops(r#"[{"op":"remove","path":"/"},{"op":"add","path":"/c","value":3}]"#);
        let result = apply(&base, &script).unwrap();
        assert_eq!(result.checksum(), map(&[("c", "3")]).checksum());
    }

    #[test]
    fn test_apply_remove_all_not_first_rejected() {
        let base = map(&[("a", "1")]);
        let script = ops(r#"[{"op":"add","path":"/c","value":3},{"op":"remove","path":"/"}]"#);
        assert!(matches!(apply(&base, &script), Err(CoreError::InvalidPath { .. })));
    }

    #[test]
    fn test_apply_unknown_op() {
        let script = ops(r#"[{"op":"move","path":"/a","value":1}]"#);
        let err = apply(&VersionedMap::new(), &script).unwrap_err();
        assert!(matches!(err, CoreError::UnknownOperation(ref op) if op == "move"));
    }

    #[test]
    fn test_apply_invalid_path() {
        let script = ops(r#"[{"op":"add","path":"a","value":1}]"#);
        assert!(matches!(
            apply(&VersionedMap::new(), &script),
            Err(CoreError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_apply_missing_value() {
        let script = ops(r#"[{"op":"add","path":"/a"}]"#);
        assert!(matches!(
            apply(&VersionedMap::new(), &script),
            Err(CoreError::MalformedValue { .. })
        ));
    }

    #[test]
    fn test_explicit_null_value_is_kept() {
        let script = ops(r#"[{"op":"add","path":"/a","value":null}]"#);
        assert!(script[0].value.is_some());
        let result = apply(&VersionedMap::new(), &script).unwrap();
        assert_eq!(result.get("a").unwrap().as_ref(), b"null");
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let base = map(&[("a", "1")]);
        let result = apply(&base, &ops(r#"[{"op":"remove","path":"/zzz"}]"#)).unwrap();
        assert_eq!(result.checksum(), base.checksum());
    }

    #[test]
    fn test_operation_serialization() {
        let op = Operation::add("a/b", &Bytes::from_static(b"\"x\"")).unwrap();
        assert_eq!(
            serde_json::to_string(&op).unwrap(),
            r#"{"op":"add","path":"/a~1b","value":"x"}"#
        );
        assert_eq!(
            serde_json::to_string(&Operation::remove_all()).unwrap(),
            r#"{"op":"remove","path":"/"}"#
        );
        assert!(Operation::remove_all().is_remove_all());
    }
}
