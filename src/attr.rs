//! Attribute value trees
//!
//! Resource attributes form a tree of string scalars nested in lists, sets,
//! and maps of unknown depth. Sets are unordered but iterate in `Ord` order,
//! so every walk over the tree is deterministic.

use crate::error::{Error, Result};
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One attribute value: a scalar or a container of further values
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AttrValue {
    String(String),
    List(Vec<AttrValue>),
    Set(BTreeSet<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

// Sets serialize as sorted arrays. Deserialization produces only strings,
// lists, and maps; the set distinction exists in memory for callers that
// load provider data, and flattening does not depend on it.
impl Serialize for AttrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::String(v) => serializer.serialize_str(v),
            Self::List(v) => serializer.collect_seq(v),
            Self::Set(v) => serializer.collect_seq(v),
            Self::Map(v) => serializer.collect_map(v),
        }
    }
}

impl<'de> Deserialize<'de> for AttrValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct AttrVisitor;

        impl<'de> Visitor<'de> for AttrVisitor {
            type Value = AttrValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, array, or object")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<AttrValue, E> {
                Ok(AttrValue::String(v.to_string()))
            }

            fn visit_string<E: serde::de::Error>(
                self,
                v: String,
            ) -> std::result::Result<AttrValue, E> {
                Ok(AttrValue::String(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<AttrValue, A::Error> {
                let mut values = Vec::new();
                while let Some(v) = seq.next_element()? {
                    values.push(v);
                }
                Ok(AttrValue::List(values))
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<AttrValue, A::Error> {
                let mut values = BTreeMap::new();
                while let Some((k, v)) = map.next_entry()? {
                    values.insert(k, v);
                }
                Ok(AttrValue::Map(values))
            }
        }

        deserializer.deserialize_any(AttrVisitor)
    }
}

/// Collect every non-empty scalar reachable from `attrs` along the dotted
/// `path`
///
/// Lists and sets are traversed element-wise without consuming a path
/// segment. A map consumes one segment, or flattens all of its values once
/// the path is exhausted. A missing map entry yields nothing; a path that
/// tries to descend through a scalar is an [`Error::AttributePath`].
pub fn flatten(
    attrs: &BTreeMap<String, AttrValue>,
    path: &str,
    resource_type: &str,
) -> Result<Vec<String>> {
    // A literal dotted key takes priority over a tree walk.
    if let Some(AttrValue::String(v)) = attrs.get(path) {
        return Ok(if v.is_empty() {
            Vec::new()
        } else {
            vec![v.clone()]
        });
    }
    let mut values = Vec::new();
    let (head, rest) = split_attr(path);
    if let Some(v) = attrs.get(head) {
        collect(v, rest, resource_type, path, &mut values)?;
    }
    Ok(values)
}

fn collect(
    value: &AttrValue,
    remaining: &str,
    resource_type: &str,
    full_path: &str,
    values: &mut Vec<String>,
) -> Result<()> {
    match value {
        AttrValue::String(v) => {
            if !remaining.is_empty() {
                return Err(Error::AttributePath {
                    resource_type: resource_type.to_string(),
                    path: full_path.to_string(),
                });
            }
            if !v.is_empty() {
                values.push(v.clone());
            }
        }
        AttrValue::List(elems) => {
            for e in elems {
                collect(e, remaining, resource_type, full_path, values)?;
            }
        }
        AttrValue::Set(elems) => {
            for e in elems {
                collect(e, remaining, resource_type, full_path, values)?;
            }
        }
        AttrValue::Map(entries) => {
            if remaining.is_empty() {
                for e in entries.values() {
                    collect(e, remaining, resource_type, full_path, values)?;
                }
            } else {
                let (head, rest) = split_attr(remaining);
                if let Some(e) = entries.get(head) {
                    collect(e, rest, resource_type, full_path, values)?;
                }
            }
        }
    }
    Ok(())
}

/// Split a dotted attribute path at its first segment
fn split_attr(path: &str) -> (&str, &str) {
    match path.find('.') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => (path, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(entries: &[(&str, AttrValue)]) -> BTreeMap<String, AttrValue> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_flatten_scalar() {
        let a = attrs(&[("id", "i-123".into()), ("blank", "".into())]);
        assert_eq!(flatten(&a, "id", "t").unwrap(), vec!["i-123"]);
        assert!(flatten(&a, "blank", "t").unwrap().is_empty());
        assert!(flatten(&a, "missing", "t").unwrap().is_empty());
    }

    #[test]
    fn test_flatten_literal_dotted_key() {
        let a = attrs(&[("group.id", "g-1".into())]);
        assert_eq!(flatten(&a, "group.id", "t").unwrap(), vec!["g-1"]);
    }

    #[test]
    fn test_flatten_nested_map() {
        let a = attrs(&[(
            "network",
            AttrValue::Map(
                [
                    ("subnet".to_string(), AttrValue::from("s-1")),
                    ("vpc".to_string(), AttrValue::from("v-1")),
                ]
                .into(),
            ),
        )]);
        assert_eq!(flatten(&a, "network.subnet", "t").unwrap(), vec!["s-1"]);
        // Exhausted path on a map flattens all values.
        assert_eq!(flatten(&a, "network", "t").unwrap(), vec!["s-1", "v-1"]);
        assert!(flatten(&a, "network.missing", "t").unwrap().is_empty());
    }

    #[test]
    fn test_flatten_list_of_maps() {
        let a = attrs(&[(
            "rules",
            AttrValue::List(vec![
                AttrValue::Map([("port".to_string(), AttrValue::from("80"))].into()),
                AttrValue::Map([("port".to_string(), AttrValue::from("443"))].into()),
            ]),
        )]);
        assert_eq!(flatten(&a, "rules.port", "t").unwrap(), vec!["80", "443"]);
    }

    #[test]
    fn test_flatten_set_is_deterministic() {
        let a = attrs(&[(
            "members",
            AttrValue::Set(["b".into(), "a".into(), "c".into()].into()),
        )]);
        assert_eq!(flatten(&a, "members", "t").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_flatten_scalar_midpath_fails() {
        let a = attrs(&[("id", "i-123".into())]);
        assert!(matches!(
            flatten(&a, "id.deeper", "t"),
            Err(Error::AttributePath { .. })
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let a = AttrValue::Map(
            [
                ("id".to_string(), AttrValue::from("x")),
                (
                    "tags".to_string(),
                    AttrValue::List(vec!["a".into(), "b".into()]),
                ),
            ]
            .into(),
        );
        let js = serde_json::to_string(&a).unwrap();
        let back: AttrValue = serde_json::from_str(&js).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn test_set_serializes_sorted() {
        let v = AttrValue::Set(["b".into(), "a".into()].into());
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"["a","b"]"#);
    }
}
