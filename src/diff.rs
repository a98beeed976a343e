//! Changeset structure
//!
//! A [`ChangeSet`] is the planned counterpart of a state document: per
//! module, per state key, the attribute changes (or destruction) a plan
//! would apply. Computing changesets belongs to the planner; this crate
//! only models them so a [`StateTransform`](crate::StateTransform) can
//! remap their addresses alongside the state.

use crate::addr::normalize_path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One attribute transition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrChange {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub old: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub new: String,
}

/// Planned changes for one resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub destroy: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrChange>,
}

impl ResourceChange {
    pub fn is_empty(&self) -> bool {
        !self.destroy && self.attributes.is_empty()
    }
}

/// Planned changes for one module, keyed by state key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleChange {
    pub path: Vec<String>,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceChange>,
}

/// Planned changes for an entire state graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub modules: Vec<ModuleChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.iter().all(|m| m.resources.is_empty())
    }

    pub fn module_by_path(&self, path: &[String]) -> Option<&ModuleChange> {
        let path = normalize_path(path);
        self.modules.iter().find(|m| normalize_path(&m.path) == path)
    }

    /// Look up the module at `path`, creating an empty one if absent
    pub fn module_mut(&mut self, path: &[String]) -> &mut ModuleChange {
        let path = normalize_path(path);
        let at = match self
            .modules
            .iter()
            .position(|m| normalize_path(&m.path) == path)
        {
            Some(i) => i,
            None => {
                self.modules.push(ModuleChange {
                    path,
                    resources: BTreeMap::new(),
                });
                self.modules.len() - 1
            }
        };
        &mut self.modules[at]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transform::StateTransform;

    fn changeset(keys: &[&str]) -> ChangeSet {
        let mut cs = ChangeSet::new();
        let m = cs.module_mut(&[]);
        for key in keys {
            let mut change = ResourceChange::default();
            change.attributes.insert(
                "id".into(),
                AttrChange {
                    old: String::new(),
                    new: format!("{key}-id"),
                },
            );
            m.resources.insert((*key).to_string(), change);
        }
        cs
    }

    #[test]
    fn test_remap_renames_and_deletes() {
        let mut cs = changeset(&["a.a", "b.b", "c.c"]);
        let st: StateTransform = [("a.a", "w.w"), ("b.b", ""), ("c.c", "module.x.c.c")]
            .into_iter()
            .collect();
        st.apply_to_changeset(&mut cs).unwrap();

        let root = cs.module_by_path(&[]).unwrap();
        let keys: Vec<_> = root.resources.keys().cloned().collect();
        assert_eq!(keys, ["w.w"]);
        assert_eq!(root.resources["w.w"].attributes["id"].new, "a.a-id");
        let x = cs
            .module_by_path(&["x".to_string()])
            .expect("module x created");
        assert!(x.resources.contains_key("c.c"));
    }

    #[test]
    fn test_remap_replacement_favors_mapped_change() {
        let mut cs = changeset(&["a.a", "b.b"]);
        let st: StateTransform = [("a.a", "b.b")].into_iter().collect();
        st.apply_to_changeset(&mut cs).unwrap();

        let root = cs.module_by_path(&[]).unwrap();
        let keys: Vec<_> = root.resources.keys().cloned().collect();
        assert_eq!(keys, ["b.b"]);
        assert_eq!(root.resources["b.b"].attributes["id"].new, "a.a-id");
    }

    #[test]
    fn test_remap_collision_fails() {
        let mut cs = changeset(&["a.a", "b.b"]);
        let st: StateTransform = [("a.a", "c.c"), ("b.b", "c.c")].into_iter().collect();
        assert!(matches!(
            st.apply_to_changeset(&mut cs),
            Err(Error::AddressCollision(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let cs = changeset(&["a.a"]);
        let js = serde_json::to_string(&cs).unwrap();
        let back: ChangeSet = serde_json::from_str(&js).unwrap();
        assert_eq!(back, cs);
    }
}
