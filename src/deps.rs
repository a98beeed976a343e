//! Dependency inference
//!
//! A [`DepMap`] is a rule table correlating attribute paths across resource
//! types: "a `widget`'s `ref` attribute holds the `id` of a `gadget`".
//! [`DepMap::infer`] fills in dependency edges for resources whose edges
//! are missing, typically because the state was built from a scan rather
//! than applied from configuration. Rule tables are produced offline and
//! loaded as static data.

use crate::attr::flatten;
use crate::error::{Error, Result};
use crate::state::StateDocument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// One inference rule: the destination attribute `attr` holds values drawn
/// from `src_attr` of resources of type `src_type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepSpec {
    pub attr: String,
    pub src_type: String,
    pub src_attr: String,
}

impl DepSpec {
    pub fn new(
        attr: impl Into<String>,
        src_type: impl Into<String>,
        src_attr: impl Into<String>,
    ) -> Self {
        Self {
            attr: attr.into(),
            src_type: src_type.into(),
            src_attr: src_attr.into(),
        }
    }
}

/// Rule table mapping a destination resource type to its inference rules,
/// applied in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepMap(BTreeMap<String, Vec<DepSpec>>);

impl DepMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource_type: impl Into<String>, specs: Vec<DepSpec>) {
        self.0.insert(resource_type.into(), specs);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Move all entries of `other` into this table. Panics if a resource
    /// type appears in both; rule tables are assembled per provider and
    /// must not overlap.
    pub fn merge(&mut self, other: DepMap) {
        for (k, v) in other.0 {
            match self.0.entry(k) {
                Entry::Occupied(e) => panic!("duplicate resource type in rule table: {}", e.key()),
                Entry::Vacant(e) => {
                    e.insert(v);
                }
            }
        }
    }

    /// Add inferred dependency edges to every resource in `doc`
    ///
    /// Existing edges are never removed. Within each module, a destination
    /// resource gains an edge to every same-module source whose single
    /// source-attribute value appears among the destination's values. A
    /// source attribute yielding more than one value is a defect in the
    /// rule table and aborts the pass with [`Error::AmbiguousSource`];
    /// edges added to earlier modules remain.
    pub fn infer(&self, doc: &mut StateDocument) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        let mut total = 0usize;
        for m in &mut doc.modules {
            let additions = {
                let mut by_type: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
                for (k, r) in &m.resources {
                    by_type
                        .entry(r.resource_type.as_str())
                        .or_default()
                        .push(k.as_str());
                }
                let mut additions: Vec<(String, Vec<String>)> = Vec::new();
                for (dst_type, dst_keys) in &by_type {
                    let Some(specs) = self.0.get(*dst_type) else {
                        continue;
                    };
                    for &dst_key in dst_keys {
                        let dst = &m.resources[dst_key];
                        let mut added: Vec<String> = Vec::new();
                        for spec in specs {
                            let vals = flatten(&dst.attributes, &spec.attr, &dst.resource_type)?;
                            if vals.is_empty() {
                                continue;
                            }
                            let Some(src_keys) = by_type.get(spec.src_type.as_str()) else {
                                continue;
                            };
                            for &src_key in src_keys {
                                if src_key == dst_key {
                                    continue;
                                }
                                let src = &m.resources[src_key];
                                let sv =
                                    flatten(&src.attributes, &spec.src_attr, &src.resource_type)?;
                                match sv.as_slice() {
                                    [] => {}
                                    [v] if vals.contains(v) => added.push(src_key.to_string()),
                                    [_] => {}
                                    _ => {
                                        return Err(Error::AmbiguousSource {
                                            src_type: spec.src_type.clone(),
                                            src_attr: spec.src_attr.clone(),
                                        });
                                    }
                                }
                            }
                        }
                        if !added.is_empty() {
                            additions.push((dst_key.to_string(), added));
                        }
                    }
                }
                additions
            };
            for (key, mut added) in additions {
                if let Some(r) = m.resources.get_mut(&key) {
                    total += added.len();
                    r.dependencies.append(&mut added);
                    r.dependencies.sort();
                    r.dependencies.dedup();
                }
            }
        }
        log::debug!("inferred {total} dependency edges");
        Ok(())
    }
}

impl FromIterator<(String, Vec<DepSpec>)> for DepMap {
    fn from_iter<T: IntoIterator<Item = (String, Vec<DepSpec>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
