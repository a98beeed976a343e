//! State transform engine
//!
//! A [`StateTransform`] maps source addresses to destination addresses and
//! can rename resources, move them between modules, merge one resource over
//! another, and delete them. `apply` rewrites the whole graph in phases:
//! index, remap, resolve placement, swap, rewire. Every fallible step runs
//! before the swap, so a returned error always leaves the document
//! byte-for-byte unchanged.

use crate::addr::{
    NameNormalizer, ResourceAddress, ResourceKey, ResourceMode, key_to_address, normalize_path,
};
use crate::diff::ChangeSet;
use crate::error::{Error, Result};
use crate::state::{ModuleState, ResourceRecord, StateDocument};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// What the remap phase decided for one graph node
enum Fate {
    Kept,
    Deleted,
    Moved(ResourceAddress),
    ReplacedBy(usize),
}

/// Where a surviving node lands after the swap
#[derive(Clone, Copy)]
enum Place {
    Existing(usize),
    Staged(usize),
}

struct Node {
    /// Canonical address; rewritten to the destination when mapped
    addr: String,
    /// Original state key within the source module
    key: String,
    /// Source module index
    module: usize,
    /// Dependency links resolved against sibling keys; `None` is dangling
    deps: Vec<Option<usize>>,
    fate: Fate,
}

/// An address-to-address remapping of the state graph
///
/// Keys and values are resource addresses; an empty value deletes the
/// resource. Mapping two sources onto one destination is a replacement and
/// resolves in favor of the explicitly mapped source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateTransform(BTreeMap<String, String>);

impl StateTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, src: impl Into<String>, dst: impl Into<String>) {
        self.0.insert(src.into(), dst.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Look up the mapping for a node address. Root resources may be
    /// addressed with or without the `module.root.` qualifier.
    fn lookup(&self, addr: &str, is_root: bool) -> Option<&str> {
        if let Some(v) = self.0.get(addr) {
            return Some(v);
        }
        if is_root {
            if let Some(v) = self.0.get(&format!("module.root.{addr}")) {
                return Some(v);
            }
        }
        None
    }

    /// Apply the transform to `doc`. Resources named by the transform but
    /// absent from the graph are ignored. On error the document is
    /// unchanged.
    pub fn apply(&self, doc: &mut StateDocument) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }

        // Phase 1: index every resource by canonical address and resolve
        // dependency links against sibling keys.
        let mut nodes: Vec<Node> = Vec::new();
        let mut by_addr: HashMap<String, usize> = HashMap::new();
        for (mi, m) in doc.modules.iter().enumerate() {
            let mut module_map: HashMap<&str, usize> = HashMap::with_capacity(m.resources.len());
            for key in m.resources.keys() {
                let addr = key_to_address(&m.path, key)?;
                let h = nodes.len();
                assert!(
                    by_addr.insert(addr.clone(), h).is_none(),
                    "address collision in input state: {addr}"
                );
                module_map.insert(key.as_str(), h);
                nodes.push(Node {
                    addr,
                    key: key.clone(),
                    module: mi,
                    deps: Vec::new(),
                    fate: Fate::Kept,
                });
            }
            for (key, record) in &m.resources {
                let h = module_map[key.as_str()];
                nodes[h].deps = record
                    .dependencies
                    .iter()
                    .map(|d| module_map.get(d.as_str()).copied())
                    .collect();
            }
        }

        // Phase 2: remap addresses, detect collisions, mark replacements.
        let mut final_addr: HashMap<String, usize> = HashMap::with_capacity(nodes.len());
        let mut explicit = vec![false; nodes.len()];
        for h in 0..nodes.len() {
            let is_root = doc.modules[nodes[h].module].is_root();
            match self.lookup(&nodes[h].addr, is_root).map(str::to_string) {
                None => match final_addr.entry(nodes[h].addr.clone()) {
                    Entry::Vacant(e) => {
                        e.insert(h);
                    }
                    // An explicitly mapped node already claimed this
                    // address: the kept node is superseded, not a
                    // collision.
                    Entry::Occupied(e) => nodes[h].fate = Fate::ReplacedBy(*e.get()),
                },
                Some(dst) if dst.is_empty() => nodes[h].fate = Fate::Deleted,
                Some(dst) => {
                    let dest = ResourceAddress::parse(&dst)?;
                    let canon = dest.to_string();
                    if let Some(&u) = final_addr.get(&canon) {
                        if explicit[u] {
                            return Err(Error::AddressCollision(canon));
                        }
                        nodes[u].fate = Fate::ReplacedBy(h);
                    }
                    explicit[h] = true;
                    nodes[h].addr = canon.clone();
                    nodes[h].fate = Fate::Moved(dest);
                    final_addr.insert(canon, h);
                }
            }
        }

        // Phase 3: decode destination addresses into module/key placements,
        // staging new modules without touching the document.
        let mod_paths: Vec<Vec<String>> = doc
            .modules
            .iter()
            .map(|m| normalize_path(&m.path))
            .collect();
        let mut staged: Vec<ModuleState> = Vec::new();
        let mut place: Vec<Option<Place>> = (0..nodes.len()).map(|_| None).collect();
        let mut final_key: Vec<String> = nodes.iter().map(|n| n.key.clone()).collect();
        for h in 0..nodes.len() {
            match &nodes[h].fate {
                Fate::Kept => place[h] = Some(Place::Existing(nodes[h].module)),
                Fate::Moved(dest) => {
                    final_key[h] = dest.key.to_string();
                    let landing = mod_paths
                        .iter()
                        .position(|p| *p == dest.path)
                        .map(Place::Existing)
                        .or_else(|| {
                            staged
                                .iter()
                                .position(|m| m.path == dest.path)
                                .map(Place::Staged)
                        })
                        .unwrap_or_else(|| {
                            staged.push(ModuleState::new(dest.path.clone()));
                            Place::Staged(staged.len() - 1)
                        });
                    place[h] = Some(landing);
                }
                Fate::Deleted | Fate::ReplacedBy(_) => {}
            }
        }

        // Phase 4: swap. Strip every module's resource map and attach the
        // staged destination modules. Nothing after this point can fail.
        let mut pools: Vec<BTreeMap<String, ResourceRecord>> = doc
            .modules
            .iter_mut()
            .map(|m| std::mem::take(&mut m.resources))
            .collect();
        let existing = doc.modules.len();
        doc.modules.extend(staged);
        let at = |p: Place| match p {
            Place::Existing(i) => i,
            Place::Staged(i) => existing + i,
        };

        // Phase 5: reinsert surviving records and rewire dependencies.
        // Replacement indirection is followed exactly one level; edges to
        // deleted or dangling nodes, edges that left the module, and
        // self-references are dropped.
        let mut moved = 0usize;
        let mut dropped = 0usize;
        for h in 0..nodes.len() {
            let target = match (&nodes[h].fate, place[h]) {
                (Fate::Kept | Fate::Moved(_), Some(p)) => at(p),
                _ => {
                    dropped += 1;
                    continue;
                }
            };
            if !matches!(nodes[h].fate, Fate::Kept) {
                moved += 1;
            }
            let mut deps: Vec<String> = Vec::new();
            for d in &nodes[h].deps {
                let Some(mut d) = *d else { continue };
                if let Fate::ReplacedBy(r) = nodes[d].fate {
                    d = r;
                }
                if !matches!(nodes[d].fate, Fate::Kept | Fate::Moved(_)) {
                    continue;
                }
                match place[d] {
                    Some(p) if at(p) == target => {}
                    _ => continue,
                }
                if final_key[d] == final_key[h] {
                    continue;
                }
                deps.push(final_key[d].clone());
            }
            deps.sort();
            deps.dedup();
            if let Some(mut record) = pools[nodes[h].module].remove(&nodes[h].key) {
                record.dependencies = deps;
                let prev = doc.modules[target]
                    .resources
                    .insert(final_key[h].clone(), record);
                assert!(prev.is_none(), "state key collision: {}", final_key[h]);
            }
        }
        log::debug!(
            "transform applied: {moved} moved or replaced, {dropped} removed, {} total",
            nodes.len()
        );
        Ok(())
    }

    /// The reverse mapping, or `None` when the transform deletes resources
    /// or maps two sources onto one destination
    pub fn inverse(&self) -> Option<StateTransform> {
        let mut inv = BTreeMap::new();
        for (src, dst) in &self.0 {
            if dst.is_empty() || inv.insert(dst.clone(), src.clone()).is_some() {
                return None;
            }
        }
        Some(StateTransform(inv))
    }

    /// Apply the same address remapping to a changeset. Replacement and
    /// deletion behave as in [`apply`](Self::apply); changesets carry no
    /// dependency edges, so there is nothing to rewire.
    pub fn apply_to_changeset(&self, cs: &mut ChangeSet) -> Result<()> {
        if self.0.is_empty() {
            return Ok(());
        }

        enum SlotFate {
            Kept,
            Deleted,
            Moved(ResourceAddress),
        }
        struct Slot {
            module: usize,
            key: String,
            fate: SlotFate,
        }

        let mut slots: Vec<Slot> = Vec::new();
        let mut final_addr: HashMap<String, usize> = HashMap::new();
        let mut replaced: Vec<bool> = Vec::new();
        let mut explicit: Vec<bool> = Vec::new();
        for (mi, m) in cs.modules.iter().enumerate() {
            let is_root = normalize_path(&m.path) == ["root"];
            for key in m.resources.keys() {
                let addr = key_to_address(&m.path, key)?;
                let h = slots.len();
                replaced.push(false);
                explicit.push(false);
                let fate = match self.lookup(&addr, is_root).map(str::to_string) {
                    None => {
                        match final_addr.entry(addr) {
                            Entry::Vacant(e) => {
                                e.insert(h);
                            }
                            Entry::Occupied(_) => replaced[h] = true,
                        }
                        SlotFate::Kept
                    }
                    Some(dst) if dst.is_empty() => SlotFate::Deleted,
                    Some(dst) => {
                        let dest = ResourceAddress::parse(&dst)?;
                        let canon = dest.to_string();
                        if let Some(&u) = final_addr.get(&canon) {
                            if explicit[u] {
                                return Err(Error::AddressCollision(canon));
                            }
                            replaced[u] = true;
                        }
                        explicit[h] = true;
                        final_addr.insert(canon, h);
                        SlotFate::Moved(dest)
                    }
                };
                slots.push(Slot {
                    module: mi,
                    key: key.clone(),
                    fate,
                });
            }
        }

        let mut pools: Vec<_> = cs
            .modules
            .iter_mut()
            .map(|m| std::mem::take(&mut m.resources))
            .collect();
        for (h, slot) in slots.iter().enumerate() {
            if replaced[h] {
                continue;
            }
            let Some(change) = pools[slot.module].remove(&slot.key) else {
                continue;
            };
            match &slot.fate {
                SlotFate::Kept => {
                    cs.modules[slot.module]
                        .resources
                        .insert(slot.key.clone(), change);
                }
                SlotFate::Moved(dest) => {
                    cs.module_mut(&dest.path)
                        .resources
                        .insert(dest.key.to_string(), change);
                }
                SlotFate::Deleted => {}
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for StateTransform {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for StateTransform {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Build a transform that renames every managed resource to the normalized
/// form of its provider name and ID
///
/// Resources whose name already matches, data resources, and records
/// without an ID are left alone. The result may be empty.
pub fn normalize_keys(doc: &StateDocument, norm: &NameNormalizer) -> Result<StateTransform> {
    let mut st = StateTransform::new();
    for m in &doc.modules {
        for (key, r) in &m.resources {
            let parsed = ResourceKey::parse(key)?;
            if parsed.mode != ResourceMode::Managed || r.id.is_empty() {
                continue;
            }
            let name = norm.normalize(&format!("{}_{}", r.provider, r.id));
            if parsed.name == name {
                continue;
            }
            let mut renamed = parsed.clone();
            renamed.name = name;
            let src = key_to_address(&m.path, key)?;
            let dst = key_to_address(&m.path, &renamed.to_string())?;
            st.insert(src, dst);
        }
    }
    Ok(st)
}
