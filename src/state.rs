//! State graph model and persisted document
//!
//! A [`StateDocument`] is the durable record of provisioned infrastructure:
//! an ordered list of modules, each mapping state keys to resource records.
//! Records are mutated in place by the transform and inference engines; the
//! document itself is plain data with JSON persistence.

use crate::addr::normalize_path;
use crate::attr::AttrValue;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Format identifier written into every persisted document
pub const STATE_VERSION: u64 = 3;

/// One tracked infrastructure object
///
/// Identity (mode, type, name, index) is encoded in the state key under
/// which the record is stored; `resource_type` repeats the type for
/// convenience, as the persisted format does. `provider` and `id` feed key
/// normalization and may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,

    /// State keys of sibling resources this record depends on
    #[serde(default, rename = "depends_on", skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl ResourceRecord {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }
}

/// A namespace within the state graph, identified by a hierarchical path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleState {
    pub path: Vec<String>,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
}

impl ModuleState {
    /// Create an empty module at `path` (the leading `root` element may be
    /// omitted)
    pub fn new<I>(path: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        Self {
            path: normalize_path(&path),
            resources: BTreeMap::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.len() == 1 && self.path[0] == "root"
    }

    /// Discard all resources while keeping the module wrapper itself
    pub fn clear_resources(&mut self) {
        self.resources.clear();
    }
}

/// The persisted state graph: versioned, with a unique lineage token and an
/// ordered list of modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    pub version: u64,
    pub lineage: String,

    #[serde(default)]
    pub modules: Vec<ModuleState>,
}

impl StateDocument {
    /// Create an empty document with a fresh lineage and a root module
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            lineage: uuid::Uuid::new_v4().to_string(),
            modules: vec![ModuleState::new(["root"])],
        }
    }

    /// The root module. Panics if the document has none; every document
    /// built by this crate has one.
    pub fn root_module(&self) -> &ModuleState {
        self.modules
            .iter()
            .find(|m| m.is_root())
            .expect("state document has no root module")
    }

    /// Mutable access to the root module, creating it if missing
    pub fn root_module_mut(&mut self) -> &mut ModuleState {
        self.add_module(["root"])
    }

    pub fn module_by_path(&self, path: &[String]) -> Option<&ModuleState> {
        let path = normalize_path(path);
        self.modules.iter().find(|m| m.path == path)
    }

    pub fn module_by_path_mut(&mut self, path: &[String]) -> Option<&mut ModuleState> {
        let path = normalize_path(path);
        self.modules.iter_mut().find(|m| m.path == path)
    }

    /// Look up the module at `path`, creating an empty one if absent
    pub fn add_module<I>(&mut self, path: I) -> &mut ModuleState
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        let path = normalize_path(&path);
        let at = match self.modules.iter().position(|m| m.path == path) {
            Some(i) => i,
            None => {
                self.modules.push(ModuleState {
                    path,
                    resources: BTreeMap::new(),
                });
                self.modules.len() - 1
            }
        };
        &mut self.modules[at]
    }

    /// Union in all resources from `other`, ignoring keys already present
    pub fn merge(&mut self, other: &StateDocument) {
        for om in &other.modules {
            match self.module_by_path_mut(&om.path) {
                Some(m) => {
                    for (k, r) in &om.resources {
                        m.resources.entry(k.clone()).or_insert_with(|| r.clone());
                    }
                }
                None => self.modules.push(om.clone()),
            }
        }
    }

    /// Remove every resource whose module path and key appear in `other`
    pub fn subtract(&mut self, other: &StateDocument) {
        for om in &other.modules {
            if let Some(m) = self.module_by_path_mut(&om.path) {
                for k in om.resources.keys() {
                    m.resources.remove(k);
                }
            }
        }
    }

    /// Clear the dependency list of every resource
    pub fn clear_dependencies(&mut self) {
        for m in &mut self.modules {
            for r in m.resources.values_mut() {
                r.dependencies.clear();
            }
        }
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn to_writer(&self, writer: impl Write) -> Result<()> {
        Ok(serde_json::to_writer_pretty(writer, self)?)
    }

    /// Load a document from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let doc = Self::from_reader(BufReader::new(File::open(path)?))?;
        log::debug!("loaded state from {}", path.display());
        Ok(doc)
    }

    /// Save the document to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut w = BufWriter::new(File::create(path)?);
        self.to_writer(&mut w)?;
        w.flush()?;
        log::debug!("saved state to {}", path.display());
        Ok(())
    }
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::new()
    }
}
