//! # Stategraph
//!
//! Graph rewriting and dependency inference for declarative infrastructure
//! state.
//!
//! A state document records provisioned infrastructure as a directed graph:
//! modules hold resource records under compact state keys, and records carry
//! attribute trees plus dependency edges to sibling resources. This crate
//! provides the two operations that rewrite that graph:
//!
//! - **[`StateTransform`]**: an address-to-address remapping that renames,
//!   moves, merges, or deletes resources while keeping every dependency
//!   edge consistent. Applied atomically; an error leaves the graph
//!   untouched.
//! - **[`DepMap`]**: a rule table that reconstructs missing dependency
//!   edges by correlating attribute values between resources of different
//!   types.
//!
//! ## Example
//!
//! ```
//! use stategraph::{ResourceRecord, StateDocument, StateTransform};
//!
//! let mut doc = StateDocument::new();
//! let m = doc.root_module_mut();
//! m.resources.insert("gadget.g".into(), ResourceRecord::new("gadget"));
//! let mut w = ResourceRecord::new("widget");
//! w.dependencies = vec!["gadget.g".into()];
//! m.resources.insert("widget.w".into(), w);
//!
//! // Rename the gadget; its dependent follows.
//! let st: StateTransform = [("gadget.g", "gadget.main")].into_iter().collect();
//! st.apply(&mut doc)?;
//! let m = doc.root_module();
//! assert_eq!(m.resources["widget.w"].dependencies, ["gadget.main"]);
//! # Ok::<(), stategraph::Error>(())
//! ```
//!
//! Parsing configuration, planning against live infrastructure, and
//! executing changes are all out of scope; this is an in-process library
//! consumed by a higher-level orchestration layer.

pub mod addr;
pub mod attr;
pub mod deps;
pub mod diff;
pub mod error;
pub mod state;
pub mod transform;

// Re-export main types at crate root
pub use addr::{
    NameNormalizer, ResourceAddress, ResourceKey, ResourceMode, address_to_key, key_to_address,
};
pub use attr::{AttrValue, flatten};
pub use deps::{DepMap, DepSpec};
pub use diff::{AttrChange, ChangeSet, ModuleChange, ResourceChange};
pub use error::{Error, Result};
pub use state::{ModuleState, ResourceRecord, STATE_VERSION, StateDocument};
pub use transform::{StateTransform, normalize_keys};
