//! # pathweave_reactive
//!
//! The identity layer of pathweave: interned path patterns, stable list element
//! identities, interned `(path, identity)` refs and the identity preserving list
//! diff. Everything here is single threaded and owned by one component engine.

mod error;
mod list_diff;
mod list_index;
mod path;
mod state_ref;

pub use error::{PathweaveError, PathweaveResult};
pub use list_diff::{diff, ListDiff, ListDiffSummary, ListIndexSet};
pub use list_index::{ListIndex, ListIndexArena};
pub use path::{PathId, PathInfo, PathResolver, WILDCARD};
pub use state_ref::{RefRegistry, StatePropertyRef};
