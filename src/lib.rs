//! # Pathweave
//! Pathweave is a dependency tracking and batched update engine for component
//! state addressed by dotted paths.
//!
//! ## Example: Counter
//! ```rust
//! use std::rc::Rc;
//!
//! use pathweave::prelude::*;
//! use serde_json::json;
//!
//! struct Label;
//!
//! impl Binding for Label {
//!     fn apply_change(&self, renderer: &mut Renderer<'_>) -> PathweaveResult<()> {
//!         let text = renderer.state().get("label")?;
//!         assert_eq!(text, json!("count: 1"));
//!         Ok(())
//!     }
//! }
//!
//! let class = StateClass::builder(json!({ "count": 0 }))
//!     .getter("label", |state| {
//!         Ok(json!(format!("count: {}", state.get("count")?)))
//!     })
//!     .build()?;
//! let engine = ComponentEngine::new(ComponentDefinition::new(class).path("label"));
//! let scheduler = Scheduler::new();
//! let component = Component::new(&engine, &scheduler);
//!
//! // Discover that `label` reads `count`.
//! component.create_readonly_state(|state| state.get("label"))?;
//! component.register_binding(component.state_ref("label", None)?, Rc::new(Label));
//!
//! component.update(None, |state| state.set("count", json!(1)))?;
//! scheduler.drain_pending_work()?;
//! # Ok::<(), PathweaveError>(())
//! ```
//!
//! ## Paths and refs
//! Every location in state is named by a path pattern such as `user.name` or
//! `items.*.price`, where `*` stands for "the current element" of a list. A
//! [`StatePropertyRef`] pairs a pattern with the [`ListIndex`] identities of the
//! elements its wildcards stand for. List identities survive reordering: the
//! list diff repositions an existing identity instead of creating a new one.
//!
//! ## Dependencies
//! The [`PathManager`](path_manager::PathManager) knows the structural tree of
//! every path a component uses. Computed members (getters) add dynamic edges
//! the first time they are seen reading another path.
//!
//! ## Updates
//! Writes go through a [`WritableState`]. Each write is enqueued on the
//! component's updater, and the first write of a turn schedules one flush on
//! the [`Scheduler`]. The flush renders queued refs in batches, and each
//! [`Binding`] is notified at most once per batch.

pub mod binding;
pub mod class;
pub mod component;
pub mod config;
pub mod engine;
pub mod path_manager;
pub mod renderer;
pub mod scheduler;
pub mod state;
mod updater;

pub use binding::{Binding, BindingId};
pub use class::{MemberKind, ReservedKey, StateClass, StateClassBuilder};
pub use component::Component;
pub use config::{EngineConfig, STACK_DEPTH};
pub use engine::{ComponentDefinition, ComponentEngine};
pub use pathweave_reactive as reactive;
pub use pathweave_reactive::{
    ListDiff, ListDiffSummary, ListIndex, ListIndexSet, PathInfo, PathweaveError,
    PathweaveResult, StatePropertyRef, WILDCARD,
};
pub use renderer::Renderer;
pub use scheduler::Scheduler;
pub use state::{ExternalSlice, ParentSlice, ReadonlyState, StateView, WritableState};
pub use updater::UpdaterPhase;

pub mod prelude {
    pub use crate::{
        Binding, Component, ComponentDefinition, ComponentEngine, EngineConfig, ListIndex,
        ParentSlice, PathweaveError, PathweaveResult, ReadonlyState, Renderer, STACK_DEPTH,
        Scheduler, StateClass, StatePropertyRef, StateView, WritableState,
    };
}
