//! One render batch.
//!
//! The renderer walks the path graph from every changed ref: structural
//! children first, then the computed members that were seen reading it. Each
//! binding hears about the batch at most once, and all of them read through one
//! shared [`ReadonlyState`] so sibling updates observe the same values.

use std::rc::Rc;

use pathweave_reactive::{
    ListDiff, ListIndex, PathweaveError, PathweaveResult, StatePropertyRef,
};
use rustc_hash::FxHashSet;
use serde_json::Value;
use tracing::trace;

use crate::{binding::BindingId, component::Component, state::ReadonlyState};

pub struct Renderer<'a> {
    component: &'a Component,
    state: ReadonlyState<'a>,
    batch: u64,
    visited_refs: FxHashSet<StatePropertyRef>,
    visited_bindings: FxHashSet<BindingId>,
    current: Option<StatePropertyRef>,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(component: &'a Component, batch: u64) -> Self {
        Self {
            component,
            state: ReadonlyState::new(component),
            batch,
            visited_refs: FxHashSet::default(),
            visited_bindings: FxHashSet::default(),
            current: None,
        }
    }

    /// Sequence number of this batch within the component.
    pub fn batch(&self) -> u64 {
        self.batch
    }

    pub fn component(&self) -> &'a Component {
        self.component
    }

    /// The batch's shared read-only view.
    pub fn state(&mut self) -> &mut ReadonlyState<'a> {
        &mut self.state
    }

    /// The ref whose bindings are being notified.
    pub fn current_ref(&self) -> Option<&StatePropertyRef> {
        self.current.as_ref()
    }

    pub fn read(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<Value> {
        self.state.0.read(state_ref)
    }

    /// This cycle's diff of a list ref, computing it if nobody has yet.
    pub fn list_diff(&mut self, list_ref: &StatePropertyRef) -> PathweaveResult<Rc<ListDiff>> {
        if let Some(diff) = self.component.updater().cycle_diff(list_ref) {
            return Ok(diff);
        }
        let value = self.read(list_ref)?;
        self.component.calc_list_diff(list_ref, &value)?;
        self.component
            .updater()
            .cycle_diff(list_ref)
            .ok_or_else(|| PathweaveError::NotAList {
                pattern: list_ref.pattern().to_string(),
            })
    }

    pub(crate) fn render(&mut self, refs: &[StatePropertyRef]) -> PathweaveResult<()> {
        for state_ref in refs {
            self.render_ref(state_ref)?;
        }
        for state_ref in refs {
            self.render_ancestors(state_ref)?;
        }
        Ok(())
    }

    /// Notifies the bindings and dependents of every strict prefix of
    /// `state_ref`, without walking the prefixes' other children.
    fn render_ancestors(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<()> {
        let engine = self.component.engine().clone();
        if state_ref.live_list_index(&engine.arena()).is_err() {
            return Ok(());
        }
        for info in state_ref.info().ancestor_infos() {
            let ancestor = engine.state_ref(info, state_ref.list_index())?;
            if self.visited_refs.contains(&ancestor) {
                continue;
            }
            trace!(key = ancestor.key(), "render ancestor");
            self.notify(&ancestor)?;
            self.render_dependents(&ancestor)?;
        }
        Ok(())
    }

    fn render_ref(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<()> {
        if !self.visited_refs.insert(state_ref.clone()) {
            return Ok(());
        }
        let engine = self.component.engine().clone();
        if !engine.path_manager().contains(state_ref.pattern()) {
            return Err(PathweaveError::UnknownPath {
                pattern: state_ref.pattern().to_string(),
            });
        }
        if state_ref.live_list_index(&engine.arena()).is_err() {
            trace!(key = state_ref.key(), "skipping ref of a released element");
            return Ok(());
        }

        self.notify(state_ref)?;

        let children: Vec<Rc<str>> = engine
            .path_manager()
            .static_children(state_ref.pattern())
            .cloned()
            .collect();
        for child in children {
            let info = engine.resolve(&child);
            if info.is_wildcard() {
                let diff = self.list_diff(state_ref)?;
                for list_index in &diff.adds {
                    let child_ref = engine.state_ref(&info, Some(*list_index))?;
                    self.render_ref(&child_ref)?;
                }
            } else {
                let child_ref = engine.state_ref(&info, state_ref.list_index())?;
                self.render_ref(&child_ref)?;
            }
        }

        self.render_dependents(state_ref)
    }

    /// Renders every computed member seen reading `state_ref`'s path, fanned
    /// out over the live identities of its wildcards.
    fn render_dependents(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<()> {
        let engine = self.component.engine().clone();
        let dependents: Vec<Rc<str>> = engine
            .path_manager()
            .dynamic_dependents(state_ref.pattern())
            .cloned()
            .collect();
        for dependent in dependents {
            let info = engine.resolve(&dependent);
            let mut frontier: Vec<Option<ListIndex>> = vec![None];
            for list_info in info.wildcard_parent_infos() {
                let mut next = Vec::new();
                for parent in frontier {
                    let list_ref = engine.state_ref(list_info, parent)?;
                    let identities = self.state.0.list_identities(&list_ref)?;
                    next.extend(identities.into_iter().map(Some));
                }
                frontier = next;
            }
            for list_index in frontier {
                let dependent_ref = engine.state_ref(&info, list_index)?;
                self.render_ref(&dependent_ref)?;
            }
        }
        Ok(())
    }

    fn notify(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<()> {
        let bindings = self.component.bindings_for(state_ref);
        if bindings.is_empty() {
            return Ok(());
        }
        let previous = self.current.replace(state_ref.clone());
        for (id, binding) in bindings {
            if self.visited_bindings.insert(id) {
                binding.apply_change(self)?;
            }
        }
        self.current = previous;
        Ok(())
    }
}
