//! Consumers of state changes.
//!
//! The engine only decides which bindings must hear about a change. What a
//! binding does with it is up to the implementation.

use std::rc::Rc;

use pathweave_reactive::{ListIndex, PathweaveResult, StatePropertyRef};
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::renderer::Renderer;

new_key_type! {
    pub struct BindingId;
}

/// A consumer bound to one state ref.
pub trait Binding {
    /// Called at most once per render batch when the bound ref may have changed.
    fn apply_change(&self, renderer: &mut Renderer<'_>) -> PathweaveResult<()>;
}

#[derive(Default)]
pub(crate) struct BindingRegistry {
    bindings: SlotMap<BindingId, (StatePropertyRef, Rc<dyn Binding>)>,
    by_ref: FxHashMap<StatePropertyRef, SmallVec<[BindingId; 2]>>,
}

impl BindingRegistry {
    pub(crate) fn insert(
        &mut self,
        state_ref: StatePropertyRef,
        binding: Rc<dyn Binding>,
    ) -> BindingId {
        let id = self.bindings.insert((state_ref.clone(), binding));
        self.by_ref.entry(state_ref).or_default().push(id);
        id
    }

    pub(crate) fn remove(&mut self, id: BindingId) -> bool {
        let Some((state_ref, _)) = self.bindings.remove(id) else {
            return false;
        };
        if let Some(ids) = self.by_ref.get_mut(&state_ref) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_ref.remove(&state_ref);
            }
        }
        true
    }

    pub(crate) fn get(&self, state_ref: &StatePropertyRef) -> Vec<(BindingId, Rc<dyn Binding>)> {
        self.by_ref
            .get(state_ref)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.bindings.get(*id).map(|(_, b)| (*id, b.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops every binding whose ref belongs to a released identity.
    pub(crate) fn forget(&mut self, released: &FxHashSet<ListIndex>) -> usize {
        let stale: Vec<BindingId> = self
            .bindings
            .iter()
            .filter(|(_, (state_ref, _))| {
                state_ref
                    .list_index()
                    .is_some_and(|list_index| released.contains(&list_index))
            })
            .map(|(id, _)| id)
            .collect();
        for id in &stale {
            self.remove(*id);
        }
        stale.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.bindings.len()
    }
}
