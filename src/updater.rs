//! Write bookkeeping between a mutation and the render that follows it.

use std::{
    cell::{Cell, RefCell},
    mem,
    rc::Rc,
};

use pathweave_reactive::{
    diff, ListDiff, ListIndex, ListIndexArena, ListIndexSet, PathweaveError, PathweaveResult,
    StatePropertyRef,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tracing::{debug, trace};

/// Where a component is in its write → render cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdaterPhase {
    Idle,
    /// Writes are queued but no flush has been scheduled yet.
    Collecting,
    FlushScheduled,
    Rendering,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SavedList {
    pub(crate) value: Vec<Value>,
    pub(crate) list_indexes: Vec<ListIndex>,
}

struct CycleDiff {
    revision: u64,
    diff: Rc<ListDiff>,
}

#[derive(Default)]
pub(crate) struct Updater {
    revision: Cell<u64>,
    versions: RefCell<FxHashMap<Rc<str>, u64>>,
    queue: RefCell<Vec<StatePropertyRef>>,
    scheduled: Cell<bool>,
    rendering: Cell<bool>,
    batches: Cell<u64>,
    saved_lists: RefCell<FxHashMap<StatePropertyRef, SavedList>>,
    cycle_diffs: RefCell<FxHashMap<StatePropertyRef, CycleDiff>>,
    overwrites: RefCell<FxHashMap<StatePropertyRef, ListIndexSet>>,
    pending_release: RefCell<Vec<ListIndex>>,
}

impl Updater {
    pub(crate) fn revision(&self) -> u64 {
        self.revision.get()
    }

    /// Whether `pattern` was possibly written after `revision`.
    pub(crate) fn is_stale(&self, pattern: &str, revision: u64) -> bool {
        self.versions
            .borrow()
            .get(pattern)
            .is_some_and(|written| *written > revision)
    }

    pub(crate) fn phase(&self) -> UpdaterPhase {
        if self.rendering.get() {
            UpdaterPhase::Rendering
        } else if self.scheduled.get() {
            UpdaterPhase::FlushScheduled
        } else if !self.queue.borrow().is_empty() {
            UpdaterPhase::Collecting
        } else {
            UpdaterPhase::Idle
        }
    }

    pub(crate) fn batches(&self) -> u64 {
        self.batches.get()
    }

    /// Records a write to `state_ref`, marking every path in `affected` as
    /// changed. Returns whether the caller must schedule a flush.
    pub(crate) fn enqueue(
        &self,
        state_ref: &StatePropertyRef,
        affected: &[Rc<str>],
    ) -> bool {
        let revision = self.revision.get() + 1;
        self.revision.set(revision);
        {
            let mut versions = self.versions.borrow_mut();
            for path in affected {
                versions.insert(path.clone(), revision);
            }
        }
        self.queue.borrow_mut().push(state_ref.clone());
        trace!(pattern = state_ref.pattern(), key = state_ref.key(), revision, "enqueue ref");

        if self.scheduled.get() || self.rendering.get() {
            return false;
        }
        self.scheduled.set(true);
        true
    }

    pub(crate) fn begin_flush(&self) {
        self.scheduled.set(false);
        self.rendering.set(true);
    }

    pub(crate) fn end_flush(&self) {
        self.rendering.set(false);
    }

    pub(crate) fn take_queue(&self) -> Vec<StatePropertyRef> {
        mem::take(&mut *self.queue.borrow_mut())
    }

    pub(crate) fn next_batch(&self) -> u64 {
        let batch = self.batches.get() + 1;
        self.batches.set(batch);
        batch
    }

    /// Memoized diff of `state_ref` for this cycle, unless a later write made
    /// it stale.
    pub(crate) fn cycle_diff(&self, state_ref: &StatePropertyRef) -> Option<Rc<ListDiff>> {
        let diffs = self.cycle_diffs.borrow();
        let entry = diffs.get(state_ref)?;
        if self.is_stale(state_ref.pattern(), entry.revision) {
            return None;
        }
        Some(entry.diff.clone())
    }

    /// Diffs `value` against the saved snapshot of `state_ref`.
    ///
    /// The new snapshot is persisted only when something changed. Returns
    /// whether anything did.
    pub(crate) fn calc_list_diff(
        &self,
        arena: &mut ListIndexArena,
        state_ref: &StatePropertyRef,
        value: &Value,
    ) -> PathweaveResult<bool> {
        if let Some(diff) = self.cycle_diff(state_ref) {
            return Ok(!diff.same);
        }
        let items: &[Value] = match value {
            Value::Array(items) => items,
            Value::Null => &[],
            _ => {
                return Err(PathweaveError::NotAList {
                    pattern: state_ref.pattern().to_string(),
                });
            }
        };
        let parent = state_ref.live_list_index(arena)?;
        let saved = self
            .saved_lists
            .borrow()
            .get(state_ref)
            .cloned()
            .unwrap_or_default();
        let mut result = diff(
            arena,
            state_ref.pattern(),
            parent,
            Some(saved.value.as_slice()),
            Some(items),
            &saved.list_indexes,
        )?;
        self.pending_release
            .borrow_mut()
            .extend(result.removes.iter().copied());
        if let Some(overwrites) = self.overwrites.borrow_mut().remove(state_ref) {
            let overwrites: ListIndexSet = overwrites
                .into_iter()
                .filter(|list_index| result.new_indexes.contains(list_index))
                .collect();
            if !overwrites.is_empty() {
                result.same = false;
            }
            result.overwrites = overwrites;
        }

        if !result.same {
            self.saved_lists.borrow_mut().insert(
                state_ref.clone(),
                SavedList {
                    value: result.new_value.clone(),
                    list_indexes: result.new_indexes.clone(),
                },
            );
        }

        // A diff not rendered yet still owes its changes to the next render.
        let previous = self.cycle_diffs.borrow_mut().remove(state_ref);
        if let Some(previous) = previous {
            merge_unrendered(&previous.diff, &mut result);
        }
        debug!(pattern = state_ref.pattern(), summary = ?result.summary(), "list diff");

        let changed = !result.same;
        self.cycle_diffs.borrow_mut().insert(
            state_ref.clone(),
            CycleDiff {
                revision: self.revision.get(),
                diff: Rc::new(result),
            },
        );
        Ok(changed)
    }

    /// Replaces one element of a saved snapshot in place, keeping its identity.
    ///
    /// With `overwrite`, the identity is also reported in the next diff's
    /// `overwrites`.
    pub(crate) fn patch_saved_element(
        &self,
        list_ref: &StatePropertyRef,
        list_index: ListIndex,
        position: usize,
        value: Value,
        overwrite: bool,
    ) {
        if let Some(saved) = self.saved_lists.borrow_mut().get_mut(list_ref) {
            if saved.list_indexes.get(position) == Some(&list_index) {
                if let Some(slot) = saved.value.get_mut(position) {
                    *slot = value;
                }
            }
        }
        if overwrite {
            self.overwrites
                .borrow_mut()
                .entry(list_ref.clone())
                .or_default()
                .insert(list_index);
        }
    }

    pub(crate) fn saved_list(&self, state_ref: &StatePropertyRef) -> Option<SavedList> {
        self.saved_lists.borrow().get(state_ref).cloned()
    }

    /// Ends a render cycle, returning identities that are ready to be released.
    pub(crate) fn end_cycle(&self) -> Vec<ListIndex> {
        self.cycle_diffs.borrow_mut().clear();
        mem::take(&mut *self.pending_release.borrow_mut())
    }

    /// Drops list snapshots owned by released identities.
    pub(crate) fn forget(&self, released: &FxHashSet<ListIndex>) {
        let owned = |state_ref: &StatePropertyRef| {
            state_ref
                .list_index()
                .is_some_and(|list_index| released.contains(&list_index))
        };
        self.saved_lists.borrow_mut().retain(|state_ref, _| !owned(state_ref));
        self.overwrites.borrow_mut().retain(|state_ref, _| !owned(state_ref));
    }
}

/// Folds a diff that was computed but never rendered into its successor, so
/// the successor still reports the earlier adds and moves relative to the last
/// rendered snapshot.
fn merge_unrendered(previous: &ListDiff, next: &mut ListDiff) {
    let live: FxHashSet<ListIndex> = next.new_indexes.iter().copied().collect();
    let adds: Vec<ListIndex> = previous
        .adds
        .iter()
        .copied()
        .filter(|list_index| live.contains(list_index))
        .collect();
    let overwrites: Vec<ListIndex> = previous
        .overwrites
        .iter()
        .copied()
        .filter(|list_index| live.contains(list_index))
        .collect();

    // Identities added and dropped again before any render were never seen.
    next.removes.retain(|list_index| !previous.adds.contains(list_index));
    next.adds.extend(adds);
    next.overwrites.extend(overwrites);
    next.removes.extend(previous.removes.iter().copied());
    next.old_value = previous.old_value.clone();
    next.old_indexes = previous.old_indexes.clone();

    // Moves are relative to the last rendered positions.
    let rendered: FxHashMap<ListIndex, usize> = next
        .old_indexes
        .iter()
        .enumerate()
        .map(|(position, list_index)| (*list_index, position))
        .collect();
    next.change_indexes = next
        .new_indexes
        .iter()
        .enumerate()
        .filter(|(position, list_index)| {
            rendered
                .get(*list_index)
                .is_some_and(|old| old != position)
        })
        .map(|(_, list_index)| *list_index)
        .collect();

    next.same = next.adds.is_empty()
        && next.removes.is_empty()
        && next.change_indexes.is_empty()
        && next.overwrites.is_empty()
        && next.old_value == next.new_value;
}
