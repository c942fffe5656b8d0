//! Identity preserving diff between two list snapshots.
//!
//! The diff decides, for every element of the new snapshot, whether it keeps
//! an identity from the old snapshot or needs a fresh one. Reused identities
//! are repositioned in place through [`ListIndexArena::set_index`].

use std::hash::{Hash, Hasher};

use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    error::{PathweaveError, PathweaveResult},
    list_index::{ListIndex, ListIndexArena},
};

pub type ListIndexSet = IndexSet<ListIndex, FxBuildHasher>;

/// Result of diffing two snapshots of one list.
#[derive(Debug, Clone, Default)]
pub struct ListDiff {
    pub old_value: Vec<Value>,
    pub new_value: Vec<Value>,
    pub old_indexes: Vec<ListIndex>,
    /// Identities aligned with `new_value`.
    pub new_indexes: Vec<ListIndex>,
    pub adds: ListIndexSet,
    pub removes: ListIndexSet,
    pub change_indexes: ListIndexSet,
    /// Identities whose element value was replaced without changing identity.
    pub overwrites: ListIndexSet,
    pub same: bool,
}

impl ListDiff {
    /// A diff that reports no change for `value` / `indexes`.
    pub fn unchanged(value: Vec<Value>, indexes: Vec<ListIndex>) -> Self {
        Self {
            old_value: value.clone(),
            new_value: value,
            old_indexes: indexes.clone(),
            new_indexes: indexes,
            same: true,
            ..Default::default()
        }
    }

    pub fn summary(&self) -> ListDiffSummary {
        ListDiffSummary {
            old_len: self.old_value.len(),
            new_len: self.new_value.len(),
            adds: self.adds.len(),
            removes: self.removes.len(),
            change_indexes: self.change_indexes.len(),
            overwrites: self.overwrites.len(),
            same: self.same,
        }
    }
}

/// Counts of a [`ListDiff`], for logging and debugging dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ListDiffSummary {
    pub old_len: usize,
    pub new_len: usize,
    pub adds: usize,
    pub removes: usize,
    pub change_indexes: usize,
    pub overwrites: usize,
    pub same: bool,
}

/// Hashes a JSON value structurally so it can key the value → position index.
struct ValueKey<'a>(&'a Value);

impl PartialEq for ValueKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for ValueKey<'_> {}

impl Hash for ValueKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(self.0, state);
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Number(n) => {
            2u8.hash(state);
            // `0.0 == -0.0`, so both must hash alike.
            n.as_f64()
                .map(|f| if f == 0.0 { 0 } else { f.to_bits() })
                .hash(state);
        }
        Value::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Array(items) => {
            4u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            5u8.hash(state);
            map.len().hash(state);
            for (key, item) in map {
                key.hash(state);
                hash_value(item, state);
            }
        }
    }
}

/// Diffs `old` against `new` under `parent`, reusing identities from `old_indexes`.
///
/// `old_indexes` is aligned with `old` by position. Missing snapshots are empty
/// lists; old positions without an identity are simply not reusable.
///
/// Duplicate values: a value's first occurrence in the new list takes the last
/// remaining old occurrence, later occurrences take the remaining old slots, and
/// occurrences beyond the old count get fresh identities.
pub fn diff(
    arena: &mut ListIndexArena,
    pattern: &str,
    parent: Option<ListIndex>,
    old: Option<&[Value]>,
    new: Option<&[Value]>,
    old_indexes: &[ListIndex],
) -> PathweaveResult<ListDiff> {
    let old = old.unwrap_or(&[]);
    let new = new.unwrap_or(&[]);
    let mut result = ListDiff {
        old_value: old.to_vec(),
        new_value: new.to_vec(),
        old_indexes: old_indexes.to_vec(),
        ..Default::default()
    };

    if old == new {
        result.new_indexes = old_indexes.to_vec();
        result.same = true;
        trace!(pattern, len = new.len(), "list unchanged");
        return Ok(result);
    }

    if new.is_empty() {
        result.removes.extend(old_indexes.iter().copied());
        trace!(pattern, removed = result.removes.len(), "list cleared");
        return Ok(result);
    }

    let create = |arena: &mut ListIndexArena, index: usize| {
        arena
            .create(parent, index)
            .ok_or_else(|| PathweaveError::ListIndexReleased {
                pattern: pattern.to_string(),
            })
    };

    if old.is_empty() {
        for index in 0..new.len() {
            let list_index = create(arena, index)?;
            result.adds.insert(list_index);
            result.new_indexes.push(list_index);
        }
        trace!(pattern, added = result.adds.len(), "list filled");
        return Ok(result);
    }

    let reusable = old.len().min(old_indexes.len());
    let mut consumed = vec![false; old_indexes.len()];

    let mut prefix = 0;
    while prefix < new.len() && prefix < reusable && new[prefix] == old[prefix] {
        let list_index = old_indexes[prefix];
        if arena.index(list_index) != Some(prefix) {
            arena.set_index(list_index, prefix);
            result.change_indexes.insert(list_index);
        }
        consumed[prefix] = true;
        result.new_indexes.push(list_index);
        prefix += 1;
    }

    // Positions are pushed in ascending order and popped from the back.
    let mut slots: FxHashMap<ValueKey<'_>, SmallVec<[usize; 2]>> = FxHashMap::default();
    for (position, value) in old.iter().enumerate().take(reusable).skip(prefix) {
        slots.entry(ValueKey(value)).or_default().push(position);
    }
    for positions in slots.values_mut() {
        if positions.len() > 1 {
            // Last occurrence first, then the remaining slots in array order.
            let last = positions.remove(positions.len() - 1);
            positions.reverse();
            positions.push(last);
        }
    }

    for (index, value) in new.iter().enumerate().skip(prefix) {
        let reused = slots
            .get_mut(&ValueKey(value))
            .and_then(|positions| positions.pop());
        match reused {
            Some(position) => {
                let list_index = old_indexes[position];
                consumed[position] = true;
                if arena.index(list_index) != Some(index) {
                    arena.set_index(list_index, index);
                    result.change_indexes.insert(list_index);
                }
                result.new_indexes.push(list_index);
            }
            None => {
                let list_index = create(arena, index)?;
                result.adds.insert(list_index);
                result.new_indexes.push(list_index);
            }
        }
    }

    for (position, list_index) in old_indexes.iter().enumerate() {
        if !consumed[position] {
            result.removes.insert(*list_index);
        }
    }

    trace!(
        pattern,
        reused = result.new_indexes.len() - result.adds.len(),
        added = result.adds.len(),
        moved = result.change_indexes.len(),
        removed = result.removes.len(),
        "list diffed"
    );
    Ok(result)
}
