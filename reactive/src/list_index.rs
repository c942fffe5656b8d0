//! Stable identities for list elements.
//!
//! A [`ListIndex`] is a key into a [`ListIndexArena`]. The node behind it holds
//! the element's current position, which the list diff rewrites in place when
//! the element moves, so everything keyed by the identity (bindings, caches,
//! refs) stays valid across reorders. Nested loops chain a child identity to
//! the identity of the enclosing element; children point at parents, never the
//! reverse.
//!
//! Released keys keep their slot generation bumped, so a stale key simply stops
//! resolving instead of aliasing a newer identity.

use slotmap::{new_key_type, SecondaryMap, SlotMap};
use smallvec::SmallVec;

use crate::error::{PathweaveError, PathweaveResult};

new_key_type! {
    /// Identity token of one list element.
    pub struct ListIndex;
}

#[derive(Debug)]
struct ListIndexNode {
    id: u64,
    index: usize,
    parent: Option<ListIndex>,
    depth: usize,
}

/// Storage for every live list identity of one component engine.
#[derive(Default)]
pub struct ListIndexArena {
    nodes: SlotMap<ListIndex, ListIndexNode>,
    children: SecondaryMap<ListIndex, SmallVec<[ListIndex; 4]>>,
    next_id: u64,
}

impl ListIndexArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new identity at `index`, nested under `parent` when given.
    ///
    /// Returns `None` if `parent` has already been released.
    pub fn create(&mut self, parent: Option<ListIndex>, index: usize) -> Option<ListIndex> {
        let depth = match parent {
            Some(parent) => self.nodes.get(parent)?.depth + 1,
            None => 1,
        };
        let id = self.next_id;
        self.next_id += 1;
        let key = self.nodes.insert(ListIndexNode {
            id,
            index,
            parent,
            depth,
        });
        if let Some(parent) = parent {
            if let Some(children) = self.children.entry(parent) {
                children.or_default().push(key);
            }
        }
        Some(key)
    }

    /// Creates a child identity of `parent`.
    pub fn add(&mut self, parent: ListIndex, index: usize) -> Option<ListIndex> {
        self.create(Some(parent), index)
    }

    pub fn is_live(&self, key: ListIndex) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Current position of the element within its list.
    pub fn index(&self, key: ListIndex) -> Option<usize> {
        self.nodes.get(key).map(|node| node.index)
    }

    /// Repositions an identity. This is the only way an element moves.
    pub fn set_index(&mut self, key: ListIndex, index: usize) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) => {
                node.index = index;
                true
            }
            None => false,
        }
    }

    /// Sequential id, unique for the lifetime of the arena.
    pub fn id(&self, key: ListIndex) -> Option<u64> {
        self.nodes.get(key).map(|node| node.id)
    }

    pub fn parent(&self, key: ListIndex) -> Option<ListIndex> {
        self.nodes.get(key).and_then(|node| node.parent)
    }

    /// Number of loop levels in the chain; 1 for an outermost identity.
    pub fn depth(&self, key: ListIndex) -> Option<usize> {
        self.nodes.get(key).map(|node| node.depth)
    }

    /// The identity at `position` in the chain.
    ///
    /// Non-negative positions count from the outermost level, negative ones from
    /// this identity (`-1` is `key` itself).
    pub fn at(&self, key: ListIndex, position: isize) -> Option<ListIndex> {
        let depth = self.depth(key)? as isize;
        let target = if position < 0 { depth + position } else { position };
        if target < 0 || target >= depth {
            return None;
        }
        let mut steps = depth - 1 - target;
        let mut current = key;
        while steps > 0 {
            current = self.parent(current)?;
            steps -= 1;
        }
        Some(current)
    }

    /// Walks up the chain until the identity has at most `length` levels.
    pub fn truncate(&self, key: ListIndex, length: usize) -> Option<ListIndex> {
        if length == 0 {
            return None;
        }
        let mut current = key;
        loop {
            let node = self.nodes.get(current)?;
            if node.depth <= length {
                return Some(current);
            }
            current = node.parent?;
        }
    }

    /// Identity chain, outermost first.
    pub fn list_indexes(&self, key: ListIndex) -> Option<SmallVec<[ListIndex; 4]>> {
        let mut chain = SmallVec::new();
        let mut current = Some(key);
        while let Some(k) = current {
            let node = self.nodes.get(k)?;
            chain.push(k);
            current = node.parent;
        }
        chain.reverse();
        Some(chain)
    }

    /// Positions of every level in the chain, outermost first.
    pub fn indexes(&self, key: ListIndex) -> Option<SmallVec<[usize; 4]>> {
        let chain = self.list_indexes(key)?;
        chain.iter().map(|k| self.index(*k)).collect()
    }

    /// Like [`Self::index`], reporting a release as an identity error on `pattern`.
    pub fn require_index(&self, key: ListIndex, pattern: &str) -> PathweaveResult<usize> {
        self.index(key)
            .ok_or_else(|| PathweaveError::ListIndexReleased {
                pattern: pattern.to_string(),
            })
    }

    /// Releases `key` and every identity nested under it.
    ///
    /// Returns the keys that were actually freed.
    pub fn release(&mut self, key: ListIndex) -> Vec<ListIndex> {
        let mut released = Vec::new();
        if let Some(parent) = self.parent(key) {
            if let Some(siblings) = self.children.get_mut(parent) {
                siblings.retain(|k| *k != key);
            }
        }
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if self.nodes.remove(current).is_none() {
                continue;
            }
            if let Some(children) = self.children.remove(current) {
                stack.extend(children);
            }
            released.push(current);
        }
        released
    }
}
