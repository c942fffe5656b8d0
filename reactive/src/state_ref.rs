//! Interned `(path, list index)` pairs.
//!
//! A [`StatePropertyRef`] names one concrete location in component state: the
//! path info plus, for wildcard paths, the identity of the element. It is the
//! unit of change tracking and cache keying. Refs are interned by the
//! [`RefRegistry`], so asking twice for the same pair returns the same object.

use std::{
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
};

use rustc_hash::FxHashMap;

use crate::{
    error::{PathweaveError, PathweaveResult},
    list_index::{ListIndex, ListIndexArena},
    path::{PathId, PathInfo},
};

struct RefInner {
    info: Rc<PathInfo>,
    list_index: Option<ListIndex>,
    key: Rc<str>,
}

/// Interned reference to a state location.
///
/// Equality and hashing follow the `(path id, list index)` pair, which after
/// interning is the same as object identity. Two refs whose elements currently
/// sit at the same position but have different identities never compare equal.
#[derive(Clone)]
pub struct StatePropertyRef(Rc<RefInner>);

impl StatePropertyRef {
    pub fn info(&self) -> &Rc<PathInfo> {
        &self.0.info
    }

    pub fn pattern(&self) -> &str {
        self.0.info.pattern()
    }

    /// The element identity, which may have been released since the ref was made.
    pub fn list_index(&self) -> Option<ListIndex> {
        self.0.list_index
    }

    /// The element identity, checked against the arena.
    pub fn live_list_index(&self, arena: &ListIndexArena) -> PathweaveResult<Option<ListIndex>> {
        match self.0.list_index {
            Some(key) if !arena.is_live(key) => Err(PathweaveError::ListIndexReleased {
                pattern: self.pattern().to_string(),
            }),
            other => Ok(other),
        }
    }

    /// Deterministic string key combining the path id and the identity id.
    pub fn key(&self) -> &str {
        &self.0.key
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl PartialEq for StatePropertyRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.info.id() == other.0.info.id() && self.0.list_index == other.0.list_index
    }
}

impl Eq for StatePropertyRef {}

impl Hash for StatePropertyRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.info.id().hash(state);
        self.0.list_index.hash(state);
    }
}

impl fmt::Debug for StatePropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatePropertyRef")
            .field("pattern", &self.pattern())
            .field("key", &self.key())
            .finish()
    }
}

/// Two-level interning table: first by list index, then by path id.
#[derive(Default)]
pub struct RefRegistry {
    refs: FxHashMap<Option<ListIndex>, FxHashMap<PathId, StatePropertyRef>>,
}

impl RefRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the interned ref for `(info, list_index)`, creating it on first use.
    pub fn get_or_create(
        &mut self,
        arena: &ListIndexArena,
        info: &Rc<PathInfo>,
        list_index: Option<ListIndex>,
    ) -> PathweaveResult<StatePropertyRef> {
        if let Some(existing) = self
            .refs
            .get(&list_index)
            .and_then(|by_path| by_path.get(&info.id()))
        {
            return Ok(existing.clone());
        }

        let key: Rc<str> = match list_index {
            Some(list_index) => {
                let id = arena
                    .id(list_index)
                    .ok_or_else(|| PathweaveError::ListIndexReleased {
                        pattern: info.pattern().to_string(),
                    })?;
                Rc::from(format!("{}#{}", info.id(), id))
            }
            None => Rc::from(info.id().to_string()),
        };
        let state_ref = StatePropertyRef(Rc::new(RefInner {
            info: info.clone(),
            list_index,
            key,
        }));
        self.refs
            .entry(list_index)
            .or_default()
            .insert(info.id(), state_ref.clone());
        Ok(state_ref)
    }

    /// Drops every ref keyed by a released identity.
    pub fn forget(&mut self, list_index: ListIndex) {
        self.refs.remove(&Some(list_index));
    }

    pub fn len(&self) -> usize {
        self.refs.values().map(|by_path| by_path.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
