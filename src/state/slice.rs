//! State owned by someone else.
//!
//! A child component can expose part of a parent's state under a local prefix.
//! Reads and writes under that prefix go to the parent, and the parent's
//! render passes notify the child so its own bindings refresh.

use std::rc::{Rc, Weak};

use pathweave_reactive::{PathInfo, PathweaveError, PathweaveResult, StatePropertyRef};
use serde_json::Value;
use tracing::debug;

use crate::{
    binding::Binding,
    component::{Component, ComponentInner},
    renderer::Renderer,
};

/// A state source outside the component's own data.
pub trait ExternalSlice {
    /// Whether this slice owns `pattern`.
    fn claims(&self, pattern: &str) -> bool;

    /// Reads a claimed path. `indexes` are the positions of its wildcards.
    fn read(&self, info: &PathInfo, indexes: &[usize]) -> PathweaveResult<Value>;

    fn write(&self, info: &PathInfo, indexes: &[usize], value: Value) -> PathweaveResult<()>;
}

/// Maps `prefix` and everything below it onto `parent_path` in a parent component.
///
/// `context` pins the parent's wildcards, for a child rendered once per
/// element of a parent list.
pub struct ParentSlice {
    parent: Component,
    prefix: Rc<str>,
    parent_path: Rc<str>,
    context: Option<StatePropertyRef>,
}

impl ParentSlice {
    pub fn new(
        parent: &Component,
        prefix: impl Into<Rc<str>>,
        parent_path: impl Into<Rc<str>>,
        context: Option<StatePropertyRef>,
    ) -> Self {
        Self {
            parent: parent.clone(),
            prefix: prefix.into(),
            parent_path: parent_path.into(),
            context,
        }
    }

    /// Installs the slice on `child` and subscribes the child to the parent
    /// paths it mirrors.
    pub fn attach(self, child: &Component) -> PathweaveResult<()> {
        let slice = Rc::new(self);
        let class = child.engine().class();
        // Local getters and setters shadow the parent under the prefix.
        let mirrored: Vec<Rc<str>> = child
            .engine()
            .path_manager()
            .paths()
            .filter(|pattern| slice.claims(pattern))
            .filter(|pattern| class.getter(pattern).is_none() && class.setter(pattern).is_none())
            .cloned()
            .collect();

        let parent_engine = slice.parent.engine().clone();
        let context = slice.context.as_ref().and_then(StatePropertyRef::list_index);
        for pattern in mirrored {
            if child.engine().resolve(&pattern).wildcard_count() > 0 {
                continue;
            }
            let parent_pattern = slice.parent_pattern(&pattern);
            parent_engine.add_path(&parent_pattern);
            let parent_ref = parent_engine.state_ref_for(&parent_pattern, context)?;
            slice.parent.register_binding(
                parent_ref,
                Rc::new(SliceBinding {
                    child: Rc::downgrade(&child.inner),
                    pattern,
                }),
            );
        }
        debug!(prefix = %slice.prefix, parent_path = %slice.parent_path, "attached parent slice");
        child.set_external_slice(slice);
        Ok(())
    }

    fn parent_pattern(&self, pattern: &str) -> String {
        let rest = &pattern[self.prefix.len()..];
        format!("{}{rest}", self.parent_path)
    }

    /// Parent path for `info` plus one position per parent wildcard.
    fn map(&self, info: &PathInfo, indexes: &[usize]) -> PathweaveResult<(String, Vec<usize>)> {
        let pattern = self.parent_pattern(info.pattern());
        let pinned = self
            .parent
            .engine()
            .resolve(&self.parent_path)
            .wildcard_count();
        let mut positions: Vec<usize> = match self.context.as_ref().and_then(|c| c.list_index()) {
            Some(list_index) => self
                .parent
                .engine()
                .arena()
                .indexes(list_index)
                .map(|chain| chain.into_iter().take(pinned).collect())
                .ok_or_else(|| PathweaveError::ListIndexReleased {
                    pattern: self.parent_path.to_string(),
                })?,
            None => Vec::new(),
        };
        if positions.len() < pinned {
            return Err(PathweaveError::NoContextualIndex {
                pattern: self.parent_path.to_string(),
            });
        }
        positions.extend_from_slice(indexes);
        Ok((pattern, positions))
    }
}

impl ExternalSlice for ParentSlice {
    fn claims(&self, pattern: &str) -> bool {
        match pattern.strip_prefix(&*self.prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }

    fn read(&self, info: &PathInfo, indexes: &[usize]) -> PathweaveResult<Value> {
        let (pattern, positions) = self.map(info, indexes)?;
        self.parent
            .create_readonly_state(|state| state.0.resolve(&pattern, &positions))
    }

    fn write(&self, info: &PathInfo, indexes: &[usize], value: Value) -> PathweaveResult<()> {
        let (pattern, positions) = self.map(info, indexes)?;
        self.parent
            .update(None, |state| state.0.resolve_set(&pattern, &positions, value))
    }
}

/// Enqueues a mirrored child path when the parent renders its counterpart.
struct SliceBinding {
    child: Weak<ComponentInner>,
    pattern: Rc<str>,
}

impl Binding for SliceBinding {
    fn apply_change(&self, _renderer: &mut Renderer<'_>) -> PathweaveResult<()> {
        let Some(child) = Component::upgrade(&self.child) else {
            return Ok(());
        };
        let state_ref = child.engine().state_ref_for(&self.pattern, None)?;
        child.enqueue_ref(&state_ref)
    }
}
