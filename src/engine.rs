//! Shared per component type state: path interning, identities, refs and the
//! path manager.

use std::{
    cell::{Ref, RefCell},
    rc::Rc,
};

use pathweave_reactive::{
    ListIndex, ListIndexArena, PathInfo, PathResolver, PathweaveError, PathweaveResult,
    RefRegistry, StatePropertyRef,
};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::{class::StateClass, config::EngineConfig, path_manager::PathManager};

pub(crate) type PathClosure = Rc<FxHashSet<Rc<str>>>;

/// Everything known about a component type before it is instantiated.
#[derive(Debug, Clone, Default)]
pub struct ComponentDefinition {
    pub class: StateClass,
    /// Paths referenced by the component's bindings.
    pub paths: Vec<String>,
    /// Paths iterated by list bindings.
    pub lists: Vec<String>,
    pub config: EngineConfig,
}

impl ComponentDefinition {
    pub fn new(class: StateClass) -> Self {
        Self {
            class,
            ..Default::default()
        }
    }

    pub fn path(mut self, pattern: impl Into<String>) -> Self {
        self.paths.push(pattern.into());
        self
    }

    pub fn paths<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.paths.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn list(mut self, pattern: impl Into<String>) -> Self {
        self.lists.push(pattern.into());
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) resolver: PathResolver,
    pub(crate) class: StateClass,
    pub(crate) path_manager: RefCell<PathManager>,
    pub(crate) arena: RefCell<ListIndexArena>,
    pub(crate) refs: RefCell<RefRegistry>,
    maybe_updates: RefCell<FxHashMap<Rc<str>, (u64, PathClosure)>>,
}

/// The engine of one component type, shared by all of its instances.
#[derive(Clone)]
pub struct ComponentEngine {
    pub(crate) inner: Rc<EngineInner>,
}

impl ComponentEngine {
    pub fn new(definition: ComponentDefinition) -> Self {
        let resolver = PathResolver::new();
        let path_manager = PathManager::new(
            &resolver,
            &definition.class,
            definition.paths.iter().map(String::as_str),
            definition.lists.iter().map(String::as_str),
        );
        Self {
            inner: Rc::new(EngineInner {
                config: definition.config,
                resolver,
                class: definition.class,
                path_manager: RefCell::new(path_manager),
                arena: RefCell::new(ListIndexArena::new()),
                refs: RefCell::new(RefRegistry::new()),
                maybe_updates: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.inner.config
    }

    pub fn class(&self) -> &StateClass {
        &self.inner.class
    }

    pub fn resolve(&self, pattern: &str) -> Rc<PathInfo> {
        self.inner.resolver.resolve(pattern)
    }

    pub fn path_manager(&self) -> Ref<'_, PathManager> {
        self.inner.path_manager.borrow()
    }

    pub fn arena(&self) -> Ref<'_, ListIndexArena> {
        self.inner.arena.borrow()
    }

    /// Interned ref for `info`, with `list_index` cut down to the path's own
    /// wildcard depth.
    pub fn state_ref(
        &self,
        info: &Rc<PathInfo>,
        list_index: Option<ListIndex>,
    ) -> PathweaveResult<StatePropertyRef> {
        let arena = self.inner.arena.borrow();
        let count = info.wildcard_count();
        let list_index = if count == 0 {
            None
        } else {
            let list_index = list_index.ok_or_else(|| PathweaveError::NoContextualIndex {
                pattern: info.pattern().to_string(),
            })?;
            let depth = arena
                .depth(list_index)
                .ok_or_else(|| PathweaveError::ListIndexReleased {
                    pattern: info.pattern().to_string(),
                })?;
            if depth < count {
                return Err(PathweaveError::NoContextualIndex {
                    pattern: info.pattern().to_string(),
                });
            }
            arena.truncate(list_index, count)
        };
        self.inner
            .refs
            .borrow_mut()
            .get_or_create(&arena, info, list_index)
    }

    /// Convenience for [`Self::state_ref`] by pattern.
    pub fn state_ref_for(
        &self,
        pattern: &str,
        list_index: Option<ListIndex>,
    ) -> PathweaveResult<StatePropertyRef> {
        self.state_ref(&self.resolve(pattern), list_index)
    }

    /// Registers a path discovered at runtime, with its prefixes.
    pub(crate) fn add_path(&self, pattern: &str) {
        if !self.inner.path_manager.borrow().contains(pattern) {
            self.inner
                .path_manager
                .borrow_mut()
                .add_path(&self.inner.resolver, pattern);
        }
    }

    pub(crate) fn add_dynamic_dependency(&self, dependency: &str, dependent: &str) {
        self.inner.path_manager.borrow_mut().add_dynamic_dependency(
            &self.inner.resolver,
            dependency,
            dependent,
        );
    }

    /// Every path whose value may change when `pattern` is written: its
    /// structural subtree, its ancestors and everything that depends on either.
    ///
    /// Memoized per origin path until the next path or dynamic edge is added.
    pub(crate) fn collect_maybe_updates(&self, pattern: &str) -> PathweaveResult<PathClosure> {
        let path_manager = self.inner.path_manager.borrow();
        let generation = path_manager.generation();
        if let Some((cached_generation, closure)) = self.inner.maybe_updates.borrow().get(pattern) {
            if *cached_generation == generation {
                return Ok(closure.clone());
            }
        }

        let mut visited = FxHashSet::default();
        collect(&path_manager, pattern, &mut visited, true)?;
        // Ancestors hold the written value too, and so do their dependents.
        let info = self.resolve(pattern);
        for ancestor in info.ancestor_infos() {
            let ancestor = ancestor.pattern();
            visited.insert(Rc::from(ancestor));
            let from_element = path_manager.is_element(ancestor);
            for dependent in path_manager.dynamic_dependents(ancestor) {
                collect(&path_manager, dependent, &mut visited, !from_element)?;
            }
        }
        let closure = Rc::new(visited);
        trace!(pattern, paths = closure.len(), "collected maybe updates");
        self.inner
            .maybe_updates
            .borrow_mut()
            .insert(Rc::from(pattern), (generation, closure.clone()));
        Ok(closure)
    }

    /// Frees identities dropped by list diffs, along with their refs.
    pub(crate) fn release_list_indexes(&self, list_indexes: &[ListIndex]) -> Vec<ListIndex> {
        let mut arena = self.inner.arena.borrow_mut();
        let mut refs = self.inner.refs.borrow_mut();
        let mut freed = Vec::new();
        for list_index in list_indexes {
            for released in arena.release(*list_index) {
                refs.forget(released);
                freed.push(released);
            }
        }
        freed
    }
}

fn collect(
    path_manager: &PathManager,
    pattern: &str,
    visited: &mut FxHashSet<Rc<str>>,
    walk_static: bool,
) -> PathweaveResult<()> {
    if !path_manager.contains(pattern) {
        return Err(PathweaveError::UnknownPath {
            pattern: pattern.to_string(),
        });
    }
    if !visited.insert(Rc::from(pattern)) {
        return Ok(());
    }
    if walk_static {
        for child in path_manager.static_children(pattern) {
            collect(path_manager, child, visited, true)?;
        }
    }
    // One element touching a dependent must not fan out into that dependent's
    // whole subtree.
    let from_element = path_manager.is_element(pattern);
    for dependent in path_manager.dynamic_dependents(pattern) {
        collect(path_manager, dependent, visited, !from_element)?;
    }
    Ok(())
}
