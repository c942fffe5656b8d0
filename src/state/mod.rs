//! Property access interception.
//!
//! Getters, setters and methods never touch component data directly. They get
//! a [`StateView`], which turns every access into a [`StatePropertyRef`],
//! records which computed member read what, and routes writes to the updater.

mod readonly;
mod slice;
mod writable;

use std::rc::Rc;

use pathweave_reactive::{
    ListIndex, PathInfo, PathweaveError, PathweaveResult, StatePropertyRef, WILDCARD,
};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use tracing::trace;

pub use self::{
    readonly::ReadonlyState,
    slice::{ExternalSlice, ParentSlice},
    writable::WritableState,
};
use crate::{
    class::ReservedKey,
    component::Component,
    path_manager::{build_accessor, Accessor, Step},
};

/// What computed members see of component state.
pub trait StateView {
    /// Reads `pattern`, taking wildcard identities from the current context.
    fn get(&mut self, pattern: &str) -> PathweaveResult<Value>;

    fn set(&mut self, pattern: &str, value: Value) -> PathweaveResult<()>;

    /// The ref `pattern` names in the current context.
    fn state_ref(&self, pattern: &str) -> PathweaveResult<StatePropertyRef>;

    fn get_ref(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<Value>;

    fn set_ref(&mut self, state_ref: &StatePropertyRef, value: Value) -> PathweaveResult<()>;

    /// Position of the enclosing element at loop `level`, 1 based (`$1`).
    fn loop_index(&self, level: usize) -> PathweaveResult<usize>;

    /// Reads a wildcard path with explicit positions, one per wildcard.
    fn resolve(&mut self, pattern: &str, indexes: &[usize]) -> PathweaveResult<Value>;

    fn resolve_set(&mut self, pattern: &str, indexes: &[usize], value: Value)
    -> PathweaveResult<()>;

    /// Every value of a wildcard path. `indexes` fixes the outer levels; the
    /// remaining levels range over all live elements.
    fn get_all(&mut self, pattern: &str, indexes: &[usize]) -> PathweaveResult<Vec<Value>>;

    /// Records that the computed member being evaluated depends on `pattern`.
    fn track_dependency(&mut self, pattern: &str) -> PathweaveResult<()>;

    fn is_writable(&self) -> bool;

    /// Answers a reserved `$` key.
    fn dispatch(&mut self, key: ReservedKey, args: &[Value]) -> PathweaveResult<Value> {
        match key {
            ReservedKey::Index(level) => self.loop_index(level).map(Value::from),
            ReservedKey::Resolve => {
                let pattern = string_arg(key, args, 0)?;
                let indexes = indexes_arg(key, args, 1)?;
                match args.get(2) {
                    Some(value) => {
                        self.resolve_set(pattern, &indexes, value.clone())?;
                        Ok(Value::Null)
                    }
                    None => self.resolve(pattern, &indexes),
                }
            }
            ReservedKey::GetAll => {
                let pattern = string_arg(key, args, 0)?;
                let indexes = match args.get(1) {
                    Some(_) => indexes_arg(key, args, 1)?,
                    None => Vec::new(),
                };
                self.get_all(pattern, &indexes).map(Value::Array)
            }
            ReservedKey::TrackDependency => {
                let pattern = string_arg(key, args, 0)?;
                self.track_dependency(pattern)?;
                Ok(Value::Null)
            }
        }
    }
}

fn string_arg(key: ReservedKey, args: &[Value], at: usize) -> PathweaveResult<&str> {
    args.get(at)
        .and_then(Value::as_str)
        .ok_or_else(|| PathweaveError::custom(format!("{key:?} expects a path at argument {at}")))
}

fn indexes_arg(key: ReservedKey, args: &[Value], at: usize) -> PathweaveResult<Vec<usize>> {
    let invalid =
        || PathweaveError::custom(format!("{key:?} expects positions at argument {at}"));
    let items = args.get(at).and_then(Value::as_array).ok_or_else(invalid)?;
    items
        .iter()
        .map(|item| item.as_u64().map(|i| i as usize).ok_or_else(invalid))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessMode {
    Readonly,
    Writable,
}

struct CacheEntry {
    value: Value,
    revision: u64,
}

/// Shared core of [`ReadonlyState`] and [`WritableState`].
pub(crate) struct StateHandler<'a> {
    component: &'a Component,
    mode: AccessMode,
    stack: SmallVec<[StatePropertyRef; 8]>,
    cache: FxHashMap<StatePropertyRef, CacheEntry>,
    cache_enabled: bool,
    loop_context: Option<StatePropertyRef>,
}

impl<'a> StateHandler<'a> {
    pub(crate) fn new(
        component: &'a Component,
        mode: AccessMode,
        loop_context: Option<StatePropertyRef>,
    ) -> Self {
        let cache_enabled = match mode {
            AccessMode::Readonly => component.engine().config().readonly_cache,
            AccessMode::Writable => true,
        };
        Self {
            component,
            mode,
            stack: SmallVec::new(),
            cache: FxHashMap::default(),
            cache_enabled,
            loop_context,
        }
    }

    pub(crate) fn component(&self) -> &'a Component {
        self.component
    }

    pub(crate) fn read(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<Value> {
        let caller = self.stack.last().cloned();
        let value = self.lookup(state_ref)?;
        if let Some(caller) = caller {
            self.track(&caller, state_ref.pattern());
        }
        if self
            .component
            .engine()
            .path_manager()
            .is_list(state_ref.pattern())
        {
            self.component.calc_list_diff(state_ref, &value)?;
        }
        Ok(value)
    }

    fn lookup(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<Value> {
        let component = self.component;
        let updater = component.updater();
        if self.cache_enabled {
            if let Some(entry) = self.cache.get(state_ref) {
                if !updater.is_stale(state_ref.pattern(), entry.revision) {
                    trace!(key = state_ref.key(), "state cache hit");
                    return Ok(entry.value.clone());
                }
            }
        }

        let revision = updater.revision();
        let value = match component.slice_for(state_ref.pattern()) {
            Some(slice) => {
                let indexes = self.positions(state_ref)?;
                slice.read(state_ref.info(), &indexes)?
            }
            None => self.evaluate(state_ref)?,
        };
        if self.cache_enabled {
            self.cache.insert(
                state_ref.clone(),
                CacheEntry {
                    value: value.clone(),
                    revision,
                },
            );
        }
        Ok(value)
    }

    fn track(&self, caller: &StatePropertyRef, pattern: &str) {
        if caller.pattern() == pattern {
            return;
        }
        let engine = self.component.engine();
        let computed = {
            let path_manager = engine.path_manager();
            path_manager.is_getter(caller.pattern()) && !path_manager.is_setter(caller.pattern())
        };
        if computed {
            engine.add_dynamic_dependency(pattern, caller.pattern());
        }
    }

    fn push(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<()> {
        let depth = self.component.engine().config().stack_depth;
        if self.stack.len() >= depth {
            return Err(PathweaveError::StackOverflow {
                pattern: state_ref.pattern().to_string(),
                depth,
            });
        }
        self.stack.push(state_ref.clone());
        Ok(())
    }

    fn evaluate(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<Value> {
        self.push(state_ref)?;
        let result = self.evaluate_in_place(state_ref);
        self.stack.pop();
        result
    }

    fn evaluate_in_place(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<Value> {
        let engine = self.component.engine().clone();
        let info = state_ref.info().clone();
        if info.is_root() {
            return Ok(Value::Object(self.component.data().clone()));
        }
        if let Some(getter) = engine.class().getter(info.pattern()) {
            return getter(self);
        }

        let list_index = state_ref.live_list_index(&engine.arena())?;
        if info.segments().len() == 1 {
            return Ok(self
                .component
                .data()
                .get(info.pattern())
                .cloned()
                .unwrap_or(Value::Null));
        }

        let accessor = engine.path_manager().accessor(info.pattern());
        if let Some(accessor) = accessor {
            return self.read_accessor(&info, &accessor, list_index);
        }

        let parent = info
            .parent_info()
            .cloned()
            .ok_or_else(|| PathweaveError::MissingParentInfo {
                pattern: info.pattern().to_string(),
            })?;
        let parent_ref = engine.state_ref(&parent, list_index)?;
        let parent_value = self.read(&parent_ref)?;
        let projected = match info.last_segment() {
            Some(WILDCARD) => {
                let list_index = list_index.ok_or_else(|| PathweaveError::NoContextualIndex {
                    pattern: info.pattern().to_string(),
                })?;
                let position = engine.arena().require_index(list_index, info.pattern())?;
                parent_value.get(position)
            }
            Some(segment) => parent_value.get(segment),
            None => None,
        };
        Ok(projected.cloned().unwrap_or(Value::Null))
    }

    fn read_accessor(
        &mut self,
        info: &Rc<PathInfo>,
        accessor: &Accessor,
        list_index: Option<ListIndex>,
    ) -> PathweaveResult<Value> {
        let engine = self.component.engine().clone();
        let positions = positions_of(self.component, list_index);
        match &accessor.base {
            Some(base) => {
                let base_ref = engine.state_ref(base, list_index)?;
                let base_value = self.read(&base_ref)?;
                let found = navigate(&base_value, &accessor.steps, &positions, info.pattern())?;
                Ok(found.cloned().unwrap_or(Value::Null))
            }
            None => {
                let data = self.component.data();
                let found = navigate_root(&data, &accessor.steps, &positions, info.pattern())?;
                Ok(found.cloned().unwrap_or(Value::Null))
            }
        }
    }

    pub(crate) fn write(
        &mut self,
        state_ref: &StatePropertyRef,
        value: Value,
    ) -> PathweaveResult<()> {
        let pattern = state_ref.pattern();
        if self.mode == AccessMode::Readonly {
            return Err(PathweaveError::ReadonlyWrite {
                pattern: pattern.to_string(),
            });
        }
        let engine = self.component.engine().clone();

        if let Some(slice) = self.component.slice_for(pattern) {
            let indexes = self.positions(state_ref)?;
            slice.write(state_ref.info(), &indexes, value)?;
        } else if let Some(setter) = engine.class().setter(pattern) {
            self.push(state_ref)?;
            let result = setter(self, value);
            self.stack.pop();
            result?;
        } else if engine.class().getter(pattern).is_some() {
            return Err(PathweaveError::GetterOnly {
                pattern: pattern.to_string(),
            });
        } else {
            write_raw(self.component, state_ref, value.clone())?;
            self.component.sync_list_snapshots(state_ref, &value)?;
        }

        self.cache.remove(state_ref);
        engine.add_path(pattern);
        self.component.enqueue_ref(state_ref)
    }

    /// Identity for the wildcards of `info` taken from the evaluation context:
    /// the innermost ref being evaluated, then the transaction's loop context.
    fn context_list_index(&self, info: &PathInfo) -> PathweaveResult<Option<ListIndex>> {
        let count = info.wildcard_count();
        if count == 0 {
            return Ok(None);
        }
        let last = info.last_wildcard_path();
        let candidates = self.stack.iter().rev().chain(self.loop_context.iter());
        for candidate in candidates {
            let Some(list_index) = candidate.list_index() else {
                continue;
            };
            let governs = candidate
                .info()
                .wildcard_paths()
                .get(count - 1)
                .map(|path| &**path);
            if governs == last {
                return Ok(Some(list_index));
            }
        }
        Err(PathweaveError::NoContextualIndex {
            pattern: info.pattern().to_string(),
        })
    }

    pub(crate) fn state_ref(&self, pattern: &str) -> PathweaveResult<StatePropertyRef> {
        let engine = self.component.engine();
        let info = engine.resolve(pattern);
        let list_index = self.context_list_index(&info)?;
        engine.state_ref(&info, list_index)
    }

    pub(crate) fn get(&mut self, pattern: &str) -> PathweaveResult<Value> {
        match ReservedKey::parse(pattern) {
            Some(ReservedKey::Index(level)) => self.loop_index(level).map(Value::from),
            Some(_) => Err(PathweaveError::ReservedName {
                name: pattern.to_string(),
            }),
            None => {
                let state_ref = self.state_ref(pattern)?;
                self.read(&state_ref)
            }
        }
    }

    pub(crate) fn set(&mut self, pattern: &str, value: Value) -> PathweaveResult<()> {
        if ReservedKey::is_reserved(pattern) {
            return Err(PathweaveError::ReservedName {
                name: pattern.to_string(),
            });
        }
        let state_ref = self.state_ref(pattern)?;
        self.write(&state_ref, value)
    }

    pub(crate) fn loop_index(&self, level: usize) -> PathweaveResult<usize> {
        let name = || format!("${level}");
        let list_index = self
            .stack
            .iter()
            .rev()
            .chain(self.loop_context.iter())
            .find_map(|candidate| candidate.list_index())
            .ok_or_else(|| PathweaveError::NoContextualIndex { pattern: name() })?;
        let positions = positions_of(self.component, Some(list_index));
        level
            .checked_sub(1)
            .and_then(|at| positions.get(at).copied())
            .ok_or_else(|| PathweaveError::NoContextualIndex { pattern: name() })
    }

    /// Ref for `pattern` with one explicit position per wildcard level.
    fn ref_at(&mut self, pattern: &str, indexes: &[usize]) -> PathweaveResult<StatePropertyRef> {
        let engine = self.component.engine().clone();
        let info = engine.resolve(pattern);
        let count = info.wildcard_count();
        if indexes.len() < count {
            return Err(PathweaveError::NoContextualIndex {
                pattern: pattern.to_string(),
            });
        }
        let mut list_index = None;
        for (level, list_info) in info.wildcard_parent_infos().iter().enumerate() {
            let list_ref = engine.state_ref(list_info, list_index)?;
            let identities = self.list_identities(&list_ref)?;
            let position = indexes[level];
            let identity = identities.get(position).copied().ok_or_else(|| {
                PathweaveError::IdentityOutOfRange {
                    pattern: pattern.to_string(),
                    position: position as isize,
                }
            })?;
            list_index = Some(identity);
        }
        engine.state_ref(&info, list_index)
    }

    /// Current identities of a list ref, reading the list first.
    pub(crate) fn list_identities(
        &mut self,
        list_ref: &StatePropertyRef,
    ) -> PathweaveResult<Vec<ListIndex>> {
        let value = self.read(list_ref)?;
        if !self
            .component
            .engine()
            .path_manager()
            .is_list(list_ref.pattern())
        {
            self.component.calc_list_diff(list_ref, &value)?;
        }
        Ok(self.component.get_list_indexes(list_ref).unwrap_or_default())
    }

    pub(crate) fn resolve(&mut self, pattern: &str, indexes: &[usize]) -> PathweaveResult<Value> {
        let state_ref = self.ref_at(pattern, indexes)?;
        self.read(&state_ref)
    }

    pub(crate) fn resolve_set(
        &mut self,
        pattern: &str,
        indexes: &[usize],
        value: Value,
    ) -> PathweaveResult<()> {
        let state_ref = self.ref_at(pattern, indexes)?;
        self.write(&state_ref, value)
    }

    pub(crate) fn get_all(
        &mut self,
        pattern: &str,
        indexes: &[usize],
    ) -> PathweaveResult<Vec<Value>> {
        let engine = self.component.engine().clone();
        let info = engine.resolve(pattern);
        let mut frontier: Vec<Option<ListIndex>> = vec![None];
        for (level, list_info) in info.wildcard_parent_infos().iter().enumerate() {
            let mut next = Vec::new();
            for parent in frontier {
                let list_ref = engine.state_ref(list_info, parent)?;
                let identities = self.list_identities(&list_ref)?;
                match indexes.get(level) {
                    Some(position) => {
                        let identity = identities.get(*position).copied().ok_or_else(|| {
                            PathweaveError::IdentityOutOfRange {
                                pattern: pattern.to_string(),
                                position: *position as isize,
                            }
                        })?;
                        next.push(Some(identity));
                    }
                    None => next.extend(identities.into_iter().map(Some)),
                }
            }
            frontier = next;
        }

        let mut values = Vec::with_capacity(frontier.len());
        for list_index in frontier {
            let state_ref = engine.state_ref(&info, list_index)?;
            values.push(self.read(&state_ref)?);
        }
        Ok(values)
    }

    pub(crate) fn track_dependency(&mut self, pattern: &str) -> PathweaveResult<()> {
        if let Some(caller) = self.stack.last().cloned() {
            self.track(&caller, pattern);
        }
        Ok(())
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.mode == AccessMode::Writable
    }

    fn positions(&self, state_ref: &StatePropertyRef) -> PathweaveResult<SmallVec<[usize; 4]>> {
        let list_index = state_ref.live_list_index(&self.component.engine().arena())?;
        Ok(positions_of(self.component, list_index))
    }
}

impl StateView for StateHandler<'_> {
    fn get(&mut self, pattern: &str) -> PathweaveResult<Value> {
        StateHandler::get(self, pattern)
    }

    fn set(&mut self, pattern: &str, value: Value) -> PathweaveResult<()> {
        StateHandler::set(self, pattern, value)
    }

    fn state_ref(&self, pattern: &str) -> PathweaveResult<StatePropertyRef> {
        StateHandler::state_ref(self, pattern)
    }

    fn get_ref(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<Value> {
        self.read(state_ref)
    }

    fn set_ref(&mut self, state_ref: &StatePropertyRef, value: Value) -> PathweaveResult<()> {
        self.write(state_ref, value)
    }

    fn loop_index(&self, level: usize) -> PathweaveResult<usize> {
        StateHandler::loop_index(self, level)
    }

    fn resolve(&mut self, pattern: &str, indexes: &[usize]) -> PathweaveResult<Value> {
        StateHandler::resolve(self, pattern, indexes)
    }

    fn resolve_set(
        &mut self,
        pattern: &str,
        indexes: &[usize],
        value: Value,
    ) -> PathweaveResult<()> {
        StateHandler::resolve_set(self, pattern, indexes, value)
    }

    fn get_all(&mut self, pattern: &str, indexes: &[usize]) -> PathweaveResult<Vec<Value>> {
        StateHandler::get_all(self, pattern, indexes)
    }

    fn track_dependency(&mut self, pattern: &str) -> PathweaveResult<()> {
        StateHandler::track_dependency(self, pattern)
    }

    fn is_writable(&self) -> bool {
        StateHandler::is_writable(self)
    }
}

/// Implements [`StateView`] for a newtype over [`StateHandler`].
macro_rules! delegate_state_view {
    ($ty:ident) => {
        impl $crate::state::StateView for $ty<'_> {
            fn get(&mut self, pattern: &str) -> PathweaveResult<Value> {
                self.0.get(pattern)
            }

            fn set(&mut self, pattern: &str, value: Value) -> PathweaveResult<()> {
                self.0.set(pattern, value)
            }

            fn state_ref(&self, pattern: &str) -> PathweaveResult<StatePropertyRef> {
                self.0.state_ref(pattern)
            }

            fn get_ref(&mut self, state_ref: &StatePropertyRef) -> PathweaveResult<Value> {
                self.0.read(state_ref)
            }

            fn set_ref(
                &mut self,
                state_ref: &StatePropertyRef,
                value: Value,
            ) -> PathweaveResult<()> {
                self.0.write(state_ref, value)
            }

            fn loop_index(&self, level: usize) -> PathweaveResult<usize> {
                self.0.loop_index(level)
            }

            fn resolve(&mut self, pattern: &str, indexes: &[usize]) -> PathweaveResult<Value> {
                self.0.resolve(pattern, indexes)
            }

            fn resolve_set(
                &mut self,
                pattern: &str,
                indexes: &[usize],
                value: Value,
            ) -> PathweaveResult<()> {
                self.0.resolve_set(pattern, indexes, value)
            }

            fn get_all(
                &mut self,
                pattern: &str,
                indexes: &[usize],
            ) -> PathweaveResult<Vec<Value>> {
                self.0.get_all(pattern, indexes)
            }

            fn track_dependency(&mut self, pattern: &str) -> PathweaveResult<()> {
                self.0.track_dependency(pattern)
            }

            fn is_writable(&self) -> bool {
                self.0.is_writable()
            }
        }
    };
}
pub(crate) use delegate_state_view;

fn positions_of(component: &Component, list_index: Option<ListIndex>) -> SmallVec<[usize; 4]> {
    list_index
        .and_then(|list_index| component.engine().arena().indexes(list_index))
        .unwrap_or_default()
}

fn position_at(positions: &[usize], level: usize, pattern: &str) -> PathweaveResult<usize> {
    positions
        .get(level)
        .copied()
        .ok_or_else(|| PathweaveError::NoContextualIndex {
            pattern: pattern.to_string(),
        })
}

/// Follows `steps` from `value`. A missing intermediate yields `None`.
fn navigate<'v>(
    value: &'v Value,
    steps: &[Step],
    positions: &[usize],
    pattern: &str,
) -> PathweaveResult<Option<&'v Value>> {
    let mut current = value;
    for step in steps {
        let next = match step {
            Step::Key(key) => current.get(&**key),
            Step::Index(level) => current.get(position_at(positions, *level, pattern)?),
        };
        match next {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn navigate_root<'v>(
    data: &'v Map<String, Value>,
    steps: &[Step],
    positions: &[usize],
    pattern: &str,
) -> PathweaveResult<Option<&'v Value>> {
    let Some((Step::Key(first), rest)) = steps.split_first() else {
        return Ok(None);
    };
    match data.get(&**first) {
        Some(value) => navigate(value, rest, positions, pattern),
        None => Ok(None),
    }
}

/// Reads a plain data path, ignoring computed members.
pub(crate) fn read_raw(
    component: &Component,
    info: &Rc<PathInfo>,
    list_index: Option<ListIndex>,
) -> PathweaveResult<Value> {
    let positions = positions_of(component, list_index);
    let accessor = build_accessor(info, |_| false);
    let data = component.data();
    let found = navigate_root(&data, &accessor.steps, &positions, info.pattern())?;
    Ok(found.cloned().unwrap_or(Value::Null))
}

/// Stores `value` at a plain data path.
fn write_raw(
    component: &Component,
    state_ref: &StatePropertyRef,
    value: Value,
) -> PathweaveResult<()> {
    let info = state_ref.info();
    let pattern = info.pattern();
    if info.is_root() {
        let Value::Object(map) = value else {
            return Err(PathweaveError::custom("root state must be an object"));
        };
        *component.data_mut() = map;
        return Ok(());
    }

    let engine = component.engine();
    let list_index = state_ref.live_list_index(&engine.arena())?;
    let positions = positions_of(component, list_index);
    let accessor = build_accessor(info, |prefix| {
        let class = engine.class();
        class.getter(prefix).is_some() || class.setter(prefix).is_some()
    });
    if accessor.base.is_some() {
        return Err(PathweaveError::WriteThroughComputed {
            pattern: pattern.to_string(),
        });
    }

    let missing = || PathweaveError::MissingParentValue {
        pattern: pattern.to_string(),
    };
    let mut data = component.data_mut();
    let Some((last, init)) = accessor.steps.split_last() else {
        return Err(missing());
    };
    let Some((first, init)) = init.split_first() else {
        return match last {
            Step::Key(key) => {
                data.insert(key.to_string(), value);
                Ok(())
            }
            Step::Index(_) => Err(missing()),
        };
    };
    let Step::Key(first) = first else {
        return Err(missing());
    };

    let mut current = data.get_mut(&**first).ok_or_else(missing)?;
    for step in init {
        current = match step {
            Step::Key(key) => current.get_mut(&**key),
            Step::Index(level) => current.get_mut(position_at(&positions, *level, pattern)?),
        }
        .ok_or_else(missing)?;
    }

    match last {
        Step::Key(key) => {
            current
                .as_object_mut()
                .ok_or_else(missing)?
                .insert(key.to_string(), value);
        }
        Step::Index(level) => {
            let position = position_at(&positions, *level, pattern)?;
            let items = current.as_array_mut().ok_or_else(missing)?;
            if position < items.len() {
                items[position] = value;
            } else if position == items.len() {
                items.push(value);
            } else {
                return Err(PathweaveError::IdentityOutOfRange {
                    pattern: pattern.to_string(),
                    position: position as isize,
                });
            }
        }
    }
    Ok(())
}
