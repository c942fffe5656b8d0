//! A component instance: its data, bindings and update cycle.

use std::{
    cell::{Ref, RefCell, RefMut},
    rc::{Rc, Weak},
};

use pathweave_reactive::{ListIndex, PathweaveResult, StatePropertyRef};
use rustc_hash::FxHashSet;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    binding::{Binding, BindingId, BindingRegistry},
    engine::ComponentEngine,
    renderer::Renderer,
    scheduler::Scheduler,
    state::{read_raw, ExternalSlice, ReadonlyState, WritableState},
    updater::{Updater, UpdaterPhase},
};

pub(crate) struct ComponentInner {
    engine: ComponentEngine,
    scheduler: Scheduler,
    data: RefCell<Map<String, Value>>,
    updater: Updater,
    bindings: RefCell<BindingRegistry>,
    slice: RefCell<Option<Rc<dyn ExternalSlice>>>,
}

/// Handle to one component instance. Clones share the instance.
#[derive(Clone)]
pub struct Component {
    pub(crate) inner: Rc<ComponentInner>,
}

impl Component {
    /// Creates an instance seeded with the class's initial data. Flushes are
    /// queued on `scheduler`.
    pub fn new(engine: &ComponentEngine, scheduler: &Scheduler) -> Self {
        let data = engine.class().initial().clone();
        Self {
            inner: Rc::new(ComponentInner {
                engine: engine.clone(),
                scheduler: scheduler.clone(),
                data: RefCell::new(data),
                updater: Updater::default(),
                bindings: RefCell::new(BindingRegistry::default()),
                slice: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<ComponentInner>) -> Option<Component> {
        weak.upgrade().map(|inner| Component { inner })
    }

    pub fn engine(&self) -> &ComponentEngine {
        &self.inner.engine
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn phase(&self) -> UpdaterPhase {
        self.inner.updater.phase()
    }

    /// Number of render batches run so far.
    pub fn batches_rendered(&self) -> u64 {
        self.inner.updater.batches()
    }

    /// Copy of the raw component data, without computed members.
    pub fn data_snapshot(&self) -> Value {
        Value::Object(self.inner.data.borrow().clone())
    }

    pub fn state_ref(
        &self,
        pattern: &str,
        list_index: Option<ListIndex>,
    ) -> PathweaveResult<StatePropertyRef> {
        self.engine().state_ref_for(pattern, list_index)
    }

    /// Marks `state_ref` as changed and makes sure a flush is scheduled.
    pub fn enqueue_ref(&self, state_ref: &StatePropertyRef) -> PathweaveResult<()> {
        let closure = self.engine().collect_maybe_updates(state_ref.pattern())?;
        let mut affected: Vec<Rc<str>> = closure.iter().cloned().collect();
        affected.extend(state_ref.info().cumulative_paths().iter().cloned());
        affected.push(Rc::from(""));

        if self.inner.updater.enqueue(state_ref, &affected) {
            let weak = Rc::downgrade(&self.inner);
            self.inner.scheduler.schedule(move || match Component::upgrade(&weak) {
                Some(component) => component.flush(),
                None => Ok(()),
            });
        }
        Ok(())
    }

    /// Renders queued refs in batches until no more are queued, including
    /// refs enqueued by bindings during the flush.
    pub(crate) fn flush(&self) -> PathweaveResult<()> {
        let updater = &self.inner.updater;
        updater.begin_flush();
        let mut rounds = 0;
        let result = loop {
            let batch = updater.take_queue();
            if batch.is_empty() {
                break Ok(());
            }
            rounds += 1;
            if let Err(err) = self.render(&batch) {
                // A failed flush leaves nothing behind for the next one.
                let dropped = updater.take_queue().len();
                warn!(%err, dropped, "flush failed");
                break Err(err);
            }
        };
        updater.end_flush();
        debug!(rounds, "flush finished");
        result
    }

    /// Renders `refs` as one batch.
    pub fn render(&self, refs: &[StatePropertyRef]) -> PathweaveResult<()> {
        let batch = self.inner.updater.next_batch();
        debug!(batch, refs = refs.len(), "render batch");
        let result = Renderer::new(self, batch).render(refs);
        self.end_cycle();
        result
    }

    fn end_cycle(&self) {
        let pending = self.inner.updater.end_cycle();
        if pending.is_empty() {
            return;
        }
        let released: FxHashSet<ListIndex> = self
            .engine()
            .release_list_indexes(&pending)
            .into_iter()
            .collect();
        let bindings = self.inner.bindings.borrow_mut().forget(&released);
        self.inner.updater.forget(&released);
        debug!(identities = released.len(), bindings, "released list identities");
    }

    /// Runs `f` as one write transaction. `loop_context` supplies identities
    /// for wildcard paths, as when handling an event from a list row.
    pub fn update<R>(
        &self,
        loop_context: Option<&StatePropertyRef>,
        f: impl FnOnce(&mut WritableState<'_>) -> PathweaveResult<R>,
    ) -> PathweaveResult<R> {
        let mut state = WritableState::new(self, loop_context.cloned());
        f(&mut state)
    }

    pub fn create_readonly_state<R>(
        &self,
        f: impl FnOnce(&mut ReadonlyState<'_>) -> PathweaveResult<R>,
    ) -> PathweaveResult<R> {
        let mut state = ReadonlyState::new(self);
        f(&mut state)
    }

    /// Calls a method member inside a write transaction.
    pub fn invoke(
        &self,
        name: &str,
        loop_context: Option<&StatePropertyRef>,
        args: &[Value],
    ) -> PathweaveResult<Value> {
        let method = self.engine().class().method(name)?;
        debug!(name, "invoke method");
        self.update(loop_context, |state| method(state, args))
    }

    pub fn register_binding(
        &self,
        state_ref: StatePropertyRef,
        binding: Rc<dyn Binding>,
    ) -> BindingId {
        self.inner.bindings.borrow_mut().insert(state_ref, binding)
    }

    pub fn unregister_binding(&self, id: BindingId) -> bool {
        self.inner.bindings.borrow_mut().remove(id)
    }

    pub fn binding_count(&self) -> usize {
        self.inner.bindings.borrow().len()
    }

    pub fn get_bindings(&self, state_ref: &StatePropertyRef) -> Vec<Rc<dyn Binding>> {
        self.bindings_for(state_ref)
            .into_iter()
            .map(|(_, binding)| binding)
            .collect()
    }

    pub(crate) fn bindings_for(
        &self,
        state_ref: &StatePropertyRef,
    ) -> Vec<(BindingId, Rc<dyn Binding>)> {
        self.inner.bindings.borrow().get(state_ref)
    }

    /// Identities of the last snapshot taken of a list ref.
    pub fn get_list_indexes(&self, state_ref: &StatePropertyRef) -> Option<Vec<ListIndex>> {
        self.inner
            .updater
            .saved_list(state_ref)
            .map(|saved| saved.list_indexes)
    }

    pub fn get_list_and_list_indexes(
        &self,
        state_ref: &StatePropertyRef,
    ) -> Option<(Vec<Value>, Vec<ListIndex>)> {
        self.inner
            .updater
            .saved_list(state_ref)
            .map(|saved| (saved.value, saved.list_indexes))
    }

    pub fn set_external_slice(&self, slice: Rc<dyn ExternalSlice>) {
        *self.inner.slice.borrow_mut() = Some(slice);
    }

    pub(crate) fn slice_for(&self, pattern: &str) -> Option<Rc<dyn ExternalSlice>> {
        let slice = self.inner.slice.borrow().clone()?;
        if !slice.claims(pattern) {
            return None;
        }
        let class = self.engine().class();
        if class.getter(pattern).is_some() || class.setter(pattern).is_some() {
            return None;
        }
        Some(slice)
    }

    pub(crate) fn updater(&self) -> &Updater {
        &self.inner.updater
    }

    pub(crate) fn data(&self) -> Ref<'_, Map<String, Value>> {
        self.inner.data.borrow()
    }

    pub(crate) fn data_mut(&self) -> RefMut<'_, Map<String, Value>> {
        self.inner.data.borrow_mut()
    }

    pub(crate) fn calc_list_diff(
        &self,
        state_ref: &StatePropertyRef,
        value: &Value,
    ) -> PathweaveResult<bool> {
        let mut arena = self.engine().inner.arena.borrow_mut();
        self.inner.updater.calc_list_diff(&mut arena, state_ref, value)
    }

    /// Keeps saved list snapshots in line with a plain write under a list
    /// element, so the element keeps its identity at the next diff.
    pub(crate) fn sync_list_snapshots(
        &self,
        state_ref: &StatePropertyRef,
        value: &Value,
    ) -> PathweaveResult<()> {
        let info = state_ref.info();
        let count = info.wildcard_count();
        let Some(leaf) = state_ref.list_index() else {
            return Ok(());
        };
        let engine = self.engine();
        for level in 0..count {
            let located = {
                let arena = engine.arena();
                arena
                    .at(leaf, level as isize)
                    .and_then(|list_index| Some((list_index, arena.index(list_index)?)))
            };
            let Some((list_index, position)) = located else {
                continue;
            };
            let list_ref = engine.state_ref(&info.wildcard_parent_infos()[level], Some(list_index))?;
            let direct = level + 1 == count && info.is_wildcard();
            let element = if direct {
                value.clone()
            } else {
                let element_info = engine.resolve(&info.wildcard_paths()[level]);
                read_raw(self, &element_info, Some(list_index))?
            };
            self.inner
                .updater
                .patch_saved_element(&list_ref, list_index, position, element, direct);
        }
        Ok(())
    }
}
