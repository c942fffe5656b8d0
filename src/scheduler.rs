//! Single threaded deferred work queue.
//!
//! Components never flush synchronously inside `enqueue_ref`; they push one
//! flush task here per idle → active transition. The host decides when the
//! current turn ends by calling [`Scheduler::drain_pending_work`].

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use pathweave_reactive::PathweaveResult;
use tracing::debug;

type Task = Box<dyn FnOnce() -> PathweaveResult<()>>;

#[derive(Clone, Default)]
pub struct Scheduler {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&self, task: impl FnOnce() -> PathweaveResult<()> + 'static) {
        self.tasks.borrow_mut().push_back(Box::new(task));
    }

    pub fn has_pending_work(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }

    /// Runs queued tasks, including ones queued while draining, until none are
    /// left. Stops at the first failing task and returns its error; tasks
    /// behind it stay queued.
    pub fn drain_pending_work(&self) -> PathweaveResult<usize> {
        let mut ran = 0;
        loop {
            let task = self.tasks.borrow_mut().pop_front();
            let Some(task) = task else {
                break;
            };
            task()?;
            ran += 1;
        }
        if ran > 0 {
            debug!(tasks = ran, "drained pending work");
        }
        Ok(ran)
    }
}
