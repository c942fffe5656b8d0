use pathweave_reactive::{PathweaveResult, StatePropertyRef};
use serde_json::Value;

use super::{delegate_state_view, AccessMode, StateHandler};
use crate::component::Component;

/// View handed to one [`Component::update`] transaction.
///
/// Its cache dies with the transaction. Writes land in component data right
/// away and are enqueued for the next flush.
pub struct WritableState<'a>(pub(crate) StateHandler<'a>);

impl<'a> WritableState<'a> {
    pub(crate) fn new(component: &'a Component, loop_context: Option<StatePropertyRef>) -> Self {
        Self(StateHandler::new(component, AccessMode::Writable, loop_context))
    }

    pub fn component(&self) -> &'a Component {
        self.0.component()
    }
}

delegate_state_view!(WritableState);
