use pathweave_reactive::{PathweaveResult, StatePropertyRef};
use serde_json::Value;

use super::{delegate_state_view, AccessMode, StateHandler};
use crate::component::Component;

/// Read-only view used by render passes and pure reads.
///
/// Values are cached for the lifetime of the view and re-read only when the
/// updater has seen a newer write to their path. Every `set` fails with
/// `ReadonlyWrite`.
pub struct ReadonlyState<'a>(pub(crate) StateHandler<'a>);

impl<'a> ReadonlyState<'a> {
    pub(crate) fn new(component: &'a Component) -> Self {
        Self(StateHandler::new(component, AccessMode::Readonly, None))
    }

    pub fn component(&self) -> &'a Component {
        self.0.component()
    }
}

delegate_state_view!(ReadonlyState);
