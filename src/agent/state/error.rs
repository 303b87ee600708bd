use tracing::{error, info};

use super::{State, StateId};
use crate::agent::AgentContext;
use crate::event::cancellation::Cancellation;

/// Reports a failed attempt, then goes back to Idle.
#[derive(Debug)]
pub struct ErrorState {
    cancellation: Cancellation,
    message: String,
}

impl ErrorState {
    pub fn new(message: String) -> Self {
        Self {
            cancellation: Cancellation::new(),
            message,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn handle(self, context: &mut AgentContext) -> State {
        error!(err = %self.message, "update attempt failed");
        context.report(StateId::Error, Some(&self.message));
        info!("back to idle");
        State::idle()
    }
}
