use tracing::{info, warn};

use super::{State, StateId};
use crate::agent::AgentContext;
use crate::event::cancellation::Cancellation;

/// Restarts the device into the freshly installed image.
#[derive(Debug, Default)]
pub struct RebootState {
    cancellation: Cancellation,
}

impl RebootState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn handle(self, context: &mut AgentContext) -> State {
        context.report(StateId::Reboot, None);

        info!(command = %context.reboot_command, "rebooting");
        match context.executor.execute(&context.reboot_command) {
            // only reached when the reboot command does not take the device down itself
            Ok(_) => State::idle(),
            Err(err) => {
                warn!(%err, "reboot failed");
                State::error(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::test_context_with;
    use crate::client::tests::MockUpdateServer;
    use crate::command::tests::MockCommandExecutor;
    use crate::command::CommandError;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn reporting_server() -> MockUpdateServer {
        let mut server = MockUpdateServer::new();
        server
            .expect_report_state()
            .withf(|state, error_message| *state == StateId::Reboot && error_message.is_empty())
            .once()
            .returning(|_, _| Ok(()));
        server
    }

    #[test]
    fn reboot_command_is_executed() {
        let (mut context, _dir) = test_context_with(0, reporting_server());
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_execute()
            .withf(|cmd| cmd.to_string() == "reboot")
            .once()
            .returning(|_| Ok(String::new()));
        context.executor = Arc::new(executor);

        let next = RebootState::new().handle(&mut context);

        assert_matches!(next, State::Idle(_));
    }

    #[test]
    fn reboot_failure_goes_to_error() {
        let (mut context, _dir) = test_context_with(0, reporting_server());
        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().once().returning(|_| {
            Err(CommandError::ExitError {
                program: "reboot".to_string(),
                output: "permission denied".to_string(),
            })
        });
        context.executor = Arc::new(executor);

        let next = RebootState::new().handle(&mut context);

        assert_matches!(next, State::Error(error) => {
            assert_eq!(
                "error executing 'reboot'. Output: permission denied",
                error.message()
            );
        });
    }
}
