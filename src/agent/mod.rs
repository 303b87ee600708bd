//! The update lifecycle: a state machine cycling through Idle, Update-Check, Download,
//! Install and Reboot, with Error as the landing state of any failed attempt.
pub mod state;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::UpdateServer;
use crate::command::{CommandExecutor, CommandLine};
use crate::config::AgentConfig;
use crate::descriptor::UpdateDescriptor;
use crate::event::cancellation::{Cancellation, CancellationMessage};
use crate::event::channel::EventPublisher;
use crate::installmodes::InstallModeRegistry;

use self::state::{State, StateId};

const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Everything the states need to run. Only the running state touches it.
pub struct AgentContext {
    /// Seconds spent in Idle between update checks.
    pub poll_interval: u64,
    /// Length of one Idle second.
    pub tick: Duration,
    pub download_dir: PathBuf,
    pub reboot_command: CommandLine,
    pub server: Box<dyn UpdateServer>,
    pub executor: Arc<dyn CommandExecutor>,
    pub registry: InstallModeRegistry,
    /// Last descriptor received from the server.
    pub update_descriptor: Option<UpdateDescriptor>,
}

impl AgentContext {
    pub fn new(
        config: &AgentConfig,
        server: Box<dyn UpdateServer>,
        executor: Arc<dyn CommandExecutor>,
        registry: InstallModeRegistry,
    ) -> Self {
        let reboot_command = CommandLine::parse(&config.reboot_command).unwrap_or_else(|| {
            warn!("empty reboot command configured, using `reboot`");
            CommandLine::new("reboot")
        });

        Self {
            poll_interval: config.poll_interval.as_secs(),
            tick: DEFAULT_TICK,
            download_dir: config.download_dir.clone(),
            reboot_command,
            server,
            executor,
            registry,
            update_descriptor: None,
        }
    }

    /// Reports the entered state to the server. A failed report does not stop the lifecycle.
    pub fn report(&self, state: StateId, error: Option<&str>) {
        if let Err(err) = self.server.report_state(state, error.unwrap_or_default()) {
            warn!(%state, %err, "could not report state");
        }
    }
}

type CurrentCancellation = Arc<Mutex<EventPublisher<CancellationMessage>>>;

pub struct StateMachine {
    context: AgentContext,
    state: State,
    current: CurrentCancellation,
    stop: Cancellation,
}

impl StateMachine {
    pub fn new(context: AgentContext, initial_state: State) -> Self {
        let current = Arc::new(Mutex::new(initial_state.cancellation().publisher()));
        Self {
            context,
            state: initial_state,
            current,
            stop: Cancellation::new(),
        }
    }

    pub fn handle(&self) -> StateMachineHandle {
        StateMachineHandle {
            current: self.current.clone(),
            stop: self.stop.publisher(),
        }
    }

    /// Runs states until a stop is requested, then gives the context back.
    pub fn run(self) -> AgentContext {
        let Self {
            mut context,
            mut state,
            current,
            stop,
        } = self;

        info!(state = %state.id(), "state machine started");
        loop {
            // publish the token before looking at the stop flag so a concurrent stop reaches
            // either the flag check or the state about to run
            match current.lock() {
                Ok(mut publisher) => *publisher = state.cancellation().publisher(),
                Err(poisoned) => *poisoned.into_inner() = state.cancellation().publisher(),
            }
            if stop.consumer().is_cancelled() {
                break;
            }

            let from = state.id();
            state = state.handle(&mut context);
            info!(from = %from, to = %state.id(), "state transition");
        }
        info!(state = %state.id(), "state machine stopped");

        context
    }
}

/// Controls a running [StateMachine] from another thread.
#[derive(Clone)]
pub struct StateMachineHandle {
    current: CurrentCancellation,
    stop: EventPublisher<CancellationMessage>,
}

impl StateMachineHandle {
    /// Cancels the state currently running. No-op once that state has finished.
    pub fn cancel(&self) {
        let publisher = match self.current.lock() {
            Ok(publisher) => publisher.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if publisher.publish(()).is_err() {
            debug!("cancellation requested for a finished state");
        }
    }

    /// Stops the state machine after the current state returns, cancelling it.
    pub fn stop(&self) {
        if self.stop.publish(()).is_err() {
            debug!("state machine already stopped");
        }
        self.cancel();
    }
}
