//! Lifecycle states of the agent.
//!
//! A [State] owns everything needed to run it, its [Cancellation] token included. Running a
//! state consumes it and yields the next one, so a state value is never reused.
pub mod download;
pub mod error;
pub mod idle;
pub mod install;
pub mod reboot;
pub mod update_check;

use std::fmt::{Display, Formatter};

use super::AgentContext;
use crate::event::cancellation::Cancellation;

pub use download::{DownloadError, DownloadState};
pub use error::ErrorState;
pub use idle::IdleState;
pub use install::InstallState;
pub use reboot::RebootState;
pub use update_check::UpdateCheckState;

/// Identity of a state, as logged and reported to the update server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateId {
    Idle,
    UpdateCheck,
    Download,
    Install,
    Reboot,
    Error,
}

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let id = match self {
            StateId::Idle => "idle",
            StateId::UpdateCheck => "update-check",
            StateId::Download => "downloading",
            StateId::Install => "installing",
            StateId::Reboot => "rebooting",
            StateId::Error => "error",
        };
        f.write_str(id)
    }
}

#[derive(Debug)]
pub enum State {
    Idle(IdleState),
    UpdateCheck(UpdateCheckState),
    Download(DownloadState),
    Install(InstallState),
    Reboot(RebootState),
    Error(ErrorState),
}

impl State {
    pub fn idle() -> Self {
        State::Idle(IdleState::new())
    }

    /// Error state carrying the message of `err`.
    pub fn error<E: Display>(err: E) -> Self {
        State::Error(ErrorState::new(err.to_string()))
    }

    pub fn id(&self) -> StateId {
        match self {
            State::Idle(_) => StateId::Idle,
            State::UpdateCheck(_) => StateId::UpdateCheck,
            State::Download(_) => StateId::Download,
            State::Install(_) => StateId::Install,
            State::Reboot(_) => StateId::Reboot,
            State::Error(_) => StateId::Error,
        }
    }

    pub fn cancellation(&self) -> &Cancellation {
        match self {
            State::Idle(s) => s.cancellation(),
            State::UpdateCheck(s) => s.cancellation(),
            State::Download(s) => s.cancellation(),
            State::Install(s) => s.cancellation(),
            State::Reboot(s) => s.cancellation(),
            State::Error(s) => s.cancellation(),
        }
    }

    /// Runs the state to completion and returns the next one. Failures never escape: they
    /// become [State::Error].
    pub fn handle(self, context: &mut AgentContext) -> State {
        match self {
            State::Idle(s) => s.handle(context),
            State::UpdateCheck(s) => s.handle(context),
            State::Download(s) => s.handle(context),
            State::Install(s) => s.handle(context),
            State::Reboot(s) => s.handle(context),
            State::Error(s) => s.handle(context),
        }
    }
}
