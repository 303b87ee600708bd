use tracing::{debug, error, info};

use super::{State, StateId, UpdateCheckState};
use crate::agent::AgentContext;
use crate::event::cancellation::Cancellation;
use crate::utils::threads::spawn_named_thread;

const IDLE_THREAD_NAME: &str = "idle-poller";

/// Waits for the poll interval to elapse before the next update check.
///
/// The elapsed counter survives cancellation: a cancelled Idle hands its progress over to the
/// Idle that follows.
#[derive(Debug, Default)]
pub struct IdleState {
    cancellation: Cancellation,
    elapsed: u64,
}

impl IdleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elapsed(elapsed: u64) -> Self {
        Self {
            cancellation: Cancellation::new(),
            elapsed,
        }
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn handle(self, context: &mut AgentContext) -> State {
        let poll_interval = context.poll_interval;
        let tick = context.tick;
        let mut elapsed = self.elapsed;
        // the publisher stays alive until the poller is joined, dropping it would read as a cancel
        let (_publisher, consumer) = self.cancellation.into_parts();

        debug!(elapsed, poll_interval, "idle");
        let poller = spawn_named_thread(IDLE_THREAD_NAME, move || loop {
            if elapsed >= poll_interval {
                return (0, StateId::UpdateCheck);
            }
            if consumer.is_cancelled_with_timeout(tick) {
                return (elapsed, StateId::Idle);
            }
            elapsed += 1;
        });

        match poller.join() {
            Ok((_, StateId::UpdateCheck)) => State::UpdateCheck(UpdateCheckState::new()),
            Ok((elapsed, _)) => {
                info!(elapsed, "idle cancelled");
                State::Idle(IdleState::with_elapsed(elapsed))
            }
            Err(_) => {
                error!("idle poller panicked");
                State::error("idle poller panicked")
            }
        }
    }
}
