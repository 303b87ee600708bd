use tracing::{info, warn};

use super::{DownloadState, State};
use crate::agent::AgentContext;
use crate::event::cancellation::Cancellation;

/// Asks the update server for a pending update. Bounded by the client timeout, so it never
/// listens to its cancellation token.
#[derive(Debug, Default)]
pub struct UpdateCheckState {
    cancellation: Cancellation,
}

impl UpdateCheckState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn handle(self, context: &mut AgentContext) -> State {
        match context.server.check_update() {
            Ok(None) => {
                info!("no update available");
                State::idle()
            }
            Ok(Some(descriptor)) => {
                info!(
                    mode = descriptor.mode(),
                    sha256sum = %descriptor.sha256sum(),
                    "update available"
                );
                context.update_descriptor = Some(descriptor.clone());
                State::Download(DownloadState::new(descriptor))
            }
            Err(err) => {
                warn!(%err, "update check failed");
                State::error(err)
            }
        }
    }
}
