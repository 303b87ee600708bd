//! Access to the remote update server.
pub mod error;
pub mod http;

use std::io::Write;

use crate::agent::state::StateId;
use crate::descriptor::UpdateDescriptor;

pub use error::ClientError;
pub use http::HttpUpdateServer;

pub trait UpdateServer: Send + Sync {
    /// Asks for a pending update. `None` means the device is up to date.
    fn check_update(&self) -> Result<Option<UpdateDescriptor>, ClientError>;

    /// Streams the payload named by the descriptor checksum into `dest`, returning the number
    /// of bytes written.
    fn fetch_object(
        &self,
        descriptor: &UpdateDescriptor,
        dest: &mut dyn Write,
    ) -> Result<u64, ClientError>;

    /// Reports the state the agent entered. `error_message` is empty unless `state` is an error.
    fn report_state(&self, state: StateId, error_message: &str) -> Result<(), ClientError>;
}
