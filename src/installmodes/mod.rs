//! Hardware specific strategies to write a staged payload onto storage.
//!
//! Every install mode implements [InstallMode] and is built fresh, per update attempt, by the
//! [InstallModeRegistry] from the [crate::descriptor::UpdateDescriptor] being installed.
pub mod imxkobs;
pub mod raw;
pub mod registry;
pub mod requirements;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::archive::ExtractError;
use crate::command::CommandError;

pub use registry::{InstallModeFactory, InstallModeRegistry};

#[derive(Error, Debug)]
pub enum InstallModeError {
    #[error("requirement missing: executable '{0}' not found in PATH")]
    RequirementMissing(String),

    #[error("unknown install mode: '{0}'")]
    UnknownMode(String),

    #[error("invalid parameters for install mode '{mode}': {reason}")]
    InvalidParams { mode: String, reason: String },

    #[error("{0}")]
    Command(#[from] CommandError),

    #[error("{0}")]
    Extract(#[from] ExtractError),

    #[error("payload '{0}' has no entries")]
    EmptyPayload(PathBuf),

    #[error("could not access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InstallModeError {
    /// Whether the error means the attempt was rejected before touching the device.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::RequirementMissing(_) | Self::UnknownMode(_) | Self::InvalidParams { .. }
        )
    }
}

pub trait InstallMode: Send {
    /// Identifier this mode is registered with.
    fn mode(&self) -> &'static str;

    /// External executables the mode runs during install.
    fn required_binaries(&self) -> &[&'static str] {
        &[]
    }

    /// Verifies that every required executable is resolvable on the search path.
    fn check_requirements(&self) -> Result<(), InstallModeError> {
        requirements::check_executables(self.required_binaries().iter().copied(), None)
    }

    fn setup(&mut self) -> Result<(), InstallModeError> {
        Ok(())
    }

    /// Writes the payload staged as `download_dir/<sha256sum>`.
    fn install(&mut self, download_dir: &Path) -> Result<(), InstallModeError>;

    fn cleanup(&mut self) -> Result<(), InstallModeError> {
        Ok(())
    }

    /// Device path the payload is written to.
    fn target(&self) -> PathBuf;
}
