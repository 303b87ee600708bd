use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::{InstallMode, InstallModeError};
use crate::archive::{
    copy_data, seek_offset, ArchiveOpener, ArchiveReader, CopyOptions, ExtractError, NextHeader,
    DEFAULT_BLOCK_SIZE,
};
use crate::descriptor::{Sha256Sum, UpdateDescriptor};

pub const RAW_MODE: &str = "raw";

const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_count() -> i64 {
    -1
}

/// Mode specific fields of a `raw` descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RawConfig {
    pub target: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Input chunks to skip.
    #[serde(default)]
    pub skip: u64,
    /// Output chunks to skip.
    #[serde(default)]
    pub seek: u64,
    /// Chunks to copy, -1 copies everything.
    #[serde(default = "default_count")]
    pub count: i64,
    #[serde(default)]
    pub truncate: bool,
}

impl RawConfig {
    fn validate(self) -> Result<Self, String> {
        if self.target.is_empty() {
            return Err("target must not be empty".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk-size must be greater than zero".to_string());
        }
        if self.count < -1 {
            return Err(format!("count must be -1 or positive, got {}", self.count));
        }
        seek_offset(self.seek, self.chunk_size).map_err(|err| err.to_string())?;
        Ok(self)
    }

    fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            chunk_size: self.chunk_size,
            skip: self.skip,
            seek: self.seek,
            count: u64::try_from(self.count).ok(),
        }
    }
}

/// Streams the first entry of the payload straight onto a device or file.
pub struct Raw<O> {
    sha256sum: Sha256Sum,
    config: RawConfig,
    opener: Arc<O>,
}

impl<O> Raw<O>
where
    O: ArchiveOpener,
{
    pub fn new(sha256sum: Sha256Sum, config: RawConfig, opener: Arc<O>) -> Self {
        Self {
            sha256sum,
            config,
            opener,
        }
    }

    pub fn try_new(
        descriptor: &UpdateDescriptor,
        opener: Arc<O>,
    ) -> Result<Self, InstallModeError> {
        let invalid = |reason: String| InstallModeError::InvalidParams {
            mode: RAW_MODE.to_string(),
            reason,
        };
        let config: RawConfig =
            serde_json::from_value(serde_json::Value::Object(descriptor.params().clone()))
                .map_err(|err| invalid(err.to_string()))?;
        let config = config.validate().map_err(invalid)?;

        Ok(Self::new(descriptor.sha256sum().clone(), config, opener))
    }
}

impl<O> InstallMode for Raw<O>
where
    O: ArchiveOpener,
{
    fn mode(&self) -> &'static str {
        RAW_MODE
    }

    fn install(&mut self, download_dir: &Path) -> Result<(), InstallModeError> {
        let source = download_dir.join(self.sha256sum.as_str());
        let mut reader = self
            .opener
            .open_for_reading(&source, DEFAULT_BLOCK_SIZE)
            .map_err(ExtractError::from)?;

        let entry = match reader.next_header().map_err(ExtractError::from)? {
            NextHeader::Entry(entry) => entry,
            NextHeader::EndOfEntries => return Err(InstallModeError::EmptyPayload(source)),
        };

        let target = self.target();
        let io_error = |source| InstallModeError::Io {
            path: target.clone(),
            source,
        };
        let mut output = OpenOptions::new()
            .write(true)
            .truncate(self.config.truncate)
            .open(&target)
            .map_err(io_error)?;

        let written = copy_data(&mut reader, &mut output, &self.config.copy_options())?;
        output.sync_all().map_err(io_error)?;
        reader.close();

        info!(
            entry = entry.pathname(),
            target = %target.display(),
            written,
            "raw payload written"
        );
        Ok(())
    }

    fn target(&self) -> PathBuf {
        PathBuf::from(&self.config.target)
    }
}
