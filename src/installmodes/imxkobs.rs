//! i.MX NAND boot images written through the `kobs-ng` helper.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use super::{InstallMode, InstallModeError};
use crate::command::{CommandExecutor, CommandLine};
use crate::descriptor::{Sha256Sum, UpdateDescriptor};

pub const IMXKOBS_MODE: &str = "imxkobs";

const KOBS_NG: &str = "kobs-ng";
const DEFAULT_TARGET_DEVICE: &str = "/dev/mtd0";
const READ_ONLY_SUFFIX: &str = "ro";

/// Mode specific fields of an `imxkobs` descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImxKobsConfig {
    #[serde(rename = "1k_padding", default)]
    pub add_1k_padding: bool,
    #[serde(default)]
    pub search_exponent: i64,
    #[serde(default)]
    pub chip_0_device_path: String,
    #[serde(default)]
    pub chip_1_device_path: String,
}

pub struct ImxKobs<E> {
    sha256sum: Sha256Sum,
    config: ImxKobsConfig,
    executor: Arc<E>,
}

impl<E> ImxKobs<E>
where
    E: CommandExecutor,
{
    pub fn new(sha256sum: Sha256Sum, config: ImxKobsConfig, executor: Arc<E>) -> Self {
        Self {
            sha256sum,
            config,
            executor,
        }
    }

    pub fn try_new(
        descriptor: &UpdateDescriptor,
        executor: Arc<E>,
    ) -> Result<Self, InstallModeError> {
        let config: ImxKobsConfig =
            serde_json::from_value(serde_json::Value::Object(descriptor.params().clone()))
                .map_err(|err| InstallModeError::InvalidParams {
                    mode: IMXKOBS_MODE.to_string(),
                    reason: err.to_string(),
                })?;

        Ok(Self::new(descriptor.sha256sum().clone(), config, executor))
    }

    /// Arguments always follow the same order, whatever the order of the descriptor fields.
    pub fn command_line(&self, download_dir: &Path) -> CommandLine {
        let source = download_dir.join(self.sha256sum.as_str());
        let config = &self.config;

        CommandLine::new(KOBS_NG)
            .arg("init")
            .arg_if(config.add_1k_padding, "-x")
            .arg(source.to_string_lossy())
            .arg_if(
                config.search_exponent > 0,
                format!("--search_exponent={}", config.search_exponent),
            )
            .arg_if(
                !config.chip_0_device_path.is_empty(),
                format!("--chip_0_device_path={}", config.chip_0_device_path),
            )
            .arg_if(
                !config.chip_1_device_path.is_empty(),
                format!("--chip_1_device_path={}", config.chip_1_device_path),
            )
            .arg("-v")
    }
}

impl<E> InstallMode for ImxKobs<E>
where
    E: CommandExecutor,
{
    fn mode(&self) -> &'static str {
        IMXKOBS_MODE
    }

    fn required_binaries(&self) -> &[&'static str] {
        &[KOBS_NG]
    }

    fn install(&mut self, download_dir: &Path) -> Result<(), InstallModeError> {
        info!(sha256sum = %self.sha256sum, "imxkobs install");

        let cmd = self.command_line(download_dir);
        let output = self.executor.execute(&cmd)?;
        debug!(command = %cmd, output = %output, "kobs-ng finished");

        Ok(())
    }

    fn target(&self) -> PathBuf {
        let primary = if self.config.chip_0_device_path.is_empty() {
            DEFAULT_TARGET_DEVICE
        } else {
            self.config.chip_0_device_path.as_str()
        };
        PathBuf::from(format!("{primary}{READ_ONLY_SUFFIX}"))
    }
}
