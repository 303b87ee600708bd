use std::path::PathBuf;
use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

pub const DEFAULT_SERVER_ADDRESS: &str = "http://localhost:8080";
pub const DEFAULT_DOWNLOAD_DIR: &str = "/tmp/fota-agent";
pub const DEFAULT_REBOOT_COMMAND: &str = "reboot";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_server_address")]
    pub server_address: String,
    #[serde(default)]
    pub poll_interval: PollInterval,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_reboot_command")]
    pub reboot_command: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            poll_interval: PollInterval::default(),
            download_dir: default_download_dir(),
            reboot_command: default_reboot_command(),
        }
    }
}

fn default_server_address() -> String {
    DEFAULT_SERVER_ADDRESS.to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DOWNLOAD_DIR)
}

fn default_reboot_command() -> String {
    DEFAULT_REBOOT_COMMAND.to_string()
}

/// Time spent in Idle between two update checks. Written as `30s`, `15m`, `1h`...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PollInterval(#[serde(deserialize_with = "deserialize_duration")] Duration);

impl PollInterval {
    /// Whole seconds; the idle counter ticks once per second.
    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(DEFAULT_POLL_INTERVAL)
    }
}

impl From<Duration> for PollInterval {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl From<PollInterval> for Duration {
    fn from(value: PollInterval) -> Self {
        value.0
    }
}
