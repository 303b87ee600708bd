use std::path::{Path, PathBuf};

use tracing::debug;

use super::agent_config::AgentConfig;
use super::error::AgentConfigError;

pub trait AgentConfigLoader {
    fn load_config(&self) -> Result<AgentConfig, AgentConfigError>;
}

pub struct AgentConfigLoaderFile {
    path: PathBuf,
}

impl AgentConfigLoaderFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl AgentConfigLoader for AgentConfigLoaderFile {
    fn load_config(&self) -> Result<AgentConfig, AgentConfigError> {
        let file = std::fs::File::open(&self.path)?;
        let config: AgentConfig = serde_yaml::from_reader(file)?;
        debug!(path = %self.path.display(), ?config, "config loaded");
        Ok(config)
    }
}
