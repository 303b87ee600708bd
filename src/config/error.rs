use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentConfigError {
    #[error("error loading config: `{0}`")]
    IOError(#[from] std::io::Error),

    #[error("invalid config: `{0}`")]
    InvalidYamlConfiguration(#[from] serde_yaml::Error),
}
