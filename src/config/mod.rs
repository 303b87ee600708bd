//! Agent configuration, read once at startup from a YAML file.
pub mod agent_config;
pub mod error;
pub mod loader;

pub use agent_config::{AgentConfig, PollInterval};
pub use error::AgentConfigError;
pub use loader::{AgentConfigLoader, AgentConfigLoaderFile};
