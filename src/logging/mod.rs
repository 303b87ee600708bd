use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;
use tracing::metadata::LevelFilter;
use tracing_subscriber::fmt::format::PrettyFields;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("init logging error: `{0}`")]
    TryInitError(String),
}

pub struct Logging;

impl Logging {
    /// Installs the global subscriber. `RUST_LOG` overrides the default `INFO` level.
    pub fn try_init() -> Result<(), LoggingError> {
        Self::try_init_with_level(LevelFilter::INFO)
    }

    pub fn try_init_with_level(default_level: LevelFilter) -> Result<(), LoggingError> {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::builder()
                    .with_default_directive(default_level.into())
                    .from_env_lossy(),
            )
            // the idle poller runs on its own named thread
            .with_thread_names(true)
            .fmt_fields(PrettyFields::new())
            .try_init()
            .map_err(|_| {
                LoggingError::TryInitError(
                    "unable to set fota agent global logging subscriber".to_string(),
                )
            })?;

        debug!(%default_level, "logging initialized");
        Ok(())
    }
}
