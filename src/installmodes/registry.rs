use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::imxkobs::{ImxKobs, IMXKOBS_MODE};
use super::raw::{Raw, RAW_MODE};
use super::{InstallMode, InstallModeError};
use crate::archive::ArchiveOpener;
use crate::command::CommandExecutor;
use crate::descriptor::UpdateDescriptor;

/// Builds an install mode instance out of the descriptor being installed.
pub type InstallModeFactory = Box<
    dyn Fn(&UpdateDescriptor) -> Result<Box<dyn InstallMode>, InstallModeError> + Send + Sync,
>;

/// Maps install mode identifiers to the factories building them.
#[derive(Default)]
pub struct InstallModeRegistry(HashMap<String, InstallModeFactory>);

impl InstallModeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every install mode shipped with the agent.
    pub fn with_defaults<E, O>(executor: Arc<E>, opener: Arc<O>) -> Self
    where
        E: CommandExecutor + 'static,
        O: ArchiveOpener + 'static,
    {
        let mut registry = Self::new();
        registry.register(IMXKOBS_MODE, move |descriptor| {
            Ok(Box::new(ImxKobs::try_new(descriptor, executor.clone())?))
        });
        registry.register(RAW_MODE, move |descriptor| {
            Ok(Box::new(Raw::try_new(descriptor, opener.clone())?))
        });
        registry
    }

    /// Registers `factory` for `mode`, replacing any previous registration.
    pub fn register<F>(&mut self, mode: &str, factory: F)
    where
        F: Fn(&UpdateDescriptor) -> Result<Box<dyn InstallMode>, InstallModeError>
            + Send
            + Sync
            + 'static,
    {
        if self.0.insert(mode.to_string(), Box::new(factory)).is_some() {
            warn!(mode, "install mode registered twice, keeping the latest");
        }
    }

    /// Sorted list of the registered modes.
    pub fn modes(&self) -> Vec<&str> {
        let mut modes: Vec<&str> = self.0.keys().map(String::as_str).collect();
        modes.sort_unstable();
        modes
    }

    /// Builds a fresh instance of the mode requested by `descriptor`.
    pub fn build(
        &self,
        descriptor: &UpdateDescriptor,
    ) -> Result<Box<dyn InstallMode>, InstallModeError> {
        let factory = self
            .0
            .get(descriptor.mode())
            .ok_or_else(|| InstallModeError::UnknownMode(descriptor.mode().to_string()))?;
        factory(descriptor)
    }
}

impl std::fmt::Debug for InstallModeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InstallModeRegistry")
            .field(&self.modes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::StreamArchiveOpener;
    use crate::command::ProcessRunner;
    use crate::descriptor::tests::{sha256sum, sha256sum_of};
    use crate::installmodes::tests::MockInstallMode;
    use assert_matches::assert_matches;
    use std::path::PathBuf;

    fn default_registry() -> InstallModeRegistry {
        InstallModeRegistry::with_defaults(
            Arc::new(ProcessRunner::new()),
            Arc::new(StreamArchiveOpener::new()),
        )
    }

    #[test]
    fn defaults_are_registered() {
        assert_eq!(vec!["imxkobs", "raw"], default_registry().modes());
    }

    #[test]
    fn unknown_mode_is_a_configuration_error() {
        let descriptor = UpdateDescriptor::new("ubifs", sha256sum());

        let result = default_registry().build(&descriptor).err();

        assert_matches!(result, Some(InstallModeError::UnknownMode(mode)) => {
            assert_eq!("ubifs", mode);
        });
    }

    #[test]
    fn build_maps_descriptor_into_instance() {
        let descriptor = UpdateDescriptor::new("imxkobs", sha256sum())
            .with_param("chip_0_device_path", "/dev/mtd3");

        let instance = default_registry().build(&descriptor).unwrap();

        assert_eq!("imxkobs", instance.mode());
        assert_eq!(PathBuf::from("/dev/mtd3ro"), instance.target());
    }

    #[test]
    fn build_creates_a_fresh_instance_each_time() {
        let mut registry = InstallModeRegistry::new();
        registry.register("fake", |descriptor| {
            let target = PathBuf::from(format!("/dev/{}", descriptor.sha256sum()));
            let mut mode = MockInstallMode::new();
            mode.expect_target().return_const(target);
            Ok(Box::new(mode))
        });

        let one = sha256sum_of(b"one");
        let two = sha256sum_of(b"two");
        let first = registry.build(&UpdateDescriptor::new("fake", one.clone())).unwrap();
        let second = registry.build(&UpdateDescriptor::new("fake", two.clone())).unwrap();

        assert_eq!(PathBuf::from(format!("/dev/{one}")), first.target());
        assert_eq!(PathBuf::from(format!("/dev/{two}")), second.target());
    }

    #[test]
    fn registering_twice_keeps_the_latest() {
        let mut registry = InstallModeRegistry::new();
        registry.register("fake", |_| Err(InstallModeError::UnknownMode("first".into())));
        registry.register("fake", |_| Err(InstallModeError::UnknownMode("second".into())));

        assert_eq!(vec!["fake"], registry.modes());
        assert_matches!(
            registry.build(&UpdateDescriptor::new("fake", sha256sum())).err(),
            Some(InstallModeError::UnknownMode(m)) if m == "second"
        );
    }
}
