use tracing::{info, warn};

use super::{RebootState, State, StateId};
use crate::agent::AgentContext;
use crate::descriptor::UpdateDescriptor;
use crate::event::cancellation::Cancellation;
use crate::installmodes::InstallModeError;

/// Writes the downloaded payload with the install mode the descriptor asks for.
#[derive(Debug)]
pub struct InstallState {
    cancellation: Cancellation,
    descriptor: UpdateDescriptor,
}

impl InstallState {
    pub fn new(descriptor: UpdateDescriptor) -> Self {
        Self {
            cancellation: Cancellation::new(),
            descriptor,
        }
    }

    pub fn descriptor(&self) -> &UpdateDescriptor {
        &self.descriptor
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn handle(self, context: &mut AgentContext) -> State {
        context.report(StateId::Install, None);

        match install(context, &self.descriptor) {
            Ok(()) => {
                info!(mode = self.descriptor.mode(), "update installed");
                State::Reboot(RebootState::new())
            }
            Err(err) => {
                warn!(mode = self.descriptor.mode(), %err, "install failed");
                State::error(err)
            }
        }
    }
}

// The instance lives for this attempt only. Cleanup runs whenever setup succeeded; the
// install error wins over the cleanup one.
fn install(context: &AgentContext, descriptor: &UpdateDescriptor) -> Result<(), InstallModeError> {
    let mut mode = context.registry.build(descriptor)?;
    mode.check_requirements()?;
    mode.setup()?;

    let installed = mode.install(&context.download_dir);
    let cleaned = mode.cleanup();
    if let (Err(_), Err(cleanup_err)) = (&installed, &cleaned) {
        warn!(%cleanup_err, "cleanup failed after a failed install");
    }

    installed.and(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::test_context_with;
    use crate::client::tests::MockUpdateServer;
    use crate::command::CommandError;
    use crate::descriptor::tests::sha256sum;
    use crate::installmodes::tests::MockInstallMode;
    use crate::installmodes::InstallModeRegistry;
    use assert_matches::assert_matches;
    use mockall::Sequence;
    use std::path::PathBuf;

    const FAKE_MODE: &str = "fake";

    fn context_with_mode<F>(build: F) -> (AgentContext, tempfile::TempDir)
    where
        F: Fn() -> MockInstallMode + Send + Sync + 'static,
    {
        let mut server = MockUpdateServer::new();
        server.should_report_any();
        let (mut context, dir) = test_context_with(0, server);
        let mut registry = InstallModeRegistry::new();
        registry.register(FAKE_MODE, move |_| Ok(Box::new(build())));
        context.registry = registry;
        (context, dir)
    }

    fn command_failure() -> InstallModeError {
        InstallModeError::Command(CommandError::ExitError {
            program: "kobs-ng".to_string(),
            output: "combinedOutput".to_string(),
        })
    }

    #[test]
    fn successful_install_goes_to_reboot() {
        let (mut context, _dir) = context_with_mode(|| {
            let mut seq = Sequence::new();
            let mut mode = MockInstallMode::new();
            mode.expect_check_requirements()
                .once()
                .in_sequence(&mut seq)
                .returning(|| Ok(()));
            mode.expect_setup()
                .once()
                .in_sequence(&mut seq)
                .returning(|| Ok(()));
            mode.expect_install()
                .once()
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
            mode.expect_cleanup()
                .once()
                .in_sequence(&mut seq)
                .returning(|| Ok(()));
            mode
        });

        let descriptor = UpdateDescriptor::new(FAKE_MODE, sha256sum());
        let next = InstallState::new(descriptor).handle(&mut context);

        assert_matches!(next, State::Reboot(_));
    }

    #[test]
    fn install_receives_download_dir() {
        let (mut context, _dir) = context_with_mode(MockInstallMode::new);
        let download_dir = context.download_dir.clone();
        context.registry.register(FAKE_MODE, move |_| {
            let expected: PathBuf = download_dir.clone();
            let mut mode = MockInstallMode::new();
            mode.expect_check_requirements().returning(|| Ok(()));
            mode.expect_setup().returning(|| Ok(()));
            mode.expect_install()
                .withf(move |dir| dir.to_path_buf() == expected)
                .once()
                .returning(|_| Ok(()));
            mode.expect_cleanup().returning(|| Ok(()));
            Ok(Box::new(mode))
        });

        let descriptor = UpdateDescriptor::new(FAKE_MODE, sha256sum());
        let next = InstallState::new(descriptor).handle(&mut context);

        assert_matches!(next, State::Reboot(_));
    }

    #[test]
    fn unknown_mode_goes_to_error() {
        let (mut context, _dir) = context_with_mode(MockInstallMode::new);

        let next =
            InstallState::new(UpdateDescriptor::new("ubifs", sha256sum())).handle(&mut context);

        assert_matches!(next, State::Error(error) => {
            assert_eq!("unknown install mode: 'ubifs'", error.message());
        });
    }

    #[test]
    fn missing_requirement_skips_setup() {
        let (mut context, _dir) = context_with_mode(|| {
            let mut mode = MockInstallMode::new();
            mode.expect_check_requirements()
                .once()
                .returning(|| Err(InstallModeError::RequirementMissing("kobs-ng".to_string())));
            mode.expect_setup().never();
            mode.expect_install().never();
            mode.expect_cleanup().never();
            mode
        });

        let descriptor = UpdateDescriptor::new(FAKE_MODE, sha256sum());
        let next = InstallState::new(descriptor).handle(&mut context);

        assert_matches!(next, State::Error(error) => {
            assert_eq!(
                "requirement missing: executable 'kobs-ng' not found in PATH",
                error.message()
            );
        });
    }

    #[test]
    fn failed_setup_skips_install_and_cleanup() {
        let (mut context, _dir) = context_with_mode(|| {
            let mut mode = MockInstallMode::new();
            mode.expect_check_requirements().returning(|| Ok(()));
            mode.expect_setup().once().returning(|| Err(command_failure()));
            mode.expect_install().never();
            mode.expect_cleanup().never();
            mode
        });

        let descriptor = UpdateDescriptor::new(FAKE_MODE, sha256sum());
        let next = InstallState::new(descriptor).handle(&mut context);

        assert_matches!(next, State::Error(_));
    }

    #[test]
    fn cleanup_runs_after_failed_install() {
        let (mut context, _dir) = context_with_mode(|| {
            let mut mode = MockInstallMode::new();
            mode.expect_check_requirements().returning(|| Ok(()));
            mode.expect_setup().returning(|| Ok(()));
            mode.expect_install().once().returning(|_| Err(command_failure()));
            mode.expect_cleanup().once().returning(|| {
                Err(InstallModeError::EmptyPayload(PathBuf::from("/tmp/cleanup")))
            });
            mode
        });

        let descriptor = UpdateDescriptor::new(FAKE_MODE, sha256sum());
        let next = InstallState::new(descriptor).handle(&mut context);

        assert_matches!(next, State::Error(error) => {
            assert_eq!(
                "error executing 'kobs-ng'. Output: combinedOutput",
                error.message()
            );
        });
    }

    #[test]
    fn failed_cleanup_after_successful_install_is_an_error() {
        let (mut context, _dir) = context_with_mode(|| {
            let mut mode = MockInstallMode::new();
            mode.expect_check_requirements().returning(|| Ok(()));
            mode.expect_setup().returning(|| Ok(()));
            mode.expect_install().returning(|_| Ok(()));
            mode.expect_cleanup().once().returning(|| {
                Err(InstallModeError::EmptyPayload(PathBuf::from("/tmp/cleanup")))
            });
            mode
        });

        let descriptor = UpdateDescriptor::new(FAKE_MODE, sha256sum());
        let next = InstallState::new(descriptor).handle(&mut context);

        assert_matches!(next, State::Error(_));
    }
}
