use std::process::{Command, Stdio};

use tracing::debug;

use super::{CommandError, CommandExecutor, CommandLine};

/// Runs commands as child processes of the agent.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for ProcessRunner {
    fn execute(&self, cmd: &CommandLine) -> Result<String, CommandError> {
        debug!(command = %cmd, "executing command");

        let output = Command::new(cmd.program())
            .args(cmd.args())
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CommandError::SpawnError {
                program: cmd.program().to_string(),
                source,
            })?;

        // stdout followed by stderr
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(CommandError::ExitError {
                program: cmd.program().to_string(),
                output: combined,
            });
        }

        Ok(combined)
    }
}

#[cfg(all(test, target_family = "unix"))]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn successful_command_returns_combined_output() {
        let cmd = CommandLine::new("sh")
            .arg("-c")
            .arg("printf out; printf err >&2");

        assert_eq!("outerr", ProcessRunner::new().execute(&cmd).unwrap());
    }

    #[test]
    fn stdout_comes_first_regardless_of_write_order() {
        let cmd = CommandLine::new("sh")
            .arg("-c")
            .arg("printf err >&2; printf out");

        assert_eq!("outerr", ProcessRunner::new().execute(&cmd).unwrap());
    }

    #[test]
    fn failing_command_reports_output() {
        let cmd = CommandLine::new("sh")
            .arg("-c")
            .arg("printf 'bad block'; exit 3");

        let err = ProcessRunner::new().execute(&cmd).unwrap_err();
        assert_matches!(&err, CommandError::ExitError { program, output } => {
            assert_eq!("sh", program);
            assert_eq!("bad block", output);
        });
        assert_eq!("error executing 'sh'. Output: bad block", err.to_string());
    }

    #[test]
    fn missing_binary_fails_to_spawn() {
        let cmd = CommandLine::new("/nonexistent/fota-agent-binary");

        assert_matches!(
            ProcessRunner::new().execute(&cmd),
            Err(CommandError::SpawnError { .. })
        );
    }
}
