mod error;
mod processrunner;

use std::fmt::{Display, Formatter};

pub use error::CommandError;
pub use processrunner::ProcessRunner;

/// A program and its arguments, built deterministically by the install modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends `arg` only when `condition` holds.
    pub fn arg_if<S: Into<String>>(self, condition: bool, arg: S) -> Self {
        if condition {
            self.arg(arg)
        } else {
            self
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Splits a whitespace separated command string, as found in configuration files.
    pub fn parse(cmdline: &str) -> Option<Self> {
        let mut parts = cmdline.split_whitespace();
        let program = parts.next()?;
        Some(parts.fold(Self::new(program), |cmd, arg| cmd.arg(arg)))
    }
}

impl Display for CommandLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Trait that specifies the interface to run an external command to completion.
pub trait CommandExecutor: Send + Sync {
    /// Runs the command, returning its combined output when it exits successfully.
    ///
    /// The combined output is all of stdout followed by all of stderr. The two streams are
    /// captured separately, so their writes are not interleaved in the order they happened.
    /// A failed command reports the same combined output in [CommandError::ExitError].
    fn execute(&self, cmd: &CommandLine) -> Result<String, CommandError>;
}
