//! External command execution.
//!
//! Commands run synchronously to completion on the calling thread. There is
//! no timeout and no retry; callers decide what a non-zero exit code means.

use std::process::Command;

use crate::error::DaemonError;

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Something that can run an argv to completion.
pub trait CommandRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput, DaemonError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput, DaemonError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(DaemonError::Command {
                program: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
            });
        };

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| DaemonError::Command {
                program: program.clone(),
                source,
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        };

        tracing::info!(
            command = %argv.join(" "),
            rc = ?result.code,
            stdout = %result.stdout,
            stderr = %result.stderr,
            "executed command",
        );
        Ok(result)
    }
}
