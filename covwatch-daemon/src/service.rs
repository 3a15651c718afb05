use covwatch_core::{ServiceName, Settings};

use crate::command::CommandRunner;

/// Restarts the instrumented service so a patched executable takes effect.
pub struct ServiceController<R> {
    runner: R,
    name: ServiceName,
    argv: Vec<String>,
}

impl<R: CommandRunner> ServiceController<R> {
    pub fn new(runner: R, name: ServiceName, argv: Vec<String>) -> Self {
        Self { runner, name, argv }
    }

    pub fn from_settings(runner: R, settings: &Settings) -> Self {
        Self::new(runner, settings.service_name.clone(), settings.restart_argv())
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run the restart command. Returns whether it exited successfully;
    /// failures are logged here and never propagated.
    pub fn restart(&self) -> bool {
        tracing::info!(service = %self.name, "restarting service");
        match self.runner.run(&self.argv) {
            Ok(output) if output.success() => true,
            Ok(output) => {
                tracing::error!(service = %self.name, rc = ?output.code, "service restart failed");
                false
            }
            Err(err) => {
                tracing::error!(service = %self.name, error = %err, "service restart failed");
                false
            }
        }
    }
}
