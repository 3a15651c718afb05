//! Tracing subscriber setup for the daemon.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

use covwatch_core::LogLevel;

use crate::error::{io_err, DaemonError};

/// Install the global subscriber. `RUST_LOG` wins over `level`. With a
/// logfile, output is appended there (parent directories are created);
/// otherwise it goes to stderr.
pub fn init_tracing(level: LogLevel, logfile: Option<&Path>) -> Result<(), DaemonError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    match logfile {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| io_err(path, e))?;
            let _ = fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn logfile_and_missing_parents_are_created() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("log/nested/covwatch.log");

        init_tracing(LogLevel::Info, Some(&path)).expect("init tracing");

        assert!(path.exists());
    }
}
