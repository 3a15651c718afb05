use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the watcher daemon: watches, patching, commands, lifecycle.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to run `{program}`: {source}")]
    Command {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no watch registered for {path}")]
    WatchNotFound { path: PathBuf },

    #[error("daemon already running with pid {pid} (pidfile {path})")]
    AlreadyRunning { pid: u32, path: PathBuf },

    #[error("signal handler failed: {0}")]
    Signal(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
