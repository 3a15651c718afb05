//! In-memory stand-ins for the OS notification backend and process runner.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::command::{CommandOutput, CommandRunner};
use crate::error::DaemonError;
use crate::watch_set::{WatchBackend, WatchId, WatchMask};

/// Records every argv it is asked to run and answers with a fixed exit code.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingRunner {
    calls: Rc<RefCell<Vec<Vec<String>>>>,
    exit_code: i32,
}

impl RecordingRunner {
    pub(crate) fn failing(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput, DaemonError> {
        self.calls.borrow_mut().push(argv.to_vec());
        Ok(CommandOutput {
            code: Some(self.exit_code),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Hands out sequential ids and remembers which paths are live.
#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    next: u64,
    live: BTreeMap<WatchId, (PathBuf, WatchMask)>,
    refused: HashSet<PathBuf>,
    pub(crate) stopped: bool,
}

impl FakeBackend {
    /// Make future subscriptions on `path` fail.
    pub(crate) fn refuse(&mut self, path: &Path) {
        self.refused.insert(path.to_path_buf());
    }

    pub(crate) fn live(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.live.values().map(|(p, _)| p.clone()).collect();
        paths.sort();
        paths
    }
}

impl WatchBackend for FakeBackend {
    fn subscribe(&mut self, path: &Path, mask: WatchMask) -> Result<WatchId, DaemonError> {
        if self.refused.contains(path) {
            return Err(DaemonError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "refused"),
            });
        }
        self.next += 1;
        let id = WatchId(self.next);
        self.live.insert(id, (path.to_path_buf(), mask));
        Ok(id)
    }

    fn unsubscribe(&mut self, id: WatchId) -> Result<(), DaemonError> {
        self.live
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DaemonError::WatchNotFound {
                path: PathBuf::from(format!("<watch {}>", id.0)),
            })
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
