//! Pidfile held for the lifetime of the running daemon.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, DaemonError};

/// Writes the current pid on creation and removes the file on drop.
#[derive(Debug)]
pub struct Pidfile {
    path: PathBuf,
}

impl Pidfile {
    /// Claim `path`. A pidfile naming a live process is an error; one naming
    /// a dead process is replaced.
    pub fn create(path: &Path) -> Result<Self, DaemonError> {
        let own = std::process::id();

        match fs::read_to_string(path) {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(pid) if pid != own && process_alive(pid) => {
                    return Err(DaemonError::AlreadyRunning {
                        pid,
                        path: path.to_path_buf(),
                    });
                }
                _ => {
                    tracing::warn!(path = %path.display(), "replacing stale pidfile");
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(path, err)),
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::write(path, format!("{own}\n")).map_err(|e| io_err(path, e))?;
        tracing::debug!(path = %path.display(), pid = own, "pidfile written");

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Pidfile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove pidfile")
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
