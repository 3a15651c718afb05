//! Tracks which ancestors of the target path are currently watched.
//!
//! The set owns a [`WatchBackend`] and keeps a path → [`WatchEntry`] map
//! that mirrors exactly what the backend has installed. Only the single
//! event-processing thread ever touches it.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};

use covwatch_core::TargetPath;

use crate::error::DaemonError;

// ---------------------------------------------------------------------------
// Masks and handles
// ---------------------------------------------------------------------------

/// Which event kinds a watch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchMask(u8);

impl WatchMask {
    pub const CREATE: Self = Self(0b001);
    pub const DELETE: Self = Self(0b010);
    pub const MODIFY: Self = Self(0b100);
    /// Mask used for directories on the ancestor chain.
    pub const BASE: Self = Self(Self::CREATE.0 | Self::DELETE.0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Base mask, plus MODIFY when `path` is currently a regular file.
    pub fn for_path(path: &Path) -> Self {
        if path.is_file() {
            Self::BASE | Self::MODIFY
        } else {
            Self::BASE
        }
    }
}

impl BitOr for WatchMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for WatchMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::CREATE, "CREATE"),
            (Self::DELETE, "DELETE"),
            (Self::MODIFY, "MODIFY"),
        ]
        .into_iter()
        .filter(|(bit, _)| self.contains(*bit))
        .map(|(_, name)| name)
        .collect();
        f.write_str(&names.join("|"))
    }
}

/// Opaque handle handed out by a [`WatchBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

/// OS notification capability: install and remove single-path watches.
pub trait WatchBackend {
    fn subscribe(&mut self, path: &Path, mask: WatchMask) -> Result<WatchId, DaemonError>;

    fn unsubscribe(&mut self, id: WatchId) -> Result<(), DaemonError>;

    /// Stop delivering events altogether. Called once during teardown.
    fn stop(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchEntry {
    pub id: WatchId,
    pub mask: WatchMask,
}

// ---------------------------------------------------------------------------
// WatchSet
// ---------------------------------------------------------------------------

pub struct WatchSet<B> {
    target: TargetPath,
    backend: B,
    entries: BTreeMap<PathBuf, WatchEntry>,
}

impl<B: WatchBackend> WatchSet<B> {
    pub fn new(target: TargetPath, backend: B) -> Self {
        Self {
            target,
            backend,
            entries: BTreeMap::new(),
        }
    }

    pub fn target(&self) -> &TargetPath {
        &self.target
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn get(&self, path: &Path) -> Option<&WatchEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Watched paths in lexical order (root first along the chain).
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Watch every existing prefix of the target, stopping at the first one
    /// that does not exist.
    pub fn add_all(&mut self) {
        for prefix in self.target.prefixes() {
            if !prefix.exists() {
                tracing::debug!(path = %prefix.display(), "prefix missing, stopping walk");
                break;
            }
            self.add(&prefix);
        }
    }

    /// Install a watch on `path`. Failures are logged and leave the path
    /// unwatched.
    pub fn add(&mut self, path: &Path) -> Option<WatchId> {
        if let Some(previous) = self.entries.remove(path) {
            // Re-adding replaces the old handle so a path never has two.
            if let Err(err) = self.backend.unsubscribe(previous.id) {
                tracing::debug!(path = %path.display(), error = %err, "dropping stale watch");
            }
        }

        let mask = WatchMask::for_path(path);
        tracing::info!(path = %path.display(), mask = %mask, "adding watch");
        match self.backend.subscribe(path, mask) {
            Ok(id) => {
                self.entries.insert(path.to_path_buf(), WatchEntry { id, mask });
                Some(id)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "watch not installed");
                None
            }
        }
    }

    /// Uninstall the watch on `path`. An unmapped path is logged and reported
    /// as an error.
    ///
    /// DELETE handling goes through [`forget`](Self::forget) instead, since a
    /// vanished path often has no entry left.
    pub fn remove(&mut self, path: &Path) -> Result<(), DaemonError> {
        let Some(entry) = self.entries.remove(path) else {
            tracing::error!(path = %path.display(), "no watch to remove");
            return Err(DaemonError::WatchNotFound {
                path: path.to_path_buf(),
            });
        };
        tracing::info!(path = %path.display(), "removing watch");
        self.backend.unsubscribe(entry.id)
    }

    /// Drop `path` after it disappeared from disk. Unmapped paths are fine.
    /// Returns whether an entry was dropped.
    pub fn forget(&mut self, path: &Path) -> bool {
        let Some(entry) = self.entries.remove(path) else {
            return false;
        };
        // The OS usually retires the watch together with the inode.
        if let Err(err) = self.backend.unsubscribe(entry.id) {
            tracing::debug!(path = %path.display(), error = %err, "watch already gone");
        }
        true
    }

    /// Tear down every watch.
    pub fn remove_all(&mut self) {
        for (path, entry) in std::mem::take(&mut self.entries) {
            tracing::info!(path = %path.display(), "removing watch");
            if let Err(err) = self.backend.unsubscribe(entry.id) {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove watch");
            }
        }
    }
}
