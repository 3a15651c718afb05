//! Domain types shared by the config loader and the daemon.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of the OS service restarted after the target file is patched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceName(pub String);

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServiceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Python module that carries the coverage hook. Doubles as the marker that
/// identifies an instrumented line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HookModule(pub String);

impl Default for HookModule {
    fn default() -> Self {
        Self("vdsmcodecoverage".to_string())
    }
}

impl fmt::Display for HookModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for HookModule {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Verbosity of the daemon log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

// ---------------------------------------------------------------------------
// TargetPath
// ---------------------------------------------------------------------------

/// Absolute path of the file to instrument, viewed as its ordered chain of
/// components. The root component counts as the first element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetPath {
    path: PathBuf,
}

/// Result of comparing some path against the target component by component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixMatch {
    /// Number of leading components that compared equal.
    pub matched: usize,
    /// A differing component was seen before either path ran out.
    pub diverged: bool,
}

impl PrefixMatch {
    /// True when every compared component was equal.
    pub fn on_chain(&self) -> bool {
        !self.diverged
    }
}

impl TargetPath {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(ConfigError::invalid(
                "path_to_target",
                format!("'{}' is not an absolute path", path.display()),
            ));
        }
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
        {
            return Err(ConfigError::invalid(
                "path_to_target",
                format!("'{}' must not contain '.' or '..'", path.display()),
            ));
        }
        if path.components().count() < 2 {
            return Err(ConfigError::invalid(
                "path_to_target",
                "the filesystem root cannot be a target",
            ));
        }
        // Re-assemble from components so trailing or doubled separators vanish.
        Ok(Self {
            path: path.components().collect(),
        })
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Number of components, root included (`/a/b/vdsm` has 4).
    pub fn depth(&self) -> usize {
        self.path.components().count()
    }

    /// Every prefix from the root down to the target itself:
    /// `/`, `/a`, `/a/b`, `/a/b/vdsm`.
    pub fn prefixes(&self) -> Vec<PathBuf> {
        let mut current = PathBuf::new();
        self.path
            .components()
            .map(|component| {
                current.push(component);
                current.clone()
            })
            .collect()
    }

    /// Compare `other` with the target pairwise over the shorter chain.
    pub fn match_prefix(&self, other: &Path) -> PrefixMatch {
        let mut matched = 0;
        for (ours, theirs) in self.path.components().zip(other.components()) {
            if ours != theirs {
                return PrefixMatch {
                    matched,
                    diverged: true,
                };
            }
            matched += 1;
        }
        PrefixMatch {
            matched,
            diverged: false,
        }
    }

    /// True when a comparison covered the whole target chain.
    pub fn is_reached_by(&self, m: PrefixMatch) -> bool {
        m.matched == self.depth()
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.display().fmt(f)
    }
}
