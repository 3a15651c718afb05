//! Adds, updates and removes the coverage hook line in the target file.
//!
//! The text transformation is pure ([`patch_content`], [`strip_hook`]); the
//! [`Patcher`] wraps it with file I/O and the post-mutation service restart.
//!
//! A hook line looks like:
//!
//! ```text
//! from vdsmcodecoverage.hook import instrument;instrument("/etc/coveragerc")
//! ```
//!
//! Any line containing the hook module name counts as a marker line.

use std::fs;
use std::path::Path;

use covwatch_core::{HookModule, Settings};

use crate::command::CommandRunner;
use crate::error::{io_err, DaemonError};
use crate::service::ServiceController;

const CALL_OPEN: &str = "instrument(";

// ---------------------------------------------------------------------------
// Pure transformation
// ---------------------------------------------------------------------------

/// What the hook line should say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDirective {
    module: String,
    config: String,
}

impl HookDirective {
    pub fn new(module: &HookModule, config: impl Into<String>) -> Self {
        Self {
            module: module.0.clone(),
            config: config.into(),
        }
    }

    /// Substring identifying an instrumented line.
    pub fn marker(&self) -> &str {
        &self.module
    }

    pub fn hook_line(&self) -> String {
        format!(
            "from {}.hook import instrument;{}",
            self.module,
            self.call()
        )
    }

    fn call(&self) -> String {
        format!("{CALL_OPEN}\"{}\")", self.config)
    }
}

/// Result of applying a [`HookDirective`] to file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Content already carries a correct hook line.
    Unchanged,
    /// No marker was present; the hook line was inserted after the first line.
    Inserted(String),
    /// A marker was present with a stale config reference that was rewritten.
    Replaced(String),
}

/// Compute the content that makes `original` carry the hook described by
/// `directive`.
pub fn patch_content(original: &str, directive: &HookDirective) -> PatchOutcome {
    let marker = directive.marker();
    let call = directive.call();

    let has_marker = original.split_inclusive('\n').any(|l| l.contains(marker));
    if !has_marker {
        return PatchOutcome::Inserted(insert_after_first_line(
            original,
            &directive.hook_line(),
        ));
    }

    if original
        .split_inclusive('\n')
        .any(|l| l.contains(marker) && l.contains(&call))
    {
        return PatchOutcome::Unchanged;
    }

    let mut patched = String::with_capacity(original.len() + call.len());
    for line in original.split_inclusive('\n') {
        if !line.contains(marker) {
            patched.push_str(line);
            continue;
        }
        // A rewrite that drops the marker (it only appeared inside the old
        // argument) would leave a line the next pass no longer recognises.
        match rewrite_calls(line, &call).filter(|rewritten| rewritten.contains(marker)) {
            Some(rewritten) => patched.push_str(&rewritten),
            None => {
                // Marker without a usable call: replace the whole line.
                patched.push_str(&directive.hook_line());
                if line.ends_with('\n') {
                    patched.push('\n');
                }
            }
        }
    }
    PatchOutcome::Replaced(patched)
}

/// Drop every marker line. Returns the new content and how many lines went.
pub fn strip_hook(original: &str, directive: &HookDirective) -> (String, usize) {
    let mut removed = 0;
    let mut stripped = String::with_capacity(original.len());
    for line in original.split_inclusive('\n') {
        if line.contains(directive.marker()) {
            removed += 1;
        } else {
            stripped.push_str(line);
        }
    }
    (stripped, removed)
}

/// Insert `hook` as the second line so an interpreter directive stays first.
fn insert_after_first_line(original: &str, hook: &str) -> String {
    let mut out = String::with_capacity(original.len() + hook.len() + 2);
    match original.find('\n') {
        Some(end) => {
            out.push_str(&original[..=end]);
            out.push_str(hook);
            out.push('\n');
            out.push_str(&original[end + 1..]);
        }
        None if original.is_empty() => {
            out.push_str(hook);
            out.push('\n');
        }
        None => {
            out.push_str(original);
            out.push('\n');
            out.push_str(hook);
            out.push('\n');
        }
    }
    out
}

/// Replace the argument list of every `instrument(...)` call in `line`.
fn rewrite_calls(line: &str, call: &str) -> Option<String> {
    let mut out = String::with_capacity(line.len() + call.len());
    let mut rest = line;
    let mut found = false;
    while let Some(start) = rest.find(CALL_OPEN) {
        let args = &rest[start + CALL_OPEN.len()..];
        let Some(close) = args.find(')') else { break };
        out.push_str(&rest[..start]);
        out.push_str(call);
        rest = &args[close + 1..];
        found = true;
    }
    out.push_str(rest);
    found.then_some(out)
}

// ---------------------------------------------------------------------------
// Patcher
// ---------------------------------------------------------------------------

/// What an `enable` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    /// The file does not exist yet.
    Absent,
    /// Hook already correct; nothing written, no restart.
    AlreadyInstrumented,
    /// Hook inserted and service restart attempted.
    Inserted,
    /// Stale config reference rewritten and service restart attempted.
    Replaced,
    /// Reading or writing the file failed; no restart.
    Failed,
}

/// What a `disable` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableOutcome {
    /// The file does not exist; nothing done.
    Absent,
    /// Marker lines removed (possibly zero) and service restart attempted.
    Stripped { removed: usize },
}

/// Applies [`HookDirective`]s to files and restarts the service afterwards.
pub struct Patcher<R> {
    directive: HookDirective,
    service: ServiceController<R>,
}

impl<R: CommandRunner> Patcher<R> {
    pub fn new(directive: HookDirective, service: ServiceController<R>) -> Self {
        Self { directive, service }
    }

    pub fn from_settings(runner: R, settings: &Settings) -> Self {
        Self::new(
            HookDirective::new(&settings.hook_module, settings.coverage_config.clone()),
            ServiceController::from_settings(runner, settings),
        )
    }

    pub fn directive(&self) -> &HookDirective {
        &self.directive
    }

    pub fn service(&self) -> &ServiceController<R> {
        &self.service
    }

    /// Make sure `path` carries a correct hook line; restart the service only
    /// when the file was actually changed.
    pub fn enable(&self, path: &Path) -> EnableOutcome {
        if !path.exists() {
            return EnableOutcome::Absent;
        }
        tracing::info!(path = %path.display(), "instrumenting");

        let original = match read(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::error!(error = %err, "failed to instrument");
                return EnableOutcome::Failed;
            }
        };

        let (content, outcome) = match patch_content(&original, &self.directive) {
            PatchOutcome::Unchanged => {
                tracing::debug!(path = %path.display(), "already instrumented");
                return EnableOutcome::AlreadyInstrumented;
            }
            PatchOutcome::Inserted(content) => (content, EnableOutcome::Inserted),
            PatchOutcome::Replaced(content) => (content, EnableOutcome::Replaced),
        };

        if let Err(err) = write_in_place(path, &content) {
            tracing::error!(error = %err, "failed to instrument");
            return EnableOutcome::Failed;
        }
        tracing::info!(path = %path.display(), outcome = ?outcome, "hook line written");
        self.service.restart();
        outcome
    }

    /// Remove every marker line from `path`, then restart the service even if
    /// nothing was removed.
    pub fn disable(&self, path: &Path) -> DisableOutcome {
        if !path.exists() {
            return DisableOutcome::Absent;
        }
        tracing::info!(path = %path.display(), "removing instrumentation");

        let removed = match read(path) {
            Ok(original) => {
                let (content, removed) = strip_hook(&original, &self.directive);
                if removed > 0 {
                    if let Err(err) = write_in_place(path, &content) {
                        tracing::error!(error = %err, "failed to remove instrumentation");
                    }
                }
                removed
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to remove instrumentation");
                0
            }
        };

        self.service.restart();
        DisableOutcome::Stripped { removed }
    }
}

fn read(path: &Path) -> Result<String, DaemonError> {
    fs::read_to_string(path).map_err(|e| io_err(path, e))
}

// Truncate-and-write keeps the inode, so the executable bit and the watch on
// the file both survive.
fn write_in_place(path: &Path, content: &str) -> Result<(), DaemonError> {
    fs::write(path, content).map_err(|e| io_err(path, e))
}
