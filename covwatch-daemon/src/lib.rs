//! covwatch daemon: keeps a service executable instrumented for coverage.
//!
//! The [`runtime`] loop waits for filesystem notifications along the target
//! path, the [`dispatcher`] keeps the [`watch_set`] in step with what exists
//! on disk, and the [`patcher`] rewrites the target and restarts the service.

pub mod backend;
pub mod command;
pub mod dispatcher;
mod error;
pub mod logging;
pub mod patcher;
pub mod pidfile;
pub mod runtime;
pub mod service;
pub mod watch_set;

#[cfg(test)]
mod test_support;

pub use backend::NotifyBackend;
pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use dispatcher::{Dispatcher, FsEvent};
pub use error::DaemonError;
pub use logging::init_tracing;
pub use patcher::{
    patch_content, strip_hook, DisableOutcome, EnableOutcome, HookDirective, PatchOutcome, Patcher,
};
pub use pidfile::Pidfile;
pub use runtime::{run, start_blocking};
pub use service::ServiceController;
pub use watch_set::{WatchBackend, WatchEntry, WatchId, WatchMask, WatchSet};
