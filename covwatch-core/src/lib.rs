//! covwatch core library: settings, domain types and errors.
//!
//! - [`types`]: newtypes and the [`TargetPath`] component chain
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / validate / merge CLI overrides

pub mod config;
pub mod error;
pub mod types;

pub use config::Settings;
pub use error::ConfigError;
pub use types::{HookModule, LogLevel, PrefixMatch, ServiceName, TargetPath};
