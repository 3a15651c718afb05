//! Daemon settings loaded from a YAML file.
//!
//! # File layout
//!
//! ```yaml
//! general:
//!   path_to_target: /usr/share/vdsm/vdsm
//!   coverage_config: /var/lib/vdsmcodecoverage/coveragerc
//!   service_name: vdsmd
//!   log_level: info
//!   logfile: /var/log/covwatch/covwatch.log
//!   pidfile: /var/run/covwatch.pid
//!   hook_module: vdsmcodecoverage
//!   restart_command: [service, "{service}", restart]
//! ```
//!
//! Only the first three keys are required.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{HookModule, LogLevel, ServiceName, TargetPath};

/// Placeholder in `restart_command` replaced with the service name.
pub const SERVICE_PLACEHOLDER: &str = "{service}";

// ---------------------------------------------------------------------------
// 1. On-disk shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub general: GeneralSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralSection {
    pub path_to_target: PathBuf,
    pub coverage_config: String,
    pub service_name: ServiceName,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logfile: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pidfile: Option<PathBuf>,
    #[serde(default)]
    pub hook_module: HookModule,
    #[serde(default = "default_restart_command")]
    pub restart_command: Vec<String>,
}

fn default_restart_command() -> Vec<String> {
    vec![
        "service".to_string(),
        SERVICE_PLACEHOLDER.to_string(),
        "restart".to_string(),
    ]
}

// ---------------------------------------------------------------------------
// 2. Validated settings
// ---------------------------------------------------------------------------

/// Everything the daemon needs, validated and read-only for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub target: TargetPath,
    pub coverage_config: String,
    pub service_name: ServiceName,
    pub log_level: LogLevel,
    pub logfile: Option<PathBuf>,
    pub pidfile: Option<PathBuf>,
    pub hook_module: HookModule,
    pub restart_command: Vec<String>,
}

impl Settings {
    /// Validate a parsed config file.
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let general = file.general;

        let target = TargetPath::new(general.path_to_target)?;

        if general.coverage_config.trim().is_empty() {
            return Err(ConfigError::invalid("coverage_config", "must not be empty"));
        }
        // The path is written between double quotes into the hook line.
        if general
            .coverage_config
            .contains(|c: char| c == '"' || c == '\n')
        {
            return Err(ConfigError::invalid(
                "coverage_config",
                "must not contain quotes or newlines",
            ));
        }
        if general.service_name.0.trim().is_empty() {
            return Err(ConfigError::invalid("service_name", "must not be empty"));
        }
        let module = general.hook_module.0.trim();
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::invalid(
                "hook_module",
                "must be a non-empty dotted module name",
            ));
        }
        if general
            .restart_command
            .first()
            .map_or(true, |program| program.trim().is_empty())
        {
            return Err(ConfigError::invalid(
                "restart_command",
                "must name a program to run",
            ));
        }

        Ok(Self {
            target,
            coverage_config: general.coverage_config,
            service_name: general.service_name,
            log_level: general.log_level,
            logfile: general.logfile,
            pidfile: general.pidfile,
            hook_module: general.hook_module,
            restart_command: general.restart_command,
        })
    }

    /// Merge command-line overrides: `--debug` wins over the configured level,
    /// `--log` wins over the configured logfile.
    pub fn apply_overrides(&mut self, debug: bool, logfile: Option<PathBuf>) {
        if debug {
            self.log_level = LogLevel::Debug;
        }
        if logfile.is_some() {
            self.logfile = logfile;
        }
    }

    /// The restart command with `{service}` substituted.
    pub fn restart_argv(&self) -> Vec<String> {
        self.restart_command
            .iter()
            .map(|arg| arg.replace(SERVICE_PLACEHOLDER, &self.service_name.0))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Parse settings from YAML text. `path` only labels errors.
pub fn parse(contents: &str, path: &Path) -> Result<Settings, ConfigError> {
    let file: ConfigFile = serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    Settings::from_file(file)
}

/// Load and validate settings from `path`.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with path
/// and line context) if malformed, `ConfigError::Invalid` if a value is unusable.
pub fn load_at(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse(&contents, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
general:
  path_to_target: /usr/share/vdsm/vdsm
  coverage_config: /var/lib/vdsmcodecoverage/coveragerc
  service_name: vdsmd
";

    #[test]
    fn minimal_config_fills_defaults() {
        let settings = parse(MINIMAL, Path::new("test.yaml")).expect("parse");
        assert_eq!(settings.target.as_path(), Path::new("/usr/share/vdsm/vdsm"));
        assert_eq!(settings.log_level, LogLevel::Info);
        assert_eq!(settings.hook_module, HookModule::default());
        assert_eq!(settings.logfile, None);
        assert_eq!(settings.pidfile, None);
        assert_eq!(settings.restart_argv(), vec!["service", "vdsmd", "restart"]);
    }

    #[test]
    fn overrides_replace_level_and_logfile() {
        let mut settings = parse(MINIMAL, Path::new("test.yaml")).expect("parse");
        settings.apply_overrides(true, Some(PathBuf::from("/tmp/covwatch.log")));
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.logfile, Some(PathBuf::from("/tmp/covwatch.log")));
    }

    #[test]
    fn no_overrides_keep_configured_values() {
        let yaml = format!("{MINIMAL}  log_level: warn\n  logfile: /var/log/c.log\n");
        let mut settings = parse(&yaml, Path::new("test.yaml")).expect("parse");
        settings.apply_overrides(false, None);
        assert_eq!(settings.log_level, LogLevel::Warn);
        assert_eq!(settings.logfile, Some(PathBuf::from("/var/log/c.log")));
    }

    #[test]
    fn custom_restart_command_substitutes_service() {
        let yaml = format!("{MINIMAL}  restart_command: [systemctl, restart, \"{{service}}.service\"]\n");
        let settings = parse(&yaml, Path::new("test.yaml")).expect("parse");
        assert_eq!(
            settings.restart_argv(),
            vec!["systemctl", "restart", "vdsmd.service"]
        );
    }
}
