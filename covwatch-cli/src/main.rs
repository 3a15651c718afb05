//! covwatch: keep a service executable instrumented for code coverage.
//!
//! # Usage
//!
//! ```text
//! covwatch --conf <FILE> [--log <FILE>] [--debug] [--daemon]
//! ```

mod detach;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use covwatch_core::config;
use covwatch_daemon::{init_tracing, start_blocking};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "covwatch",
    version,
    about = "Watch a service executable and keep a coverage hook installed in it",
    long_about = None,
)]
pub(crate) struct Cli {
    /// YAML config file with a `general` section.
    #[arg(short = 'c', long = "conf", value_name = "FILE")]
    pub conf: PathBuf,

    /// Append log output to this file instead of the configured logfile.
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Log at debug level regardless of the configured level.
    #[arg(long)]
    pub debug: bool,

    /// Detach from the terminal and keep running in the background.
    #[arg(long)]
    pub daemon: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = config::load_at(&cli.conf)
        .with_context(|| format!("failed to load config '{}'", cli.conf.display()))?;
    settings.apply_overrides(cli.debug, cli.log.clone());

    if cli.daemon {
        let pid = detach::spawn_detached(&cli)?;
        println!("covwatch running in background (pid {pid})");
        return Ok(());
    }

    init_tracing(settings.log_level, settings.logfile.as_deref())
        .context("failed to set up logging")?;
    start_blocking(settings).context("daemon exited with error")
}
