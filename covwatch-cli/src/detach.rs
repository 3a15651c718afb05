//! `--daemon`: re-launch the binary in the background and return.

use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::Cli;

/// Spawn a copy of the current executable without `--daemon`, detached from
/// our stdio. Returns the child's pid.
pub(crate) fn spawn_detached(cli: &Cli) -> Result<u32> {
    let binary = std::env::current_exe().context("cannot locate current executable")?;
    let args = child_args(cli)?;

    let mut command = Command::new(&binary);
    command.args(&args);
    // Own process group, so a terminal hangup or ^C aimed at the caller's
    // job does not reach the daemon.
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut command, 0);

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn '{}'", binary.display()))?;

    Ok(child.id())
}

/// Arguments for the background copy. Paths are made absolute so the child
/// does not depend on our working directory.
fn child_args(cli: &Cli) -> Result<Vec<String>> {
    let mut args = vec!["--conf".to_string(), absolute(&cli.conf)?];
    if let Some(log) = &cli.log {
        args.push("--log".to_string());
        args.push(absolute(log)?);
    }
    if cli.debug {
        args.push("--debug".to_string());
    }
    Ok(args)
}

fn absolute(path: &Path) -> Result<String> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot determine working directory")?
            .join(path)
    };
    Ok(path.display().to_string())
}
