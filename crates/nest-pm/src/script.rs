//! Lifecycle scripts
//!
//! Scripts run through the platform shell with the package root as working
//! directory and the scope's bin directory first on `PATH`.

use crate::scope::ScopeLayout;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Events run after a package is linked, in order
pub const INSTALL_EVENTS: &[&str] = &["install", "postinstall"];

/// Event run before a package is unlinked
pub const PREUNINSTALL: &str = "preuninstall";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to start {event} script of {package}: {source}")]
    Spawn {
        package: String,
        event: String,
        #[source]
        source: io::Error,
    },

    #[error("{event} script of {package} exited with {}: {stderr}", describe_status(.code))]
    Failed {
        package: String,
        event: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn describe_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// What a script needs to know about its package
#[derive(Debug, Clone)]
pub struct ScriptContext<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub package_dir: &'a Path,
    pub scope: &'a ScopeLayout,
}

impl ScriptContext<'_> {
    fn identifier(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Run one lifecycle script to completion, capturing its output
pub fn run_script(event: &str, command: &str, ctx: &ScriptContext<'_>) -> Result<(), ScriptError> {
    info!(package = %ctx.identifier(), event, "running script: {}", command);

    let output = prepare(command, ctx)
        .output()
        .map_err(|source| ScriptError::Spawn {
            package: ctx.identifier(),
            event: event.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!(package = %ctx.identifier(), event, "{}", stdout.trim_end());
    }

    if !output.status.success() {
        return Err(ScriptError::Failed {
            package: ctx.identifier(),
            event: event.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

/// Run a script with the terminal attached, for `nest run`
pub fn run_attached(script: &str, command: &str, ctx: &ScriptContext<'_>) -> Result<(), ScriptError> {
    debug!(package = %ctx.identifier(), script, "running: {}", command);

    let status = prepare(command, ctx)
        .status()
        .map_err(|source| ScriptError::Spawn {
            package: ctx.identifier(),
            event: script.to_string(),
            source,
        })?;

    if !status.success() {
        return Err(ScriptError::Failed {
            package: ctx.identifier(),
            event: script.to_string(),
            code: status.code(),
            stderr: String::new(),
        });
    }
    Ok(())
}

/// Append shell-quoted arguments to a script command
pub fn with_args(command: &str, args: &[String]) -> String {
    let mut line = command.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&quote(arg));
    }
    line
}

fn prepare(command: &str, ctx: &ScriptContext<'_>) -> Command {
    let mut cmd = shell(command);
    cmd.current_dir(ctx.package_dir)
        .env("PATH", prefixed_path(ctx.scope.bin_dir()))
        .env("NEST_PACKAGE_NAME", ctx.name)
        .env("NEST_PACKAGE_VERSION", ctx.version)
        .env("NEST_SCOPE", if ctx.scope.is_global() { "global" } else { "local" });
    cmd
}

#[cfg(windows)]
fn quote(arg: &str) -> String {
    format!("\"{}\"", arg.replace('"', "\"\""))
}

#[cfg(not(windows))]
fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

fn prefixed_path(bin_dir: &Path) -> OsString {
    let mut paths: Vec<PathBuf> = vec![bin_dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| bin_dir.as_os_str().to_os_string())
}
