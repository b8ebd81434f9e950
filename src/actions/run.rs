use anyhow::{Context, Result};
use fakechroot::FakeChroot;
use fakechroot::chroot::exit_code;
use fakechroot::config::Config;
use fakechroot::util::set_json_output;
use log::debug;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;

/// Runs `command` in the sandbox at `path` and returns its exit code.
pub fn run(config: &Config, path: &Path, command: &[String]) -> Result<i32> {
    let mut chroot = FakeChroot::attach(config, path)?;

    let status = chroot
        .command(command)?
        .stdin(Stdio::inherit())
        .status()
        .context(format!("Running {}", command.join(" ")))?;

    let code = exit_code(status);
    debug!("`{}` exited with {}", command.join(" "), code);
    set_json_output("code", Value::from(code));
    Ok(code)
}
