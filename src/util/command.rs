use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use anyhow::Result;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/**
 * An argv list whose tokens may contain `{name}` placeholders.
 *
 * Placeholders are substituted per token, so a value containing spaces or
 * quotes stays a single argument. Nothing here goes through a shell.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(pub Vec<String>);

impl CommandTemplate {
    pub fn new<S: AsRef<str>>(argv: &[S]) -> Self {
        Self(argv.iter().map(|s| s.as_ref().to_string()).collect())
    }

    pub fn render(&self, params: &HashMap<&str, String>) -> Result<Vec<String>> {
        self.0
            .iter()
            .map(|token| substitute(token, params))
            .collect()
    }
}

impl std::fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// Replaces every `{name}` in `token`. `{{` and `}}` produce literal braces.
pub fn substitute(token: &str, params: &HashMap<&str, String>) -> Result<String> {
    let mut out = String::with_capacity(token.len());
    let mut rest = token;

    while let Some(start) = rest.find(['{', '}']) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('}') {
            // A lone closing brace is kept as-is
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            rest = "";
            break;
        };

        let name = &tail[1..end];
        match params.get(name) {
            Some(value) => out.push_str(value),
            None => {
                return Err(Error::Template {
                    template: token.to_string(),
                    placeholder: name.to_string(),
                }
                .into());
            }
        }
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

pub fn describe(argv: &[String]) -> String {
    argv.join(" ")
}

/**
 * Runs `argv` to completion with inherited stdio, failing on a non-zero exit.
 */
pub fn run(argv: &[String], cwd: Option<&Path>) -> Result<()> {
    let mut cmd = build(argv, cwd)?;
    let status = cmd.status().map_err(|source| Error::CommandSpawn {
        command: describe(argv),
        source,
    })?;

    if !status.success() {
        return Err(Error::CommandFailed {
            command: describe(argv),
            status: status.to_string(),
        }
        .into());
    }
    Ok(())
}

/**
 * Runs `argv` capturing stdout and stderr. The exit status is not checked,
 * callers decide what a failure means.
 */
pub fn capture(argv: &[String], cwd: Option<&Path>) -> Result<Output> {
    let mut cmd = build(argv, cwd)?;
    cmd.stdin(Stdio::null());
    cmd.output()
        .map_err(|source| {
            Error::CommandSpawn {
                command: describe(argv),
                source,
            }
            .into()
        })
}

fn build(argv: &[String], cwd: Option<&Path>) -> Result<Command> {
    let Some((program, args)) = argv.split_first() else {
        return Err(Error::CommandFailed {
            command: String::new(),
            status: "empty command".to_string(),
        }
        .into());
    };

    trace!("Running: {}", describe(argv));
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(cwd) = cwd {
        trace!("  in {}", cwd.display());
        cmd.current_dir(cwd);
    }
    Ok(cmd)
}
