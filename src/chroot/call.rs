use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};

use anyhow::Result;
use log::trace;

use super::FakeChroot;
use crate::error::Error;
use crate::util::command::describe;

/// What a command run inside the sandbox produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CallOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Exit code, or the negated signal number for a killed process.
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

impl FakeChroot {
    /**
     * A `Command` that runs `argv` inside the sandbox: working directory
     * at the sandbox root and nothing but the sandbox environment.
     */
    pub fn command(&mut self, argv: &[String]) -> Result<Command> {
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::CommandFailed {
                command: String::new(),
                status: "empty command".to_string(),
            }
            .into());
        };

        let env = self.get_env()?;
        trace!("Running in {}: {}", self.path.display(), describe(argv));
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.chroot_path)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null());
        Ok(cmd)
    }

    /// Runs `argv`, discarding its output, and returns its exit code.
    pub fn call(&mut self, argv: &[String]) -> Result<i32> {
        Ok(self.check_call(argv)?.code)
    }

    /// Runs `argv` and collects its exit code, stdout and stderr.
    pub fn check_call(&mut self, argv: &[String]) -> Result<CallOutput> {
        let output = self
            .command(argv)?
            .output()
            .map_err(|source| Error::CommandSpawn {
                command: describe(argv),
                source,
            })?;

        let code = exit_code(output.status);
        trace!("`{}` exited with {}", describe(argv), code);
        Ok(CallOutput {
            code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
