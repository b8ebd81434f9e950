use std::path::PathBuf;
use thiserror::Error;

/// Failures callers may want to tell apart.
///
/// Everything in the crate returns `anyhow::Result`; these are attached as the
/// root cause so callers can `downcast_ref::<Error>()` when they need to react
/// to a specific condition (skip a test, wait on a lock, ...).
#[derive(Error, Debug)]
pub enum Error {
    /// A required host tool is missing and the policy says to fail.
    #[error("Need '{}' to run fakechroot sandboxes", tool.display())]
    MissingTool { tool: PathBuf },

    /// A required host tool is missing and the policy says the caller should
    /// skip rather than fail.
    #[error("Unsupported host, '{}' is not installed", tool.display())]
    Unsupported { tool: PathBuf },

    #[error("'{}' is not a valid directory", dir.display())]
    InvalidLockDirectory { dir: PathBuf },

    #[error("{} is locked by another process", path.display())]
    Locked { path: PathBuf },

    #[error("{} is already locked by the current process ({pid})", path.display())]
    SelfDeadlock { path: PathBuf, pid: i32 },

    #[error("Failed to launch `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` failed: {status}")]
    CommandFailed { command: String, status: String },

    #[error("Unexpected output from the fakeroot daemon: {output:?}")]
    MalformedSession { output: String },

    #[error("Failed to stat {path}: {reason}")]
    StatFailed { path: String, reason: String },

    #[error("'{key}' not found in {database}")]
    NotFound { database: &'static str, key: String },

    #[error("Unknown placeholder '{{{placeholder}}}' in command template {template:?}")]
    Template { template: String, placeholder: String },
}

impl Error {
    /// True for the errors a test harness should turn into a skipped test.
    pub fn is_skip(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }
}

/// Looks through an `anyhow` chain for one of our errors.
pub fn classify(err: &anyhow::Error) -> Option<&Error> {
    err.chain().find_map(|cause| cause.downcast_ref::<Error>())
}
