use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use log::{debug, trace};
use nix::unistd::Pid;

use crate::error::Error;
use crate::util::{command, terminate};

/// A fakeroot session: the key every cooperating process presents, and the
/// `faked` daemon that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub key: String,
    pub daemon_pid: Pid,
    raw: String,
}

impl Session {
    /// Parses the daemon's `<key>:<pid>` line, splitting on the first colon.
    pub fn parse(raw: &str) -> Result<Session> {
        let malformed = || Error::MalformedSession {
            output: raw.to_string(),
        };

        let (key, pid) = raw.split_once(':').ok_or_else(malformed)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed().into());
        }
        let pid = pid
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or_else(malformed)?;

        Ok(Session {
            key: key.to_string(),
            daemon_pid: Pid::from_raw(pid),
            raw: raw.to_string(),
        })
    }

    /// The daemon output exactly as it was persisted.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/**
 * The session handed out to every sandbox of this process that clones the
 * same base image, with a count of the sandboxes still using it.
 */
#[derive(Debug, Default)]
pub struct SharedSession {
    session: Option<Session>,
    holders: usize,
}

impl SharedSession {
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn holders(&self) -> usize {
        self.holders
    }
}

pub type SessionSlot = Arc<Mutex<SharedSession>>;

/**
 * Obtains, persists and tears down the fakeroot session of one sandbox.
 *
 * Lookup order: the session this manager already has, the one persisted in
 * `state_path` (left there by another process using the same sandbox
 * directory), the one shared in-process through `slot`, and finally a fresh
 * daemon launch.
 */
pub struct SessionManager {
    state_path: PathBuf,
    daemon: Vec<String>,
    slot: SessionSlot,
    current: Option<Session>,
    holds_shared: bool,
    released: bool,
}

impl SessionManager {
    pub fn new(state_path: &Path, daemon: &[String], slot: SessionSlot) -> Self {
        Self {
            state_path: state_path.to_path_buf(),
            daemon: daemon.to_vec(),
            slot,
            current: None,
            holds_shared: false,
            released: false,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn get_session(&mut self) -> Result<&Session> {
        if self.current.is_none() {
            let session = self.acquire()?;
            self.current = Some(session);
            self.released = false;
        }
        self.current
            .as_ref()
            .ok_or_else(|| anyhow!("fakeroot session vanished"))
    }

    /**
     * Stops using the session. The daemon is sent SIGTERM unless other
     * sandboxes in this process still share it. Safe to call repeatedly: once
     * released, further calls do nothing until `get_session` is called again.
     */
    pub fn cleanup_session(&mut self) -> Result<()> {
        if self.released {
            trace!("fakeroot session already released");
            return Ok(());
        }

        // Another process, or another sandbox of this one, may have started
        // the session for this directory
        if self.current.is_none() && self.state_path.exists() {
            self.current = Some(self.load()?);
        }

        let Some(session) = self.current.take() else {
            trace!("No fakeroot session to clean up");
            return Ok(());
        };
        self.released = true;
        let holds_shared = std::mem::take(&mut self.holds_shared);

        {
            let mut shared = self.lock_slot()?;
            if shared.session.as_ref() == Some(&session) {
                if holds_shared {
                    shared.holders = shared.holders.saturating_sub(1);
                }
                // A session recovered from disk that is still shared here is
                // stopped by whichever holder releases it last
                if shared.holders > 0 {
                    debug!(
                        "fakeroot session {} still used by {} sandbox(es)",
                        session.key, shared.holders
                    );
                    return Ok(());
                }
                shared.session = None;
            }
        }

        debug!(
            "Stopping faked (pid {}) for session {}",
            session.daemon_pid, session.key
        );
        terminate(session.daemon_pid)
    }

    fn acquire(&mut self) -> Result<Session> {
        if self.state_path.exists() {
            let session = self.load()?;
            debug!(
                "Reusing fakeroot session {} from {}",
                session.key,
                self.state_path.display()
            );
            return Ok(session);
        }

        let slot = self.slot.clone();
        let mut shared = slot
            .lock()
            .map_err(|_| anyhow!("fakeroot session cache is poisoned"))?;

        if let Some(session) = shared.session.clone() {
            shared.holders += 1;
            self.holds_shared = true;
            drop(shared);
            debug!("Sharing fakeroot session {}", session.key);
            self.persist(&session)?;
            return Ok(session);
        }

        let session = self.launch()?;
        shared.session = Some(session.clone());
        shared.holders = 1;
        self.holds_shared = true;
        Ok(session)
    }

    fn launch(&self) -> Result<Session> {
        let output = command::capture(&self.daemon, None)?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: command::describe(&self.daemon),
                status: output.status.to_string(),
            }
            .into());
        }

        let raw = String::from_utf8_lossy(&output.stdout).to_string();
        let session = Session::parse(&raw).context(format!(
            "starting fakeroot daemon `{}`",
            command::describe(&self.daemon)
        ))?;
        debug!(
            "Started faked (pid {}) with session {}",
            session.daemon_pid, session.key
        );
        self.persist(&session)?;
        Ok(session)
    }

    fn load(&self) -> Result<Session> {
        let raw = std::fs::read_to_string(&self.state_path).context(format!(
            "failed to read fakeroot state {}",
            self.state_path.display()
        ))?;
        Session::parse(&raw).context(format!(
            "failed to parse fakeroot state {}",
            self.state_path.display()
        ))
    }

    fn persist(&self, session: &Session) -> Result<()> {
        std::fs::write(&self.state_path, session.raw()).context(format!(
            "failed to write fakeroot state {}",
            self.state_path.display()
        ))
    }

    fn lock_slot(&self) -> Result<std::sync::MutexGuard<'_, SharedSession>> {
        self.slot
            .lock()
            .map_err(|_| anyhow!("fakeroot session cache is poisoned"))
    }
}
