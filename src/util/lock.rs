use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{debug, trace};
use nix::fcntl::{Flock, FlockArg};
use nix::unistd::{Pid, getpid};

use crate::error::Error;
use crate::util::is_alive;

/// Interval between liveness polls.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How many polls `open()` makes after a failed exclusive create.
pub const LOCK_RETRIES: usize = 20;

/**
 * A PID-file lock shared between processes.
 *
 * The file exists while somebody holds the lock and contains the holder's
 * PID. A file naming a process that no longer exists is stale and counts as
 * unlocked. Only the `Lock` that created the file removes it.
 *
 * Creating the file and reclaiming a stale one both happen under an
 * exclusive `flock` on `<path>.reclaim`, so a reclaimer can never delete a
 * lock another process has just taken. The sidecar is left in place.
 */
pub struct Lock {
    path: PathBuf,
    file: Option<File>,
}

impl Lock {
    pub fn new(path: &Path) -> Result<Lock> {
        let dir = path.parent().unwrap_or(Path::new("/"));
        if !dir.is_dir() {
            return Err(Error::InvalidLockDirectory {
                dir: dir.to_path_buf(),
            }
            .into());
        }
        Ok(Lock {
            path: path.to_path_buf(),
            file: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /**
     * Takes the lock or fails with `Error::Locked` if a live process holds it.
     *
     * If the exclusive create loses a race we poll for up to
     * `LOCK_RETRIES * LOCK_POLL_INTERVAL`, reclaiming the file if its holder
     * turns out to be dead, and otherwise fail with the create error.
     */
    pub fn open(&mut self) -> Result<()> {
        if self.file.is_some() {
            return Err(Error::SelfDeadlock {
                path: self.path.clone(),
                pid: getpid().as_raw(),
            }
            .into());
        }

        if self.locked()? {
            return Err(self.locked_error());
        }

        let mut acquired = self.try_acquire()?;
        for _ in 0..LOCK_RETRIES {
            if acquired.is_some() {
                break;
            }
            std::thread::sleep(LOCK_POLL_INTERVAL);
            if self.locked()? {
                return Err(self.locked_error());
            }
            acquired = self.try_acquire()?;
        }

        let Some(file) = acquired else {
            return Err(std::io::Error::from(ErrorKind::AlreadyExists)).context(format!(
                "failed to create lock file {}",
                self.path.display()
            ));
        };
        debug!("Acquired lock {}", self.path.display());
        self.file = Some(file);
        Ok(())
    }

    /// Releases the lock if we hold it. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        if self.file.take().is_none() {
            return Ok(());
        }
        debug!("Releasing lock {}", self.path.display());
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!(
                "failed to remove lock file {}",
                self.path.display()
            )),
        }
    }

    /**
     * Whether a live process currently holds the lock.
     *
     * Unparseable content reads as unlocked. Finding our own PID in the file
     * is a bug in the caller and fails rather than letting `wait()` spin
     * forever.
     */
    pub fn locked(&self) -> Result<bool> {
        let Some(pid) = self.read_pid()? else {
            return Ok(false);
        };

        if !is_alive(pid) {
            trace!(
                "Lock {} names dead process {}, treating as stale",
                self.path.display(),
                pid
            );
            return Ok(false);
        }

        if pid == getpid() {
            return Err(Error::SelfDeadlock {
                path: self.path.clone(),
                pid: pid.as_raw(),
            }
            .into());
        }

        Ok(true)
    }

    /// Blocks until no live process holds the lock. There is no timeout.
    pub fn wait(&self) -> Result<()> {
        trace!("Waiting for lock {}", self.path.display());
        while self.locked()? {
            std::thread::sleep(LOCK_POLL_INTERVAL);
        }
        trace!("Lock {} is free", self.path.display());
        Ok(())
    }

    /// The live process holding the lock, if any. Never fails on our own PID.
    pub fn holder(&self) -> Result<Option<Pid>> {
        Ok(self.read_pid()?.filter(|pid| is_alive(*pid)))
    }

    /**
     * One attempt at taking the lock: under the reclaim guard, drop a stale
     * file, create ours and write our PID. `None` if the file is still taken.
     */
    fn try_acquire(&self) -> Result<Option<File>> {
        let _guard = self.reclaim_guard()?;
        self.remove_if_stale()?;

        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                trace!("Exclusive create of {} failed: {}", self.path.display(), e);
                return Ok(None);
            }
            Err(e) => {
                return Err(e).context(format!(
                    "failed to create lock file {}",
                    self.path.display()
                ));
            }
        };

        write!(file, "{}", getpid().as_raw())
            .and_then(|_| file.flush())
            .context(format!(
                "failed to write PID to lock file {}",
                self.path.display()
            ))?;
        Ok(Some(file))
    }

    fn reclaim_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".reclaim");
        PathBuf::from(name)
    }

    /// Exclusive `flock` on the sidecar, released when dropped.
    fn reclaim_guard(&self) -> Result<Flock<File>> {
        let path = self.reclaim_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .context(format!("failed to open {}", path.display()))?;
        Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, e)| anyhow!("failed to lock {}: {}", path.display(), e))
    }

    /// `None` when the file is missing or does not hold a PID.
    fn read_pid(&self) -> Result<Option<Pid>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.trim().parse::<i32>().ok().map(Pid::from_raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                if !self.path.exists() {
                    return Ok(None);
                }
                Err(e).context(format!(
                    "failed to read lock file {}",
                    self.path.display()
                ))
            }
        }
    }

    /// Removes the file only when it names a PID that is no longer running.
    /// An empty file may belong to a holder that has not written its PID yet.
    fn remove_if_stale(&self) -> Result<()> {
        if let Some(pid) = self.read_pid()? {
            if !is_alive(pid) {
                debug!(
                    "Removing stale lock {} left by {}",
                    self.path.display(),
                    pid
                );
                match std::fs::remove_file(&self.path) {
                    Ok(()) => (),
                    Err(e) if e.kind() == ErrorKind::NotFound => (),
                    Err(e) => {
                        return Err(e).context(format!(
                            "failed to remove stale lock file {}",
                            self.path.display()
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn locked_error(&self) -> anyhow::Error {
        Error::Locked {
            path: self.path.clone(),
        }
        .into()
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if self.file.is_some() {
            trace!("Unlocking lock {}", self.path.display());
            let _ = self.close();
        }
    }
}
