use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, trace};

use super::FakeChroot;
use crate::util::{CleanupStack, command};

fn remove_file_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        trace!("Removing {}", path.display());
        std::fs::remove_file(path).context(format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

impl FakeChroot {
    /**
     * Stops the fakeroot session and removes everything the instance owns.
     *
     * Works on partially built instances. Every step runs even if an earlier
     * one failed; failures are logged and returned rather than raised.
     */
    pub fn destroy(&mut self) -> Vec<anyhow::Error> {
        debug!("Destroying sandbox {}", self.path.display());
        let mut cleanup = CleanupStack::new();

        // Released last to first
        cleanup.push("instance directory", || {
            if self.path.exists() {
                std::fs::remove_dir_all(&self.path)
                    .context(format!("Failed to remove {}", self.path.display()))?;
            }
            Ok(())
        });
        cleanup.push("sandbox root", || {
            if self.chroot_path.exists() {
                // remove_dir_all is far slower on a full image
                command::run(
                    &[
                        "rm".to_string(),
                        "-rf".to_string(),
                        self.chroot_path.display().to_string(),
                    ],
                    None,
                )?;
            }
            Ok(())
        });
        cleanup.push("inode list", || remove_file_if_exists(&self.ilist_path));
        cleanup.push("fakeroot state", || remove_file_if_exists(&self.faked_state_path));
        cleanup.push("fakeroot session", || self.session.cleanup_session());

        cleanup.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_destroy_partial_instance() {
        let dir = std::env::temp_dir()
            .join(format!("fakechroot-destroy-tests-{}", uuid::Uuid::new_v4()));
        let config = Config::with_location(&dir);
        let mut chroot = FakeChroot::create(&config).unwrap();
        std::fs::create_dir_all(chroot.chroot_path.join("etc")).unwrap();
        std::fs::write(&chroot.ilist_path, "").unwrap();

        assert!(chroot.destroy().is_empty());
        assert!(!chroot.path.exists());

        // nothing left, still fine
        assert!(chroot.destroy().is_empty());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_destroy_continues_past_bad_session_state() {
        let dir = std::env::temp_dir()
            .join(format!("fakechroot-destroy-tests-{}", uuid::Uuid::new_v4()));
        let config = Config::with_location(&dir);
        let mut chroot = FakeChroot::create(&config).unwrap();
        std::fs::write(&chroot.faked_state_path, "garbage").unwrap();

        let failures = chroot.destroy();
        assert_eq!(failures.len(), 1);
        assert!(format!("{:#}", failures[0]).contains("fakeroot session"));
        assert!(!chroot.path.exists());
        std::fs::remove_dir_all(dir).unwrap();
    }
}
