use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use log::debug;

use super::base_image::{BaseImage, NoRefresh, RefreshHook};
use super::session::SessionManager;
use crate::config::Config;

/**
 * One sandbox instance.
 *
 * Everything it owns lives in `path`:
 *
 *   chroot/       hardlink clone of the base image, the sandbox root
 *   faked-state   the fakeroot session, `<key>:<pid>`
 *   ilist         cowdancer's list of inodes to copy before writing
 *   overlay/      the `sudo` and `env` replacements
 */
pub struct FakeChroot {
    pub path: PathBuf,
    pub chroot_path: PathBuf,
    pub faked_state_path: PathBuf,
    pub ilist_path: PathBuf,
    pub overlay_dir: PathBuf,
    /// Real path of the directory the instance lives in
    pub location: PathBuf,
    pub config: Config,
    pub(super) base: Arc<BaseImage>,
    pub(super) session: SessionManager,
    pub(super) refresh: Arc<dyn RefreshHook>,
}

impl FakeChroot {
    /// An instance rooted at `path`. Nothing is created until `build()`.
    pub fn new(config: &Config, path: &Path) -> Result<FakeChroot> {
        let path = std::path::absolute(path)
            .context(format!("Failed to resolve {}", path.display()))?;
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;
        let location = parent
            .canonicalize()
            .unwrap_or_else(|_| parent.to_path_buf());

        let base = BaseImage::shared(config)?;
        let faked_state_path = path.join("faked-state");
        let session =
            SessionManager::new(&faked_state_path, &config.daemon, base.session_slot());

        Ok(FakeChroot {
            chroot_path: path.join("chroot"),
            ilist_path: path.join("ilist"),
            overlay_dir: path.join("overlay"),
            faked_state_path,
            path,
            location,
            config: config.clone(),
            base,
            session,
            refresh: Arc::new(NoRefresh),
        })
    }

    /// A fresh, uniquely named instance directory inside `parent`.
    pub fn create_in(config: &Config, parent: &Path) -> Result<FakeChroot> {
        std::fs::create_dir_all(parent)
            .context(format!("Failed to create {}", parent.display()))?;

        let dir = parent.join(format!("fakechroot-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir(&dir)
            .context(format!("Failed to create {}", dir.display()))?;
        debug!("Created sandbox directory {}", dir.display());
        FakeChroot::new(config, &dir)
    }

    /// A fresh instance in the configured location.
    pub fn create(config: &Config) -> Result<FakeChroot> {
        FakeChroot::create_in(config, &config.location)
    }

    /// An instance that was already built, possibly by another process.
    pub fn attach(config: &Config, path: &Path) -> Result<FakeChroot> {
        let chroot = FakeChroot::new(config, path)?;
        if !chroot.is_built() {
            return Err(anyhow!(
                "{} is not a built sandbox, {} is missing",
                chroot.path.display(),
                chroot.chroot_path.display()
            ));
        }
        Ok(chroot)
    }

    pub fn with_refresh_hook(mut self, hook: Arc<dyn RefreshHook>) -> Self {
        self.refresh = hook;
        self
    }

    pub fn is_built(&self) -> bool {
        self.chroot_path.is_dir()
    }

    pub fn base_image(&self) -> &BaseImage {
        &self.base
    }

    /// The fakeroot session key, starting the daemon if needed.
    pub fn session_key(&mut self) -> Result<String> {
        Ok(self.session.get_session()?.key.clone())
    }

    pub fn cleanup_session(&mut self) -> Result<()> {
        self.session.cleanup_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        let location = std::env::temp_dir()
            .join(format!("fakechroot-struct-tests-{}", uuid::Uuid::new_v4()));
        Config::with_location(&location)
    }

    #[test]
    fn test_layout() {
        let config = test_config();
        let chroot = FakeChroot::new(&config, &config.location.join("one")).unwrap();
        assert_eq!(chroot.chroot_path, config.location.join("one/chroot"));
        assert_eq!(chroot.faked_state_path, config.location.join("one/faked-state"));
        assert_eq!(chroot.ilist_path, config.location.join("one/ilist"));
        assert_eq!(chroot.overlay_dir, config.location.join("one/overlay"));
        assert!(!chroot.is_built());
    }

    #[test]
    fn test_create_in_makes_unique_directories() {
        let config = test_config();
        let a = FakeChroot::create(&config).unwrap();
        let b = FakeChroot::create(&config).unwrap();
        assert_ne!(a.path, b.path);
        assert!(a.path.is_dir() && b.path.is_dir());
        assert_eq!(a.location, config.location.canonicalize().unwrap());
        assert!(Arc::ptr_eq(&a.base, &b.base));
        std::fs::remove_dir_all(&config.location).unwrap();
    }

    #[test]
    fn test_attach_requires_a_built_instance() {
        let config = test_config();
        let path = config.location.join("attached");
        assert!(FakeChroot::attach(&config, &path).is_err());

        std::fs::create_dir_all(path.join("chroot")).unwrap();
        assert!(FakeChroot::attach(&config, &path).unwrap().is_built());
        std::fs::remove_dir_all(&config.location).unwrap();
    }
}
