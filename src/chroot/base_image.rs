use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use anyhow::{Context, Result, anyhow};
use log::{debug, info, trace};

use super::session::SessionSlot;
use crate::config::Config;
use crate::error::{Error, classify};
use crate::util::{Lock, command};

static REGISTRY: LazyLock<Mutex<HashMap<PathBuf, Arc<BaseImage>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    NotBuilt,
    Building,
    Ready,
}

/**
 * Runs once per process after the base image is known to exist, while the
 * build lock is still held. Use it to bring a previously built image up to
 * date (install extra packages, refresh indexes, ...).
 */
pub trait RefreshHook: Send + Sync {
    fn refresh_environment(&self, image: &BaseImage) -> Result<()>;
}

/// The default hook, leaves an existing image alone.
pub struct NoRefresh;

impl RefreshHook for NoRefresh {
    fn refresh_environment(&self, _image: &BaseImage) -> Result<()> {
        Ok(())
    }
}

/**
 * The bootstrapped root filesystem sandboxes are cloned from.
 *
 * There is one `BaseImage` per path per process. The first sandbox to build
 * makes sure the image exists, holding the cross-process lock at
 * `<path>.lock` while it bootstraps or refreshes it. Later sandboxes see
 * `BuildState::Ready` and go straight to cloning.
 */
pub struct BaseImage {
    pub path: PathBuf,
    pub distro: String,
    pub lock_path: PathBuf,
    state: Mutex<BuildState>,
    session: SessionSlot,
}

impl BaseImage {
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.base_image.clone(),
            distro: config.distro.clone(),
            lock_path: config.lock_path(),
            state: Mutex::new(BuildState::NotBuilt),
            session: SessionSlot::default(),
        }
    }

    /// The process-wide coordinator for `config.base_image`.
    pub fn shared(config: &Config) -> Result<Arc<BaseImage>> {
        let mut registry = REGISTRY
            .lock()
            .map_err(|_| anyhow!("base image registry is poisoned"))?;

        if let Some(image) = registry.get(&config.base_image) {
            if image.distro != config.distro {
                return Err(anyhow!(
                    "Base image {} is already in use for {}, cannot use it for {}",
                    image.path.display(),
                    image.distro,
                    config.distro
                ));
            }
            return Ok(image.clone());
        }

        let image = Arc::new(BaseImage::new(config));
        registry.insert(config.base_image.clone(), image.clone());
        Ok(image)
    }

    pub fn state(&self) -> BuildState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(BuildState::NotBuilt)
    }

    /// Session shared by the sandboxes of this process cloned from this image.
    pub fn session_slot(&self) -> SessionSlot {
        self.session.clone()
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /**
     * Makes sure the image is built and refreshed for this process.
     *
     * If another process holds the build lock we wait for it and take the
     * lock ourselves afterwards, at which point the image normally exists
     * and only the refresh hook runs. A failed build leaves the state at
     * `NotBuilt`; nothing is rolled back.
     */
    pub fn ensure_ready(&self, config: &Config, hook: &dyn RefreshHook) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("base image state is poisoned"))?;
        if *state == BuildState::Ready {
            return Ok(());
        }

        *state = BuildState::Building;
        trace!("Preparing base image {}", self.path.display());
        let result = self.prepare(config, hook);
        *state = match result {
            Ok(()) => BuildState::Ready,
            Err(_) => BuildState::NotBuilt,
        };
        result.context(format!("Preparing base image {}", self.path.display()))
    }

    fn prepare(&self, config: &Config, hook: &dyn RefreshHook) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create {}", parent.display()))?;
        }

        let mut lock = Lock::new(&self.lock_path)?;
        loop {
            match lock.open() {
                Ok(()) => break,
                Err(e) if matches!(classify(&e), Some(Error::Locked { .. })) => {
                    info!(
                        "Waiting for another process to prepare {}",
                        self.path.display()
                    );
                    lock.wait()?;
                }
                Err(e) => return Err(e),
            }
        }

        let result = self.build_if_missing(config, hook);
        let closed = lock.close();
        result?;
        closed
    }

    fn build_if_missing(&self, config: &Config, hook: &dyn RefreshHook) -> Result<()> {
        if self.exists() {
            debug!("Base image {} already exists", self.path.display());
        } else {
            self.build_environment(config)?;
        }
        trace!("Refreshing base image {}", self.path.display());
        hook.refresh_environment(self)
            .context(format!("Refreshing base image {}", self.path.display()))
    }

    /**
     * Runs the bootstrap commands with `{distro}`, `{base_image}` and
     * `{include}` filled in, then makes `/var/run` a real directory.
     */
    pub fn build_environment(&self, config: &Config) -> Result<()> {
        info!(
            "Bootstrapping {} base image in {}, this takes a while",
            self.distro,
            self.path.display()
        );

        let params: HashMap<&str, String> = HashMap::from([
            ("distro", self.distro.clone()),
            ("base_image", self.path.display().to_string()),
            ("include", config.packages.join(",")),
        ]);

        for template in &config.bootstrap {
            let argv = template
                .render(&params)
                .context(format!("Rendering bootstrap command `{}`", template))?;
            command::run(&argv, None)?;
        }

        fix_var_run(&self.path)
    }
}

/// debootstrap leaves `/var/run` as a symlink fakechroot cannot follow.
fn fix_var_run(base: &Path) -> Result<()> {
    let var_run = base.join("var/run");
    let is_symlink = var_run
        .symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    if is_symlink {
        debug!("Replacing symlink {} with a directory", var_run.display());
        std::fs::remove_file(&var_run)
            .context(format!("Failed to remove {}", var_run.display()))?;
        std::fs::create_dir(&var_run)
            .context(format!("Failed to create {}", var_run.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::CommandTemplate;
    use std::process::Command;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRefresh(AtomicUsize);

    impl RefreshHook for CountingRefresh {
        fn refresh_environment(&self, image: &BaseImage) -> Result<()> {
            assert!(image.exists());
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_config() -> Config {
        let location = std::env::temp_dir()
            .join(format!("fakechroot-base-tests-{}", uuid::Uuid::new_v4()));
        let mut config = Config::with_location(&location);
        config.bootstrap = vec![
            CommandTemplate::new(&["mkdir", "-p", "{base_image}/var", "{base_image}/etc"]),
            CommandTemplate::new(&["sh", "-c", "echo \"$0\" > \"$1/etc/distro\"", "{distro}", "{base_image}"]),
            CommandTemplate::new(&["ln", "-s", "/tmp", "{base_image}/var/run"]),
        ];
        config
    }

    #[test]
    fn test_build_runs_templates_and_fixes_var_run() {
        let config = test_config();
        let image = BaseImage::new(&config);
        let hook = CountingRefresh::default();

        image.ensure_ready(&config, &hook).unwrap();
        assert_eq!(image.state(), BuildState::Ready);
        assert_eq!(
            std::fs::read_to_string(config.base_image.join("etc/distro")).unwrap(),
            "precise\n"
        );
        let var_run = config.base_image.join("var/run").symlink_metadata().unwrap();
        assert!(var_run.is_dir());
        assert!(!config.lock_path().exists());

        // ready, so neither the build nor the hook runs again
        image.ensure_ready(&config, &hook).unwrap();
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);

        std::fs::remove_dir_all(&config.location).unwrap();
    }

    #[test]
    fn test_existing_image_is_only_refreshed() {
        let mut config = test_config();
        std::fs::create_dir_all(&config.base_image).unwrap();
        config.bootstrap = vec![CommandTemplate::new(&["false"])];

        let image = BaseImage::new(&config);
        let hook = CountingRefresh::default();
        image.ensure_ready(&config, &hook).unwrap();
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);

        std::fs::remove_dir_all(&config.location).unwrap();
    }

    #[test]
    fn test_failed_build_resets_state_and_releases_lock() {
        let mut config = test_config();
        config.bootstrap = vec![CommandTemplate::new(&["false"])];

        let image = BaseImage::new(&config);
        let err = image.ensure_ready(&config, &NoRefresh).unwrap_err();
        assert!(matches!(classify(&err), Some(Error::CommandFailed { .. })));
        assert_eq!(image.state(), BuildState::NotBuilt);
        assert!(!config.lock_path().exists());

        std::fs::remove_dir_all(&config.location).unwrap();
    }

    #[test]
    fn test_unknown_placeholder_fails_build() {
        let mut config = test_config();
        config.bootstrap = vec![CommandTemplate::new(&["echo", "{mirror}"])];

        let image = BaseImage::new(&config);
        let err = image.ensure_ready(&config, &NoRefresh).unwrap_err();
        assert!(matches!(classify(&err), Some(Error::Template { .. })));

        std::fs::remove_dir_all(&config.location).unwrap();
    }

    #[test]
    fn test_waits_for_other_holder() {
        let config = test_config();
        std::fs::create_dir_all(&config.location).unwrap();

        // Another "process" holds the lock for a moment
        let mut holder = Command::new("sleep").arg("0.5").spawn().unwrap();
        std::fs::write(config.lock_path(), holder.id().to_string()).unwrap();
        let reaper = std::thread::spawn(move || holder.wait());

        let image = BaseImage::new(&config);
        image.ensure_ready(&config, &NoRefresh).unwrap();
        assert_eq!(image.state(), BuildState::Ready);
        assert!(config.base_image.join("etc/distro").exists());
        assert!(!config.lock_path().exists());

        reaper.join().unwrap().unwrap();
        std::fs::remove_dir_all(&config.location).unwrap();
    }

    #[test]
    fn test_shared_registry() {
        let config = test_config();
        let a = BaseImage::shared(&config).unwrap();
        let b = BaseImage::shared(&config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a.session_slot(), &b.session_slot()));

        let mut other = config.clone();
        other.distro = "lucid".to_string();
        assert!(BaseImage::shared(&other).is_err());
    }
}
