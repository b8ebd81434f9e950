#![allow(dead_code)]

use anyhow::Result;
use fakechroot::{Config, ConfigOverrides, FakeChroot, MissingToolPolicy, classify, resolve_config};
use log::{error, warn};
use rand::Rng;
use rstest::*;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

const TEST_DATA_DIR: &str = "generated-test-data";

pub fn rid() -> String {
    let mut rng = rand::rng();
    let rid: String = (0..10)
        .map(|_| rng.sample(rand::distr::Alphanumeric) as char)
        .collect();
    rid
}

pub fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

pub fn test_data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(TEST_DATA_DIR)
}

pub fn get_fakechroot_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fakechroot"))
}

/**
 * A built sandbox that is destroyed when dropped, unless debug mode is on.
 */
pub struct TestChroot {
    chroot: FakeChroot,
    debug_mode: bool,
}

impl TestChroot {
    /* When debug mode is on, the sandbox is left behind for inspection */
    pub fn set_debug_mode(&mut self, debug_mode: bool) {
        self.debug_mode = debug_mode;
    }
}

impl Deref for TestChroot {
    type Target = FakeChroot;
    fn deref(&self) -> &FakeChroot {
        &self.chroot
    }
}

impl DerefMut for TestChroot {
    fn deref_mut(&mut self) -> &mut FakeChroot {
        &mut self.chroot
    }
}

impl Drop for TestChroot {
    fn drop(&mut self) {
        if self.debug_mode {
            warn!("Debug mode is on, *NOT* destroying {}", self.chroot.path.display());
            return;
        }
        for failure in self.chroot.destroy() {
            error!("Failed to clean up {}: {:#}", self.chroot.path.display(), failure);
        }
    }
}

/**
 * Hands out sandboxes cloned from a base image shared by every test run
 * (under `generated-test-data/`, or `FAKECHROOT_FIXTURE_LOCATION`), so the
 * expensive bootstrap happens once per machine.
 */
pub struct ChrootManager {
    pub name: String,
    pub config: Config,
}

impl ChrootManager {
    pub fn new() -> Self {
        fakechroot::logger::init(log::LevelFilter::Warn);

        let location = match std::env::var_os("FAKECHROOT_FIXTURE_LOCATION") {
            Some(_) => None,
            None => Some(test_data_dir().join("chroots").display().to_string()),
        };

        #[allow(clippy::panic)]
        let config = match resolve_config(ConfigOverrides {
            no_config: true,
            location,
            missing_tools: Some(MissingToolPolicy::Skip),
            ..Default::default()
        }) {
            Ok(config) => config,
            Err(e) => panic!("Failed to resolve test config: {:#}", e),
        };

        Self {
            name: format!("fakechroot-test-{}", rid()),
            config,
        }
    }

    /**
     * A freshly built sandbox, or `None` when this host lacks fakeroot,
     * fakechroot, debootstrap or cowdancer and the test should be skipped.
     */
    pub fn sandbox(&self) -> Result<Option<TestChroot>> {
        let mut chroot = TestChroot {
            chroot: FakeChroot::create(&self.config)?,
            debug_mode: false,
        };

        match chroot.build() {
            Ok(()) => Ok(Some(chroot)),
            Err(e) if classify(&e).is_some_and(|e| e.is_skip()) => {
                eprintln!("Skipping {}: {:#}", self.name, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[fixture]
pub fn chroots() -> ChrootManager {
    ChrootManager::new()
}
