use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use anyhow::{Context, Result, anyhow};
use log::{debug, trace};

use super::FakeChroot;
use super::overlay::deploy_overlay;
use crate::config::{Config, MissingToolPolicy};
use crate::error::Error;
use crate::util::command;

/// Tools already found on this host, so each is only looked up once.
static VERIFIED_TOOLS: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// The inode list recipe cow-shell uses.
const ILIST_FIND: &str = "find . -xdev \\( -type l -o -type f \\) -a -links +1 -print0 | xargs -0 stat --format '%d %i '";

/**
 * Fails unless every tool in `config.required_tools` exists. What a missing
 * tool turns into depends on `config.missing_tools`.
 */
pub fn assert_supported(config: &Config) -> Result<()> {
    let mut verified = VERIFIED_TOOLS
        .lock()
        .map_err(|_| anyhow!("tool cache is poisoned"))?;

    for tool in &config.required_tools {
        if verified.contains(tool) {
            continue;
        }
        if !tool.exists() {
            trace!("Required tool {} is missing", tool.display());
            let tool = tool.clone();
            return Err(match config.missing_tools {
                MissingToolPolicy::Fail => Error::MissingTool { tool },
                MissingToolPolicy::Skip => Error::Unsupported { tool },
            }
            .into());
        }
        verified.insert(tool.clone());
    }
    Ok(())
}

impl FakeChroot {
    /**
     * Clones the base image into this instance, building the base image
     * first if this is the first sandbox of the process.
     */
    pub fn build(&mut self) -> Result<()> {
        assert_supported(&self.config)?;

        self.base
            .ensure_ready(&self.config, self.refresh.as_ref())?;

        std::fs::create_dir_all(&self.path)
            .context(format!("Failed to create {}", self.path.display()))?;
        if self.chroot_path.exists() {
            return Err(anyhow!(
                "{} already exists, destroy the sandbox before building it again",
                self.chroot_path.display()
            ));
        }

        debug!(
            "Cloning {} into {}",
            self.base.path.display(),
            self.chroot_path.display()
        );
        command::run(
            &[
                "cp".to_string(),
                "-al".to_string(),
                self.base.path.display().to_string(),
                self.chroot_path.display().to_string(),
            ],
            None,
        )
        .context("Cloning the base image")?;

        create_ilist(&self.ilist_path, &self.chroot_path)?;
        deploy_overlay(&self.overlay_dir)?;
        debug!("Sandbox {} is ready", self.path.display());
        Ok(())
    }
}

/// Records the hardlinked inodes cowdancer must copy before a write.
fn create_ilist(ilist: &Path, chroot: &Path) -> Result<()> {
    command::run(
        &[
            "cowdancer-ilistcreate".to_string(),
            ilist.display().to_string(),
            ILIST_FIND.to_string(),
        ],
        Some(chroot),
    )
    .context("Creating the cowdancer inode list")
}
