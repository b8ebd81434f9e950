use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use log::trace;

/// Scripts fakechroot runs instead of the sandbox's own `sudo` and `env`.
pub const OVERLAY_SCRIPTS: [(&str, &str); 2] = [
    ("sudo", include_str!("../../overlay/sudo")),
    ("env", include_str!("../../overlay/env")),
];

/// Writes the overlay scripts into `dir` with mode 0755, replacing old copies.
pub fn deploy_overlay(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).context(format!("Failed to create {}", dir.display()))?;

    for (name, script) in OVERLAY_SCRIPTS {
        let dst = dir.join(name);
        trace!("Installing overlay script {}", dst.display());
        std::fs::write(&dst, script).context(format!("Failed to write {}", dst.display()))?;
        std::fs::set_permissions(&dst, std::fs::Permissions::from_mode(0o755))
            .context(format!("Failed to chmod {}", dst.display()))?;
    }
    Ok(())
}
