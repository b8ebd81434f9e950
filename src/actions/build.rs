use anyhow::{Context, Result};
use fakechroot::FakeChroot;
use fakechroot::config::Config;
use fakechroot::outln;
use fakechroot::util::set_json_output;
use log::{info, warn};
use serde_json::Value;
use std::path::PathBuf;

pub fn build(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let mut chroot = match path {
        Some(path) => FakeChroot::new(config, &path)?,
        None => FakeChroot::create(config)?,
    };

    if let Err(e) = chroot.build() {
        warn!("Build failed, removing {}", chroot.path.display());
        for failure in chroot.destroy() {
            warn!("{:#}", failure);
        }
        return Err(e).context(format!("Building {}", chroot.path.display()));
    }

    info!("Built sandbox {}", chroot.path.display());
    set_json_output("path", Value::String(chroot.path.display().to_string()));
    outln!("{}", chroot.path.display());
    Ok(())
}
