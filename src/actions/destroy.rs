use anyhow::{Result, anyhow};
use fakechroot::FakeChroot;
use fakechroot::config::Config;
use fakechroot::util::set_json_output;
use log::info;
use serde_json::Value;
use std::path::Path;

pub fn destroy(config: &Config, path: &Path) -> Result<()> {
    let mut chroot = FakeChroot::new(config, path)?;
    let failures = chroot.destroy();

    set_json_output(
        "failures",
        Value::Array(
            failures
                .iter()
                .map(|e| Value::String(format!("{:#}", e)))
                .collect(),
        ),
    );
    if !failures.is_empty() {
        return Err(anyhow!(
            "{} cleanup step(s) failed for {}",
            failures.len(),
            path.display()
        ));
    }

    info!("Destroyed {}", path.display());
    Ok(())
}
