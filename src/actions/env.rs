use anyhow::Result;
use fakechroot::FakeChroot;
use fakechroot::config::Config;
use fakechroot::outln;
use fakechroot::util::set_json_output;
use serde_json::Value;
use std::path::Path;

pub fn env(config: &Config, path: &Path) -> Result<()> {
    let mut chroot = FakeChroot::attach(config, path)?;

    for (key, value) in chroot.get_env()? {
        outln!("{}={}", key, value);
        set_json_output(&key, Value::String(value));
    }
    Ok(())
}
