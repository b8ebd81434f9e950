use anyhow::{Result, anyhow};
use fakechroot::config::Config;
use fakechroot::outln;
use fakechroot::util::set_json_output;
use log::debug;
use serde_json::Value;

pub fn config(config: &Config, keys: Option<Vec<String>>) -> Result<()> {
    let keys = keys.unwrap_or_else(|| Config::KEYS.map(String::from).to_vec());
    let multi_line = keys.len() > 1;

    for key in keys {
        let normalized = key.replace('-', "_");
        let value = config
            .get(&normalized)
            .ok_or_else(|| anyhow!("Unknown key: {}", key))?;

        if let Some(source) = config.sources.get(&normalized) {
            debug!("{}={} set from {}", normalized, value, source);
        }
        set_json_output(&normalized, Value::String(value.clone()));

        if multi_line {
            outln!("{}={}", normalized, value);
        } else {
            outln!("{}", value);
        }
    }

    Ok(())
}
