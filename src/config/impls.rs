use super::defaults::{
    DEFAULT_DISTRO, default_bootstrap, default_daemon, default_packages,
    default_required_tools,
};
use super::structs::{Config, MissingToolPolicy};

use serde::Deserialize;
use std::{
    collections::HashMap,
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
};

impl FromStr for MissingToolPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(MissingToolPolicy::Fail),
            "skip" => Ok(MissingToolPolicy::Skip),
            _ => Err(format!("Invalid missing tool policy: {}", s)),
        }
    }
}

impl Display for MissingToolPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingToolPolicy::Fail => write!(f, "fail"),
            MissingToolPolicy::Skip => write!(f, "skip"),
        }
    }
}

impl Config {
    /**
     * Built-in defaults for sandboxes living under `location`, ignoring
     * config files and the environment.
     */
    pub fn with_location(location: &Path) -> Self {
        Self {
            log_level: log::LevelFilter::Info,
            distro: DEFAULT_DISTRO.to_string(),
            location: location.to_path_buf(),
            base_image: location.join("base-image"),
            packages: default_packages(),
            bootstrap: default_bootstrap(),
            daemon: default_daemon(),
            required_tools: default_required_tools(),
            missing_tools: MissingToolPolicy::Fail,
            use_system_libs: true,
            shim_debug: false,
            sources: HashMap::new(),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut lock = self.base_image.clone().into_os_string();
        lock.push(".lock");
        PathBuf::from(lock)
    }

    /// Looks up a config value by key for display, the way `config` prints it.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "log_level" => self.log_level.to_string(),
            "distro" => self.distro.clone(),
            "location" => self.location.display().to_string(),
            "base_image" => self.base_image.display().to_string(),
            "lock_path" => self.lock_path().display().to_string(),
            "packages" => self.packages.join(","),
            "bootstrap" => self
                .bootstrap
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join("; "),
            "daemon" => self.daemon.join(" "),
            "required_tools" => self
                .required_tools
                .iter()
                .map(|t| t.display().to_string())
                .collect::<Vec<_>>()
                .join(","),
            "missing_tools" => self.missing_tools.to_string(),
            "use_system_libs" => self.use_system_libs.to_string(),
            "shim_debug" => self.shim_debug.to_string(),
            _ => return None,
        };
        Some(value)
    }

    pub const KEYS: [&'static str; 12] = [
        "log_level",
        "distro",
        "location",
        "base_image",
        "lock_path",
        "packages",
        "bootstrap",
        "daemon",
        "required_tools",
        "missing_tools",
        "use_system_libs",
        "shim_debug",
    ];
}

pub(crate) fn deserialize_level_filter<'de, D>(
    deserializer: D,
) -> Result<Option<log::LevelFilter>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    s.map_or(Ok(None), |s| {
        log::LevelFilter::from_str(&s)
            .map(Some)
            .map_err(serde::de::Error::custom)
    })
}
