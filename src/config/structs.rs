use super::impls::deserialize_level_filter;
use crate::util::CommandTemplate;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};

/// What to do when a required host tool is missing.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MissingToolPolicy {
    /// Fail with `Error::MissingTool`
    #[serde(rename = "fail")]
    Fail,
    /// Fail with `Error::Unsupported`, which test harnesses treat as a skip
    #[serde(rename = "skip")]
    Skip,
}

#[derive(Deserialize, Default, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(deserialize_with = "deserialize_level_filter", default)]
    pub log_level: Option<log::LevelFilter>,
    pub distro: Option<String>,
    pub location: Option<String>,
    pub base_image: Option<String>,
    pub packages: Option<Vec<String>>,
    pub bootstrap: Option<Vec<CommandTemplate>>,
    pub daemon: Option<Vec<String>>,
    pub required_tools: Option<Vec<String>>,
    pub missing_tools: Option<MissingToolPolicy>,
    pub use_system_libs: Option<bool>,
    pub shim_debug: Option<bool>,
}

/// Values that take precedence over config files and the environment,
/// normally filled in from the command line.
#[derive(Default, Clone, Debug)]
pub struct ConfigOverrides {
    pub no_config: bool,
    pub log_level: Option<log::LevelFilter>,
    pub distro: Option<String>,
    pub location: Option<String>,
    pub base_image: Option<String>,
    pub missing_tools: Option<MissingToolPolicy>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: log::LevelFilter,
    pub distro: String,
    /// Directory sandbox instances are created in. Its real path is excluded
    /// from fakechroot's path translation.
    pub location: PathBuf,
    pub base_image: PathBuf,
    pub packages: Vec<String>,
    pub bootstrap: Vec<CommandTemplate>,
    pub daemon: Vec<String>,
    pub required_tools: Vec<PathBuf>,
    pub missing_tools: MissingToolPolicy,
    pub use_system_libs: bool,
    pub shim_debug: bool,
    pub sources: HashMap<String, String>,
}
