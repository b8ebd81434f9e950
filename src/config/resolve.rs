use super::defaults::{SUPPORTED_DISTROS, default_bootstrap};
use super::{Config, ConfigOverrides, MissingToolPolicy, PartialConfig};
use crate::util::{expand_tilde_path, home_dir};
use anyhow::{Context, Result, anyhow};
use log::{trace, warn};
use nix::unistd::getuid;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{env, str::FromStr};

const ENV_PREFIX: &str = "FAKECHROOT_FIXTURE_";

/**
 * Resolves the effective configuration.
 *
 * Precedence, lowest first: built-in defaults, config files, environment
 * variables, `overrides`. Where each value came from is recorded in
 * `Config::sources`.
 */
pub fn resolve_config(overrides: ConfigOverrides) -> Result<Config> {
    let (mut partial_config, mut sources) = load_partial(overrides.no_config)?;

    apply_environment(&mut partial_config, &mut sources)?;

    if let Some(log_level) = overrides.log_level {
        partial_config.log_level = Some(log_level);
        sources.insert("log_level".into(), "cli".into());
    }
    if let Some(distro) = overrides.distro {
        partial_config.distro = Some(distro);
        sources.insert("distro".into(), "cli".into());
    }
    if let Some(location) = overrides.location {
        partial_config.location = Some(location);
        sources.insert("location".into(), "cli".into());
    }
    if let Some(base_image) = overrides.base_image {
        partial_config.base_image = Some(base_image);
        sources.insert("base_image".into(), "cli".into());
    }
    if let Some(missing_tools) = overrides.missing_tools {
        partial_config.missing_tools = Some(missing_tools);
        sources.insert("missing_tools".into(), "cli".into());
    }

    let location = match partial_config.location.take() {
        Some(location) => expand_tilde_path(Path::new(&location))?,
        None => {
            sources.insert("location".into(), "default".into());
            default_location()
        }
    };

    let mut config = Config::with_location(&location);

    if let Some(base_image) = partial_config.base_image {
        config.base_image = expand_tilde_path(Path::new(&base_image))?;
    } else {
        sources.insert("base_image".into(), "derived from location".into());
    }
    if let Some(log_level) = partial_config.log_level {
        config.log_level = log_level;
    }
    if let Some(distro) = partial_config.distro {
        config.distro = distro;
    }
    if let Some(packages) = partial_config.packages {
        config.packages = packages;
    }
    if let Some(bootstrap) = partial_config.bootstrap {
        config.bootstrap = bootstrap;
    }
    if let Some(daemon) = partial_config.daemon {
        config.daemon = daemon;
    }
    if let Some(required_tools) = partial_config.required_tools {
        config.required_tools =
            required_tools.into_iter().map(PathBuf::from).collect();
    }
    if let Some(missing_tools) = partial_config.missing_tools {
        config.missing_tools = missing_tools;
    }
    if let Some(use_system_libs) = partial_config.use_system_libs {
        config.use_system_libs = use_system_libs;
    }
    if let Some(shim_debug) = partial_config.shim_debug {
        config.shim_debug = shim_debug;
    }

    for key in Config::KEYS {
        if !sources.contains_key(key) {
            sources.insert(key.into(), "default".into());
        }
    }
    config.sources = sources;

    validate_config(&config)?;

    trace!("Location: {}", config.location.display());
    trace!("Base image: {}", config.base_image.display());

    Ok(config)
}

fn env_var(name: &str) -> Option<String> {
    env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.is_empty())
}

fn apply_environment(
    partial_config: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
) -> Result<()> {
    if let Some(log_level) = env_var("LOG_LEVEL") {
        let log_level = log::LevelFilter::from_str(&log_level)
            .map_err(|_| anyhow!("Invalid log level: {}", log_level))?;
        partial_config.log_level = Some(log_level);
        sources.insert("log_level".into(), "environment".into());
    }
    if let Some(distro) = env_var("DISTRO") {
        partial_config.distro = Some(distro);
        sources.insert("distro".into(), "environment".into());
    }
    if let Some(location) = env_var("LOCATION") {
        partial_config.location = Some(location);
        sources.insert("location".into(), "environment".into());
    }
    if let Some(base_image) = env_var("BASE_IMAGE") {
        partial_config.base_image = Some(base_image);
        sources.insert("base_image".into(), "environment".into());
    }
    if let Some(use_system_libs) = env_var("USE_SYSTEM_LIBS") {
        let value = bool::from_str(&use_system_libs).map_err(|_| {
            anyhow!(
                "Invalid value for {}USE_SYSTEM_LIBS: {}",
                ENV_PREFIX,
                use_system_libs
            )
        })?;
        partial_config.use_system_libs = Some(value);
        sources.insert("use_system_libs".into(), "environment".into());
    }
    if let Some(missing_tools) = env_var("MISSING_TOOLS") {
        let policy = MissingToolPolicy::from_str(&missing_tools)
            .map_err(|e| anyhow!(e))?;
        partial_config.missing_tools = Some(policy);
        sources.insert("missing_tools".into(), "environment".into());
    }
    Ok(())
}

/// `~/.fakechroot`, or a per-user directory in /tmp when there is no usable home.
fn default_location() -> PathBuf {
    match home_dir() {
        Ok(home) if home.is_dir() => home.join(".fakechroot"),
        _ => PathBuf::from(format!("/tmp/fakechroot-{}", getuid())),
    }
}

pub fn load_partial(
    no_config: bool,
) -> Result<(PartialConfig, HashMap<String, String>)> {
    let config_paths = if no_config {
        vec![]
    } else {
        find_config_files()?
    };
    let mut sources = HashMap::new();
    if config_paths.is_empty() {
        trace!("No config files found, using default config");
        return Ok((PartialConfig::default(), sources));
    }

    let mut merged_config = PartialConfig::default();
    for path in config_paths.iter() {
        let config_str = std::fs::read_to_string(path).context(format!(
            "Failed to read config file {}",
            path.display()
        ))?;

        let config: PartialConfig = toml::from_str(&config_str).context(
            format!("Failed to parse config file {}", path.display()),
        )?;

        merge_configs(
            &mut merged_config,
            &mut sources,
            config,
            &path.display().to_string(),
        );
        trace!("Loaded config file: {}", path.display());
    }

    Ok((merged_config, sources))
}

/** Returns the config files that exist, least specific first. */
fn find_config_files() -> Result<Vec<PathBuf>> {
    let mut paths_to_check = Vec::new();

    // Project files, nearest first
    let mut current_dir = env::current_dir()?;
    loop {
        paths_to_check.push(current_dir.join(".fakechroot.toml"));
        if !current_dir.pop() {
            break;
        }
    }

    if let Ok(home) = home_dir() {
        paths_to_check.push(home.join(".config/fakechroot/config.toml"));
    }

    paths_to_check.push(PathBuf::from("/etc/fakechroot.toml"));

    paths_to_check.reverse();

    Ok(paths_to_check
        .into_iter()
        .filter(|path| path.is_file())
        .collect())
}

fn merge_configs(
    base: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    override_config: PartialConfig,
    source: &str,
) {
    macro_rules! take {
        ($($field:ident),*) => {
            $(
                if let Some(value) = override_config.$field {
                    base.$field = Some(value);
                    sources.insert(stringify!($field).into(), source.into());
                }
            )*
        };
    }

    take!(
        log_level,
        distro,
        location,
        base_image,
        packages,
        bootstrap,
        daemon,
        required_tools,
        missing_tools,
        use_system_libs,
        shim_debug
    );
}

fn validate_config(config: &Config) -> Result<()> {
    if config.distro.is_empty() || config.distro.contains('/') {
        return Err(anyhow!("Invalid distro name: {:?}", config.distro));
    }

    if !config.location.is_absolute() {
        return Err(anyhow!(
            "Sandbox location must be an absolute path: {}",
            config.location.display()
        ));
    }

    if !config.base_image.is_absolute() {
        return Err(anyhow!(
            "Base image must be an absolute path: {}",
            config.base_image.display()
        ));
    }

    if config.bootstrap.iter().any(|c| c.0.is_empty()) {
        return Err(anyhow!("Bootstrap commands must not be empty"));
    }

    if config.daemon.is_empty() {
        return Err(anyhow!("The fakeroot daemon command must not be empty"));
    }

    if config.bootstrap == default_bootstrap()
        && !SUPPORTED_DISTROS.contains(&config.distro.as_str())
    {
        warn!(
            "Distro '{}' has not been tested with the default bootstrap recipe (known to work: {})",
            config.distro,
            SUPPORTED_DISTROS.join(", ")
        );
    }

    Ok(())
}
