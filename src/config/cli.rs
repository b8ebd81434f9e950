use super::{ConfigOverrides, MissingToolPolicy};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Root-less fake chroot sandboxes for test suites", long_about = None)]
pub struct Args {
    /// Set the log level to one of trace, debug, info, warn, or error.
    /// `-v` is shorthand for enabling verbose (trace) logging.
    #[arg(short = 'v',
        long,
        global = true,
        default_missing_value = "trace",
        num_args = 0..=1,
        require_equals = true,
        value_parser = parse_log_level
    )]
    pub log_level: Option<log::LevelFilter>,

    /// Distribution to bootstrap the base image from, defaults to "precise"
    #[arg(long, global = true)]
    pub distro: Option<String>,

    /// Directory sandboxes are created in. Defaults to `~/.fakechroot/`
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub location: Option<String>,

    /// Path of the shared base image. Defaults to `<location>/base-image`
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub base_image: Option<String>,

    /// What to do when fakeroot, fakechroot, debootstrap or cowdancer is missing
    #[arg(long, global = true, value_enum)]
    pub missing_tools: Option<MissingToolPolicy>,

    /// Formats action output as a JSON blob.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Do not load config files.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_config: bool,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(clap::Subcommand, Clone, Debug)]
#[command(subcommand_help_heading = "Actions")]
pub enum Action {
    /// Create and build a sandbox, printing its directory
    Build {
        /// Sandbox directory, defaults to a fresh directory inside the location
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        path: Option<PathBuf>,
    },

    /// Run a command inside an existing sandbox and exit with its status
    Run {
        /// Sandbox directory
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        path: PathBuf,

        /// The command and its arguments
        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            num_args = 1..,
            required = true
        )]
        command: Vec<String>,
    },

    /// Print the environment commands in the sandbox run with
    Env {
        /// Sandbox directory
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        path: PathBuf,
    },

    /// Stop the sandbox's fakeroot daemon and remove its files
    Destroy {
        /// Sandbox directory
        #[arg(long, value_hint = clap::ValueHint::DirPath)]
        path: PathBuf,
    },

    /// Show whether the base image exists and who holds its build lock
    Status,

    /// Get current configuration options
    Config {
        /// The keys to get from the configuration
        #[arg(value_name = "KEYS", num_args = 0..)]
        keys: Option<Vec<String>>,
    },
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            no_config: self.no_config,
            log_level: self.log_level,
            distro: self.distro.clone(),
            location: self.location.clone(),
            base_image: self.base_image.clone(),
            missing_tools: self.missing_tools,
        }
    }
}

fn parse_log_level(s: &str) -> Result<log::LevelFilter, String> {
    s.parse::<log::LevelFilter>().map_err(|e| e.to_string())
}
