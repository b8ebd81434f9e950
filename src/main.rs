#![allow(
    clippy::collapsible_else_if,
    clippy::collapsible_if,
    clippy::module_inception,
    clippy::useless_format
)]
#![deny(
    clippy::get_unwrap,
    clippy::panic,
    clippy::print_stdout,
    clippy::unwrap_used,
    clippy::used_underscore_binding,
    clippy::used_underscore_items
)]

mod actions;

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser};
use clap_complete::CompleteEnv;
use fakechroot::config::{cli, resolve_config};
use fakechroot::logger::FakeChrootLogger;
use fakechroot::util::{print_json_output, set_json_output, set_should_print_output};
use log::Log;
use serde_json::Value;

pub fn main() -> Result<()> {
    // This function will not return if tab completion is requested
    CompleteEnv::with_factory(cli::Args::command).complete();

    let logger = FakeChrootLogger::install(log::LevelFilter::Trace)
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;
    let cli = cli::Args::parse();
    logger.set_level(cli.log_level.unwrap_or(log::LevelFilter::Info));

    let config = resolve_config(cli.overrides());

    // Messages logged while loading the config are printed once we know the
    // level it asks for
    if let Ok(config) = &config {
        logger.set_level(config.log_level);
    }
    logger.print_deferred();
    let config = config.context("Resolving config")?;

    set_should_print_output(!cli.json);

    let mut exit_code = 0;
    let result = match cli.action {
        cli::Action::Build { path } => actions::build(&config, path),
        cli::Action::Run { path, command } => {
            actions::run(&config, &path, &command).map(|code| exit_code = code)
        }
        cli::Action::Env { path } => actions::env(&config, &path),
        cli::Action::Destroy { path } => actions::destroy(&config, &path),
        cli::Action::Status => actions::status(&config),
        cli::Action::Config { keys } => actions::config(&config, keys),
    };

    if cli.json {
        match &result {
            Ok(()) => set_json_output("status", Value::String("success".to_string())),
            Err(e) => {
                set_json_output("status", Value::String("error".to_string()));
                set_json_output("error", Value::String(format!("{:#}", e)));
            }
        }
        print_json_output()?;
        if result.is_err() {
            logger.flush();
            std::process::exit(1);
        }
    }
    logger.flush();
    result?;

    if exit_code != 0 {
        // Negative codes mean the command was killed by a signal
        std::process::exit(if exit_code < 0 { 128 - exit_code } else { exit_code });
    }
    Ok(())
}
