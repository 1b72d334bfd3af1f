// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use pixsim_rs::{
    cfg::{
        cli::{CliOptions, resolve_config_path},
        error::ConfigError,
        logger::{LogFormat, LoggerOptions, init_logger, normalize_level},
        units::UnitRegistry,
    },
    geometry::GeometryError,
    messenger::MessengerError,
    module::{ModuleRegistry, error::ModuleError},
    modules,
    runtime::Simulation,
};
use tracing::info;

const PROGRAM: &str = "pixsim-rs";

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match CliOptions::parse(args) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("{}", CliOptions::usage(PROGRAM));
            return 1;
        },
    };

    if opts.show_help {
        println!("{}", CliOptions::usage(PROGRAM));
        return 0;
    }
    if opts.show_version {
        println!("{PROGRAM} {}", env!("CARGO_PKG_VERSION"));
        return 0;
    }

    let Some(config_file) = opts.config_file.clone() else {
        eprintln!("no configuration file given");
        eprintln!("{}", CliOptions::usage(PROGRAM));
        return 1;
    };

    match execute(&opts, &config_file) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {err:#}");
            exit_code(&err)
        },
    }
}

fn execute(opts: &CliOptions, config_file: &std::path::Path) -> Result<()> {
    let config_path = resolve_config_path(config_file)
        .context("failed to resolve the configuration file")?;

    let units = Arc::new(UnitRegistry::with_defaults());
    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry);

    let mut sim = Simulation::new(
        &config_path,
        units,
        registry,
        &opts.module_options,
        &opts.detector_options,
    )?;

    // Reporting level priority: command line over configuration.
    let global = sim.global_config();
    let level = match &opts.log_level {
        Some(level) => normalize_level(level)?,
        None => normalize_level(&global.get_or("log_level", "warning".to_string())?)?,
    };
    let format: LogFormat = global
        .get_or("log_format", "default".to_string())?
        .parse()?;
    let log_file = match &opts.log_file {
        Some(path) => Some(path.clone()),
        None if global.has("log_file") => Some(global.get_path("log_file", false)?),
        None => None,
    };
    let _log_guards = init_logger(&LoggerOptions {
        level,
        format: Some(format),
        log_file,
    })?;

    sim.load()?;
    sim.initialize()?;
    sim.run()?;
    sim.finalize()?;

    info!(
        "Finished run: {} events completed by {} module instantiations",
        sim.events_completed(),
        sim.module_names().len()
    );
    Ok(())
}

/// Maps the error chain onto the documented exit codes: 1 for configuration
/// errors, 2 for runtime errors, 3 for logic errors and 127 for anything
/// unrecognized.
fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return 1;
        }
        if let Some(module_err) = cause.downcast_ref::<ModuleError>() {
            return match module_err {
                ModuleError::UnknownModuleClass(_)
                | ModuleError::AmbiguousInstantiation(_)
                | ModuleError::Config(_) => 1,
                ModuleError::Geometry(GeometryError::Config(_)) => 1,
                ModuleError::InvalidAction(_) => 3,
                _ => 2,
            };
        }
        if let Some(geometry_err) = cause.downcast_ref::<GeometryError>() {
            return match geometry_err {
                GeometryError::Config(_) => 1,
                _ => 2,
            };
        }
        if cause.downcast_ref::<MessengerError>().is_some() {
            return 2;
        }
    }
    127
}
