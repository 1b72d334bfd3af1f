// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Parsed command-line surface of the `pixsim-rs` binary.
#[derive(Debug, Default, Clone)]
pub struct CliOptions {
    pub config_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
    pub module_options: Vec<String>,
    pub detector_options: Vec<String>,
    pub show_version: bool,
    pub show_help: bool,
}

impl CliOptions {
    /// Parses the argument list (without the program name).
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut opts = Self::default();
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-h" | "--help" => opts.show_help = true,
                "--version" => opts.show_version = true,
                "-c" => opts.config_file = Some(PathBuf::from(required(&mut iter, "-c")?)),
                "-l" => opts.log_file = Some(PathBuf::from(required(&mut iter, "-l")?)),
                "-v" => opts.log_level = Some(required(&mut iter, "-v")?),
                "-o" => opts.module_options.push(required(&mut iter, "-o")?),
                "-g" => opts.detector_options.push(required(&mut iter, "-g")?),
                other => bail!("unrecognized command line argument '{other}'"),
            }
        }

        Ok(opts)
    }

    pub fn usage(program: &str) -> String {
        format!(
            "Usage: {program} -c <config_file> [OPTIONS]\n\
             \n\
             Options:\n\
             \x20 -c <file>    configuration file (required)\n\
             \x20 -l <file>    write log output to the given file\n\
             \x20 -v <level>   reporting level: error, warn, info, debug, trace\n\
             \x20 -o <opt>     module option of the form [module.]key=value (repeatable)\n\
             \x20 -g <opt>     detector option of the form [detector.]key=value (repeatable)\n\
             \x20 --version    print the version and exit\n\
             \x20 -h           print this help text and exit"
        )
    }
}

fn required(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    iter.next()
        .with_context(|| format!("missing argument after '{flag}'"))
}

/// Resolves a possibly relative configuration path to a canonical absolute
/// path, verifying it exists.
pub fn resolve_config_path(rel: impl AsRef<Path>) -> Result<PathBuf> {
    let p = rel.as_ref();

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}
