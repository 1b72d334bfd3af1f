// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the configuration subsystem.
///
/// `Unavailable` and `Parse` are fatal before the simulation starts; the
/// remaining kinds surface to the caller performing a typed read and may be
/// recovered by substituting defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration file {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("syntax error in {file}:{line}: {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("key '{key}' does not exist in section [{section}]")]
    MissingKey { key: String, section: String },

    #[error(
        "value '{value}' of key '{key}' in section [{section}] is not a valid {expected}: \
         {reason}"
    )]
    InvalidKey {
        key: String,
        section: String,
        value: String,
        expected: &'static str,
        reason: String,
    },

    #[error("value '{value}' of key '{key}' in section [{section}] is invalid: {reason}")]
    InvalidValue {
        key: String,
        section: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    /// Key the error refers to, when it refers to one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::MissingKey { key, .. }
            | Self::InvalidKey { key, .. }
            | Self::InvalidValue { key, .. } => Some(key),
            _ => None,
        }
    }
}
