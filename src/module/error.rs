// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

use crate::{
    cfg::error::ConfigError, geometry::GeometryError, messenger::MessengerError,
};

/// Errors raised while loading or executing modules.
///
/// `EndOfRun` is not a fault: it is the voluntary request of a module to end
/// the event loop gracefully. The current event still completes and
/// `finalize` still runs.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("end of run requested: {0}")]
    EndOfRun(String),

    #[error("module class '{0}' is not registered")]
    UnknownModuleClass(String),

    #[error("ambiguous instantiation of '{0}': two instances with the same priority")]
    AmbiguousInstantiation(String),

    #[error("invalid module action: {0}")]
    InvalidAction(String),

    #[error(transparent)]
    Messenger(#[from] MessengerError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Failure(#[from] anyhow::Error),
}

impl ModuleError {
    /// Whether this value is the voluntary end-of-run request rather than a
    /// fault.
    pub fn is_end_of_run(&self) -> bool {
        matches!(self, Self::EndOfRun(_))
    }
}
