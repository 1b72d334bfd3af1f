// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Errors raised by the messenger fabric.
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error(
        "single-message subscription of module '{module}' received a second '{type_name}' \
         message and overwriting is not allowed"
    )]
    MessageOverwrite {
        module: String,
        type_name: &'static str,
    },

    #[error("no message of type '{type_name}' available for module '{module}'")]
    MissingMessage {
        module: String,
        type_name: &'static str,
    },
}
