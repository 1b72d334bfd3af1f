// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Reference modules bundled with the framework binary.

pub mod counter;
pub mod echo;

pub use counter::MessageCounter;
pub use echo::EchoModule;

use crate::module::ModuleRegistry;

/// Registers every bundled module class.
pub fn register_all(registry: &mut ModuleRegistry) {
    EchoModule::register(registry);
    MessageCounter::register(registry);
}
