// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashMap;

use anyhow::Result;

use crate::module::module::{Module, ModuleContext};

pub type ModuleFactory =
    Box<dyn Fn(ModuleContext) -> Result<Box<dyn Module>> + Send + Sync>;

/// One registered module implementation: whether it is instantiated once per
/// run or once per detector, and how to construct it.
pub struct ModuleClass {
    unique: bool,
    factory: ModuleFactory,
}

impl ModuleClass {
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub(crate) fn construct(&self, ctx: ModuleContext) -> Result<Box<dyn Module>> {
        (self.factory)(ctx)
    }
}

/// Startup-time registry of module classes, keyed by the class name used in
/// configuration section headers.
///
/// The host binary (or a test) fills the registry before the runtime loads
/// modules; a configuration section whose name has no registry entry is a
/// fatal load error.
#[derive(Default)]
pub struct ModuleRegistry {
    classes: HashMap<String, ModuleClass>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module class instantiated exactly once per run.
    pub fn register_unique<F>(&mut self, name: &str, factory: F)
    where F: Fn(ModuleContext) -> Result<Box<dyn Module>> + Send + Sync + 'static {
        self.classes.insert(
            name.to_string(),
            ModuleClass {
                unique: true,
                factory: Box::new(factory),
            },
        );
    }

    /// Registers a module class instantiated once per associated detector.
    pub fn register_detector<F>(&mut self, name: &str, factory: F)
    where F: Fn(ModuleContext) -> Result<Box<dyn Module>> + Send + Sync + 'static {
        self.classes.insert(
            name.to_string(),
            ModuleClass {
                unique: false,
                factory: Box::new(factory),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ModuleClass> {
        self.classes.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }
}
