// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::{
    messenger::StringMessage,
    module::{
        Event, Module, ModuleContext, ModuleInfo, ModuleRegistry, error::ModuleError,
    },
};

/// Unique reference module dispatching one [`StringMessage`] per event.
///
/// The payload text comes from the `message` configuration key. Mostly
/// useful to exercise the messenger fabric and as a template for writing
/// producer modules.
pub struct EchoModule {
    info: Arc<ModuleInfo>,
    message: String,
    dispatched: u64,
}

impl EchoModule {
    pub const NAME: &'static str = "EchoModule";

    pub fn register(registry: &mut ModuleRegistry) {
        registry.register_unique(Self::NAME, |ctx| {
            Ok(Box::new(Self::from_context(&ctx)?) as Box<dyn Module>)
        });
    }

    fn from_context(ctx: &ModuleContext) -> Result<Self> {
        Ok(Self {
            info: ctx.info(),
            message: ctx.config.get_or("message", "hello".to_string())?,
            dispatched: 0,
        })
    }
}

impl Module for EchoModule {
    fn run(&mut self, event: &mut Event) -> Result<(), ModuleError> {
        event.dispatch(&self.info, StringMessage::new(self.message.clone()), None)?;
        self.dispatched += 1;
        debug!("Dispatched '{}' in event {}", self.message, event.number());
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        info!("Dispatched {} messages", self.dispatched);
        Ok(())
    }

    fn parallelize(&self) -> bool {
        true
    }
}
