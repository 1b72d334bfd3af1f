// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, trace};

use crate::{
    messenger::{MsgFlags, StringMessage, Subscription},
    module::{
        Event, Module, ModuleContext, ModuleInfo, ModuleRegistry, error::ModuleError,
    },
};

/// Unique reference module counting every received [`StringMessage`].
///
/// Subscribes with `REQUIRED`, so the module is skipped in events where no
/// message arrives. With a non-zero `stop_after` key the module requests a
/// graceful end of the run once the total reaches the limit.
pub struct MessageCounter {
    info: Arc<ModuleInfo>,
    subscription: Subscription<StringMessage>,
    stop_after: u64,
    total: u64,
}

impl MessageCounter {
    pub const NAME: &'static str = "MessageCounter";

    pub fn register(registry: &mut ModuleRegistry) {
        registry.register_unique(Self::NAME, |ctx| {
            Ok(Box::new(Self::from_context(&ctx)?) as Box<dyn Module>)
        });
    }

    fn from_context(ctx: &ModuleContext) -> Result<Self> {
        let subscription =
            ctx.bind_multi::<StringMessage>(MsgFlags::REQUIRED | MsgFlags::IGNORE_NAME);
        Ok(Self {
            info: ctx.info(),
            subscription,
            stop_after: ctx.config.get_or("stop_after", 0)?,
            total: 0,
        })
    }
}

impl Module for MessageCounter {
    fn run(&mut self, event: &mut Event) -> Result<(), ModuleError> {
        let messages = event.fetch_multi(&self.subscription);
        self.total += messages.len() as u64;
        trace!(
            "Received {} messages in event {}",
            messages.len(),
            event.number()
        );

        if self.stop_after > 0 && self.total >= self.stop_after {
            return Err(ModuleError::EndOfRun(format!(
                "{} received {} messages",
                self.info.unique_name(),
                self.total
            )));
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        info!("Received {} messages in total", self.total);
        Ok(())
    }

    fn parallelize(&self) -> bool {
        true
    }
}
