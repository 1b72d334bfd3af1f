// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{path::{Path, PathBuf}, sync::Arc};

use anyhow::{Context, Result};

use crate::{
    cfg::{error::ConfigError, section::Configuration},
    geometry::{Detector, GeometryRegistry},
    messenger::{
        ListenerSubscription, Message, Messenger, MsgFlags, Subscription,
        messenger::DispatchSource,
    },
    module::{error::ModuleError, event::Event, identifier::ModuleIdentifier},
};

/// A stage of the simulation pipeline.
///
/// Implementations are created once per run (unique modules) or once per
/// associated detector (detector modules) and driven through the three-phase
/// lifecycle: `initialize` exactly once before the first event, `run` per
/// event in declaration order, `finalize` exactly once after the event loop
/// when at least one event ran.
pub trait Module: Send {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn run(&mut self, event: &mut Event) -> Result<(), ModuleError>;

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether this instance is safe to run for multiple events
    /// concurrently. A single non-parallel module forces the whole run onto
    /// one worker.
    fn parallelize(&self) -> bool {
        false
    }
}

/// Fixed identity of a module instance, shared between the manager, the
/// messenger and the module itself.
#[derive(Debug)]
pub struct ModuleInfo {
    identifier: ModuleIdentifier,
    unique_name: String,
    input_name: String,
    output_name: String,
    detector: Option<Arc<Detector>>,
    output_directory: PathBuf,
}

impl ModuleInfo {
    pub(crate) fn new(
        identifier: ModuleIdentifier,
        config: &Configuration,
        detector: Option<Arc<Detector>>,
        output_directory: PathBuf,
    ) -> Result<Self, ConfigError> {
        let unique_name = identifier.unique_name();
        Ok(Self {
            identifier,
            unique_name,
            input_name: config.get_or("input", String::new())?,
            output_name: config.get_or("output", String::new())?,
            detector,
            output_directory,
        })
    }

    pub fn identifier(&self) -> &ModuleIdentifier {
        &self.identifier
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Message name this module subscribes to by default.
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// Message name attached to dispatches without an explicit name.
    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Detector bound to this instance; `None` for unique modules.
    pub fn detector(&self) -> Option<&Arc<Detector>> {
        self.detector.as_ref()
    }

    /// Per-module output directory below the run's output root.
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Creates the per-module output directory on first use.
    pub fn create_output_directory(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.output_directory).with_context(|| {
            format!(
                "cannot create output directory {:?} for module {}",
                self.output_directory, self.unique_name
            )
        })?;
        Ok(&self.output_directory)
    }

    pub(crate) fn dispatch_source(&self) -> DispatchSource<'_> {
        DispatchSource {
            module: &self.unique_name,
            output_name: &self.output_name,
        }
    }

    fn detector_name(&self) -> Option<&str> {
        self.detector.as_ref().map(|d| d.name())
    }
}

/// Construction-time environment of a module instance: its resolved
/// configuration, the shared collaborators and the instance identity.
///
/// The subscription helpers register delegates owned by this instance,
/// filtered by the instance's own detector (detector modules receive only
/// messages from their detector or broadcasts) and subscribed under the
/// module's `input` name.
pub struct ModuleContext {
    pub config: Configuration,
    pub messenger: Arc<Messenger>,
    pub geometry: Arc<GeometryRegistry>,
    info: Arc<ModuleInfo>,
}

impl ModuleContext {
    pub(crate) fn new(
        config: Configuration,
        messenger: Arc<Messenger>,
        geometry: Arc<GeometryRegistry>,
        info: Arc<ModuleInfo>,
    ) -> Self {
        Self {
            config,
            messenger,
            geometry,
            info,
        }
    }

    /// Shared instance identity, kept by the module for dispatching and
    /// seed lookup.
    pub fn info(&self) -> Arc<ModuleInfo> {
        self.info.clone()
    }

    pub fn detector(&self) -> Option<&Arc<Detector>> {
        self.info.detector()
    }

    pub fn bind_single<T: Message>(&self, flags: MsgFlags) -> Subscription<T> {
        self.messenger.bind_single::<T>(
            self.info.unique_name(),
            self.info.detector_name(),
            self.info.input_name(),
            flags,
        )
    }

    pub fn bind_multi<T: Message>(&self, flags: MsgFlags) -> Subscription<T> {
        self.messenger.bind_multi::<T>(
            self.info.unique_name(),
            self.info.detector_name(),
            self.info.input_name(),
            flags,
        )
    }

    pub fn register_filter<T, F>(&self, flags: MsgFlags, filter: F) -> Subscription<T>
    where
        T: Message,
        F: Fn(&Arc<T>, &str) -> bool + Send + Sync + 'static,
    {
        self.messenger.register_filter::<T, F>(
            self.info.unique_name(),
            self.info.detector_name(),
            self.info.input_name(),
            flags,
            filter,
        )
    }

    /// Listener over all payload types; message names are always ignored.
    pub fn register_listener<F>(&self, flags: MsgFlags, filter: F) -> ListenerSubscription
    where F: Fn(&Arc<dyn Message>, &str) -> bool + Send + Sync + 'static {
        self.messenger.register_listener(
            self.info.unique_name(),
            self.info.detector_name(),
            self.info.input_name(),
            flags | MsgFlags::IGNORE_NAME,
            filter,
        )
    }
}
