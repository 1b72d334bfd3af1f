// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Module instantiation and lifecycle driving.
//!
//! The manager expands configuration sections into module instances
//! (unique or per-detector, with priority-based deduplication), drives the
//! initialize / run / finalize phases and schedules per-event tasks onto the
//! worker pool. Within one event the modules run sequentially in declaration
//! order; parallelism comes from in-flight events.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Instant,
};

use anyhow::Context;
use dashmap::DashMap;
use tracing::{debug, info, info_span, trace, warn};

use crate::{
    cfg::{
        logger::{LogFormat, scoped_overrides},
        manager::ConfigManager,
        section::Configuration,
    },
    geometry::{Detector, GeometryRegistry},
    messenger::Messenger,
    module::{
        error::ModuleError,
        event::{Event, Seeder},
        identifier::ModuleIdentifier,
        module::{Module, ModuleContext, ModuleInfo},
        registry::ModuleRegistry,
        thread_pool::ThreadPool,
    },
};

struct ModuleInstance {
    module: Mutex<Box<dyn Module>>,
    info: Arc<ModuleInfo>,
    config: Configuration,
    parallel: bool,
}

/// Owner of all module instances and the per-event execution machinery.
pub struct ModuleManager {
    modules: Vec<Arc<ModuleInstance>>,
    messenger: Arc<Messenger>,
    terminate: Arc<AtomicBool>,
    end_of_run: Arc<AtomicBool>,
    events_completed: Arc<AtomicU64>,
    execution_time: Arc<DashMap<String, f64>>,
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("modules", &self.modules.len())
            .finish()
    }
}

impl ModuleManager {
    pub fn new(messenger: Arc<Messenger>, terminate: Arc<AtomicBool>) -> Self {
        Self {
            modules: Vec::new(),
            messenger,
            terminate,
            end_of_run: Arc::new(AtomicBool::new(false)),
            events_completed: Arc::new(AtomicU64::new(0)),
            execution_time: Arc::new(DashMap::new()),
        }
    }

    /// Instantiates the modules requested by the configuration document, in
    /// declaration order.
    pub fn load(
        &mut self,
        registry: &ModuleRegistry,
        conf_mgr: &ConfigManager,
        geometry: &Arc<GeometryRegistry>,
    ) -> Result<(), ModuleError> {
        let output_root = output_root(conf_mgr.global_config())?;
        let mut position_by_name: HashMap<String, usize> = HashMap::new();

        for section in conf_mgr.module_configs() {
            let class_name = section.name().to_string();
            let class = registry
                .get(&class_name)
                .ok_or_else(|| ModuleError::UnknownModuleClass(class_name.clone()))?;

            debug!("Creating instantiations for module {class_name}");
            let instantiations = if class.is_unique() {
                vec![(None, ModuleIdentifier::new(class_name.clone(), "", 0))]
            } else {
                detector_instantiations(&class_name, section, geometry)?
            };

            for (detector, identifier) in instantiations {
                let unique_name = identifier.unique_name();

                // Priority resolution between instantiations sharing a
                // unique name: the lower number wins, ties are fatal.
                if let Some(&pos) = position_by_name.get(&unique_name) {
                    let existing = self.modules[pos].info.identifier().priority();
                    if identifier.priority() == existing {
                        return Err(ModuleError::AmbiguousInstantiation(unique_name));
                    }
                    if identifier.priority() > existing {
                        trace!(
                            "Skipping instantiation {unique_name} with lower priority"
                        );
                        continue;
                    }
                    self.discard_instance(pos, &mut position_by_name);
                }

                let mut config = section.clone();
                conf_mgr.apply_instance_options(&mut config, &class_name, &unique_name);

                let output_directory =
                    output_root.join(unique_name.replace(':', "_"));
                let info = Arc::new(ModuleInfo::new(
                    identifier,
                    &config,
                    detector,
                    output_directory,
                )?);

                let section_tag = format!("C:{unique_name}");
                let span = info_span!("module", section = %section_tag);
                let _enter = span.enter();
                let _log_scope = apply_log_overrides(&config)?;

                let ctx = ModuleContext::new(
                    config.clone(),
                    self.messenger.clone(),
                    geometry.clone(),
                    info.clone(),
                );
                let module = class
                    .construct(ctx)
                    .with_context(|| format!("cannot construct module {unique_name}"))?;
                let parallel = module.parallelize();

                position_by_name.insert(unique_name, self.modules.len());
                self.modules.push(Arc::new(ModuleInstance {
                    module: Mutex::new(module),
                    info,
                    config,
                    parallel,
                }));
            }
        }

        Ok(())
    }

    /// Drops a lower-priority instance, removing its messenger delegates and
    /// fixing up the position index.
    fn discard_instance(
        &mut self,
        pos: usize,
        position_by_name: &mut HashMap<String, usize>,
    ) {
        let removed = self.modules.remove(pos);
        trace!(
            "Discarding instantiation {} with lower priority",
            removed.info.unique_name()
        );
        self.messenger.unregister_module(removed.info.unique_name());
        position_by_name.remove(removed.info.unique_name());
        for value in position_by_name.values_mut() {
            if *value > pos {
                *value -= 1;
            }
        }
    }

    /// Runs `initialize` exactly once for every module, in declaration
    /// order.
    pub fn initialize(&self) -> Result<(), ModuleError> {
        for instance in &self.modules {
            let unique_name = instance.info.unique_name();
            info!("Initializing {unique_name}");

            let section_tag = format!("I:{unique_name}");
            let span = info_span!("module", section = %section_tag);
            let _enter = span.enter();
            let _log_scope = apply_log_overrides(&instance.config)?;

            instance
                .module
                .lock()
                .expect("module lock poisoned")
                .initialize()
                .with_context(|| format!("initialization of {unique_name} failed"))?;
        }
        info!("Initialization finished");
        Ok(())
    }

    /// Runs the event loop: one task per event index, executed by `workers`
    /// worker threads. Forces a single worker when any module is not
    /// parallel-safe.
    pub fn run(
        &self,
        global_config: &Configuration,
        seeder: &Seeder,
    ) -> Result<(), ModuleError> {
        let number_of_events: u64 = global_config.get_or("number_of_events", 1)?;
        let default_workers = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        let mut workers: usize = global_config.get_or("workers", default_workers)?;
        workers = workers.max(1);

        if !self.modules.iter().all(|m| m.parallel) && workers > 1 {
            info!("Not all modules support parallel execution, using a single worker");
            workers = 1;
        }

        let pool = ThreadPool::new(workers);
        debug!(
            "Running {number_of_events} events over {} workers",
            pool.worker_count()
        );

        for event_number in 1..=number_of_events {
            if self.terminate.load(Ordering::Relaxed)
                || self.end_of_run.load(Ordering::Relaxed)
            {
                info!("Termination requested, not submitting further events");
                break;
            }

            // Seeds are drawn on the submitting thread, in declaration
            // order, so worker interleaving cannot change them.
            let seeds: HashMap<String, u64> = self
                .modules
                .iter()
                .map(|m| (m.info.unique_name().to_string(), seeder.draw()))
                .collect();

            let modules = self.modules.clone();
            let messenger = self.messenger.clone();
            let terminate = self.terminate.clone();
            let end_of_run = self.end_of_run.clone();
            let events_completed = self.events_completed.clone();
            let execution_time = self.execution_time.clone();
            let total = number_of_events;

            pool.submit(move || {
                if terminate.load(Ordering::Relaxed) || end_of_run.load(Ordering::Relaxed)
                {
                    return Ok(());
                }

                let mut event =
                    Event::new(event_number, messenger.clone(), seeds, terminate.clone());
                info!("Running event {event_number} of {total}");

                for instance in &modules {
                    // An external termination request takes effect between
                    // modules; a voluntary end-of-run still completes the
                    // current event.
                    if terminate.load(Ordering::Relaxed)
                        && !end_of_run.load(Ordering::Relaxed)
                    {
                        break;
                    }

                    let unique_name = instance.info.unique_name();
                    let mut module =
                        instance.module.lock().expect("module lock poisoned");

                    if !messenger.is_satisfied(unique_name, event.store()) {
                        trace!(
                            "Not all required messages are received for {unique_name}, \
                             skipping module!"
                        );
                        continue;
                    }

                    let section_tag = format!("R:{unique_name}");
                    let span = info_span!("module", section = %section_tag);
                    let _enter = span.enter();
                    let _log_scope = apply_log_overrides(&instance.config)?;

                    let start = Instant::now();
                    match module.run(&mut event) {
                        Ok(()) => {},
                        Err(err) if err.is_end_of_run() => {
                            warn!("Request to terminate: {err}");
                            end_of_run.store(true, Ordering::Relaxed);
                        },
                        Err(err) => {
                            return Err(anyhow::Error::from(err)
                                .context(format!("module {unique_name} failed")));
                        },
                    }
                    *execution_time.entry(unique_name.to_string()).or_insert(0.0) +=
                        start.elapsed().as_secs_f64();
                }

                // End of event: clear non-persistent delegate state.
                for instance in &modules {
                    messenger.reset_module(instance.info.unique_name(), event.store_mut());
                }

                events_completed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            });
        }

        pool.wait_all()?;
        Ok(())
    }

    /// Runs `finalize` exactly once for every module, in declaration order.
    pub fn finalize(&self) -> Result<(), ModuleError> {
        for instance in &self.modules {
            let unique_name = instance.info.unique_name();
            info!("Finalizing {unique_name}");

            let section_tag = format!("F:{unique_name}");
            let span = info_span!("module", section = %section_tag);
            let _enter = span.enter();
            let _log_scope = apply_log_overrides(&instance.config)?;

            instance
                .module
                .lock()
                .expect("module lock poisoned")
                .finalize()
                .with_context(|| format!("finalization of {unique_name} failed"))?;
        }
        info!("Finalization completed");
        Ok(())
    }

    /// Number of events that ran to completion.
    pub fn events_completed(&self) -> u64 {
        self.events_completed.load(Ordering::Relaxed)
    }

    /// Whether a module voluntarily ended the run.
    pub fn end_of_run_requested(&self) -> bool {
        self.end_of_run.load(Ordering::Relaxed)
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Unique names of the instantiated modules, in execution order.
    pub fn module_names(&self) -> Vec<String> {
        self.modules
            .iter()
            .map(|m| m.info.unique_name().to_string())
            .collect()
    }

    /// Logs the run summary: events completed, modules executed and the
    /// accumulated per-module wall time.
    pub fn summarize(&self) {
        info!(
            "Executed {} instantiations over {} events",
            self.modules.len(),
            self.events_completed()
        );
        for instance in &self.modules {
            let unique_name = instance.info.unique_name();
            let seconds = self
                .execution_time
                .get(unique_name)
                .map(|entry| *entry.value())
                .unwrap_or_default();
            info!(" Module {unique_name} took {seconds:.3}s");
        }
    }
}

impl Drop for ModuleManager {
    fn drop(&mut self) {
        // Delegates are owned by their module instance; drop them together.
        for instance in &self.modules {
            self.messenger.unregister_module(instance.info.unique_name());
        }
    }
}

/// Expands a detector-module section into per-detector instantiations.
///
/// Detectors listed by `name` get priority 0, detectors matched by `type`
/// priority 1, and without either key one instance per registered detector
/// is created at priority 2. Expansion follows the registry's detector
/// insertion order.
fn detector_instantiations(
    class_name: &str,
    section: &Configuration,
    geometry: &Arc<GeometryRegistry>,
) -> Result<Vec<(Option<Arc<Detector>>, ModuleIdentifier)>, ModuleError> {
    let mut instantiations = Vec::new();
    let mut selected_names: Vec<String> = Vec::new();

    let names: Vec<String> = section.get_array("name")?;
    for name in &names {
        let detector = geometry.get_detector(name)?;
        instantiations.push((
            Some(detector.clone()),
            ModuleIdentifier::new(class_name, detector.name(), 0),
        ));
        selected_names.push(name.clone());
    }

    let types: Vec<String> = section.get_array("type")?;
    for model_type in &types {
        for detector in geometry.get_detectors_by_type(model_type)? {
            if selected_names.iter().any(|n| n == detector.name()) {
                continue;
            }
            instantiations.push((
                Some(detector.clone()),
                ModuleIdentifier::new(class_name, detector.name(), 1),
            ));
        }
    }

    if names.is_empty() && types.is_empty() {
        for detector in geometry.get_detectors()? {
            instantiations.push((
                Some(detector.clone()),
                ModuleIdentifier::new(class_name, detector.name(), 2),
            ));
        }
    }

    Ok(instantiations)
}

/// Resolves the per-run output root from the global configuration.
fn output_root(global_config: &Configuration) -> Result<std::path::PathBuf, ModuleError> {
    if global_config.has("output_directory") {
        return Ok(global_config.get_path("output_directory", false)?);
    }
    let cwd = std::env::current_dir()
        .context("cannot determine the current working directory")?;
    Ok(cwd.join("output"))
}

/// Applies the per-module `log_level` / `log_format` overrides for the
/// duration of a lifecycle call.
fn apply_log_overrides(
    config: &Configuration,
) -> Result<crate::cfg::logger::LogScope, ModuleError> {
    let mut level = None;
    if config.has("log_level") {
        let raw: String = config.get("log_level")?;
        level = Some(crate::cfg::logger::normalize_level(&raw).map_err(|err| {
            crate::cfg::error::ConfigError::InvalidValue {
                key: "log_level".to_string(),
                section: config.name().to_string(),
                value: raw,
                reason: err.to_string(),
            }
        })?);
    }

    let mut format = None;
    if config.has("log_format") {
        let raw: String = config.get("log_format")?;
        format = Some(raw.parse::<LogFormat>().map_err(|err: anyhow::Error| {
            crate::cfg::error::ConfigError::InvalidValue {
                key: "log_format".to_string(),
                section: config.name().to_string(),
                value: raw,
                reason: err.to_string(),
            }
        })?);
    }

    Ok(scoped_overrides(level.as_deref(), format))
}
