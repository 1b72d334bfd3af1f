// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Top-level simulation runtime.
//!
//! Owns the managers for the lifetime of a run and drives them through the
//! fixed phase sequence: construction parses the configuration and applies
//! the command-line overlays, `load` seeds the generators and builds the
//! geometry and module instances, then `initialize` / `run` / `finalize`
//! execute the pipeline. `terminate` may be called from a signal handler at
//! any point.

use std::{
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::{
    cfg::{manager::ConfigManager, units::UnitRegistry},
    geometry::GeometryRegistry,
    messenger::Messenger,
    module::{ModuleManager, ModuleRegistry, Seeder, error::ModuleError},
};

/// Section names merged into the global configuration. The unnamed section
/// covers keys written before the first section header.
pub const GLOBAL_SECTIONS: &[&str] = &["PixSim", ""];

/// Section names dropped at load time.
pub const IGNORED_SECTIONS: &[&str] = &["Ignore"];

/// A fully assembled simulation run.
pub struct Simulation {
    conf_mgr: ConfigManager,
    registry: ModuleRegistry,
    messenger: Arc<Messenger>,
    geometry: Arc<GeometryRegistry>,
    mod_mgr: ModuleManager,
    seeder_modules: Option<Seeder>,
    seeder_core: Option<Seeder>,
    terminate: Arc<AtomicBool>,
    has_run: bool,
}

impl Simulation {
    /// Parses the configuration file and records the command-line overlays.
    /// Global overlay options are applied immediately.
    pub fn new(
        config_file: &Path,
        units: Arc<UnitRegistry>,
        registry: ModuleRegistry,
        module_options: &[String],
        detector_options: &[String],
    ) -> Result<Self> {
        let mut conf_mgr =
            ConfigManager::new(config_file, units, GLOBAL_SECTIONS, IGNORED_SECTIONS)?;
        conf_mgr.load_module_options(module_options)?;
        conf_mgr.load_detector_options(detector_options)?;

        let messenger = Arc::new(Messenger::new());
        let terminate = Arc::new(AtomicBool::new(false));
        let mod_mgr = ModuleManager::new(messenger.clone(), terminate.clone());

        Ok(Self {
            conf_mgr,
            registry,
            messenger,
            geometry: Arc::new(GeometryRegistry::new()),
            mod_mgr,
            seeder_modules: None,
            seeder_core: None,
            terminate,
            has_run: false,
        })
    }

    /// Performs the load phase: seeding, output directory, geometry and
    /// module instantiation.
    pub fn load(&mut self) -> Result<()> {
        info!("Welcome to pixsim-rs {}", env!("CARGO_PKG_VERSION"));
        self.conf_mgr
            .global_config_mut()
            .set_text("version", env!("CARGO_PKG_VERSION"));

        let module_seed = self.initialize_seeders()?;
        debug!("Module seed stream starts at {module_seed}");

        self.prepare_output_directory()?;

        self.geometry
            .load_from_config(&self.conf_mgr)
            .context("cannot load the geometry")?;

        if self.terminate.load(Ordering::Relaxed) {
            info!("Skip loading modules because termination is requested");
            return Ok(());
        }
        self.mod_mgr
            .load(&self.registry, &self.conf_mgr, &self.geometry)?;
        Ok(())
    }

    /// Seeds the module and core streams from configuration or, when
    /// absent, from an entropy mixture; the derived seeds are written back
    /// into the global configuration so reruns are reproducible.
    fn initialize_seeders(&mut self) -> Result<u64> {
        let global = self.conf_mgr.global_config_mut();

        let seed = if global.has("random_seed") {
            let seed: u64 = global.get("random_seed")?;
            info!("Initialized PRNG with configured seed {seed}");
            seed
        } else {
            let clock = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default();
            let address = std::ptr::from_ref(global) as usize as u64;
            let mut hasher = std::hash::DefaultHasher::new();
            std::thread::current().id().hash(&mut hasher);
            let seed = clock ^ address ^ hasher.finish();
            global.set_text("random_seed", seed.to_string());
            info!("Initialized PRNG with system entropy seed {seed}");
            seed
        };
        self.seeder_modules = Some(Seeder::new(seed));

        let core_seed = if global.has("random_seed_core") {
            global.get("random_seed_core")?
        } else {
            let core_seed = seed.wrapping_add(1);
            global.set_text("random_seed_core", core_seed.to_string());
            core_seed
        };
        self.seeder_core = Some(Seeder::new(core_seed));

        Ok(seed)
    }

    /// Resolves, optionally purges, and creates the per-run output root.
    fn prepare_output_directory(&mut self) -> Result<()> {
        let global = self.conf_mgr.global_config_mut();

        let directory = if global.has("output_directory") {
            global.get_path("output_directory", false)?
        } else {
            std::env::current_dir()
                .context("cannot determine the current working directory")?
                .join("output")
        };

        if directory.is_dir() {
            if global.get_or("purge_output_directory", false)? {
                debug!("Deleting previous output directory {}", directory.display());
                std::fs::remove_dir_all(&directory).with_context(|| {
                    format!("cannot purge output directory {directory:?}")
                })?;
            } else {
                debug!("Output directory {} already exists", directory.display());
            }
        }
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("cannot create output directory {directory:?}"))?;

        // Store the absolute root so module subdirectories resolve from it.
        global.set_text("output_directory", directory.display().to_string());
        Ok(())
    }

    /// Runs `initialize` on all modules.
    pub fn initialize(&mut self) -> Result<()> {
        if self.terminate.load(Ordering::Relaxed) {
            info!("Skip initializing modules because termination is requested");
            return Ok(());
        }
        self.mod_mgr.initialize()?;
        Ok(())
    }

    /// Runs the event loop.
    pub fn run(&mut self) -> Result<()> {
        if self.terminate.load(Ordering::Relaxed) {
            info!("Skip running modules because termination is requested");
            return Ok(());
        }
        let seeder = self
            .seeder_modules
            .as_ref()
            .ok_or_else(|| ModuleError::InvalidAction("run called before load".into()))?;
        self.mod_mgr.run(self.conf_mgr.global_config(), seeder)?;
        self.has_run = self.mod_mgr.events_completed() > 0;
        Ok(())
    }

    /// Runs `finalize` on all modules, provided at least one event ran.
    pub fn finalize(&mut self) -> Result<()> {
        if !self.has_run {
            info!("Skip finalizing modules because no module did run");
            return Ok(());
        }
        self.mod_mgr.finalize()?;
        self.mod_mgr.summarize();
        Ok(())
    }

    /// Requests termination; safe to call from a signal handler thread. The
    /// request takes effect between modules and between events.
    pub fn terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    pub fn global_config(&self) -> &crate::cfg::section::Configuration {
        self.conf_mgr.global_config()
    }

    pub fn geometry(&self) -> &Arc<GeometryRegistry> {
        &self.geometry
    }

    pub fn messenger(&self) -> &Arc<Messenger> {
        &self.messenger
    }

    /// Seed stream reserved for the core itself (geometry sampling and the
    /// like); separate from the per-module stream.
    pub fn core_seeder(&self) -> Option<&Seeder> {
        self.seeder_core.as_ref()
    }

    pub fn events_completed(&self) -> u64 {
        self.mod_mgr.events_completed()
    }

    pub fn module_names(&self) -> Vec<String> {
        self.mod_mgr.module_names()
    }

    pub fn end_of_run_requested(&self) -> bool {
        self.mod_mgr.end_of_run_requested()
    }
}
