// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{path::Path, sync::Arc};

use crate::cfg::{
    error::ConfigError,
    options::OptionParser,
    reader::ConfigReader,
    section::Configuration,
    units::UnitRegistry,
};

/// Owner of the parsed configuration document.
///
/// Splits the document's sections into three fixed categories: *global*
/// sections (merged into a single global configuration), *ignored* sections
/// (dropped) and *module* sections (retained as pipeline stages in
/// declaration order). Category membership is decided by section name at
/// construction time and never changes afterwards.
#[derive(Debug)]
pub struct ConfigManager {
    global_config: Configuration,
    module_configs: Vec<Configuration>,
    module_options: OptionParser,
    detector_options: OptionParser,
    units: Arc<UnitRegistry>,
}

impl ConfigManager {
    /// Parses `path` and sorts its sections into the given categories.
    ///
    /// The global configuration is named after the first entry of
    /// `global_names`; later global sections merge into it without
    /// overwriting earlier keys.
    pub fn new(
        path: &Path,
        units: Arc<UnitRegistry>,
        global_names: &[&str],
        ignore_names: &[&str],
    ) -> Result<Self, ConfigError> {
        let mut reader = ConfigReader::new(units.clone());
        reader.add_file(path)?;

        let global_name = global_names.first().copied().unwrap_or_default();
        let mut global_config = Configuration::new(global_name, path, units.clone());
        let mut module_configs = Vec::new();

        for section in reader.into_configurations() {
            if global_names.contains(&section.name()) {
                global_config.merge(&section);
            } else if !ignore_names.contains(&section.name()) {
                module_configs.push(section);
            }
        }

        Ok(Self {
            global_config,
            module_configs,
            module_options: OptionParser::new(),
            detector_options: OptionParser::new(),
            units,
        })
    }

    /// Records module overlays (`-o`) and immediately applies the global
    /// ones.
    pub fn load_module_options(&mut self, options: &[String]) -> Result<bool, ConfigError> {
        for option in options {
            self.module_options.parse_option(option)?;
        }
        Ok(self
            .module_options
            .apply_global_options(&mut self.global_config))
    }

    /// Records detector overlays (`-g`), applied while loading geometry.
    pub fn load_detector_options(&mut self, options: &[String]) -> Result<(), ConfigError> {
        for option in options {
            self.detector_options.parse_option(option)?;
        }
        Ok(())
    }

    pub fn global_config(&self) -> &Configuration {
        &self.global_config
    }

    pub fn global_config_mut(&mut self) -> &mut Configuration {
        &mut self.global_config
    }

    /// Module sections in declaration order.
    pub fn module_configs(&self) -> &[Configuration] {
        &self.module_configs
    }

    /// Applies recorded overlays to one module instance configuration:
    /// class-level options first, then unique-name options on top.
    pub fn apply_instance_options(
        &self,
        config: &mut Configuration,
        class_name: &str,
        unique_name: &str,
    ) -> bool {
        let class_changed = self.module_options.apply_options(class_name, config);
        let instance_changed = self.module_options.apply_options(unique_name, config);
        class_changed || instance_changed
    }

    /// Applies recorded detector overlays to a detector section.
    pub fn apply_detector_options(&self, config: &mut Configuration) -> bool {
        let name = config.name().to_string();
        self.detector_options.apply_options(&name, config)
    }

    pub fn units(&self) -> &Arc<UnitRegistry> {
        &self.units
    }
}
