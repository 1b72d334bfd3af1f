// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
};

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    cfg::{error::ConfigError, manager::ConfigManager, reader::ConfigReader},
    geometry::{
        detector::Detector,
        model::{DetectorModel, find_model_file},
    },
};

/// Errors raised by the geometry registry.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("detector model '{0}' is already registered")]
    DuplicateModel(String),

    #[error("detector '{0}' is already registered")]
    DuplicateDetector(String),

    #[error("detector model '{0}' does not exist")]
    UnknownModel(String),

    #[error("detector '{0}' does not exist")]
    UnknownDetector(String),

    #[error("geometry registry is closed, no detectors or models can be added")]
    Closed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Default)]
struct Inner {
    closed: bool,
    models: Vec<Arc<DetectorModel>>,
    model_names: HashSet<String>,
    detectors: Vec<Arc<Detector>>,
    detector_names: HashSet<String>,
}

/// Read-only catalog of detector instances and detector models, shared by
/// all modules.
///
/// The registry starts *open*: detectors and models may be added, and a
/// detector may reference a model that is registered later. The first read of
/// detectors closes the registry, resolving every pending model reference;
/// from then on the catalog is immutable.
#[derive(Debug, Default)]
pub struct GeometryRegistry {
    inner: RwLock<Inner>,
}

impl GeometryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a detector model under its unique type name.
    pub fn add_model(&self, model: Arc<DetectorModel>) -> Result<(), GeometryError> {
        let mut inner = self.inner.write().expect("geometry lock poisoned");
        if inner.closed {
            return Err(GeometryError::Closed);
        }
        trace!("Registering new model {}", model.type_name());
        if !inner.model_names.insert(model.type_name().to_string()) {
            return Err(GeometryError::DuplicateModel(model.type_name().to_string()));
        }
        inner.models.push(model);
        Ok(())
    }

    /// Registers a detector under its unique name. The referenced model may
    /// still be missing; it is resolved when the registry closes.
    pub fn add_detector(&self, detector: Arc<Detector>) -> Result<(), GeometryError> {
        let mut inner = self.inner.write().expect("geometry lock poisoned");
        if inner.closed {
            return Err(GeometryError::Closed);
        }
        trace!("Registering new detector {}", detector.name());
        if !inner.detector_names.insert(detector.name().to_string()) {
            return Err(GeometryError::DuplicateDetector(detector.name().to_string()));
        }
        inner.detectors.push(detector);
        Ok(())
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.inner
            .read()
            .expect("geometry lock poisoned")
            .model_names
            .contains(name)
    }

    pub fn has_detector(&self, name: &str) -> bool {
        self.inner
            .read()
            .expect("geometry lock poisoned")
            .detector_names
            .contains(name)
    }

    /// Model lookup by type name. Does not close the registry.
    pub fn get_model(&self, name: &str) -> Result<Arc<DetectorModel>, GeometryError> {
        let inner = self.inner.read().expect("geometry lock poisoned");
        inner
            .models
            .iter()
            .find(|m| m.type_name() == name)
            .cloned()
            .ok_or_else(|| GeometryError::UnknownModel(name.to_string()))
    }

    /// All registered models in insertion order.
    pub fn get_models(&self) -> Vec<Arc<DetectorModel>> {
        self.inner
            .read()
            .expect("geometry lock poisoned")
            .models
            .clone()
    }

    /// Detector lookup by name; closes the registry on first use.
    pub fn get_detector(&self, name: &str) -> Result<Arc<Detector>, GeometryError> {
        let inner = self.close_for_read()?;
        inner
            .detectors
            .iter()
            .find(|d| d.name() == name)
            .cloned()
            .ok_or_else(|| GeometryError::UnknownDetector(name.to_string()))
    }

    /// All detectors in insertion order; closes the registry on first use.
    pub fn get_detectors(&self) -> Result<Vec<Arc<Detector>>, GeometryError> {
        Ok(self.close_for_read()?.detectors.clone())
    }

    /// All detectors of the given model type; closes the registry on first
    /// use. An unknown or unused type is an `UnknownModel` error.
    pub fn get_detectors_by_type(
        &self,
        model_type: &str,
    ) -> Result<Vec<Arc<Detector>>, GeometryError> {
        let inner = self.close_for_read()?;
        let result: Vec<_> = inner
            .detectors
            .iter()
            .filter(|d| d.model_type() == model_type)
            .cloned()
            .collect();
        if result.is_empty() {
            return Err(GeometryError::UnknownModel(model_type.to_string()));
        }
        Ok(result)
    }

    /// Whether the registry has been closed by a read.
    pub fn is_closed(&self) -> bool {
        self.inner.read().expect("geometry lock poisoned").closed
    }

    fn close_for_read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, GeometryError> {
        {
            let inner = self.inner.read().expect("geometry lock poisoned");
            if inner.closed {
                return Ok(inner);
            }
        }

        let mut inner = self.inner.write().expect("geometry lock poisoned");
        if !inner.closed {
            debug!("Geometry is closed");
            inner.closed = true;

            // Resolve deferred model references; a missing model is fatal.
            for detector in &inner.detectors {
                if detector.model().is_none() {
                    let model = inner
                        .models
                        .iter()
                        .find(|m| m.type_name() == detector.model_type())
                        .cloned()
                        .ok_or_else(|| {
                            GeometryError::UnknownModel(detector.model_type().to_string())
                        })?;
                    detector.set_model(model);
                }
            }
        }
        drop(inner);

        Ok(self.inner.read().expect("geometry lock poisoned"))
    }

    /// Loads detectors and their models from the `detectors_file` document
    /// referenced by the global configuration, applying any recorded `-g`
    /// detector overlays.
    ///
    /// Each section of the detectors file describes one detector: the
    /// section name is the detector name, `type` names the model and
    /// `position` / `orientation` default to the origin. Models are read
    /// from `<type>.conf` files found in the `model_paths` directories.
    pub fn load_from_config(&self, conf_mgr: &ConfigManager) -> Result<(), GeometryError> {
        let global = conf_mgr.global_config();
        if !global.has("detectors_file") {
            debug!("No detectors file configured, geometry stays empty");
            return Ok(());
        }
        let detectors_path = global.get_path("detectors_file", true)?;

        let mut reader = ConfigReader::new(conf_mgr.units().clone());
        reader.add_file(&detectors_path)?;

        let model_paths = global.get_path_array("model_paths", true)?;
        let mut pending_types: Vec<String> = Vec::new();

        for mut section in reader.into_configurations() {
            conf_mgr.apply_detector_options(&mut section);

            let model_type: String = section.get("type")?;
            let position: [f64; 3] = section.get_or("position", [0.0; 3])?;
            let orientation: [f64; 3] = section.get_or("orientation", [0.0; 3])?;

            let detector = Detector::new(
                section.name(),
                model_type.clone(),
                position.into(),
                orientation.into(),
            );
            self.add_detector(Arc::new(detector))?;

            if !pending_types.contains(&model_type) {
                pending_types.push(model_type);
            }
        }

        for model_type in pending_types {
            if self.has_model(&model_type) {
                continue;
            }
            let Some(model_file) = find_model_file(&model_type, &model_paths) else {
                return Err(GeometryError::UnknownModel(model_type));
            };
            let mut model_reader = ConfigReader::new(conf_mgr.units().clone());
            model_reader.add_file(&model_file)?;

            // A model file holds a single header-less section with the
            // parameters; the file stem is the type name.
            let mut merged = crate::cfg::section::Configuration::new(
                model_type.clone(),
                &model_file,
                conf_mgr.units().clone(),
            );
            for section in model_reader.configurations() {
                merged.merge(section);
            }
            self.add_model(Arc::new(DetectorModel::from_config(&merged)?))?;
        }

        Ok(())
    }
}
