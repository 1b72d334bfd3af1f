// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::geometry::model::DetectorModel;

/// Cartesian position in the global reference frame, base unit meter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Self {
            x: v[0],
            y: v[1],
            z: v[2],
        }
    }
}

/// Intrinsic Z-X-Z rotation, base unit radian.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub phi: f64,
    pub theta: f64,
    pub psi: f64,
}

impl From<[f64; 3]> for EulerAngles {
    fn from(v: [f64; 3]) -> Self {
        Self {
            phi: v[0],
            theta: v[1],
            psi: v[2],
        }
    }
}

/// A placed detector instance.
///
/// Detectors are immutable after geometry load. The model link may be
/// deferred: a detector can be constructed knowing only the model type name,
/// and the registry resolves the actual [`DetectorModel`] when the geometry
/// closes.
#[derive(Debug)]
pub struct Detector {
    name: String,
    model_type: String,
    position: Vec3,
    orientation: EulerAngles,
    model: OnceCell<Arc<DetectorModel>>,
}

impl Detector {
    pub fn new(
        name: impl Into<String>,
        model_type: impl Into<String>,
        position: Vec3,
        orientation: EulerAngles,
    ) -> Self {
        Self {
            name: name.into(),
            model_type: model_type.into(),
            position,
            orientation,
            model: OnceCell::new(),
        }
    }

    /// Unique detector name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Model type name this detector references.
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn orientation(&self) -> EulerAngles {
        self.orientation
    }

    /// Resolved detector model; `None` until the registry has closed.
    pub fn model(&self) -> Option<&Arc<DetectorModel>> {
        self.model.get()
    }

    pub(crate) fn set_model(&self, model: Arc<DetectorModel>) {
        // A second resolution attempt is harmless, the first link wins.
        let _ = self.model.set(model);
    }
}
