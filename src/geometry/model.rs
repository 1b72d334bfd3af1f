// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use crate::cfg::{error::ConfigError, section::Configuration};

/// Immutable description of a detector type: sensor dimensions, pixel grid
/// and assembly metadata. Registered in the geometry registry under its
/// unique type name.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorModel {
    model_type: String,
    number_of_pixels: [u32; 2],
    pixel_size: [f64; 2],
    sensor_thickness: f64,
    assembly: String,
}

impl DetectorModel {
    pub fn new(
        model_type: impl Into<String>,
        number_of_pixels: [u32; 2],
        pixel_size: [f64; 2],
        sensor_thickness: f64,
        assembly: impl Into<String>,
    ) -> Self {
        Self {
            model_type: model_type.into(),
            number_of_pixels,
            pixel_size,
            sensor_thickness,
            assembly: assembly.into(),
        }
    }

    /// Builds a model from a parsed model file section. The section name is
    /// the model type.
    pub fn from_config(config: &Configuration) -> Result<Self, ConfigError> {
        Ok(Self {
            model_type: config.name().to_string(),
            number_of_pixels: config.get("number_of_pixels")?,
            pixel_size: config.get("pixel_size")?,
            sensor_thickness: config.get("sensor_thickness")?,
            assembly: config.get_or("assembly", "monolithic".to_string())?,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.model_type
    }

    pub fn number_of_pixels(&self) -> [u32; 2] {
        self.number_of_pixels
    }

    pub fn pixel_size(&self) -> [f64; 2] {
        self.pixel_size
    }

    pub fn sensor_thickness(&self) -> f64 {
        self.sensor_thickness
    }

    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    /// Total sensitive area of the pixel matrix.
    pub fn sensor_area(&self) -> [f64; 2] {
        [
            f64::from(self.number_of_pixels[0]) * self.pixel_size[0],
            f64::from(self.number_of_pixels[1]) * self.pixel_size[1],
        ]
    }
}

/// Looks for `<type_name>.conf` in the given directories, first hit wins.
pub fn find_model_file(type_name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let file_name = format!("{type_name}.conf");
    search_paths
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| candidate.is_file())
}
