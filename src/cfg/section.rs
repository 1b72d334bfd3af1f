// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::cfg::{
    error::ConfigError,
    units::UnitRegistry,
    value::{FromSetting, unquote},
};

/// One named configuration section: an unordered set of textual key/value
/// settings plus the path of the file it originated from.
///
/// Values are stored verbatim (quotes included) and interpreted lazily by the
/// typed accessors. The originating path anchors relative path values read
/// through [`Configuration::get_path`].
#[derive(Debug, Clone)]
pub struct Configuration {
    name: String,
    path: PathBuf,
    settings: BTreeMap<String, String>,
    units: Arc<UnitRegistry>,
}

impl Configuration {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        units: Arc<UnitRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            settings: BTreeMap::new(),
            units,
        }
    }

    /// Section name, case-sensitive.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the file this section was parsed from; empty for synthetic
    /// sections.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }

    pub fn count_settings(&self) -> usize {
        self.settings.len()
    }

    /// Stores the raw text for a key, replacing any previous value.
    pub fn set_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(key.into(), value.into());
    }

    /// Raw text of a key, quotes included.
    pub fn get_text(&self, key: &str) -> Result<&str, ConfigError> {
        self.settings
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingKey {
                key: key.to_string(),
                section: self.name.clone(),
            })
    }

    /// Typed read of a key.
    pub fn get<T: FromSetting>(&self, key: &str) -> Result<T, ConfigError> {
        let raw = self.get_text(key)?;
        T::from_setting(raw, &self.units).map_err(|reason| ConfigError::InvalidKey {
            key: key.to_string(),
            section: self.name.clone(),
            value: raw.to_string(),
            expected: T::EXPECTED,
            reason,
        })
    }

    /// Typed read falling back to `default` when the key is absent.
    pub fn get_or<T: FromSetting>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        if !self.has(key) {
            return Ok(default);
        }
        self.get(key)
    }

    /// Comma-separated list read; an absent key yields an empty list.
    pub fn get_array<T: FromSetting>(&self, key: &str) -> Result<Vec<T>, ConfigError> {
        if !self.has(key) {
            return Ok(Vec::new());
        }
        self.get(key)
    }

    /// Resolves a path value against the directory of the originating file.
    ///
    /// Absolute values are used verbatim. With `check_exists` the result is
    /// canonicalized and must point to an existing file or directory.
    pub fn get_path(&self, key: &str, check_exists: bool) -> Result<PathBuf, ConfigError> {
        let raw: String = self.get(key)?;
        self.path_to_absolute(key, &raw, check_exists)
    }

    /// As [`Configuration::get_path`], for a list of paths.
    pub fn get_path_array(
        &self,
        key: &str,
        check_exists: bool,
    ) -> Result<Vec<PathBuf>, ConfigError> {
        let raw: Vec<String> = self.get_array(key)?;
        raw.iter()
            .map(|p| self.path_to_absolute(key, p, check_exists))
            .collect()
    }

    fn path_to_absolute(
        &self,
        key: &str,
        value: &str,
        check_exists: bool,
    ) -> Result<PathBuf, ConfigError> {
        let candidate = PathBuf::from(value);
        let mut path = if candidate.is_absolute() {
            candidate
        } else {
            let base = self.path.parent().unwrap_or(Path::new(""));
            base.join(candidate)
        };

        if check_exists {
            path = path.canonicalize().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                section: self.name.clone(),
                value: value.to_string(),
                reason: format!("path does not exist: {e}"),
            })?;
        }
        Ok(path)
    }

    /// Copies the keys of `other` that are absent in `self`; existing keys
    /// are retained.
    pub fn merge(&mut self, other: &Configuration) {
        for (key, value) in &other.settings {
            if !self.has(key) {
                self.set_text(key.clone(), value.clone());
            }
        }
    }

    /// Iterates over the raw settings in key order.
    pub fn settings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.settings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn units(&self) -> &Arc<UnitRegistry> {
        &self.units
    }

    /// Raw text with outer quotes stripped; used for display purposes.
    pub fn get_display_text(&self, key: &str) -> Result<&str, ConfigError> {
        self.get_text(key).map(unquote)
    }
}
