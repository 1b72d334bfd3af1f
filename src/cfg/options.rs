// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::info;

use crate::cfg::{error::ConfigError, reader::parse_key_value, section::Configuration};

/// Recorder for command-line configuration overlays of the form
/// `[qualifier.]key=value`.
///
/// Options without a qualifier are global; a qualifier is everything up to
/// the first dot and routes the option to a module class, a module unique
/// name or a detector section. Application order is the caller's
/// responsibility: global first, then class, then instance, later writes
/// overwriting earlier ones.
#[derive(Debug, Default, Clone)]
pub struct OptionParser {
    global_options: Vec<(String, String)>,
    identifier_options: Vec<(String, Vec<(String, String)>)>,
}

impl OptionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one option line.
    pub fn parse_option(&mut self, line: &str) -> Result<(), ConfigError> {
        let (key, value) = parse_key_value(line)?;

        match key.split_once('.') {
            None => self.global_options.push((key, value)),
            Some((identifier, rest)) => {
                let identifier = identifier.to_string();
                let entry = match self
                    .identifier_options
                    .iter_mut()
                    .find(|(id, _)| *id == identifier)
                {
                    Some((_, options)) => options,
                    None => {
                        self.identifier_options.push((identifier, Vec::new()));
                        &mut self
                            .identifier_options
                            .last_mut()
                            .expect("entry was just pushed")
                            .1
                    },
                };
                entry.push((rest.to_string(), value));
            },
        }
        Ok(())
    }

    /// Applies all global options to `config`, returning whether any setting
    /// changed.
    pub fn apply_global_options(&self, config: &mut Configuration) -> bool {
        for (key, value) in &self.global_options {
            info!("Setting provided option {key}={value}");
            config.set_text(key.clone(), value.clone());
        }
        !self.global_options.is_empty()
    }

    /// Applies the options recorded for `identifier` to `config`, returning
    /// whether any setting changed.
    pub fn apply_options(&self, identifier: &str, config: &mut Configuration) -> bool {
        let Some((_, options)) = self
            .identifier_options
            .iter()
            .find(|(id, _)| id == identifier)
        else {
            return false;
        };

        for (key, value) in options {
            info!("Setting provided option {key}={value} for {identifier}");
            config.set_text(key.clone(), value.clone());
        }
        !options.is_empty()
    }
}
