// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Line-oriented configuration parser.
//!
//! The grammar is deliberately small:
//!
//! ```text
//! # comment
//! [SectionName]
//! key = value          # inline comment, stripped outside quotes
//! label = "kept #hash"
//! ```
//!
//! Empty lines are ignored, sections keep their declaration order and a `#`
//! inside a single- or double-quoted run is part of the value. Anything else
//! is a parse error reported with the file name and 1-based line number.

use std::{collections::HashMap, fmt::Write, fs, path::Path, sync::Arc};

use crate::cfg::{error::ConfigError, section::Configuration, units::UnitRegistry};

/// Parser producing an ordered sequence of [`Configuration`] sections from
/// one or more files.
#[derive(Debug, Clone)]
pub struct ConfigReader {
    sections: Vec<Configuration>,
    name_index: HashMap<String, Vec<usize>>,
    units: Arc<UnitRegistry>,
}

impl ConfigReader {
    pub fn new(units: Arc<UnitRegistry>) -> Self {
        Self {
            sections: Vec::new(),
            name_index: HashMap::new(),
            units,
        }
    }

    /// Reads and parses a file, appending its sections to this reader.
    pub fn add_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Unavailable {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        self.add_str(&text, &file_name)
    }

    /// Parses configuration text, attributing errors and relative paths to
    /// `file_name`.
    pub fn add_str(&mut self, text: &str, file_name: &Path) -> Result<(), ConfigError> {
        let display = file_name.display().to_string();
        let mut current = Configuration::new("", file_name, self.units.clone());

        for (idx, line) in text.lines().enumerate() {
            let line_num = idx + 1;

            match line.find('=') {
                None => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() || trimmed.starts_with('#') {
                        continue;
                    }
                    if trimmed.starts_with('[') && trimmed.ends_with(']') {
                        let finished = std::mem::replace(
                            &mut current,
                            Configuration::new(
                                &trimmed[1..trimmed.len() - 1],
                                file_name,
                                self.units.clone(),
                            ),
                        );
                        self.push_section(finished);
                    } else {
                        return Err(ConfigError::Parse {
                            file: display,
                            line: line_num,
                            reason: "line is neither a section header nor a key/value pair"
                                .to_string(),
                        });
                    }
                },
                Some(equals_pos) => {
                    let key = line[..equals_pos].trim();
                    let value = strip_inline_comment(line[equals_pos + 1..].trim());
                    if current.has(key) {
                        return Err(ConfigError::Parse {
                            file: display,
                            line: line_num,
                            reason: format!(
                                "duplicate key '{key}' in section [{}]",
                                current.name()
                            ),
                        });
                    }
                    current.set_text(key, value);
                },
            }
        }

        self.push_section(current);
        Ok(())
    }

    /// Unnamed sections without any settings are dropped, everything else is
    /// retained in declaration order.
    fn push_section(&mut self, section: Configuration) {
        if section.name().is_empty() && section.count_settings() == 0 {
            return;
        }
        self.name_index
            .entry(section.name().to_string())
            .or_default()
            .push(self.sections.len());
        self.sections.push(section);
    }

    pub fn has_configuration(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    pub fn count_configurations(&self, name: &str) -> usize {
        self.name_index.get(name).map_or(0, Vec::len)
    }

    /// All sections with the given name, in declaration order.
    pub fn get_configurations(&self, name: &str) -> Vec<&Configuration> {
        self.name_index
            .get(name)
            .map(|positions| positions.iter().map(|&i| &self.sections[i]).collect())
            .unwrap_or_default()
    }

    /// All sections in declaration order.
    pub fn configurations(&self) -> &[Configuration] {
        &self.sections
    }

    pub fn into_configurations(self) -> Vec<Configuration> {
        self.sections
    }

    /// Canonical text form; parsing the result yields the same sections and
    /// settings as this reader holds.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if !section.name().is_empty() {
                let _ = writeln!(out, "[{}]", section.name());
            }
            for (key, value) in section.settings() {
                let _ = writeln!(out, "{key} = {value}");
            }
            out.push('\n');
        }
        out
    }
}

/// Cuts the value at the first `#` that is not inside a quoted run and trims
/// the trailing whitespace. Quote state toggles on matching `'` or `"`.
fn strip_inline_comment(value: &str) -> &str {
    let mut quote: Option<char> = None;
    for (pos, ch) in value.char_indices() {
        match (quote, ch) {
            (None, '\'' | '"') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, '#') => return value[..pos].trim_end(),
            _ => {},
        }
    }
    value
}

/// Parses a single `key = value` line outside of any section context, with
/// the same comment and whitespace handling as the file parser. Used for
/// command-line option overlays.
pub fn parse_key_value(line: &str) -> Result<(String, String), ConfigError> {
    let line = line.trim();
    let equals_pos = line.find('=').ok_or_else(|| ConfigError::Parse {
        file: "<option>".to_string(),
        line: 0,
        reason: format!("'{line}' is not a key/value pair"),
    })?;
    let key = line[..equals_pos].trim();
    if key.is_empty() {
        return Err(ConfigError::Parse {
            file: "<option>".to_string(),
            line: 0,
            reason: format!("'{line}' has an empty key"),
        });
    }
    let value = strip_inline_comment(line[equals_pos + 1..].trim());
    Ok((key.to_string(), value.to_string()))
}
