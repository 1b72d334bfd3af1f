// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Lazy interpretation of stored setting text.
//!
//! Settings are kept verbatim as written in the configuration file and only
//! parsed when a typed read happens. Numeric values accept an optional
//! trailing unit token resolved through the [`UnitRegistry`]; plain decimal
//! and exponent notation always win over unit interpretation, so `5e3` is
//! five thousand while `500e` is five hundred elementary charges.

use std::path::PathBuf;

use crate::cfg::units::UnitRegistry;

/// Conversion of raw setting text into a typed value.
///
/// Errors are plain reason strings; the calling [`Configuration`] wraps them
/// into a `ConfigError::InvalidKey` carrying key, section and expected type.
///
/// [`Configuration`]: crate::cfg::section::Configuration
pub trait FromSetting: Sized {
    /// Human-readable type name used in error messages.
    const EXPECTED: &'static str;

    fn from_setting(raw: &str, units: &UnitRegistry) -> Result<Self, String>;
}

/// Splits `raw` into a numeric prefix and an optional unit factor.
///
/// The longest prefix parseable as `f64` is taken as the number; the
/// remainder must then be a registered unit token.
fn parse_with_units(raw: &str, units: &UnitRegistry) -> Result<f64, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty value".to_string());
    }

    // Plain number, including exponent notation.
    if let Ok(v) = raw.parse::<f64>() {
        return Ok(v);
    }

    for split in (1..raw.len()).rev() {
        if !raw.is_char_boundary(split) {
            continue;
        }
        let (number, suffix) = raw.split_at(split);
        let Ok(v) = number.parse::<f64>() else {
            continue;
        };
        let token = suffix.trim();
        return match units.get(token) {
            Some(factor) => Ok(v * factor),
            None => Err(format!("unknown unit '{token}'")),
        };
    }

    Err("not a number".to_string())
}

fn parse_integral(raw: &str, units: &UnitRegistry) -> Result<f64, String> {
    let v = parse_with_units(raw, units)?;
    if v.fract() != 0.0 {
        return Err(format!("'{}' is not an integral value", raw.trim()));
    }
    Ok(v)
}

impl FromSetting for f64 {
    const EXPECTED: &'static str = "floating point number";

    fn from_setting(raw: &str, units: &UnitRegistry) -> Result<Self, String> {
        parse_with_units(raw, units)
    }
}

impl FromSetting for f32 {
    const EXPECTED: &'static str = "floating point number";

    fn from_setting(raw: &str, units: &UnitRegistry) -> Result<Self, String> {
        parse_with_units(raw, units).map(|v| v as Self)
    }
}

macro_rules! impl_from_setting_int {
    ($($ty:ty => $name:literal),+ $(,)?) => {
        $(impl FromSetting for $ty {
            const EXPECTED: &'static str = $name;

            fn from_setting(raw: &str, units: &UnitRegistry) -> Result<Self, String> {
                // Fast path without unit handling.
                if let Ok(v) = raw.trim().parse::<Self>() {
                    return Ok(v);
                }
                let v = parse_integral(raw, units)?;
                if v < <$ty>::MIN as f64 || v > <$ty>::MAX as f64 {
                    return Err(format!("value {v} is out of range"));
                }
                Ok(v as Self)
            }
        })+
    };
}

impl_from_setting_int!(
    i32 => "32-bit integer",
    i64 => "64-bit integer",
    u32 => "32-bit unsigned integer",
    u64 => "64-bit unsigned integer",
    usize => "unsigned integer",
);

impl FromSetting for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_setting(raw: &str, _units: &UnitRegistry) -> Result<Self, String> {
        match raw.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(format!("'{other}' is not a boolean")),
        }
    }
}

/// Strips one pair of matching outer quotes, if present.
pub(crate) fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    if raw.len() >= 2 {
        let bytes = raw.as_bytes();
        if (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[raw.len() - 1] == bytes[0] {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

impl FromSetting for String {
    const EXPECTED: &'static str = "string";

    fn from_setting(raw: &str, _units: &UnitRegistry) -> Result<Self, String> {
        Ok(unquote(raw).to_string())
    }
}

impl FromSetting for PathBuf {
    const EXPECTED: &'static str = "path";

    fn from_setting(raw: &str, _units: &UnitRegistry) -> Result<Self, String> {
        Ok(Self::from(unquote(raw)))
    }
}

impl<T: FromSetting> FromSetting for Vec<T> {
    const EXPECTED: &'static str = "comma-separated list";

    fn from_setting(raw: &str, units: &UnitRegistry) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::new());
        }
        raw.split(',')
            .map(|elem| T::from_setting(elem.trim(), units))
            .collect()
    }
}

impl<T: FromSetting, const N: usize> FromSetting for [T; N] {
    const EXPECTED: &'static str = "fixed-arity vector";

    fn from_setting(raw: &str, units: &UnitRegistry) -> Result<Self, String> {
        let elements: Vec<T> = Vec::from_setting(raw, units)?;
        let count = elements.len();
        elements
            .try_into()
            .map_err(|_| format!("expected {N} components, got {count}"))
    }
}
