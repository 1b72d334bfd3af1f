// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashMap;

/// Table of unit tokens accepted as trailing suffixes on numeric
/// configuration values (`100um`, `2.5V`, `3ns`).
///
/// The registry itself is a plain token → multiplicative factor map filled by
/// the embedding application. Tokens are matched case-sensitively.
#[derive(Debug, Default, Clone)]
pub struct UnitRegistry {
    factors: HashMap<String, f64>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry with the baseline tables used by the bundled binary:
    /// lengths (meter base), times (second base), voltages, charge in
    /// elementary charges and angles in radians.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();

        // Lengths, base unit meter
        reg.add("nm", 1e-9);
        reg.add("um", 1e-6);
        reg.add("mm", 1e-3);
        reg.add("cm", 1e-2);
        reg.add("m", 1.0);

        // Times, base unit second
        reg.add("ps", 1e-12);
        reg.add("ns", 1e-9);
        reg.add("us", 1e-6);
        reg.add("ms", 1e-3);
        reg.add("s", 1.0);

        // Voltages, base unit volt
        reg.add("mV", 1e-3);
        reg.add("V", 1.0);
        reg.add("kV", 1e3);

        // Charge, base unit elementary charge
        reg.add("e", 1.0);
        reg.add("ke", 1e3);

        // Angles, base unit radian
        reg.add("mrad", 1e-3);
        reg.add("rad", 1.0);
        reg.add("deg", std::f64::consts::PI / 180.0);

        reg
    }

    /// Registers a unit token. Re-adding a token replaces its factor.
    pub fn add(&mut self, token: &str, factor: f64) {
        self.factors.insert(token.to_string(), factor);
    }

    pub fn has(&self, token: &str) -> bool {
        self.factors.contains_key(token)
    }

    pub fn get(&self, token: &str) -> Option<f64> {
        self.factors.get(token).copied()
    }
}
