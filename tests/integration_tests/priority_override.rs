// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use pixsim_rs::module::ModuleRegistry;
use serial_test::serial;

use super::common::{
    SharedThresholds, TestDir, ThresholdProbe, build_simulation,
    global_section_with_geometry, write_geometry,
};

#[test]
#[serial]
fn explicit_name_section_wins_over_generic_expansion() {
    let dir = TestDir::new("priority-override");
    write_geometry(&dir);

    let thresholds: SharedThresholds = Arc::default();
    let mut registry = ModuleRegistry::new();
    ThresholdProbe::register(&mut registry, thresholds.clone());

    // First section expands to every detector at priority 2; the second
    // creates an explicit priority-0 instance for A.
    let config = global_section_with_geometry("number_of_events = 1\n")
        + "\n[Digitizer]\n\n[Digitizer]\nname = \"A\"\nthreshold = 1000e\n";
    let mut sim =
        build_simulation(&dir, &config, registry).expect("simulation constructs");
    sim.load().expect("load");

    let mut names = sim.module_names();
    names.sort();
    assert_eq!(names, ["Digitizer:A", "Digitizer:B", "Digitizer:C"]);

    // The explicit instance carried its own threshold; the survivors of the
    // generic expansion keep the default.
    let recorded = thresholds.lock().expect("threshold lock");
    let final_threshold = |name: &str| {
        recorded
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
            .expect("instance recorded")
    };
    assert_eq!(final_threshold("Digitizer:A"), 1000.0);
    assert_eq!(final_threshold("Digitizer:B"), 0.0);
    assert_eq!(final_threshold("Digitizer:C"), 0.0);
}
