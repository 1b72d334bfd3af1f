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
fn type_selection_creates_one_instance_per_matching_detector() {
    let dir = TestDir::new("detector-expansion");
    write_geometry(&dir);

    let thresholds: SharedThresholds = Arc::default();
    let mut registry = ModuleRegistry::new();
    ThresholdProbe::register(&mut registry, thresholds.clone());

    let config = global_section_with_geometry("number_of_events = 1\nrandom_seed = 7\n")
        + "\n[Digitizer]\ntype = \"X\"\nthreshold = 500e\n";
    let mut sim =
        build_simulation(&dir, &config, registry).expect("simulation constructs");
    sim.load().expect("load");

    // Two instances for the X detectors, none for C (type Y).
    assert_eq!(sim.module_names(), ["Digitizer:A", "Digitizer:B"]);
    let recorded = thresholds.lock().expect("threshold lock");
    assert_eq!(recorded.len(), 2);
    assert!(recorded.iter().all(|(_, t)| *t == 500.0));

    sim.initialize().expect("initialize");
    sim.run().expect("run");
    sim.finalize().expect("finalize");
    assert_eq!(sim.events_completed(), 1);
}

#[test]
#[serial]
fn detectors_resolve_their_models_at_load() {
    let dir = TestDir::new("model-resolution");
    write_geometry(&dir);

    let mut registry = ModuleRegistry::new();
    ThresholdProbe::register(&mut registry, Arc::default());

    let config = global_section_with_geometry("number_of_events = 1\n")
        + "\n[Digitizer]\nname = \"C\"\n";
    let mut sim =
        build_simulation(&dir, &config, registry).expect("simulation constructs");
    sim.load().expect("load");

    let detector = sim.geometry().get_detector("C").expect("detector C");
    let model = detector.model().expect("model resolved");
    assert_eq!(model.type_name(), "Y");
    assert_eq!(model.number_of_pixels(), [256, 256]);
}
