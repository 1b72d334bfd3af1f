// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, atomic::AtomicBool};

use pixsim_rs::module::ModuleRegistry;
use serial_test::serial;

use super::common::{FinalizeProbe, TestDir, build_simulation, global_section};

#[test]
#[serial]
fn zero_events_runs_nothing_and_skips_finalize() {
    let dir = TestDir::new("zero-events");
    let finalized = Arc::new(AtomicBool::new(false));

    let mut registry = ModuleRegistry::new();
    FinalizeProbe::register(&mut registry, finalized.clone());

    let config = global_section("number_of_events = 0\n") + "\n[FinalizeProbe]\n";
    let mut sim =
        build_simulation(&dir, &config, registry).expect("simulation constructs");

    sim.load().expect("load");
    sim.initialize().expect("initialize");
    sim.run().expect("run with zero events");
    sim.finalize().expect("finalize call is a no-op");

    assert_eq!(sim.events_completed(), 0);
    assert!(
        !finalized.load(std::sync::atomic::Ordering::Relaxed),
        "finalize must not run when no event ran"
    );
}
