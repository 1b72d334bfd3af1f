// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::{Arc, atomic::AtomicBool};

use pixsim_rs::{module::ModuleRegistry, modules};
use serial_test::serial;

use super::common::{FinalizeProbe, TestDir, build_simulation, global_section};

#[test]
#[serial]
fn end_of_run_terminates_gracefully_and_still_finalizes() {
    let dir = TestDir::new("end-of-run");
    let finalized = Arc::new(AtomicBool::new(false));

    let mut registry = ModuleRegistry::new();
    modules::register_all(&mut registry);
    FinalizeProbe::register(&mut registry, finalized.clone());

    // A single worker keeps the event order deterministic: the counter
    // reaches its limit in event 2 and no later event starts.
    let config = global_section(
        "number_of_events = 5\nrandom_seed = 1\nworkers = 1\n",
    ) + "\n[EchoModule]\n\n[MessageCounter]\nstop_after = 2\n\n[FinalizeProbe]\n";
    let mut sim =
        build_simulation(&dir, &config, registry).expect("simulation constructs");

    sim.load().expect("load");
    sim.initialize().expect("initialize");
    sim.run().expect("end of run is not an error");
    sim.finalize().expect("finalize");

    assert!(sim.end_of_run_requested());
    assert_eq!(sim.events_completed(), 2);
    assert!(
        finalized.load(std::sync::atomic::Ordering::Relaxed),
        "finalize must still run after a voluntary end of run"
    );
}
