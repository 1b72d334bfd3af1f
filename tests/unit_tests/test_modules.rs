// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, atomic::AtomicBool},
};

use pixsim_rs::{
    cfg::{manager::ConfigManager, units::UnitRegistry},
    geometry::{Detector, DetectorModel, EulerAngles, GeometryError, GeometryRegistry, Vec3},
    messenger::Messenger,
    module::{Event, Module, ModuleManager, ModuleRegistry, error::ModuleError},
    runtime::{GLOBAL_SECTIONS, IGNORED_SECTIONS},
};

struct NullModule;

impl Module for NullModule {
    fn run(&mut self, _event: &mut Event) -> Result<(), ModuleError> {
        Ok(())
    }

    fn parallelize(&self) -> bool {
        true
    }
}

type SharedThresholds = Arc<Mutex<HashMap<String, f64>>>;

/// Registry with one unique and one detector class; the detector class
/// records the threshold each instance was configured with.
fn registry(thresholds: &SharedThresholds) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register_unique("EventReader", |_ctx| Ok(Box::new(NullModule)));

    let sink = thresholds.clone();
    registry.register_detector("Digitizer", move |ctx| {
        let threshold: f64 = ctx.config.get_or("threshold", 0.0)?;
        sink.lock()
            .expect("threshold lock")
            .insert(ctx.info().unique_name().to_string(), threshold);
        Ok(Box::new(NullModule))
    });
    registry
}

fn geometry() -> Arc<GeometryRegistry> {
    let registry = GeometryRegistry::new();
    for name in ["X", "Y"] {
        registry
            .add_model(Arc::new(DetectorModel::new(
                name,
                [256, 256],
                [55e-6, 55e-6],
                300e-6,
                "hybrid",
            )))
            .expect("model registers");
    }
    for (name, model) in [("A", "X"), ("B", "X"), ("C", "Y")] {
        registry
            .add_detector(Arc::new(Detector::new(
                name,
                model,
                Vec3::default(),
                EulerAngles::default(),
            )))
            .expect("detector registers");
    }
    Arc::new(registry)
}

fn config_manager(test: &str, text: &str) -> (ConfigManager, PathBuf) {
    let dir = std::env::temp_dir().join(format!("pixsim-mod-{}-{test}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("main.conf");
    std::fs::write(&path, text).expect("write config");
    let conf_mgr = ConfigManager::new(
        &path,
        Arc::new(UnitRegistry::with_defaults()),
        GLOBAL_SECTIONS,
        IGNORED_SECTIONS,
    )
    .expect("config parses");
    (conf_mgr, dir)
}

fn load(
    conf_mgr: &ConfigManager,
    thresholds: &SharedThresholds,
) -> Result<ModuleManager, ModuleError> {
    let messenger = Arc::new(Messenger::new());
    let mut manager = ModuleManager::new(messenger, Arc::new(AtomicBool::new(false)));
    manager.load(&registry(thresholds), conf_mgr, &geometry())?;
    Ok(manager)
}

#[test]
fn type_selection_expands_to_matching_detectors() {
    let thresholds: SharedThresholds = Arc::default();
    let (conf_mgr, dir) = config_manager(
        "type-expansion",
        "[Digitizer]\ntype = \"X\"\nthreshold = 500e\n",
    );

    let manager = load(&conf_mgr, &thresholds).expect("load succeeds");
    assert_eq!(manager.module_names(), ["Digitizer:A", "Digitizer:B"]);
    let recorded = thresholds.lock().expect("threshold lock");
    assert_eq!(recorded["Digitizer:A"], 500.0);
    assert_eq!(recorded["Digitizer:B"], 500.0);

    std::fs::remove_dir_all(dir).expect("cleanup");
}

#[test]
fn named_section_overrides_the_generic_expansion() {
    let thresholds: SharedThresholds = Arc::default();
    let (conf_mgr, dir) = config_manager(
        "priority-override",
        "[Digitizer]\n[Digitizer]\nname = \"A\"\nthreshold = 1000e\n",
    );

    let manager = load(&conf_mgr, &thresholds).expect("load succeeds");
    let mut names = manager.module_names();
    names.sort();
    assert_eq!(names, ["Digitizer:A", "Digitizer:B", "Digitizer:C"]);

    // The explicit, priority-0 instance for A won over the generic one.
    let recorded = thresholds.lock().expect("threshold lock");
    assert_eq!(recorded["Digitizer:A"], 1000.0);
    assert_eq!(recorded["Digitizer:B"], 0.0);
    assert_eq!(recorded["Digitizer:C"], 0.0);

    std::fs::remove_dir_all(dir).expect("cleanup");
}

#[test]
fn equal_priority_collision_is_fatal() {
    let thresholds: SharedThresholds = Arc::default();
    let (conf_mgr, dir) = config_manager(
        "ambiguous",
        "[Digitizer]\nname = \"A\"\n[Digitizer]\nname = \"A\"\n",
    );

    let err = load(&conf_mgr, &thresholds).expect_err("collision must fail");
    assert!(matches!(err, ModuleError::AmbiguousInstantiation(_)));

    std::fs::remove_dir_all(dir).expect("cleanup");
}

#[test]
fn unknown_module_class_is_fatal() {
    let thresholds: SharedThresholds = Arc::default();
    let (conf_mgr, dir) = config_manager("unknown-class", "[Nonexistent]\n");

    let err = load(&conf_mgr, &thresholds).expect_err("unknown class must fail");
    assert!(matches!(err, ModuleError::UnknownModuleClass(_)));

    std::fs::remove_dir_all(dir).expect("cleanup");
}

#[test]
fn unknown_detector_name_is_fatal() {
    let thresholds: SharedThresholds = Arc::default();
    let (conf_mgr, dir) = config_manager(
        "unknown-detector",
        "[Digitizer]\nname = \"NoSuchDetector\"\n",
    );

    let err = load(&conf_mgr, &thresholds).expect_err("unknown detector must fail");
    assert!(matches!(
        err,
        ModuleError::Geometry(GeometryError::UnknownDetector(_))
    ));

    std::fs::remove_dir_all(dir).expect("cleanup");
}

#[test]
fn declaration_order_is_preserved() {
    let thresholds: SharedThresholds = Arc::default();
    let (conf_mgr, dir) = config_manager(
        "declaration-order",
        "[EventReader]\n[Digitizer]\nname = \"C\"\n",
    );

    let manager = load(&conf_mgr, &thresholds).expect("load succeeds");
    assert_eq!(manager.module_names(), ["EventReader", "Digitizer:C"]);

    std::fs::remove_dir_all(dir).expect("cleanup");
}

#[test]
fn instance_options_apply_class_first_then_unique_name() {
    let thresholds: SharedThresholds = Arc::default();
    let (mut conf_mgr, dir) = config_manager(
        "instance-options",
        "[Digitizer]\ntype = \"X\"\nthreshold = 500e\n",
    );
    conf_mgr
        .load_module_options(&[
            "Digitizer.threshold=900e".to_string(),
            "Digitizer:A.threshold=1200e".to_string(),
        ])
        .expect("options parse");

    let _manager = load(&conf_mgr, &thresholds).expect("load succeeds");
    let recorded = thresholds.lock().expect("threshold lock");
    assert_eq!(recorded["Digitizer:A"], 1200.0);
    assert_eq!(recorded["Digitizer:B"], 900.0);

    std::fs::remove_dir_all(dir).expect("cleanup");
}
