// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use pixsim_rs::geometry::{
    Detector, DetectorModel, EulerAngles, GeometryError, GeometryRegistry, Vec3,
};

fn model(name: &str) -> Arc<DetectorModel> {
    Arc::new(DetectorModel::new(
        name,
        [256, 256],
        [55e-6, 55e-6],
        300e-6,
        "hybrid",
    ))
}

fn detector(name: &str, model_type: &str) -> Arc<Detector> {
    Arc::new(Detector::new(
        name,
        model_type,
        Vec3::default(),
        EulerAngles::default(),
    ))
}

fn populated() -> GeometryRegistry {
    let registry = GeometryRegistry::new();
    registry.add_model(model("X")).expect("model X");
    registry.add_model(model("Y")).expect("model Y");
    registry.add_detector(detector("A", "X")).expect("detector A");
    registry.add_detector(detector("B", "X")).expect("detector B");
    registry.add_detector(detector("C", "Y")).expect("detector C");
    registry
}

#[test]
fn duplicate_registrations_fail() {
    let registry = populated();
    assert!(matches!(
        registry.add_model(model("X")),
        Err(GeometryError::DuplicateModel(_))
    ));
    assert!(matches!(
        registry.add_detector(detector("A", "X")),
        Err(GeometryError::DuplicateDetector(_))
    ));
}

#[test]
fn first_read_closes_the_registry() {
    let registry = populated();
    assert!(!registry.is_closed());

    let detectors = registry.get_detectors().expect("read closes");
    assert_eq!(detectors.len(), 3);
    assert!(registry.is_closed());

    // Mutation after close fails regardless of name collisions.
    assert!(matches!(
        registry.add_detector(detector("D", "X")),
        Err(GeometryError::Closed)
    ));
    assert!(matches!(
        registry.add_model(model("Z")),
        Err(GeometryError::Closed)
    ));
}

#[test]
fn close_resolves_deferred_models() {
    let registry = populated();
    let a = registry.get_detector("A").expect("detector A exists");
    let resolved = a.model().expect("model resolved at close");
    assert_eq!(resolved.type_name(), "X");

    // Every detector references a registered model after close.
    for det in registry.get_detectors().expect("detectors") {
        let model = registry
            .get_model(det.model_type())
            .expect("model lookup after close");
        assert_eq!(model.type_name(), det.model_type());
    }
}

#[test]
fn missing_model_at_close_is_fatal() {
    let registry = GeometryRegistry::new();
    registry
        .add_detector(detector("orphan", "NoSuchModel"))
        .expect("detector registers while open");
    assert!(matches!(
        registry.get_detectors(),
        Err(GeometryError::UnknownModel(_))
    ));
}

#[test]
fn lookups_report_unknown_names() {
    let registry = populated();
    assert!(registry.has_detector("A"));
    assert!(!registry.has_detector("Z"));
    assert!(matches!(
        registry.get_detector("Z"),
        Err(GeometryError::UnknownDetector(_))
    ));
    assert!(matches!(
        registry.get_model("Z"),
        Err(GeometryError::UnknownModel(_))
    ));
}

#[test]
fn detectors_by_type_follow_insertion_order() {
    let registry = populated();
    let of_x = registry.get_detectors_by_type("X").expect("type X");
    let names: Vec<&str> = of_x.iter().map(|d| d.name()).collect();
    assert_eq!(names, ["A", "B"]);

    // A type with no detectors is an unknown-model error.
    assert!(matches!(
        registry.get_detectors_by_type("unused"),
        Err(GeometryError::UnknownModel(_))
    ));
}
