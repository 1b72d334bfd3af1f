// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::BTreeMap, path::Path, sync::Arc};

use pixsim_rs::cfg::{
    error::ConfigError, reader::ConfigReader, section::Configuration, units::UnitRegistry,
};

fn units() -> Arc<UnitRegistry> {
    Arc::new(UnitRegistry::with_defaults())
}

fn parse(text: &str) -> ConfigReader {
    let mut reader = ConfigReader::new(units());
    reader
        .add_str(text, Path::new("/virtual/test.conf"))
        .expect("document should parse");
    reader
}

/// Flattens a reader into comparable (section, key, value) triples.
fn triples(reader: &ConfigReader) -> Vec<(String, String, String)> {
    let mut out = Vec::new();
    for section in reader.configurations() {
        for (key, value) in section.settings() {
            out.push((
                section.name().to_string(),
                key.to_string(),
                value.to_string(),
            ));
        }
    }
    out
}

const DOCUMENT: &str = r#"
# global settings
number_of_events = 10

[Deposition]
physics_list = "FTFP_BERT"
charge = 500e  # per step

[Digitizer]
threshold = 600e
electronics_noise = 110e
"#;

#[test]
fn parse_keeps_sections_and_declaration_order() {
    let reader = parse(DOCUMENT);
    let names: Vec<&str> = reader
        .configurations()
        .iter()
        .map(|c| c.name())
        .collect();
    assert_eq!(names, ["", "Deposition", "Digitizer"]);
    assert_eq!(reader.count_configurations("Digitizer"), 1);
    assert!(reader.has_configuration("Deposition"));
    assert!(!reader.has_configuration("deposition"), "names are case-sensitive");
}

#[test]
fn serialize_round_trips() {
    let reader = parse(DOCUMENT);
    let reparsed = parse(&reader.serialize());
    let to_set = |v: Vec<(String, String, String)>| -> BTreeMap<_, _> {
        v.into_iter().map(|(s, k, v)| ((s, k), v)).collect()
    };
    assert_eq!(to_set(triples(&reader)), to_set(triples(&reparsed)));
}

#[test]
fn inline_comments_respect_quotes() {
    let reader = parse(
        r##"
[Output]
plain = 5 # stripped
quoted = "value # kept"
single = 'also # kept'
"##,
    );
    let section = reader.get_configurations("Output")[0];
    assert_eq!(section.get_text("plain").expect("plain"), "5");
    assert_eq!(
        section.get::<String>("quoted").expect("quoted"),
        "value # kept"
    );
    assert_eq!(
        section.get::<String>("single").expect("single"),
        "also # kept"
    );
}

#[test]
fn parse_errors_carry_line_numbers() {
    let mut reader = ConfigReader::new(units());
    let err = reader
        .add_str("[Good]\nkey = 1\nnot a pair\n", Path::new("/virtual/bad.conf"))
        .expect_err("third line is invalid");
    match err {
        ConfigError::Parse { line, file, .. } => {
            assert_eq!(line, 3);
            assert!(file.contains("bad.conf"));
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn duplicate_keys_in_a_section_are_rejected() {
    let mut reader = ConfigReader::new(units());
    let err = reader
        .add_str(
            "[Digitizer]\nthreshold = 1\nthreshold = 2\n",
            Path::new("/virtual/dup.conf"),
        )
        .expect_err("duplicate key must fail");
    match err {
        ConfigError::Parse { line, reason, .. } => {
            assert_eq!(line, 3);
            assert!(reason.contains("threshold"));
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repeated_sections_stay_separate() {
    let reader = parse("[Digitizer]\na = 1\n[Digitizer]\na = 2\n");
    let sections = reader.get_configurations("Digitizer");
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].get::<u32>("a").expect("first"), 1);
    assert_eq!(sections[1].get::<u32>("a").expect("second"), 2);
}

#[test]
fn typed_reads_with_units_and_vectors() {
    let reader = parse(
        r#"
[Sensor]
bias = 2.5V
pitch = 25um, 55um
position = 0, 0, 10mm
enabled = true
names = "first", "second"
"#,
    );
    let section = reader.get_configurations("Sensor")[0];

    assert_eq!(section.get::<f64>("bias").expect("bias"), 2.5);
    let pitch: [f64; 2] = section.get("pitch").expect("pitch");
    assert!((pitch[0] - 25e-6).abs() < 1e-15);
    assert!((pitch[1] - 55e-6).abs() < 1e-15);
    let position: [f64; 3] = section.get("position").expect("position");
    assert_eq!(position[0], 0.0);
    assert_eq!(position[1], 0.0);
    assert!((position[2] - 10e-3).abs() < 1e-12);
    assert!(section.get::<bool>("enabled").expect("enabled"));
    assert_eq!(
        section.get_array::<String>("names").expect("names"),
        ["first", "second"]
    );

    // Wrong arity is invalid, not truncated.
    assert!(matches!(
        section.get::<[f64; 2]>("position"),
        Err(ConfigError::InvalidKey { .. })
    ));
}

#[test]
fn paths_resolve_and_canonicalize() {
    let dir = std::env::temp_dir().join(format!("pixsim-cfg-{}", std::process::id()));
    std::fs::create_dir_all(dir.join("maps")).expect("create temp dirs");
    std::fs::write(dir.join("maps/linear.apf"), b"x").expect("create file");
    let config_file = dir.join("main.conf");
    std::fs::write(&config_file, b"").expect("create config file");

    let mut section = Configuration::new("Sensor", &config_file, units());
    section.set_text("field_map", "maps/linear.apf");
    section.set_text("missing", "maps/none.apf");

    let resolved = section
        .get_path("field_map", true)
        .expect("existing path resolves");
    assert!(resolved.is_absolute());
    assert!(resolved.ends_with("maps/linear.apf"));

    // Without the existence check the path is only concatenated.
    let unresolved = section
        .get_path("missing", false)
        .expect("concatenation never fails");
    assert!(unresolved.ends_with("maps/none.apf"));

    assert!(matches!(
        section.get_path("missing", true),
        Err(ConfigError::InvalidValue { .. })
    ));

    std::fs::remove_dir_all(&dir).expect("cleanup");
}

#[test]
fn merge_only_adds_missing_keys() {
    let reader = parse("[A]\nx = 1\n[B]\nx = 2\ny = 3\n");
    let mut a = reader.get_configurations("A")[0].clone();
    let b = reader.get_configurations("B")[0];
    a.merge(b);
    assert_eq!(a.get::<u32>("x").expect("kept"), 1);
    assert_eq!(a.get::<u32>("y").expect("added"), 3);
}
