//! Conformance tests that run YAML fixtures against the router
//!
//! Run with: cargo test -p swroute-test --test conformance --features swroute-test/fixtures
//!
//! Note: This test file requires the `fixtures` feature to be enabled.

#![cfg(feature = "fixtures")]

use std::fs;
use std::path::{Path, PathBuf};
use swroute_test::fixture::Fixture;

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Load and run every fixture in one file
async fn run_fixture_file(name: &str) {
    let path = fixtures_dir().join(name);
    let yaml = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()));

    // Parse potentially multiple fixtures (separated by ---)
    let fixtures = Fixture::from_yaml_multi(&yaml).unwrap_or_else(|e| {
        panic!("Failed to parse {}: {}", path.display(), e);
    });
    assert!(!fixtures.is_empty(), "{} holds no fixtures", path.display());

    for fixture in fixtures {
        println!("  Running: {}", fixture.name);
        fixture.run_and_assert().await;
    }
}

#[tokio::test]
async fn test_conditions() {
    run_fixture_file("01_conditions.yaml").await;
}

#[tokio::test]
async fn test_sources() {
    run_fixture_file("02_sources.yaml").await;
}

#[tokio::test]
async fn test_races() {
    run_fixture_file("03_races.yaml").await;
}

#[tokio::test]
async fn test_routing() {
    run_fixture_file("04_routing.yaml").await;
}

#[test]
fn test_every_fixture_file_is_covered() {
    let mut names: Vec<String> = fs::read_dir(fixtures_dir())
        .expect("read fixtures dir")
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let is_yaml = path
                .extension()
                .map_or(false, |e| e == "yaml" || e == "yml");
            is_yaml.then(|| path.file_name()?.to_str().map(str::to_string))?
        })
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "01_conditions.yaml",
            "02_sources.yaml",
            "03_races.yaml",
            "04_routing.yaml"
        ]
    );
}
