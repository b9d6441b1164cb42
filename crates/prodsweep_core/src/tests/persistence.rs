//! Writing a sweep's tables and reading them back

use std::fs;

use jiff::Zoned;
use tempfile::tempdir;

use crate::config::FactorConfig;
use crate::model::ParamValue;
use crate::output::{Artifact, Manifest, OutputLayout, write_report};
use crate::pipeline::run_sweep;
use crate::table::Cell;

use super::fixtures::{Fault, ScriptedEngine, is_ten_workers, two_combo_config};

#[test]
fn test_report_round_trips_through_csv() {
    let dir = tempdir().unwrap();
    let config = two_combo_config();
    let engine = ScriptedEngine::new();
    let report = run_sweep(&engine, &config, None).unwrap();

    let now: Zoned = "2025-06-01T09:30:00[UTC]".parse().unwrap();
    let layout = OutputLayout::at(dir.path(), &config.output_stem, &now);
    let written = write_report(&report, &config, &layout).unwrap();

    assert_eq!(written.tables.len(), Artifact::ALL.len());
    assert!(layout.dir().ends_with("production_2025-06-01"));

    let manifest = Manifest::from_yaml(&fs::read_to_string(&written.manifest).unwrap()).unwrap();
    let expected = [
        &report.tables.growth_raw,
        &report.tables.lorenz_raw,
        &report.tables.wealth_raw,
        &report.tables.growth_clean,
        &report.tables.lorenz_clean,
    ];
    for ((artifact, entry), table) in Artifact::ALL.iter().zip(&manifest.tables).zip(expected) {
        assert!(entry.file.starts_with(artifact.prefix()));
        assert_eq!(&entry.read(layout.dir()).unwrap(), table, "{}", entry.file);
    }
}

#[test]
fn test_text_parameters_survive_persistence() {
    let dir = tempdir().unwrap();
    let mut config = two_combo_config();
    config.factors.push(
        FactorConfig::new("scenario", vec![ParamValue::Text("5".to_string())])
            .with_column("Scenario"),
    );
    let engine = ScriptedEngine::new();
    let report = run_sweep(&engine, &config, None).unwrap();

    let layout = OutputLayout::new(dir.path(), "text");
    let written = write_report(&report, &config, &layout).unwrap();
    let manifest = Manifest::from_yaml(&fs::read_to_string(&written.manifest).unwrap()).unwrap();

    let growth_clean = manifest.tables[3].read(layout.dir()).unwrap();
    assert_eq!(
        growth_clean.get(0, "Scenario"),
        Some(&Cell::Text("5".to_string()))
    );
    assert_eq!(growth_clean, report.tables.growth_clean);
}

#[test]
fn test_manifest_records_failures() {
    let dir = tempdir().unwrap();
    let config = two_combo_config();
    let engine = ScriptedEngine::new().with_fault(is_ten_workers, Fault::ErrorAt { run: 1, tick: 0 });
    let report = run_sweep(&engine, &config, None).unwrap();

    let layout = OutputLayout::new(dir.path(), "faulty");
    let written = write_report(&report, &config, &layout).unwrap();
    let manifest = Manifest::from_yaml(&fs::read_to_string(&written.manifest).unwrap()).unwrap();

    assert_eq!(manifest.combinations, 2);
    assert_eq!(manifest.completed, 1);
    assert_eq!(manifest.failed.len(), 1);
    assert_eq!(manifest.failed[0].combo, 1);
    assert!(manifest.failed[0].error.contains("scripted failure"));
    assert_eq!(manifest.config, config);
    assert_eq!(manifest.tables.len(), 5);
    assert!(
        manifest
            .tables
            .iter()
            .all(|entry| layout.dir().join(&entry.file).exists())
    );
}
