//! Integration tests for the dataset engine.
//!
//! These tests drive the public API end to end against a small molecule table.

use chemml_processing::{
    CancellationToken, Dataset, DatasetEngine, DescriptorKind, FeatureCache, FilterCondition,
    EngineConfig, FilterSpec, FingerprintKind, HistoryError, ImputeStrategy, OpError, Operation, ParseError,
    RowPolicy, SessionLog,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_csv(filename: &str) -> DataFrame {
    let path = fixtures_path().join(filename);
    CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path))
        .expect("Failed to create CSV reader")
        .finish()
        .expect("Failed to read CSV file")
}

fn isolated_engine(frame: DataFrame) -> (DatasetEngine, Arc<FeatureCache>) {
    let cache = Arc::new(FeatureCache::new());
    let engine = DatasetEngine::builder()
        .feature_cache(Arc::clone(&cache))
        .build(Dataset::new(frame))
        .expect("default config is valid");
    (engine, cache)
}

fn molecules_engine() -> DatasetEngine {
    isolated_engine(load_csv("molecules.csv")).0
}

fn strings(dataset: &Dataset, column: &str) -> Vec<Option<String>> {
    dataset
        .series(column)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect()
}

// ============================================================================
// History
// ============================================================================

#[test]
fn test_undo_redo_round_trip() {
    let engine = molecules_engine();
    let before = engine.current_dataset();

    let applied = engine
        .apply_operation(Operation::filter(FilterSpec::new(
            "solvent",
            FilterCondition::Equals,
            "water",
        )))
        .unwrap();
    assert_eq!(applied.height(), 5);

    let undone = engine.undo().unwrap();
    assert_eq!(*undone, *before);

    let redone = engine.redo().unwrap();
    assert_eq!(*redone, *applied);
    assert_eq!(*engine.current_dataset(), *applied);
}

#[test]
fn test_undo_at_start_fails_without_change() {
    let engine = molecules_engine();
    let before = engine.current_dataset();

    assert_eq!(engine.undo().unwrap_err(), HistoryError::NothingToUndo);
    assert_eq!(*engine.current_dataset(), *before);
    assert_eq!(engine.redo().unwrap_err(), HistoryError::NothingToRedo);
}

#[test]
fn test_apply_after_undo_discards_redo() {
    let engine = molecules_engine();
    engine.apply_operation(Operation::drop_column("name")).unwrap();
    engine.undo().unwrap();
    engine.apply_operation(Operation::drop_column("activity")).unwrap();

    assert!(!engine.can_redo());
    assert_eq!(engine.history_len(), 1);
    assert!(engine.current_dataset().has_column("name"));
}

#[test]
fn test_history_cap() {
    let config = EngineConfig::builder()
        .max_history(1)
        .build()
        .unwrap();
    let engine = DatasetEngine::builder()
        .config(config)
        .feature_cache(Arc::new(FeatureCache::new()))
        .build(Dataset::new(load_csv("molecules.csv")))
        .unwrap();

    engine.apply_operation(Operation::drop_column("name")).unwrap();
    engine.apply_operation(Operation::drop_column("activity")).unwrap();
    assert_eq!(engine.history_len(), 1);
    assert!(engine.initial_dataset().has_column("name"));
    assert_eq!(engine.operations().len(), 2);

    let floor = engine.undo().unwrap();
    assert!(!floor.has_column("name"));
    assert!(floor.has_column("activity"));
    assert!(!engine.can_undo());
}

// ============================================================================
// Encoding
// ============================================================================

#[test]
fn test_one_hot_rows_sum_to_one() {
    let engine = molecules_engine();
    let encoded = engine.apply_operation(Operation::one_hot("activity")).unwrap();

    let active = encoded.series("activity_active").unwrap().bool().unwrap().clone();
    let inactive = encoded.series("activity_inactive").unwrap().bool().unwrap().clone();
    assert!(!encoded.has_column("activity"));
    for row in 0..encoded.height() {
        let sum = u8::from(active.get(row).unwrap()) + u8::from(inactive.get(row).unwrap());
        assert_eq!(sum, 1, "row {row}");
    }

    // The recorded operation carries the categories seen at apply time.
    assert_eq!(
        engine.operations()[0],
        Operation::OneHotEncode {
            column: "activity".to_string(),
            categories: Some(vec!["active".to_string(), "inactive".to_string()]),
            drop_first: false,
        }
    );
}

#[test]
fn test_one_hot_missing_values_are_all_false() {
    let engine = molecules_engine();
    let encoded = engine.apply_operation(Operation::one_hot("solvent")).unwrap();
    // acetone has no solvent
    for column in ["solvent_ethanol", "solvent_hexane", "solvent_water"] {
        let flags = encoded.series(column).unwrap().bool().unwrap().clone();
        assert_eq!(flags.get(9), Some(false), "{column}");
    }
}

// ============================================================================
// SMILES
// ============================================================================

#[test]
fn test_smiles_column_detected_on_load() {
    let engine = molecules_engine();
    assert!(engine.initial_dataset().is_smiles_column("smiles"));
    assert!(!engine.initial_dataset().is_smiles_column("name"));
}

#[test]
fn test_kekule_and_aromatic_share_cache_entries() {
    let frame = df! {
        "smiles" => ["C1=CC=CC=C1", "c1ccccc1", "OC1=CC=CC=C1", "Oc1ccccc1"],
    }
    .unwrap();
    let (engine, cache) = isolated_engine(frame);

    let out = engine
        .apply_operation(Operation::add_descriptor("smiles", DescriptorKind::MolecularWeight))
        .unwrap();
    assert_eq!(cache.len(), 2);
    let weights: Vec<Option<f64>> = out
        .series("smiles_MW")
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(weights[0], weights[1]);
    assert_eq!(weights[2], weights[3]);

    let out = engine
        .apply_operation(Operation::canonicalize("smiles", RowPolicy::Reject))
        .unwrap();
    let canonical = strings(&out, "smiles");
    assert_eq!(canonical[0], canonical[1]);
    assert_eq!(canonical[2], canonical[3]);
}

#[test]
fn test_canonicalize_row_policies() {
    let frame = df! { "smiles" => ["CCO", "invalid_x", "c1ccccc1"] }.unwrap();
    let (engine, _) = isolated_engine(frame);

    let results = engine
        .extractor()
        .canonicalize_values(&strings(&engine.current_dataset(), "smiles"), None)
        .unwrap();
    assert!(matches!(results[0], Some(Ok(_))));
    assert!(matches!(results[1], Some(Err(ParseError::Unparseable { .. }))));
    assert!(matches!(results[2], Some(Ok(_))));

    let err = engine
        .apply_operation(Operation::canonicalize("smiles", RowPolicy::Reject))
        .unwrap_err();
    match err {
        OpError::InvalidSmiles { column, row, source } => {
            assert_eq!(column, "smiles");
            assert_eq!(row, 1);
            assert_eq!(source.error_code(), "UNPARSEABLE_SMILES");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(engine.history_len(), 0);

    let out = engine
        .apply_operation(Operation::canonicalize("smiles", RowPolicy::SetMissing))
        .unwrap();
    assert_eq!(
        strings(&out, "smiles"),
        vec![Some("CCO".to_string()), None, Some("c1ccccc1".to_string())]
    );
}

#[test]
fn test_descriptor_cache_hits() {
    let frame = df! { "smiles" => ["CCO", "OCC"] }.unwrap();
    let (engine, cache) = isolated_engine(frame);

    let out = engine
        .apply_operation(Operation::add_descriptor("smiles", DescriptorKind::MolecularWeight))
        .unwrap();
    let weights = out.series("smiles_MW").unwrap().f64().unwrap().clone();
    assert_eq!(weights.get(0), weights.get(1));
    assert!((weights.get(0).unwrap() - 46.069).abs() < 0.01);

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);

    engine.clear_feature_cache();
    assert_eq!(cache.stats().entries, 0);
}

#[test]
fn test_feature_columns() {
    let engine = molecules_engine();
    engine
        .apply_operation(Operation::canonicalize("smiles", RowPolicy::SetMissing))
        .unwrap();
    engine
        .apply_operation(Operation::add_descriptor("smiles", DescriptorKind::LogP))
        .unwrap();
    let out = engine
        .apply_operation(Operation::add_fingerprint("smiles", FingerprintKind::ECFP4))
        .unwrap();

    assert_eq!(out.width(), 5 + 1 + 1024);
    assert!(out.has_column("smiles_ECFP4_0"));
    assert!(out.has_column("smiles_ECFP4_1023"));
    // the broken row stays missing in every derived column
    assert_eq!(out.series("smiles_LogP").unwrap().f64().unwrap().get(8), None);
    assert_eq!(out.series("smiles_ECFP4_0").unwrap().bool().unwrap().get(8), None);
}

#[test]
fn test_cancelled_operation() {
    let engine = molecules_engine();
    let token = CancellationToken::new();
    token.cancel();
    let err = engine
        .apply_operation_with_token(
            Operation::add_fingerprint("smiles", FingerprintKind::Maccs),
            &token,
        )
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(!engine.can_undo());
}

// ============================================================================
// Session Replay
// ============================================================================

#[test]
fn test_session_replay_reproduces_dataset() {
    let engine = molecules_engine();
    let operations = [
        Operation::filter(FilterSpec::new("logs", FilterCondition::IsPresent, "")),
        Operation::canonicalize("smiles", RowPolicy::SetMissing),
        Operation::add_descriptor("smiles", DescriptorKind::TopologicalPolarSurfaceArea),
        Operation::Impute {
            column: "smiles_TPSA".to_string(),
            strategy: ImputeStrategy::Median,
        },
        Operation::one_hot("solvent"),
        Operation::drop_column("name"),
    ];
    for operation in operations {
        engine.apply_operation(operation).unwrap();
    }
    // Undone operations are not part of the log.
    engine
        .apply_operation(Operation::drop_column("activity"))
        .unwrap();
    engine.undo().unwrap();

    let json = engine.session_log().to_json().unwrap();
    let log = SessionLog::from_json(&json).unwrap();
    assert_eq!(log.operations.len(), 6);

    let replayed = DatasetEngine::replay(Dataset::new(load_csv("molecules.csv")), &log).unwrap();
    assert_eq!(*replayed.current_dataset(), *engine.current_dataset());
}

#[test]
fn test_replay_uses_logged_config() {
    let config = EngineConfig::builder()
        .auto_tag_smiles(false)
        .smiles_detection_threshold(0.95)
        .build()
        .unwrap();
    let engine = DatasetEngine::builder()
        .config(config.clone())
        .feature_cache(Arc::new(FeatureCache::new()))
        .build(Dataset::new(load_csv("molecules.csv")))
        .unwrap();
    engine
        .apply_operation(Operation::filter(FilterSpec::new(
            "logs",
            FilterCondition::IsPresent,
            "",
        )))
        .unwrap();
    engine.apply_operation(Operation::drop_column("name")).unwrap();
    assert!(engine.current_dataset().smiles_columns().is_empty());

    let log = SessionLog::from_json(&engine.session_log().to_json().unwrap()).unwrap();
    assert_eq!(log.config, config);

    let replayed = DatasetEngine::replay(Dataset::new(load_csv("molecules.csv")), &log).unwrap();
    assert_eq!(*replayed.config(), config);
    assert!(replayed.current_dataset().smiles_columns().is_empty());
    assert_eq!(*replayed.current_dataset(), *engine.current_dataset());
}

#[test]
fn test_replay_after_history_cap() {
    let config = EngineConfig::builder().max_history(2).build().unwrap();
    let engine = DatasetEngine::builder()
        .config(config)
        .feature_cache(Arc::new(FeatureCache::new()))
        .build(Dataset::new(load_csv("molecules.csv")))
        .unwrap();
    for operation in [
        Operation::canonicalize("smiles", RowPolicy::SetMissing),
        Operation::add_descriptor("smiles", DescriptorKind::MolecularWeight),
        Operation::drop_column("name"),
        Operation::drop_column("solvent"),
    ] {
        engine.apply_operation(operation).unwrap();
    }
    assert_eq!(engine.history_len(), 2);

    let log = SessionLog::from_json(&engine.session_log().to_json().unwrap()).unwrap();
    assert_eq!(log.operations.len(), 4);

    let replayed = DatasetEngine::replay(Dataset::new(load_csv("molecules.csv")), &log).unwrap();
    assert_eq!(replayed.history_len(), 2);
    assert!(replayed.current_dataset().has_column("smiles_MW"));
    assert_eq!(*replayed.current_dataset(), *engine.current_dataset());
}

#[test]
fn test_reset_is_logged_and_replayed() {
    let engine = molecules_engine();
    engine.apply_operation(Operation::drop_column("name")).unwrap();
    engine.apply_operation(Operation::drop_column("solvent")).unwrap();
    let reset = engine.reset_to_initial().unwrap();
    assert_eq!(*reset, *engine.initial_dataset());
    engine.apply_operation(Operation::drop_column("activity")).unwrap();

    let log = SessionLog::from_json(&engine.session_log().to_json().unwrap()).unwrap();
    assert_eq!(log.operations[2], Operation::ResetToInitial);

    let replayed = DatasetEngine::replay(Dataset::new(load_csv("molecules.csv")), &log).unwrap();
    let current = replayed.current_dataset();
    assert!(current.has_column("name"));
    assert!(!current.has_column("activity"));
    assert_eq!(*current, *engine.current_dataset());
}

#[test]
fn test_replay_failure_reports_error() {
    let log = SessionLog::new(vec![Operation::drop_column("does_not_exist")]);
    let err = DatasetEngine::replay(Dataset::new(load_csv("molecules.csv")), &log).unwrap_err();
    assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
}
