//! End-to-end scoring scenarios against an in-memory and an on-disk bundle.

use fraud_scoring_pipeline::error::{ArtifactLoadError, EvaluationError, SchemaStage};
use fraud_scoring_pipeline::models::{BundleStore, FileSource, InMemorySource, LoadOptions};
use fraud_scoring_pipeline::types::{Anomaly, FeatureValue, RawTransactionInput};
use fraud_scoring_pipeline::{evaluate, ModelBundle, Pipeline};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;

const CATEGORIES: [&str; 13] = [
    "entertainment",
    "food_dining",
    "gas_transport",
    "grocery_pos",
    "health_fitness",
    "home",
    "kids_pets",
    "misc_net",
    "misc_pos",
    "personal_care",
    "shopping_net",
    "shopping_pos",
    "travel",
];

fn manifest() -> Value {
    json!({
        "version": "2024.06.1",
        "trained_at": "2024-06-01T00:00:00Z",
        "selected_features": ["amt", "category", "zip", "lat", "long", "city_pop"],
        "feature_sources": {
            "amt": {"field": "amount", "bounds": {"min": 0.0}},
            "category": {"kind": "categorical"},
            "lat": {"bounds": {"min": -90.0, "max": 90.0}},
            "long": {"bounds": {"min": -180.0, "max": 180.0}},
            "city_pop": {"bounds": {"min": 0.0}}
        },
        "encoders": {
            "category": {"classes": CATEGORIES}
        },
        "scaler": {
            "mean": [70.0, 6.0, 50000.0, 38.5, -90.0, 88000.0],
            "scale": [160.0, 3.75, 30000.0, 5.0, 14.0, 300000.0]
        },
        "classifier": {
            "kind": "logistic",
            "coefficients": [2.5, 0.3, 0.0, 0.0, 0.0, 0.1],
            "intercept": -4.0
        }
    })
}

fn bundle_from(manifest: &Value) -> ModelBundle {
    ModelBundle::load(&InMemorySource::from_json("mem://scenario", manifest)).unwrap()
}

fn transaction(amount: f64, category: &str) -> RawTransactionInput {
    RawTransactionInput::new()
        .with("transaction_id", "tx_000000000001")
        .with("amount", amount)
        .with("category", category)
        .with("zip", "10001")
        .with("lat", 40.7)
        .with("long", -74.0)
        .with("city_pop", 500_000.0)
}

#[test]
fn test_clean_transaction_is_scored_without_anomalies() {
    let bundle = bundle_from(&manifest());
    let evaluation = evaluate(&transaction(250.0, "grocery_pos"), &bundle).unwrap();

    // decision = 2.8125 - 0.24 + 0.1373 - 4.0 = -1.2902
    assert!(!evaluation.verdict.is_fraud);
    let p = evaluation.verdict.probability.unwrap();
    assert!((p - 0.2158).abs() < 1e-3, "probability was {p}");
    assert!(evaluation.anomalies.is_empty());
}

#[test]
fn test_large_amount_is_fraud() {
    let bundle = bundle_from(&manifest());
    let evaluation = evaluate(&transaction(1500.0, "grocery_pos"), &bundle).unwrap();

    assert!(evaluation.verdict.is_fraud);
    assert!(evaluation.verdict.probability.unwrap() > 0.99);
}

#[test]
fn test_unseen_category_falls_back_and_still_scores() {
    let bundle = bundle_from(&manifest());
    let evaluation = evaluate(&transaction(250.0, "crypto_atm"), &bundle).unwrap();

    assert!(!evaluation.verdict.is_fraud);
    assert_eq!(
        evaluation.anomalies,
        vec![Anomaly::UnknownCategory {
            column: "category".to_string(),
            original: "crypto_atm".to_string(),
            substituted: "entertainment".to_string(),
        }]
    );
    assert_eq!(evaluation.unknown_categories().count(), 1);
}

#[test]
fn test_missing_field_is_defaulted_and_reported() {
    let bundle = bundle_from(&manifest());
    let complete = evaluate(&transaction(250.0, "grocery_pos"), &bundle).unwrap();

    let full = transaction(250.0, "grocery_pos");
    let partial: RawTransactionInput = full
        .iter()
        .filter(|(name, _)| *name != "zip")
        .map(|(name, value)| (name, value.clone()))
        .collect();
    let degraded = evaluate(&partial, &bundle).unwrap();

    assert_eq!(
        degraded.anomalies,
        vec![Anomaly::MissingFeature {
            column: "zip".to_string(),
            substituted: FeatureValue::Numeric(0.0),
        }]
    );
    // zip carries no weight in this model
    assert_eq!(degraded.verdict, complete.verdict);
}

#[test]
fn test_null_field_reads_as_missing() {
    let bundle = bundle_from(&manifest());
    let raw: RawTransactionInput = serde_json::from_value(json!({
        "amount": 250.0,
        "category": null,
        "zip": 10001,
        "lat": 40.7,
        "long": -74.0,
        "city_pop": 500000
    }))
    .unwrap();

    let evaluation = evaluate(&raw, &bundle).unwrap();
    assert_eq!(evaluation.anomalies.len(), 1);
    assert_eq!(evaluation.anomalies[0].column(), "category");
    assert_eq!(evaluation.anomalies[0].kind(), "missing_feature");
}

#[test]
fn test_non_numeric_amount_is_rejected() {
    let bundle = bundle_from(&manifest());
    let raw = transaction(0.0, "grocery_pos").with("amount", "abc");

    let err = evaluate(&raw, &bundle).unwrap_err();
    assert!(matches!(err, EvaluationError::FeatureType { .. }));
    assert_eq!(err.column(), Some("amt"));
    assert!(err.to_string().contains("abc"));
}

#[test]
fn test_out_of_range_value_is_rejected() {
    let bundle = bundle_from(&manifest());

    let err = evaluate(&transaction(-5.0, "grocery_pos"), &bundle).unwrap_err();
    assert_eq!(err.kind(), "feature_range");
    assert_eq!(err.column(), Some("amt"));

    let err = evaluate(&transaction(10.0, "grocery_pos").with("lat", 123.0), &bundle).unwrap_err();
    assert_eq!(err.column(), Some("lat"));
}

#[test]
fn test_scaler_width_mismatch_surfaces_at_evaluation() {
    let mut manifest = manifest();
    manifest["scaler"] = json!({
        "mean": [70.0, 6.0, 50000.0, 38.5, -90.0],
        "scale": [160.0, 3.75, 30000.0, 5.0, 14.0]
    });
    let bundle = bundle_from(&manifest);

    let err = evaluate(&transaction(250.0, "grocery_pos"), &bundle).unwrap_err();
    assert_eq!(
        err,
        EvaluationError::SchemaMismatch {
            stage: SchemaStage::Scaler,
            expected: 5,
            actual: 6,
        }
    );
}

#[test]
fn test_evaluation_is_idempotent() {
    let bundle = bundle_from(&manifest());
    let raw = transaction(250.0, "crypto_atm");

    let first = evaluate(&raw, &bundle).unwrap();
    let second = evaluate(&raw, &bundle).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_margin_classifier_reports_no_probability() {
    let mut manifest = manifest();
    manifest["classifier"]["kind"] = json!("linear_svm");
    let bundle = bundle_from(&manifest);

    let evaluation = evaluate(&transaction(1500.0, "grocery_pos"), &bundle).unwrap();
    assert!(evaluation.verdict.is_fraud);
    assert_eq!(evaluation.verdict.probability, None);
    assert!(!bundle.describe().supports_probability);
}

#[test]
fn test_incomplete_bundle_is_refused() {
    let mut manifest = manifest();
    manifest.as_object_mut().unwrap().remove("scaler");

    let err = ModelBundle::load(&InMemorySource::from_json("mem://partial", &manifest)).unwrap_err();
    assert!(matches!(
        err,
        ArtifactLoadError::Incomplete {
            component: "scaler",
            ..
        }
    ));
}

#[test]
fn test_categorical_feature_without_encoder_is_refused() {
    let mut manifest = manifest();
    manifest["encoders"] = json!({});

    let err = ModelBundle::load(&InMemorySource::from_json("mem://no-encoder", &manifest))
        .unwrap_err();
    assert!(matches!(err, ArtifactLoadError::Invalid { .. }));
}

#[test]
fn test_unreachable_positive_class_is_refused() {
    let mut manifest = manifest();
    manifest["classifier"]["kind"] = json!("linear_svm");
    manifest["positive_class"] = json!(2);

    let err = ModelBundle::load(&InMemorySource::from_json("mem://bad-class", &manifest))
        .unwrap_err();
    assert!(matches!(err, ArtifactLoadError::Invalid { .. }));
}

#[test]
fn test_nested_extra_field_does_not_block_scoring() {
    let bundle = bundle_from(&manifest());
    let raw: RawTransactionInput = serde_json::from_value(json!({
        "amount": 250.0,
        "category": "grocery_pos",
        "zip": "10001",
        "lat": 40.7,
        "long": -74.0,
        "city_pop": 500000,
        "meta": {"source": "web", "tags": ["mobile"]}
    }))
    .unwrap();

    let evaluation = evaluate(&raw, &bundle).unwrap();
    assert!(evaluation.anomalies.is_empty());
    assert!(!evaluation.verdict.is_fraud);
}

#[test]
fn test_concurrent_evaluations_share_one_bundle() {
    let bundle = Arc::new(bundle_from(&manifest()));
    let expected = evaluate(&transaction(250.0, "grocery_pos"), &bundle).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let bundle = bundle.clone();
            thread::spawn(move || {
                (0..50)
                    .map(|_| {
                        let category = if i % 2 == 0 { "grocery_pos" } else { "crypto_atm" };
                        evaluate(&transaction(250.0, category), &bundle).unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        for evaluation in handle.join().unwrap() {
            if i % 2 == 0 {
                assert_eq!(evaluation, expected);
            } else {
                assert_eq!(evaluation.anomalies.len(), 1);
            }
        }
    }
}

#[test]
fn test_file_bundle_refresh_swaps_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundle.json");
    std::fs::write(&path, manifest().to_string()).unwrap();

    let source = FileSource::new(&path);
    let store = Arc::new(BundleStore::open(&source, LoadOptions::default()).unwrap());
    let pipeline = Pipeline::new(store.clone());

    let before = pipeline.bundle();
    assert_eq!(before.metadata().version.as_deref(), Some("2024.06.1"));
    let (used, outcome) = pipeline.evaluate(&transaction(250.0, "grocery_pos"));
    assert!(Arc::ptr_eq(&used, &before));
    assert!(!outcome.unwrap().verdict.is_fraud);

    // retrained bundle with a much lower threshold
    let mut retrained = manifest();
    retrained["version"] = json!("2024.07.1");
    retrained["classifier"]["intercept"] = json!(2.0);
    std::fs::write(&path, retrained.to_string()).unwrap();

    // a cached load does not see the new file
    assert_eq!(
        store.load(&source).unwrap().metadata().version.as_deref(),
        Some("2024.06.1")
    );

    store.refresh(&source).unwrap();
    assert_eq!(
        pipeline.bundle().metadata().version.as_deref(),
        Some("2024.07.1")
    );
    let (used, outcome) = pipeline.evaluate(&transaction(250.0, "grocery_pos"));
    assert_eq!(used.metadata().version.as_deref(), Some("2024.07.1"));
    assert!(outcome.unwrap().verdict.is_fraud);

    // snapshots taken before the refresh keep the old bundle
    assert_eq!(before.metadata().version.as_deref(), Some("2024.06.1"));
    assert_eq!(store.cached_sources(), 1);
}

#[test]
fn test_failed_refresh_keeps_current_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundle.json");
    std::fs::write(&path, manifest().to_string()).unwrap();

    let source = FileSource::new(&path);
    let store = BundleStore::open(&source, LoadOptions::default()).unwrap();

    std::fs::write(&path, "{ not json").unwrap();
    let err = store.refresh(&source).unwrap_err();
    assert!(matches!(err, ArtifactLoadError::Malformed { .. }));
    assert_eq!(
        store.current().metadata().version.as_deref(),
        Some("2024.06.1")
    );
}

#[test]
fn test_unreachable_source() {
    let err = BundleStore::open(
        &FileSource::new("/no/such/dir/bundle.json"),
        LoadOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ArtifactLoadError::Unreachable { .. }));
}
