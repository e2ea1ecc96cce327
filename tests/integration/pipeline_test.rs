//! End-to-end pipeline scenarios.

use super::common::respond_once;
use du_chapters_etl::config::{Config, DbConfig};
use du_chapters_etl::extract::{FeatureServiceClient, RawFeature, StaticFeatureSource};
use du_chapters_etl::load::MemoryChapterStore;
use du_chapters_etl::pipeline::{self, Pipeline, Stage};
use du_chapters_etl::telemetry::{PipelineEvent, RecordingObserver};
use du_chapters_etl::transform::Chapter;
use pretty_assertions::assert_eq;
use serde_json::json;

fn feature(
    id: &str,
    name: &str,
    city: &str,
    x: serde_json::Value,
    y: serde_json::Value,
) -> RawFeature {
    RawFeature::from(json!({
        "attributes": {"ChapterID": id, "University_Chapter": name, "City": city, "State": "CA"},
        "geometry": {"x": x, "y": y},
    }))
}

#[tokio::test]
async fn test_single_feature_becomes_single_row() {
    let source = StaticFeatureSource::with_features(vec![feature(
        "CA-0101",
        "UC Davis",
        "Davis",
        json!(-121.7405),
        json!(38.5449),
    )]);
    let store = MemoryChapterStore::new();
    let observer = RecordingObserver::new();

    let summary = Pipeline::new(&source, &store, &observer).run().await.unwrap();

    assert_eq!(summary.loaded, 1);
    let rows: Vec<Chapter> = store.rows().into_iter().map(|r| r.chapter).collect();
    assert_eq!(
        rows,
        vec![Chapter::new("CA-0101", "UC Davis", "Davis", "CA", -121.7405, 38.5449)]
    );
}

#[tokio::test]
async fn test_bad_rows_are_dropped_not_fatal() {
    let source = StaticFeatureSource::with_features(vec![
        feature("CA-0101", "UC Davis", "Davis", json!(-121.74), json!(38.54)),
        feature("CA-0102", "UCLA", "Los Angeles", json!(null), json!(34.07)),
        feature("", "Nameless", "Nowhere", json!(1.0), json!(1.0)),
        feature("CA-0104", "Null Island U", "Ocean", json!(0.0), json!(0.0)),
    ]);
    let store = MemoryChapterStore::new();
    let observer = RecordingObserver::new();

    let summary = Pipeline::new(&source, &store, &observer).run().await.unwrap();

    assert_eq!(summary.fetched, 4);
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.loaded, 2);
    assert_eq!(observer.skipped().len(), 2);
    assert!(store.get("CA-0104").is_some());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let store = MemoryChapterStore::new();
    let observer = RecordingObserver::new();

    let first = StaticFeatureSource::with_features(vec![
        feature("CA-0101", "UC Davis", "Davis", json!(-121.74), json!(38.54)),
        feature("CA-0102", "UCLA", "Los Angeles", json!(-118.44), json!(34.07)),
    ]);
    Pipeline::new(&first, &store, &observer).run().await.unwrap();

    let second = StaticFeatureSource::with_features(vec![
        feature("CA-0101", "UC Davis Aggies", "Davis", json!(-121.75), json!(38.55)),
        feature("CA-0102", "UCLA", "Los Angeles", json!(-118.44), json!(34.07)),
    ]);
    Pipeline::new(&second, &store, &observer).run().await.unwrap();

    let rows = store.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].chapter.chapter_name, "UC Davis Aggies");
    assert_eq!(rows[0].chapter.longitude, -121.75);
    assert_eq!(rows[0].revision, 2);
}

#[tokio::test]
async fn test_empty_feature_set_exits_zero() {
    let source = StaticFeatureSource::from_response(200, r#"{"features": []}"#);
    let store = MemoryChapterStore::new();
    let observer = RecordingObserver::new();

    let result = Pipeline::new(&source, &store, &observer).run().await;

    assert_eq!(pipeline::exit_code(&result), 0);
    assert_eq!(result.unwrap().loaded, 0);
    assert!(store.rows().is_empty());
    let warnings = observer.warnings();
    assert!(warnings.contains(&PipelineEvent::NothingToLoad));
    assert!(warnings
        .iter()
        .any(|e| matches!(e, PipelineEvent::NoFeatures { .. })));
}

#[tokio::test]
async fn test_api_error_through_http_exits_one() {
    let responder =
        respond_once(200, r#"{"error": {"code": 400, "message": "Bad request"}}"#).await;
    let source = FeatureServiceClient::new(responder.api_config()).unwrap();
    let store = MemoryChapterStore::new();
    let observer = RecordingObserver::new();

    let result = Pipeline::new(&source, &store, &observer).run().await;

    assert_eq!(pipeline::exit_code(&result), 1);
    let err = result.unwrap_err();
    assert_eq!(err.stage, Stage::Fetching);
    assert!(err.to_string().contains("Bad request"));
    assert_eq!(store.contacts(), 0);
}

#[tokio::test]
async fn test_production_run_fails_before_touching_database() {
    let responder =
        respond_once(200, r#"{"error": {"code": 400, "message": "Bad request"}}"#).await;
    let config = Config {
        api: responder.api_config(),
        // Nothing listens here; the lazy pool must never be used.
        database: DbConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        },
    };
    let observer = RecordingObserver::new();

    let result = pipeline::run(&config, &observer).await;

    assert_eq!(pipeline::exit_code(&result), 1);
    assert_eq!(result.unwrap_err().stage, Stage::Fetching);
    assert!(!observer
        .stages()
        .contains(&Stage::EnsuringSchema));
}

#[tokio::test]
async fn test_production_run_reports_unreachable_database() {
    let responder = respond_once(200, r#"{"features": []}"#).await;
    let config = Config {
        api: responder.api_config(),
        database: DbConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        },
    };
    let observer = RecordingObserver::new();

    let result = pipeline::run(&config, &observer).await;

    let err = result.unwrap_err();
    assert_eq!(err.stage, Stage::EnsuringSchema);
    assert_eq!(err.source.category(), "Database Error");
}
