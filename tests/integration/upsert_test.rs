//! Postgres store integration tests.
//!
//! Each test works on its own chapter id prefix and deletes its rows
//! afterwards, so tests can share one database.

use du_chapters_etl::config::DbConfig;
use du_chapters_etl::load::{ChapterStore, PostgresChapterStore};
use du_chapters_etl::telemetry::RecordingObserver;
use du_chapters_etl::transform::Chapter;

type ChapterRow = (String, String, String, String, f64, f64);

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create a store with the table in place.
async fn get_test_store() -> Option<PostgresChapterStore> {
    let url = get_test_database_url()?;
    let config = DbConfig::from_connection_string(&url).ok()?;
    let store = PostgresChapterStore::connect_lazy(&config).ok()?;
    store
        .ensure_schema(&RecordingObserver::new())
        .await
        .ok()?;
    Some(store)
}

async fn fetch_rows(store: &PostgresChapterStore, prefix: &str) -> Vec<ChapterRow> {
    sqlx::query_as(
        r#"
        SELECT chapter_id, chapter_name, city, state, longitude, latitude
        FROM university_chapters
        WHERE chapter_id LIKE $1
        ORDER BY chapter_id
        "#,
    )
    .bind(format!("{prefix}%"))
    .fetch_all(store.pool())
    .await
    .unwrap()
}

async fn cleanup(store: &PostgresChapterStore, prefix: &str) {
    sqlx::query("DELETE FROM university_chapters WHERE chapter_id LIKE $1")
        .bind(format!("{prefix}%"))
        .execute(store.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_ensure_schema_is_idempotent() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let observer = RecordingObserver::new();
    store.ensure_schema(&observer).await.unwrap();
    store.ensure_schema(&observer).await.unwrap();

    let primary_key: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT kcu.column_name::text
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.table_name = 'university_chapters'
            AND tc.constraint_type = 'PRIMARY KEY'
        "#,
    )
    .fetch_all(store.pool())
    .await
    .unwrap();

    assert_eq!(primary_key, vec!["chapter_id".to_string()]);
    store.close().await;
}

#[tokio::test]
async fn test_upsert_twice_keeps_latest_values() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let prefix = "ZA-";
    cleanup(&store, prefix).await;
    let observer = RecordingObserver::new();

    let first = vec![
        Chapter::new("ZA-0101", "UC Davis", "Davis", "CA", -121.74, 38.54),
        Chapter::new("ZA-0102", "UCLA", "Los Angeles", "CA", -118.44, 34.07),
    ];
    assert_eq!(store.upsert(&first, &observer).await.unwrap(), 2);

    let stamp_before: String = sqlx::query_scalar(
        "SELECT updated_at::text FROM university_chapters WHERE chapter_id = 'ZA-0101'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let second = vec![
        Chapter::new("ZA-0101", "UC Davis Aggies", "Davis", "CA", -121.75, 38.55),
        Chapter::new("ZA-0102", "UCLA", "Los Angeles", "CA", -118.44, 34.07),
    ];
    assert_eq!(store.upsert(&second, &observer).await.unwrap(), 2);

    let rows = fetch_rows(&store, prefix).await;
    assert_eq!(
        rows,
        vec![
            (
                "ZA-0101".to_string(),
                "UC Davis Aggies".to_string(),
                "Davis".to_string(),
                "CA".to_string(),
                -121.75,
                38.55
            ),
            (
                "ZA-0102".to_string(),
                "UCLA".to_string(),
                "Los Angeles".to_string(),
                "CA".to_string(),
                -118.44,
                34.07
            ),
        ]
    );

    let stamp_after: String = sqlx::query_scalar(
        "SELECT updated_at::text FROM university_chapters WHERE chapter_id = 'ZA-0101'",
    )
    .fetch_one(store.pool())
    .await
    .unwrap();
    assert_ne!(stamp_before, stamp_after);

    cleanup(&store, prefix).await;
    store.close().await;
}

#[tokio::test]
async fn test_failed_batch_is_rolled_back() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let prefix = "ZB-";
    cleanup(&store, prefix).await;
    let observer = RecordingObserver::new();

    // The last row violates VARCHAR(2) on state.
    let batch = vec![
        Chapter::new("ZB-0101", "UC Davis", "Davis", "CA", -121.74, 38.54),
        Chapter::new("ZB-0102", "Cal Poly", "San Luis Obispo", "California", -120.66, 35.30),
    ];
    let err = store.upsert(&batch, &observer).await.unwrap_err();

    assert_eq!(err.category(), "Database Error");
    assert!(fetch_rows(&store, prefix).await.is_empty());

    store.close().await;
}

#[tokio::test]
async fn test_duplicate_ids_in_one_batch() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let prefix = "ZC-";
    cleanup(&store, prefix).await;
    let observer = RecordingObserver::new();

    let batch = vec![
        Chapter::new("ZC-0101", "old", "Davis", "CA", 1.0, 1.0),
        Chapter::new("ZC-0101", "new", "Davis", "CA", 2.0, 2.0),
    ];
    assert_eq!(store.upsert(&batch, &observer).await.unwrap(), 2);

    let rows = fetch_rows(&store, prefix).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1, "new");

    cleanup(&store, prefix).await;
    store.close().await;
}

#[tokio::test]
async fn test_large_batch_spans_statements() {
    let Some(store) = get_test_store().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let prefix = "ZD-";
    cleanup(&store, prefix).await;
    let observer = RecordingObserver::new();

    let batch: Vec<Chapter> = (0..2500)
        .map(|i| Chapter::new(format!("ZD-{i:05}"), "Chapter", "City", "CA", 0.0, 0.0))
        .collect();
    assert_eq!(store.upsert(&batch, &observer).await.unwrap(), 2500);
    assert_eq!(fetch_rows(&store, prefix).await.len(), 2500);

    cleanup(&store, prefix).await;
    store.close().await;
}
