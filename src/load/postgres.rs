//! PostgreSQL chapter store.
//!
//! Provides the `PostgresChapterStore` struct that implements the
//! `ChapterStore` trait using sqlx.

use super::{latest_per_key, ChapterStore, TABLE_NAME};
use crate::config::DbConfig;
use crate::error::{EtlError, Result};
use crate::telemetry::{Observer, PipelineEvent};
use crate::transform::Chapter;
use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::debug;

/// Time to wait for the single pooled connection.
const ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Rows per INSERT statement. Six binds per row keeps each statement well
/// under the 65535 bind parameter limit.
const MAX_ROWS_PER_STATEMENT: usize = 1000;

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS university_chapters (
    chapter_id   VARCHAR(20) PRIMARY KEY,
    chapter_name VARCHAR(255) NOT NULL,
    city         VARCHAR(100) NOT NULL,
    state        VARCHAR(2)   NOT NULL,
    longitude    DOUBLE PRECISION NOT NULL,
    latitude     DOUBLE PRECISION NOT NULL,
    updated_at   TIMESTAMP DEFAULT NOW()
)
"#;

const INSERT_SQL: &str = "INSERT INTO university_chapters \
    (chapter_id, chapter_name, city, state, longitude, latitude) ";

const ON_CONFLICT_SQL: &str = r#"
ON CONFLICT (chapter_id) DO UPDATE SET
    chapter_name = EXCLUDED.chapter_name,
    city         = EXCLUDED.city,
    state        = EXCLUDED.state,
    longitude    = EXCLUDED.longitude,
    latitude     = EXCLUDED.latitude,
    updated_at   = NOW()
"#;

/// PostgreSQL chapter store.
#[derive(Debug, Clone)]
pub struct PostgresChapterStore {
    pool: PgPool,
}

impl PostgresChapterStore {
    /// Creates a store whose pool connects on first use.
    ///
    /// No connection is attempted here, so a run that never reaches the
    /// database never needs one.
    pub fn connect_lazy(config: &DbConfig) -> Result<Self> {
        let conn_str = config.connection_string()?;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .connect_lazy(&conn_str)
            .map_err(|e| {
                EtlError::config(format!(
                    "Invalid database settings for {}: {e}",
                    config.display_string()
                ))
            })?;

        debug!("Database pool prepared for {}", config.display_string());
        Ok(Self { pool })
    }

    /// Creates a new store from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the pool, waiting for the connection to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ChapterStore for PostgresChapterStore {
    async fn ensure_schema(&self, observer: &dyn Observer) -> Result<()> {
        sqlx::query(CREATE_TABLE_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                EtlError::database(format!("Failed to create {TABLE_NAME} table: {e}"))
            })?;

        observer.observe(&PipelineEvent::SchemaEnsured { table: TABLE_NAME });
        Ok(())
    }

    async fn upsert(&self, chapters: &[Chapter], observer: &dyn Observer) -> Result<usize> {
        if chapters.is_empty() {
            observer.observe(&PipelineEvent::NothingToLoad);
            return Ok(0);
        }

        let rows = latest_per_key(chapters);
        if rows.len() < chapters.len() {
            debug!(
                "Collapsed {} duplicate chapter ids before upsert",
                chapters.len() - rows.len()
            );
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::database(format!("Failed to start transaction: {e}")))?;

        match write_rows(&mut tx, &rows).await {
            Ok(()) => tx
                .commit()
                .await
                .map_err(|e| EtlError::database(format!("Failed to commit upsert: {e}")))?,
            Err(e) => {
                return Err(match tx.rollback().await {
                    Ok(()) => e,
                    Err(rollback) => {
                        EtlError::database(format!("{e} (rollback also failed: {rollback})"))
                    }
                });
            }
        }

        observer.observe(&PipelineEvent::Loaded {
            rows: chapters.len(),
        });
        Ok(chapters.len())
    }
}

/// Writes all rows on the given connection, one statement per chunk.
async fn write_rows(conn: &mut PgConnection, rows: &[&Chapter]) -> Result<()> {
    for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
        build_upsert(chunk)
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|e| EtlError::database(format!("Failed to upsert chapters: {e}")))?;
    }
    Ok(())
}

/// Builds one multi-row `INSERT ... ON CONFLICT` statement.
fn build_upsert(rows: &[&Chapter]) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(INSERT_SQL);
    builder.push_values(rows, |mut row, chapter| {
        row.push_bind(chapter.chapter_id.clone())
            .push_bind(chapter.chapter_name.clone())
            .push_bind(chapter.city.clone())
            .push_bind(chapter.state.clone())
            .push_bind(chapter.longitude)
            .push_bind(chapter.latitude);
    });
    builder.push(ON_CONFLICT_SQL);
    builder
}
