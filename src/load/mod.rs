//! Load stage: upsert chapters into the destination store.
//!
//! Provides a trait-based interface so the orchestrator can run against
//! Postgres or the in-memory store interchangeably.

mod memory;
mod postgres;

pub use memory::{MemoryChapterStore, StoredChapter};
pub use postgres::PostgresChapterStore;

use crate::error::Result;
use crate::telemetry::Observer;
use crate::transform::Chapter;
use async_trait::async_trait;
use std::collections::HashMap;

/// Destination table.
pub const TABLE_NAME: &str = "university_chapters";

/// Trait defining the destination of a run.
#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// Creates the destination table if it does not exist yet.
    async fn ensure_schema(&self, observer: &dyn Observer) -> Result<()>;

    /// Inserts or updates every chapter in one transaction, keyed by
    /// `chapter_id`, and returns the number of records submitted.
    ///
    /// An empty slice returns 0 without touching the store.
    async fn upsert(&self, chapters: &[Chapter], observer: &dyn Observer) -> Result<usize>;
}

/// Collapses repeated chapter ids to their last occurrence, keeping the
/// order in which the surviving records appeared.
pub(crate) fn latest_per_key(chapters: &[Chapter]) -> Vec<&Chapter> {
    let last_index: HashMap<&str, usize> = chapters
        .iter()
        .enumerate()
        .map(|(i, c)| (c.chapter_id.as_str(), i))
        .collect();

    chapters
        .iter()
        .enumerate()
        .filter(|(i, c)| last_index.get(c.chapter_id.as_str()) == Some(i))
        .map(|(_, c)| c)
        .collect()
}
