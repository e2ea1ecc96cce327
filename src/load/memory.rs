//! In-memory chapter store.
//!
//! Mirrors the Postgres store's behavior: the table must be ensured before
//! writing, column widths are enforced, a batch is applied all-or-nothing,
//! and the last write for a chapter id wins.

use super::{latest_per_key, ChapterStore, TABLE_NAME};
use crate::error::{EtlError, Result};
use crate::telemetry::{Observer, PipelineEvent};
use crate::transform::Chapter;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// A stored row. `revision` stands in for `updated_at`: it increases on
/// every upsert that touches the row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChapter {
    pub chapter: Chapter,
    pub revision: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    table_exists: bool,
    rows: BTreeMap<String, StoredChapter>,
    revision: u64,
    contacts: usize,
}

/// In-memory chapter store.
#[derive(Debug, Default)]
pub struct MemoryChapterStore {
    state: Mutex<MemoryState>,
    failure: Option<String>,
}

impl MemoryChapterStore {
    /// Creates an empty store with no table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that fails every operation that reaches it.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            state: Mutex::default(),
            failure: Some(message.into()),
        }
    }

    /// Returns all rows ordered by chapter id.
    pub fn rows(&self) -> Vec<StoredChapter> {
        self.lock().rows.values().cloned().collect()
    }

    /// Returns the row for `chapter_id`, if any.
    pub fn get(&self, chapter_id: &str) -> Option<StoredChapter> {
        self.lock().rows.get(chapter_id).cloned()
    }

    /// Returns how many operations reached the store.
    pub fn contacts(&self) -> usize {
        self.lock().contacts
    }

    /// Returns true once `ensure_schema` has succeeded.
    pub fn table_exists(&self) -> bool {
        self.lock().table_exists
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_failure(&self) -> Result<()> {
        match &self.failure {
            Some(message) => Err(EtlError::database(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChapterStore for MemoryChapterStore {
    async fn ensure_schema(&self, observer: &dyn Observer) -> Result<()> {
        self.lock().contacts += 1;
        self.check_failure()?;

        self.lock().table_exists = true;
        observer.observe(&PipelineEvent::SchemaEnsured { table: TABLE_NAME });
        Ok(())
    }

    async fn upsert(&self, chapters: &[Chapter], observer: &dyn Observer) -> Result<usize> {
        if chapters.is_empty() {
            observer.observe(&PipelineEvent::NothingToLoad);
            return Ok(0);
        }

        let mut state = self.lock();
        state.contacts += 1;
        self.check_failure()?;

        if !state.table_exists {
            return Err(EtlError::database(format!(
                "relation \"{TABLE_NAME}\" does not exist"
            )));
        }

        // Validate the whole batch before applying any of it.
        for chapter in chapters {
            if let Some((field, max, _)) = chapter.oversized_field() {
                return Err(EtlError::database(format!(
                    "value too long for type character varying({max}) in column {field}"
                )));
            }
        }

        state.revision += 1;
        let revision = state.revision;
        for chapter in latest_per_key(chapters) {
            state.rows.insert(
                chapter.chapter_id.clone(),
                StoredChapter {
                    chapter: chapter.clone(),
                    revision,
                },
            );
        }
        drop(state);

        observer.observe(&PipelineEvent::Loaded {
            rows: chapters.len(),
        });
        Ok(chapters.len())
    }
}
