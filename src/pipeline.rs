//! Orchestrates the ETL pipeline: Extract -> Transform -> Load.
//!
//! A run moves through `Idle -> Fetching -> Normalizing -> EnsuringSchema
//! -> Upserting -> Done`. An error in any stage moves straight to `Failed`;
//! earlier stages are not undone.

use crate::config::Config;
use crate::error::{EtlError, Result};
use crate::extract::{FeatureServiceClient, FeatureSource};
use crate::load::{ChapterStore, PostgresChapterStore};
use crate::telemetry::{Observer, PipelineEvent};
use crate::transform::normalize;
use std::fmt;
use thiserror::Error;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    Fetching,
    Normalizing,
    EnsuringSchema,
    Upserting,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Normalizing => "normalizing",
            Self::EnsuringSchema => "ensuring-schema",
            Self::Upserting => "upserting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts from a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Raw features returned by the feature service.
    pub fetched: usize,
    /// Features that survived normalization.
    pub accepted: usize,
    /// Records submitted to the store.
    pub loaded: usize,
}

/// A failed run: the stage that failed and why.
#[derive(Debug, Error)]
#[error("Pipeline failed while {stage}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: EtlError,
}

/// One pipeline run over injected components.
pub struct Pipeline<'a> {
    source: &'a dyn FeatureSource,
    store: &'a dyn ChapterStore,
    observer: &'a dyn Observer,
    stage: Stage,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a dyn FeatureSource,
        store: &'a dyn ChapterStore,
        observer: &'a dyn Observer,
    ) -> Self {
        Self {
            source,
            store,
            observer,
            stage: Stage::Idle,
        }
    }

    /// Returns the current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs every stage in order. Not resumable: a failed pipeline stays
    /// `Failed`.
    pub async fn run(&mut self) -> std::result::Result<RunSummary, PipelineError> {
        self.observer.observe(&PipelineEvent::PipelineStarted);

        match self.run_stages().await {
            Ok(summary) => {
                self.enter(Stage::Done);
                self.observer.observe(&PipelineEvent::PipelineCompleted {
                    rows: summary.loaded,
                });
                Ok(summary)
            }
            Err(source) => Err(self.fail(source)),
        }
    }

    async fn run_stages(&mut self) -> Result<RunSummary> {
        if self.stage != Stage::Idle {
            return Err(EtlError::internal(format!(
                "pipeline already ran (stage: {})",
                self.stage
            )));
        }

        self.enter(Stage::Fetching);
        let features = self.source.fetch(self.observer).await?;

        self.enter(Stage::Normalizing);
        let chapters = normalize(&features, self.observer);

        self.enter(Stage::EnsuringSchema);
        self.store.ensure_schema(self.observer).await?;

        self.enter(Stage::Upserting);
        let loaded = self.store.upsert(&chapters, self.observer).await?;

        Ok(RunSummary {
            fetched: features.len(),
            accepted: chapters.len(),
            loaded,
        })
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.observer.observe(&PipelineEvent::StageStarted(stage));
    }

    fn fail(&mut self, source: EtlError) -> PipelineError {
        let stage = self.stage;
        self.stage = Stage::Failed;
        self.observer.observe(&PipelineEvent::PipelineFailed {
            stage,
            category: source.category(),
            message: source.to_string(),
        });
        PipelineError { stage, source }
    }
}

/// Builds the production components from `config` and runs them once.
pub async fn run(
    config: &Config,
    observer: &dyn Observer,
) -> std::result::Result<RunSummary, PipelineError> {
    let setup = |source: EtlError| {
        observer.observe(&PipelineEvent::PipelineFailed {
            stage: Stage::Idle,
            category: source.category(),
            message: source.to_string(),
        });
        PipelineError {
            stage: Stage::Idle,
            source,
        }
    };

    let source = FeatureServiceClient::new(config.api.clone()).map_err(setup)?;
    let store = PostgresChapterStore::connect_lazy(&config.database).map_err(setup)?;

    let result = Pipeline::new(&source, &store, observer).run().await;
    store.close().await;
    result
}

/// Maps a run result to the process exit status.
pub fn exit_code<T>(result: &std::result::Result<T, PipelineError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}
