//! Pipeline observations.
//!
//! Stages never log through global state directly; they report typed
//! events to an injected [`Observer`]. The binary wires in
//! [`TracingObserver`], tests use [`RecordingObserver`].

use crate::pipeline::Stage;
use crate::transform::SkipReason;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Something that happened during a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The orchestrator started a run.
    PipelineStarted,
    /// The orchestrator moved into a new stage.
    StageStarted(Stage),
    /// A feature service query is about to be sent.
    FetchRequested { filter: String },
    /// The feature service answered with this many features.
    FeaturesFetched { count: usize },
    /// The feature service answered with an empty result set.
    NoFeatures { filter: String },
    /// A raw feature was discarded by the normalizer.
    FeatureSkipped { index: usize, reason: SkipReason },
    /// Normalization finished.
    Normalized { accepted: usize, total: usize },
    /// The destination table exists.
    SchemaEnsured { table: &'static str },
    /// The upsert was skipped because there was nothing to write.
    NothingToLoad,
    /// A batch was committed.
    Loaded { rows: usize },
    /// The run finished successfully.
    PipelineCompleted { rows: usize },
    /// The run stopped at `stage`.
    PipelineFailed {
        stage: Stage,
        category: &'static str,
        message: String,
    },
}

impl PipelineEvent {
    /// Returns the severity this event is reported at.
    pub fn level(&self) -> Level {
        match self {
            Self::StageStarted(_) => Level::Debug,
            Self::NoFeatures { .. } | Self::FeatureSkipped { .. } | Self::NothingToLoad => {
                Level::Warn
            }
            Self::PipelineFailed { .. } => Level::Error,
            _ => Level::Info,
        }
    }
}

/// Sink for pipeline events.
pub trait Observer: Send + Sync {
    fn observe(&self, event: &PipelineEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::PipelineStarted => {
                info!("Starting DU university chapters ETL pipeline")
            }
            PipelineEvent::StageStarted(stage) => debug!(%stage, "Stage started"),
            PipelineEvent::FetchRequested { filter } => {
                info!(%filter, "Requesting chapters from feature service")
            }
            PipelineEvent::FeaturesFetched { count } => {
                info!(count, "Extracted {} features from feature service", count)
            }
            PipelineEvent::NoFeatures { filter } => {
                warn!(%filter, "No features returned for {}", filter)
            }
            PipelineEvent::FeatureSkipped { index, reason } => {
                warn!(index, "Skipping feature: {}", reason)
            }
            PipelineEvent::Normalized { accepted, total } => {
                info!(accepted, total, "Transformed {} / {} features", accepted, total)
            }
            PipelineEvent::SchemaEnsured { table } => info!("Ensured {} table exists", table),
            PipelineEvent::NothingToLoad => warn!("No chapters to load, skipping database"),
            PipelineEvent::Loaded { rows } => info!(rows, "Loaded {} chapters into Postgres", rows),
            PipelineEvent::PipelineCompleted { rows } => {
                info!(rows, "Pipeline complete, {} rows loaded", rows)
            }
            PipelineEvent::PipelineFailed {
                stage,
                category,
                message,
            } => error!(%stage, "Pipeline failed. {}: {}", category, message),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the recorded events at `Level::Warn`.
    pub fn warnings(&self) -> Vec<PipelineEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.level() == Level::Warn)
            .collect()
    }

    /// Returns the skip reasons reported by the normalizer, in order.
    pub fn skipped(&self) -> Vec<SkipReason> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::FeatureSkipped { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }

    /// Returns the stages the orchestrator entered, in order.
    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::StageStarted(stage) => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn observe(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
