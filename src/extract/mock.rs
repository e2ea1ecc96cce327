//! Canned feature source for testing.
//!
//! Replays a fixed HTTP status and body through the same response handling
//! as the real client, so error payloads behave identically.

use super::{parse_query_response, report_features, FeatureSource, RawFeature};
use crate::error::Result;
use crate::telemetry::{Observer, PipelineEvent};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A feature source that answers every fetch with the same response.
#[derive(Debug)]
pub struct StaticFeatureSource {
    status: StatusCode,
    body: String,
    filter: String,
    fetches: AtomicUsize,
}

impl StaticFeatureSource {
    /// Answers with the given HTTP status and raw body.
    pub fn from_response(status: u16, body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: body.into(),
            filter: "State='CA'".to_string(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Answers 200 with a `features` array holding `features`.
    pub fn with_features(features: Vec<RawFeature>) -> Self {
        Self::from_response(200, json!({ "features": features }).to_string())
    }

    /// Returns how many times `fetch` was called.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeatureSource for StaticFeatureSource {
    async fn fetch(&self, observer: &dyn Observer) -> Result<Vec<RawFeature>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        observer.observe(&PipelineEvent::FetchRequested {
            filter: self.filter.clone(),
        });

        let features = parse_query_response(self.status, &self.body)?;
        report_features(observer, &self.filter, &features);
        Ok(features)
    }
}
