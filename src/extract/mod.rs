//! Extract stage: query the feature service for chapter features.
//!
//! The orchestrator only sees the [`FeatureSource`] trait. The HTTP client
//! lives in `client`, a canned source for tests in `mock`.

mod client;
mod mock;
mod types;

pub use client::FeatureServiceClient;
pub use mock::StaticFeatureSource;
pub use types::RawFeature;

use crate::error::{EtlError, Result};
use crate::telemetry::{Observer, PipelineEvent};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

/// Longest response body excerpt kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Trait for anything that can produce the raw features of one run.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Issues one query and returns every feature in the response.
    async fn fetch(&self, observer: &dyn Observer) -> Result<Vec<RawFeature>>;
}

/// Interprets a feature service response.
///
/// - non-2xx status: [`EtlError::Http`]
/// - body with an `error` key: [`EtlError::Api`] carrying that payload
/// - no `features` key, or `"features": null`: empty result
pub fn parse_query_response(status: StatusCode, body: &str) -> Result<Vec<RawFeature>> {
    if !status.is_success() {
        return Err(EtlError::http(format!(
            "Feature service responded with {}: {}",
            status,
            excerpt(body)
        )));
    }

    let payload: Value = serde_json::from_str(body).map_err(|e| {
        EtlError::decode(format!("Failed to parse feature service response: {e}"))
    })?;

    let Value::Object(mut payload) = payload else {
        return Err(EtlError::decode(format!(
            "Expected a JSON object from the feature service, got: {}",
            excerpt(body)
        )));
    };

    if let Some(error) = payload.get("error") {
        return Err(EtlError::api(error.to_string()));
    }

    match payload.remove("features") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(features)) => Ok(features.into_iter().map(RawFeature::from).collect()),
        Some(other) => Err(EtlError::decode(format!(
            "Expected 'features' to be an array, got: {other}"
        ))),
    }
}

/// Reports the outcome of a successful fetch.
fn report_features(observer: &dyn Observer, filter: &str, features: &[RawFeature]) {
    observer.observe(&PipelineEvent::FeaturesFetched {
        count: features.len(),
    });
    if features.is_empty() {
        observer.observe(&PipelineEvent::NoFeatures {
            filter: filter.to_string(),
        });
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
