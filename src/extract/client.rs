//! HTTP client for the ArcGIS feature service query endpoint.

use reqwest::Client;

use super::{parse_query_response, report_features, FeatureSource, RawFeature};
use crate::config::ApiConfig;
use crate::error::{EtlError, Result};
use crate::telemetry::{Observer, PipelineEvent};
use async_trait::async_trait;

/// Feature service client.
#[derive(Debug, Clone)]
pub struct FeatureServiceClient {
    config: ApiConfig,
    client: Client,
}

impl FeatureServiceClient {
    /// Creates a new client; the configured timeout applies to the whole request.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EtlError::http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Returns the settings this client queries with.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Query string parameters for the single request of a run.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("where", self.config.where_clause()),
            ("outFields", self.config.out_fields.clone()),
            ("outSR", self.config.spatial_ref.to_string()),
            ("f", "json".to_string()),
            ("returnGeometry", "true".to_string()),
        ]
    }
}

#[async_trait]
impl FeatureSource for FeatureServiceClient {
    async fn fetch(&self, observer: &dyn Observer) -> Result<Vec<RawFeature>> {
        let filter = self.config.where_clause();
        observer.observe(&PipelineEvent::FetchRequested {
            filter: filter.clone(),
        });

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&self.query_params())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EtlError::http(format!(
                        "Request timed out after {} seconds",
                        self.config.timeout_secs
                    ))
                } else if e.is_connect() {
                    EtlError::http(format!(
                        "Failed to connect to feature service at {}: {}",
                        self.config.base_url, e
                    ))
                } else {
                    EtlError::http(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EtlError::http(format!("Failed to read response: {}", e)))?;

        let features = parse_query_response(status, &body)?;
        report_features(observer, &filter, &features);
        Ok(features)
    }
}
