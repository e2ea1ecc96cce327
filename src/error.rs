//! Error types for the chapters ETL job.
//!
//! Defines the main error enum used by every pipeline stage.

use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Transport errors talking to the feature service (non-2xx, timeouts, refused connections).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Error payload returned inside a successful feature service response.
    #[error("Feature service returned error: {0}")]
    Api(String),

    /// Response body that is not the JSON shape the feature service documents.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Schema or upsert failures against the destination database.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration errors (bad env values, unreadable config file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EtlError {
    /// Creates an HTTP transport error with the given message.
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Creates a feature service error with the given message.
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Creates a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates a database error with the given message.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "HTTP Error",
            Self::Api(_) => "API Error",
            Self::Decode(_) => "Decode Error",
            Self::Database(_) => "Database Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns true for transport-level failures, as opposed to errors the
    /// remote service reported in its own payload.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

impl From<sqlx::Error> for EtlError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Result type alias using EtlError.
pub type Result<T> = std::result::Result<T, EtlError>;
