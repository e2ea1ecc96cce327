//! DU chapters ETL - loads university chapter locations from the Ducks
//! Unlimited feature service into Postgres.
//!
//! This library exposes the core modules for use in integration tests.

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod logging;
pub mod pipeline;
pub mod telemetry;
pub mod transform;
