//! Library exports for the binary, benchmarks and tests.

/// Authorization credential acquisition for the destination API.
pub mod auth;
/// Metric units and canonical metric names.
pub mod catalog;
/// Command-line, environment and file settings.
pub mod config;
/// Truncation of oversized diagnostic text.
pub mod elide;
/// Extract stage.
pub mod extract;
/// Shared HTTP agent, retry policy and JSON requests.
pub mod http_client;
/// On-disk job documents.
pub mod job_store;
/// Parser for object-print style literals found in stored metadata.
pub mod literal;
/// Load stage.
pub mod load;
/// Logging setup.
pub mod logging;
/// Stage orchestration.
pub mod migrate;
/// Job-number selection.
pub mod selection;
/// Pipeline stages and their reports.
pub mod stage;
/// Schema transformation.
pub mod transform;
