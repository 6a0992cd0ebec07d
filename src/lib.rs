pub mod apis;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod types;

// Ports and their adapters
pub mod app;
pub mod infra;
