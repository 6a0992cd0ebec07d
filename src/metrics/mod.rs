//! Metrics infrastructure for the oil-regime pipeline and API
//!
//! Each phase defines its metrics in a dedicated submodule so names stay
//! unique and documented. The Prometheus recorder handle is kept in-process
//! and rendered by the API's `/metrics` route.

pub mod api;
pub mod registry;
pub mod sources;
pub mod store;
pub mod tiers;

pub use api::ApiMetrics;
pub use sources::SourcesMetrics;
pub use store::StoreMetrics;
pub use tiers::TierMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder and register all phase metrics.
///
/// Idempotent. Only the first successful call installs a recorder.
pub fn init_metrics() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("Prometheus handle already stored");
                return;
            }
            info!("Prometheus recorder installed");
            registry::register_all_metrics();
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
        }
    }
}

/// Render the current snapshot in Prometheus text format, if a recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Touch every metric of the phase so it shows up before first use
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Builds metric names as `oil_{phase}_{name}` with a `_total` suffix for counters
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("oil_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("oil_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("oil_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
