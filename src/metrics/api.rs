//! HTTP API metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct ApiMetrics;

impl ApiMetrics {
    pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
        ::metrics::counter!(
            phase_metric!(counter, "api", "requests"),
            "route" => route,
            "status" => status.to_string()
        )
        .increment(1);
        ::metrics::histogram!(
            phase_metric!(histogram, "api", "request_duration_seconds"),
            "route" => route
        )
        .record(duration_secs);
    }
}

impl PhaseMetrics for ApiMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "api", "requests"));
        let _ = ::metrics::histogram!(phase_metric!(histogram, "api", "request_duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "api"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "api", "requests"),
                metric_type: MetricType::Counter,
                help: "API requests by route and status",
            },
            MetricDoc {
                name: phase_metric!(histogram, "api", "request_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "API request latency by route",
            },
        ]
    }
}
