//! Sources phase metrics
//!
//! Requests to the EIA API, cadence decisions and payload deduplication.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct SourcesMetrics;

impl SourcesMetrics {
    pub fn record_request_success(source: &str, duration_secs: f64, payload_bytes: usize) {
        ::metrics::counter!(
            phase_metric!(counter, "sources", "requests_success"),
            "source" => source.to_string()
        )
        .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "sources", "request_duration_seconds"))
            .record(duration_secs);
        ::metrics::histogram!(phase_metric!(histogram, "sources", "payload_bytes"))
            .record(payload_bytes as f64);
    }

    pub fn record_request_error(source: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "sources", "requests_error"),
            "source" => source.to_string()
        )
        .increment(1);
    }

    pub fn record_cadence_skip(source: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "sources", "cadence_skips"),
            "source" => source.to_string()
        )
        .increment(1);
    }

    pub fn record_payload_archived(payload_bytes: usize) {
        ::metrics::counter!(phase_metric!(counter, "sources", "payloads_archived")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "sources", "archived_bytes"))
            .increment(payload_bytes as u64);
    }

    pub fn record_payload_deduplicated() {
        ::metrics::counter!(phase_metric!(counter, "sources", "payloads_deduplicated"))
            .increment(1);
    }
}

impl PhaseMetrics for SourcesMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "sources", "requests_success"));
        let _ = ::metrics::counter!(phase_metric!(counter, "sources", "requests_error"));
        let _ = ::metrics::counter!(phase_metric!(counter, "sources", "cadence_skips"));
        let _ = ::metrics::counter!(phase_metric!(counter, "sources", "payloads_archived"));
        let _ = ::metrics::counter!(phase_metric!(counter, "sources", "archived_bytes"));
        let _ = ::metrics::counter!(phase_metric!(counter, "sources", "payloads_deduplicated"));
        let _ = ::metrics::histogram!(phase_metric!(
            histogram,
            "sources",
            "request_duration_seconds"
        ));
        let _ = ::metrics::histogram!(phase_metric!(histogram, "sources", "payload_bytes"));
    }

    fn phase_name() -> &'static str {
        "sources"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "sources", "requests_success"),
                metric_type: MetricType::Counter,
                help: "Successful series requests to the EIA API",
            },
            MetricDoc {
                name: phase_metric!(counter, "sources", "requests_error"),
                metric_type: MetricType::Counter,
                help: "Failed series requests to the EIA API",
            },
            MetricDoc {
                name: phase_metric!(counter, "sources", "cadence_skips"),
                metric_type: MetricType::Counter,
                help: "Fetches skipped because the series was fetched recently",
            },
            MetricDoc {
                name: phase_metric!(counter, "sources", "payloads_archived"),
                metric_type: MetricType::Counter,
                help: "Raw payloads written to the content-addressed archive",
            },
            MetricDoc {
                name: phase_metric!(counter, "sources", "archived_bytes"),
                metric_type: MetricType::Counter,
                help: "Bytes written to the raw payload archive",
            },
            MetricDoc {
                name: phase_metric!(counter, "sources", "payloads_deduplicated"),
                metric_type: MetricType::Counter,
                help: "Payloads identical to one already archived",
            },
            MetricDoc {
                name: phase_metric!(histogram, "sources", "request_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Duration of series requests",
            },
            MetricDoc {
                name: phase_metric!(histogram, "sources", "payload_bytes"),
                metric_type: MetricType::Histogram,
                help: "Size of fetched payloads",
            },
        ]
    }
}
