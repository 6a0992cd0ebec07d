//! Tier metrics: bronze/silver/gold table writes and row accounting.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct TierMetrics;

impl TierMetrics {
    pub fn record_table_written(tier: &str, table: &str, rows: usize) {
        ::metrics::counter!(
            phase_metric!(counter, "tiers", "files_written"),
            "tier" => tier.to_string()
        )
        .increment(1);
        ::metrics::counter!(
            phase_metric!(counter, "tiers", "rows_written"),
            "tier" => tier.to_string()
        )
        .increment(rows as u64);
        ::metrics::gauge!(
            phase_metric!(gauge, "tiers", "last_rows"),
            "table" => table.to_string()
        )
        .set(rows as f64);
    }

    /// Rows discarded while cleaning (bad dates, missing values, duplicates)
    pub fn record_rows_dropped(table: &str, rows: usize) {
        ::metrics::counter!(
            phase_metric!(counter, "tiers", "rows_dropped"),
            "table" => table.to_string()
        )
        .increment(rows as u64);
    }

    pub fn record_stage_duration(stage: &str, duration_secs: f64) {
        ::metrics::histogram!(
            phase_metric!(histogram, "tiers", "stage_duration_seconds"),
            "stage" => stage.to_string()
        )
        .record(duration_secs);
    }
}

impl PhaseMetrics for TierMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "tiers", "files_written"));
        let _ = ::metrics::counter!(phase_metric!(counter, "tiers", "rows_written"));
        let _ = ::metrics::counter!(phase_metric!(counter, "tiers", "rows_dropped"));
        let _ = ::metrics::gauge!(phase_metric!(gauge, "tiers", "last_rows"));
        let _ = ::metrics::histogram!(phase_metric!(histogram, "tiers", "stage_duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "tiers"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "tiers", "files_written"),
                metric_type: MetricType::Counter,
                help: "Tier table files written",
            },
            MetricDoc {
                name: phase_metric!(counter, "tiers", "rows_written"),
                metric_type: MetricType::Counter,
                help: "Rows written across tier tables",
            },
            MetricDoc {
                name: phase_metric!(counter, "tiers", "rows_dropped"),
                metric_type: MetricType::Counter,
                help: "Rows discarded by cleaning",
            },
            MetricDoc {
                name: phase_metric!(gauge, "tiers", "last_rows"),
                metric_type: MetricType::Gauge,
                help: "Row count of the most recent write per table",
            },
            MetricDoc {
                name: phase_metric!(histogram, "tiers", "stage_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time of each pipeline stage",
            },
        ]
    }
}
