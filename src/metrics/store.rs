use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct StoreMetrics;

impl StoreMetrics {
    pub fn record_rows_upserted(table: &str, rows: usize) {
        ::metrics::counter!(
            phase_metric!(counter, "store", "rows_upserted"),
            "table" => table.to_string()
        )
        .increment(rows as u64);
    }

    pub fn record_query_error(operation: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "store", "query_errors"),
            "operation" => operation.to_string()
        )
        .increment(1);
    }
}

impl PhaseMetrics for StoreMetrics {
    fn register_metrics() {
        let _ = ::metrics::counter!(phase_metric!(counter, "store", "rows_upserted"));
        let _ = ::metrics::counter!(phase_metric!(counter, "store", "query_errors"));
    }

    fn phase_name() -> &'static str {
        "store"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "store", "rows_upserted"),
                metric_type: MetricType::Counter,
                help: "Rows inserted or updated in the serving store",
            },
            MetricDoc {
                name: phase_metric!(counter, "store", "query_errors"),
                metric_type: MetricType::Counter,
                help: "Failed store operations",
            },
        ]
    }
}
