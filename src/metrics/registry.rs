//! Registers every phase's metrics at startup and detects name conflicts early.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::sources::SourcesMetrics>(&mut all_metrics);
    register_phase_metrics::<super::tiers::TierMetrics>(&mut all_metrics);
    register_phase_metrics::<super::store::StoreMetrics>(&mut all_metrics);
    register_phase_metrics::<super::api::ApiMetrics>(&mut all_metrics);

    info!("Registered {} metrics across all phases", all_metrics.len());
}

fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<&'static str, (&'static str, MetricDoc)>) {
    T::register_metrics();
    let phase_name = T::phase_name();
    for doc in T::metrics_documentation() {
        if let Some((owner, _)) = all_metrics.get(doc.name) {
            warn!(
                "Metric name conflict: '{}' is defined by both '{}' and '{}'",
                doc.name, owner, phase_name
            );
            continue;
        }
        debug!("metric {} ({:?}): {}", doc.name, doc.metric_type, doc.help);
        all_metrics.insert(doc.name, (phase_name, doc));
    }
}

/// Every documented metric name, for docs and tests
pub fn all_metric_names() -> Vec<&'static str> {
    let mut names = Vec::new();
    names.extend(doc_names::<super::sources::SourcesMetrics>());
    names.extend(doc_names::<super::tiers::TierMetrics>());
    names.extend(doc_names::<super::store::StoreMetrics>());
    names.extend(doc_names::<super::api::ApiMetrics>());
    names
}

fn doc_names<T: PhaseMetrics>() -> Vec<&'static str> {
    T::metrics_documentation().into_iter().map(|d| d.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_names_are_unique_and_prefixed() {
        let names = all_metric_names();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert!(names.iter().all(|n| n.starts_with("oil_")));
    }
}
