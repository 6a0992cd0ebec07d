use super::tiers::{Tier, TierStore};
use crate::apis::eia::{points_to_bronze, series_to_points, EiaClient};
use crate::constants::SourceType;
use crate::envelope::{EnvelopeSubmission, PayloadMeta, RequestMeta, ENVELOPE_VERSION};
use crate::error::{PipelineError, Result};
use crate::gateway::Gateway;
use crate::idempotency::{compute_idempotency_key, sha256_hex};
use crate::metrics::SourcesMetrics;
use anyhow::Context;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct BronzeOptions {
    pub sources: Vec<SourceType>,
    pub bypass_cadence: bool,
    pub min_fetch_interval_secs: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Written {
        path: PathBuf,
        rows: usize,
        envelope_id: String,
        /// The payload was byte-identical to an archived one
        duplicate: bool,
    },
    SkippedCadence,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct BronzeSummary {
    pub outcomes: Vec<(SourceType, SourceOutcome)>,
}

impl BronzeSummary {
    pub fn written(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SourceOutcome::Written { .. }))
            .count()
    }

    pub fn failures(&self) -> Vec<(SourceType, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(s, o)| match o {
                SourceOutcome::Failed(msg) => Some((*s, msg.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.failures().len() == self.outcomes.len()
    }
}

/// Fetch every selected source and write one bronze file per source.
///
/// A failing source is recorded in the summary and does not stop the others.
/// Returns an error only when every selected source failed.
#[instrument(skip_all, fields(sources = opts.sources.len()))]
pub async fn run_bronze(
    client: &EiaClient,
    gateway: &Gateway,
    tiers: &TierStore,
    opts: &BronzeOptions,
) -> Result<BronzeSummary> {
    let mut summary = BronzeSummary::default();
    for &source in &opts.sources {
        let outcome = match ingest_source(client, gateway, tiers, source, opts).await {
            Ok(outcome) => outcome,
            Err(e) => {
                SourcesMetrics::record_request_error(source.name());
                warn!(source = %source, error = %format!("{e:#}"), "source ingest failed");
                SourceOutcome::Failed(format!("{e:#}"))
            }
        };
        summary.outcomes.push((source, outcome));
    }

    if summary.all_failed() {
        let detail = summary
            .failures()
            .iter()
            .map(|(s, msg)| format!("{s}: {msg}"))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(PipelineError::Api {
            message: format!("all sources failed: {detail}"),
        });
    }
    Ok(summary)
}

async fn ingest_source(
    client: &EiaClient,
    gateway: &Gateway,
    tiers: &TierStore,
    source: SourceType,
    opts: &BronzeOptions,
) -> anyhow::Result<SourceOutcome> {
    let series_id = source.series_id();
    let now = Utc::now();

    if !opts.bypass_cadence
        && !gateway
            .meta()
            .cadence_allows(series_id, now.timestamp(), opts.min_fetch_interval_secs)?
    {
        SourcesMetrics::record_cadence_skip(source.name());
        info!(source = %source, series_id, "skipped: fetched within cadence window");
        return Ok(SourceOutcome::SkippedCadence);
    }

    let started = Instant::now();
    let fetched = client
        .fetch_series(series_id)
        .await
        .with_context(|| format!("fetching {series_id}"))?;
    SourcesMetrics::record_request_success(
        source.name(),
        started.elapsed().as_secs_f64(),
        fetched.response.bytes.len(),
    );

    let sha = sha256_hex(&fetched.response.bytes);
    let submission = EnvelopeSubmission {
        envelope_version: ENVELOPE_VERSION.to_string(),
        source_type: source,
        series_id: series_id.to_string(),
        idempotency_key: compute_idempotency_key(
            series_id,
            &fetched.redacted_url,
            fetched.response.etag.as_deref(),
            fetched.response.last_modified.as_deref(),
            &sha,
        ),
        payload_meta: PayloadMeta {
            mime_type: fetched.response.content_type.clone(),
            size_bytes: fetched.response.bytes.len() as u64,
            sha256: sha,
        },
        request: RequestMeta {
            url: fetched.redacted_url.clone(),
            status: fetched.response.status,
            etag: fetched.response.etag.clone(),
            last_modified: fetched.response.last_modified.clone(),
        },
        fetched_at: now,
    };
    let stamped = gateway
        .accept(submission, &fetched.response.bytes)
        .context("archiving raw payload")?;

    let rows = points_to_bronze(series_to_points(&fetched.series, series_id), source, now);
    let written = tiers
        .write(Tier::Bronze, source.bronze_table(), &rows, now)
        .context("writing bronze table")?;
    // Cadence only counts fetches that produced a bronze file
    gateway.meta().set_last_fetched_at(series_id, now.timestamp())?;

    let duplicate = stamped.is_duplicate();
    info!(
        source = %source,
        rows = written.rows,
        path = %written.path.display(),
        format = %written.format,
        duplicate,
        "bronze table written"
    );

    Ok(SourceOutcome::Written {
        path: written.path,
        rows: written.rows,
        envelope_id: stamped.envelope_id,
        duplicate,
    })
}
