//! Raw payload archive for the bronze stage.
//!
//! Every fetched payload is recorded as an envelope in a daily NDJSON ingest
//! log. First-seen payloads are also written to a content-addressed store;
//! byte-identical refetches are logged with `dedupe_of` and not stored again.

pub mod cas_fs;
pub mod ingest_log;
pub mod ingest_meta;

use crate::envelope::{EnvelopeSubmission, StampedEnvelope};
use crate::metrics::SourcesMetrics;
use chrono::Utc;
use ingest_meta::IngestMeta;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

pub struct Gateway {
    root: PathBuf,
    meta: IngestMeta,
}

impl Gateway {
    /// `root` is the raw archive directory, usually `{data_root}/raw`
    pub fn open<P: Into<PathBuf>>(root: P) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("cas"))?;
        std::fs::create_dir_all(root.join("ingest_log"))?;
        let meta = IngestMeta::open_at_root(&root)?;
        Ok(Self { root, meta })
    }

    pub fn meta(&self) -> &IngestMeta {
        &self.meta
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("ingest_log")
    }

    pub fn accept(
        &self,
        env: EnvelopeSubmission,
        payload_bytes: &[u8],
    ) -> anyhow::Result<StampedEnvelope> {
        let accepted_at = Utc::now();
        let envelope_id = Uuid::new_v4().to_string();

        if let Some(existing_id) = self.meta.get_envelope_by_idk(&env.idempotency_key)? {
            SourcesMetrics::record_payload_deduplicated();
            debug!(series = %env.series_id, dedupe_of = %existing_id, "payload already archived");
            let dup = StampedEnvelope {
                envelope_id,
                accepted_at,
                payload_ref: String::new(),
                dedupe_of: Some(existing_id),
                envelope: env,
            };
            ingest_log::append_rotating(&self.log_dir(), &dup)?;
            return Ok(dup);
        }

        let payload_ref = cas_fs::write_cas(&self.root.join("cas"), payload_bytes)?;
        SourcesMetrics::record_payload_archived(payload_bytes.len());

        let idk = env.idempotency_key.clone();
        let stamped = StampedEnvelope {
            envelope_id: envelope_id.clone(),
            accepted_at,
            payload_ref,
            dedupe_of: None,
            envelope: env,
        };
        ingest_log::append_rotating(&self.log_dir(), &stamped)?;
        self.meta.put_dedupe_mapping(&idk, &envelope_id)?;
        Ok(stamped)
    }
}
