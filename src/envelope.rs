use crate::constants::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ENVELOPE_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PayloadMeta {
    pub mime_type: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Request details. The URL never carries the api key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RequestMeta {
    pub url: String,
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// What the bronze stage submits for every fetched series payload
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EnvelopeSubmission {
    pub envelope_version: String,
    pub source_type: SourceType,
    pub series_id: String,
    pub idempotency_key: String,
    pub payload_meta: PayloadMeta,
    pub request: RequestMeta,
    pub fetched_at: DateTime<Utc>,
}

/// Submission as accepted by the gateway and appended to the ingest log
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StampedEnvelope {
    pub envelope_id: String,
    pub accepted_at: DateTime<Utc>,
    /// `cas:sha256:<hex>`; empty for duplicates
    pub payload_ref: String,
    pub dedupe_of: Option<String>,
    pub envelope: EnvelopeSubmission,
}

impl StampedEnvelope {
    pub fn is_duplicate(&self) -> bool {
        self.dedupe_of.is_some()
    }
}
