use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Key identifying one fetched payload of one series.
///
/// Absent headers contribute empty fields, so the same bytes fetched from the
/// same URL with the same validators always map to the same key.
pub fn compute_idempotency_key(
    series_id: &str,
    url: &str,
    etag: Option<&str>,
    last_modified: Option<&str>,
    payload_sha256_hex: &str,
) -> String {
    let canonical = [
        series_id,
        url,
        etag.unwrap_or_default(),
        last_modified.unwrap_or_default(),
        payload_sha256_hex,
    ]
    .join("|");
    sha256_hex(canonical.as_bytes())
}
