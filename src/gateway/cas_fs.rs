use crate::idempotency::sha256_hex;
use std::fs;
use std::path::{Path, PathBuf};

/// Store bytes under `root/sha256/ab/cd/<hex>` and return `cas:sha256:<hex>`.
/// Writing the same bytes twice is a no-op.
pub fn write_cas(root: &Path, bytes: &[u8]) -> anyhow::Result<String> {
    let hex = sha256_hex(bytes);
    let path = cas_path(root, &hex);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    if !path.exists() {
        fs::write(&path, bytes)?;
    }
    Ok(format!("cas:sha256:{}", hex))
}

pub fn read_cas(root: &Path, payload_ref: &str) -> anyhow::Result<Vec<u8>> {
    let hex = payload_ref
        .strip_prefix("cas:sha256:")
        .filter(|h| h.len() == 64)
        .ok_or_else(|| anyhow::anyhow!("invalid payload ref '{}'", payload_ref))?;
    Ok(fs::read(cas_path(root, hex))?)
}

fn cas_path(root: &Path, hex: &str) -> PathBuf {
    root.join("sha256").join(&hex[0..2]).join(&hex[2..4]).join(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_cas(dir.path(), b"payload").unwrap();
        let b = write_cas(dir.path(), b"payload").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("cas:sha256:"));
        assert_eq!(read_cas(dir.path(), &a).unwrap(), b"payload");
        assert!(read_cas(dir.path(), "cas:sha256:zz").is_err());
    }
}
