use crate::envelope::StampedEnvelope;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Daily ingest log file for `at`: `ingest_YYYY-MM-DD.ndjson`
pub fn log_path_for(log_dir: &Path, at: DateTime<Utc>) -> PathBuf {
    log_dir.join(format!("ingest_{}.ndjson", at.format("%Y-%m-%d")))
}

/// Append one envelope as a JSON line to the log file of its acceptance day.
pub fn append_rotating(log_dir: &Path, stamped: &StampedEnvelope) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let target = log_path_for(log_dir, stamped.accepted_at);
    let mut file = OpenOptions::new().create(true).append(true).open(&target)?;
    let line = serde_json::to_string(stamped)?;
    writeln!(file, "{}", line)?;
    Ok(target)
}

/// Read back every envelope of one log file, skipping blank lines
pub fn read_log(path: &Path) -> anyhow::Result<Vec<StampedEnvelope>> {
    let file = fs::File::open(path)?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}
