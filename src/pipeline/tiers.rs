use crate::error::{PipelineError, Result};
use crate::metrics::TierMetrics;
use chrono::{DateTime, Utc};
use polars::prelude::{CsvReadOptions, CsvWriter, ParquetReader, ParquetWriter, SerReader, SerWriter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk format of one table file. Parquet is written when possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierFormat {
    Parquet,
    Csv,
}

impl TierFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TierFormat::Parquet => "parquet",
            TierFormat::Csv => "csv",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("parquet") => Some(TierFormat::Parquet),
            Some("csv") => Some(TierFormat::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for TierFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Result of writing one tier table
#[derive(Debug, Clone, PartialEq)]
pub struct TierWrite {
    pub path: PathBuf,
    pub format: TierFormat,
    pub rows: usize,
}

/// Timestamped, append-only table files under `{data_root}/{tier}/{table}/`.
///
/// Every write creates a new file; the newest file of a table is the one with
/// the greatest stamp, whichever format it was written in.
#[derive(Debug, Clone)]
pub struct TierStore {
    root: PathBuf,
}

impl TierStore {
    pub fn new<P: Into<PathBuf>>(data_root: P) -> Self {
        Self {
            root: data_root.into(),
        }
    }

    pub fn table_dir(&self, tier: Tier, table: &str) -> PathBuf {
        self.root.join(tier.as_str()).join(table)
    }

    /// Write `rows` as parquet, falling back to CSV when the frame cannot be
    /// built (no rows) or the parquet write fails.
    pub fn write<T: Serialize>(
        &self,
        tier: Tier,
        table: &str,
        rows: &[T],
        at: DateTime<Utc>,
    ) -> Result<TierWrite> {
        let dir = self.table_dir(tier, table);
        fs::create_dir_all(&dir)?;
        let stamp = next_free_stamp(&dir, &file_stamp(at));
        let encoded = encode_csv(rows)?;

        let parquet_path = dir.join(format!("{stamp}.{}", TierFormat::Parquet));
        let format = if rows.is_empty() {
            TierFormat::Csv
        } else {
            match write_parquet(&encoded, &parquet_path) {
                Ok(()) => TierFormat::Parquet,
                Err(e) => {
                    warn!(tier = %tier, table, error = %e, "parquet write failed, writing csv");
                    fs::remove_file(&parquet_path).ok();
                    TierFormat::Csv
                }
            }
        };
        let path = match format {
            TierFormat::Parquet => parquet_path,
            TierFormat::Csv => {
                let path = dir.join(format!("{stamp}.{}", TierFormat::Csv));
                fs::write(&path, &encoded)?;
                path
            }
        };

        TierMetrics::record_table_written(tier.as_str(), table, rows.len());
        debug!(tier = %tier, table, rows = rows.len(), %format, path = %path.display(), "wrote tier table");
        Ok(TierWrite {
            path,
            format,
            rows: rows.len(),
        })
    }

    pub fn latest_file(&self, tier: Tier, table: &str) -> Result<PathBuf> {
        let dir = self.table_dir(tier, table);
        let not_found =
            || PipelineError::NotFound(format!("No {} files found in {}", tier, dir.display()));
        if !dir.is_dir() {
            return Err(not_found());
        }
        let mut latest: Option<PathBuf> = None;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if TierFormat::from_path(&path).is_none() {
                continue;
            }
            if latest.as_ref().map_or(true, |l| path.file_stem() > l.file_stem()) {
                latest = Some(path);
            }
        }
        latest.ok_or_else(not_found)
    }

    pub fn read_latest<T: DeserializeOwned>(&self, tier: Tier, table: &str) -> Result<Vec<T>> {
        let path = self.latest_file(tier, table)?;
        read_table(&path)
    }
}

pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match TierFormat::from_path(path) {
        Some(TierFormat::Parquet) => decode_csv(Cursor::new(parquet_to_csv(path)?)),
        _ => decode_csv(fs::File::open(path)?),
    }
}

/// `YYYYMMDDTHHMMSSZ`, sortable as plain text
pub fn file_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

// Two writes in the same second get `_01`, `_02`, ... which sort after the bare stamp.
fn next_free_stamp(dir: &Path, stamp: &str) -> String {
    let taken = |candidate: &str| {
        [TierFormat::Parquet, TierFormat::Csv]
            .iter()
            .any(|f| dir.join(format!("{candidate}.{f}")).exists())
    };
    if !taken(stamp) {
        return stamp.to_string();
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{stamp}_{n:02}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

// Rows go through CSV so serde drives the column layout for both formats.
fn encode_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::Io(e.into_error()))
}

fn decode_csv<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

fn write_parquet(encoded: &[u8], path: &Path) -> Result<()> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(encoded))
        .finish()?;
    let file = fs::File::create(path)?;
    ParquetWriter::new(file).finish(&mut df)?;
    Ok(())
}

fn parquet_to_csv(path: &Path) -> Result<Vec<u8>> {
    let file = fs::File::open(path)?;
    let mut df = ParquetReader::new(file).finish()?;
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(&mut df)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        week: chrono::NaiveDate,
        value: Option<f64>,
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, h, m, s).unwrap()
    }

    #[test]
    fn stamps_are_compact_utc() {
        assert_eq!(file_stamp(at(9, 3, 7)), "20240105T090307Z");
    }

    #[test]
    fn latest_file_wins_and_same_second_writes_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = TierStore::new(dir.path());
        let week = chrono::NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();

        store
            .write(Tier::Silver, "t", &[Row { week, value: Some(1.0) }], at(9, 0, 0))
            .unwrap();
        let second = store
            .write(Tier::Silver, "t", &[Row { week, value: Some(2.0) }], at(9, 0, 0))
            .unwrap();
        assert!(second.path.ends_with("20240105T090000Z_01.parquet"));
        assert_eq!(second.format, TierFormat::Parquet);

        let rows: Vec<Row> = store.read_latest(Tier::Silver, "t").unwrap();
        assert_eq!(rows, vec![Row { week, value: Some(2.0) }]);

        store
            .write(Tier::Silver, "t", &[Row { week, value: None }], at(9, 0, 1))
            .unwrap();
        let rows: Vec<Row> = store.read_latest(Tier::Silver, "t").unwrap();
        assert_eq!(rows, vec![Row { week, value: None }]);
        assert_eq!(fs::read_dir(store.table_dir(Tier::Silver, "t")).unwrap().count(), 3);
    }

    #[test]
    fn missing_table_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = TierStore::new(dir.path());
        let err = store.latest_file(Tier::Bronze, "bronze_eia_prices").unwrap_err();
        assert!(err.to_string().starts_with("No bronze files found in"));
    }

    #[test]
    fn empty_tables_fall_back_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let store = TierStore::new(dir.path());
        let written = store
            .write::<Row>(Tier::Gold, "t", &[], at(9, 0, 0))
            .unwrap();
        assert_eq!(written.format, TierFormat::Csv);
        assert!(written.path.ends_with("20240105T090000Z.csv"));
        let rows: Vec<Row> = store.read_latest(Tier::Gold, "t").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn latest_file_compares_stamps_across_formats() {
        let dir = tempfile::tempdir().unwrap();
        let store = TierStore::new(dir.path());
        let week = chrono::NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        store
            .write(Tier::Bronze, "t", &[Row { week, value: Some(1.5) }], at(9, 0, 0))
            .unwrap();

        let table = store.table_dir(Tier::Bronze, "t");
        fs::write(table.join("20240105T100000Z.csv"), "week,value\n2024-01-05,3.25\n").unwrap();
        fs::write(table.join("notes.txt"), "ignored").unwrap();

        let latest = store.latest_file(Tier::Bronze, "t").unwrap();
        assert!(latest.ends_with("20240105T100000Z.csv"));
        let rows: Vec<Row> = store.read_latest(Tier::Bronze, "t").unwrap();
        assert_eq!(rows, vec![Row { week, value: Some(3.25) }]);

        // a same-second parquet write must not reuse the csv stamp
        let next = store
            .write(Tier::Bronze, "t", &[Row { week, value: Some(4.0) }], at(10, 0, 0))
            .unwrap();
        assert!(next.path.ends_with("20240105T100000Z_01.parquet"));
        let rows: Vec<Row> = store.read_latest(Tier::Bronze, "t").unwrap();
        assert_eq!(rows, vec![Row { week, value: Some(4.0) }]);
    }
}
