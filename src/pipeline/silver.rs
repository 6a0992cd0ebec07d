use super::tiers::{Tier, TierStore, TierWrite};
use crate::constants::SourceType;
use crate::error::Result;
use crate::metrics::TierMetrics;
use crate::types::{BronzeRow, SilverRow};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// First Friday on or after `date`
pub fn week_ending_friday(date: NaiveDate) -> NaiveDate {
    let from_monday = date.weekday().num_days_from_monday() as i64;
    let delta = (4 - from_monday + 7) % 7;
    date + Duration::days(delta)
}

/// Dated observations, rows without a date or value removed.
/// When a date repeats the later row wins. Sorted by date.
pub fn clean_observations(rows: &[BronzeRow]) -> BTreeMap<NaiveDate, f64> {
    let mut by_date = BTreeMap::new();
    for row in rows {
        if let (Some(date), Some(value)) = (row.date, row.value) {
            by_date.insert(date, value);
        }
    }
    by_date
}

/// Resample observations onto the Friday grid with forward fill.
///
/// Weeks run from the Friday closing the earliest observation to the Friday
/// closing the latest one. Each week takes the last observation dated on or
/// before its Friday. With `max_fill_weeks` set, weeks whose observation is
/// more than that many weeks old are left out.
pub fn align_weekly(
    observations: &BTreeMap<NaiveDate, f64>,
    max_fill_weeks: Option<u32>,
) -> Vec<(NaiveDate, NaiveDate, f64)> {
    let (Some((&first, _)), Some((&last, _))) =
        (observations.iter().next(), observations.iter().next_back())
    else {
        return Vec::new();
    };
    let max_age = max_fill_weeks.map(|w| Duration::weeks(w as i64));

    let mut out = Vec::new();
    let mut week = week_ending_friday(first);
    let end = week_ending_friday(last);
    while week <= end {
        if let Some((&source_date, &value)) = observations.range(..=week).next_back() {
            let fresh = max_age.map_or(true, |max| week - source_date <= max);
            if fresh {
                out.push((week, source_date, value));
            }
        }
        week += Duration::weeks(1);
    }
    out
}

/// Clean one bronze table into silver rows
pub fn to_silver(
    rows: &[BronzeRow],
    source: SourceType,
    max_fill_weeks: Option<u32>,
) -> Vec<SilverRow> {
    let series_id = rows
        .first()
        .map(|r| r.series_id.clone())
        .unwrap_or_else(|| source.series_id().to_string());
    let observations = clean_observations(rows);
    let dropped = rows.len() - observations.len();
    if dropped > 0 {
        TierMetrics::record_rows_dropped(source.bronze_table(), dropped);
    }

    align_weekly(&observations, max_fill_weeks)
        .into_iter()
        .map(|(week, source_date, value)| SilverRow {
            week,
            series_id: series_id.clone(),
            source_type: source,
            value,
            source_date,
            filled: source_date != week,
        })
        .collect()
}

/// Read the latest bronze table of every source and write its silver table
#[instrument(skip(tiers))]
pub fn run_silver(
    tiers: &TierStore,
    max_fill_weeks: Option<u32>,
    at: DateTime<Utc>,
) -> Result<Vec<(SourceType, TierWrite)>> {
    let mut written = Vec::new();
    for source in SourceType::ALL {
        let bronze: Vec<BronzeRow> = tiers.read_latest(Tier::Bronze, source.bronze_table())?;
        let silver = to_silver(&bronze, source, max_fill_weeks);
        let write = tiers.write(Tier::Silver, source.silver_table(), &silver, at)?;
        info!(
            table = source.silver_table(),
            bronze_rows = bronze.len(),
            weeks = write.rows,
            "silver table written"
        );
        written.push((source, write));
    }
    Ok(written)
}
