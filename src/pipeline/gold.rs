use super::tiers::{Tier, TierStore, TierWrite};
use crate::constants::SourceType;
use crate::error::Result;
use crate::types::{GoldPriceRow, GoldStorageRow, GoldSupplyRow, SilverRow};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, instrument};

pub const VOL_WINDOW: usize = 4;

/// Week-over-week percent change. `None` for the first week and after a zero.
pub fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let r = match i.checked_sub(1).map(|p| values[p]) {
            Some(prev) if prev != 0.0 => Some(values[i] / prev - 1.0),
            _ => None,
        };
        out.push(r);
    }
    out
}

/// Week-over-week difference, `None` for the first week
pub fn diff(values: &[f64]) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| i.checked_sub(1).map(|p| values[i] - values[p]))
        .collect()
}

/// Sample standard deviation over a trailing window, defined only when every
/// value in the window is present.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if window < 2 || i + 1 < window {
                return None;
            }
            let slice: Option<Vec<f64>> = values[i + 1 - window..=i].iter().copied().collect();
            slice.map(|w| sample_std(&w))
        })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn sample_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

fn sorted_by_week(rows: &[SilverRow]) -> (Vec<NaiveDate>, Vec<f64>) {
    let mut rows: Vec<&SilverRow> = rows.iter().collect();
    rows.sort_by_key(|r| r.week);
    rows.iter().map(|r| (r.week, r.value)).unzip()
}

pub fn price_features(rows: &[SilverRow]) -> Vec<GoldPriceRow> {
    let (weeks, values) = sorted_by_week(rows);
    let returns = pct_change(&values);
    let vols = rolling_std(&returns, VOL_WINDOW);
    weeks
        .into_iter()
        .zip(values)
        .zip(returns.into_iter().zip(vols))
        .map(|((week, value), (return_1w, vol_4w))| GoldPriceRow {
            week,
            value,
            return_1w,
            vol_4w,
        })
        .collect()
}

pub fn supply_features(rows: &[SilverRow]) -> Vec<GoldSupplyRow> {
    let (weeks, values) = sorted_by_week(rows);
    let deltas = diff(&values);
    weeks
        .into_iter()
        .zip(values)
        .zip(deltas)
        .map(|((week, value), supply_delta)| GoldSupplyRow {
            week,
            value,
            supply_delta,
        })
        .collect()
}

pub fn storage_features(rows: &[SilverRow]) -> Vec<GoldStorageRow> {
    let (weeks, values) = sorted_by_week(rows);
    let deltas = diff(&values);
    weeks
        .into_iter()
        .zip(values)
        .zip(deltas)
        .map(|((week, value), inventory_delta)| GoldStorageRow {
            week,
            value,
            inventory_delta,
        })
        .collect()
}

#[instrument(skip(tiers))]
pub fn run_gold(tiers: &TierStore, at: DateTime<Utc>) -> Result<Vec<(SourceType, TierWrite)>> {
    let mut written = Vec::new();
    for source in SourceType::ALL {
        let silver: Vec<SilverRow> = tiers.read_latest(Tier::Silver, source.silver_table())?;
        let table = source.gold_table();
        let write = match source {
            SourceType::Prices => tiers.write(Tier::Gold, table, &price_features(&silver), at)?,
            SourceType::Supply => tiers.write(Tier::Gold, table, &supply_features(&silver), at)?,
            SourceType::Storage => tiers.write(Tier::Gold, table, &storage_features(&silver), at)?,
        };
        info!(table, rows = write.rows, "gold table written");
        written.push((source, write));
    }
    Ok(written)
}
