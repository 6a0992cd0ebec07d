use super::tiers::{Tier, TierStore, TierWrite};
use crate::constants::SourceType;
use crate::error::Result;
use crate::types::BronzeRow;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub seed: u64,
    pub weeks: u32,
    pub start: NaiveDate,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            weeks: 156,
            start: NaiveDate::from_ymd_opt(2021, 1, 4).unwrap_or_default(),
        }
    }
}

/// Synthetic bronze rows for one source: daily weekday prices, weekly
/// Friday inventory and production. Same seed, same rows.
pub fn synthetic_rows(
    source: SourceType,
    opts: &DemoOptions,
    ingested_at: DateTime<Utc>,
) -> Vec<BronzeRow> {
    let mut rng = StdRng::seed_from_u64(opts.seed ^ source as u64);
    let days = opts.weeks as i64 * 7;
    let (mut level, step, mean_reversion, anchor) = match source {
        SourceType::Prices => (75.0_f64, 0.018, 0.01, 75.0),
        SourceType::Storage => (430.0_f64, 0.012, 0.05, 430.0),
        SourceType::Supply => (12.5_f64, 0.004, 0.05, 12.5),
    };

    let mut rows = Vec::new();
    for offset in 0..days {
        let date = opts.start + Duration::days(offset);
        let observed = match source {
            SourceType::Prices => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            _ => date.weekday() == Weekday::Fri,
        };
        if !observed {
            continue;
        }
        let shock: f64 = rng.gen_range(-1.0..1.0) * step * 1.7;
        level *= 1.0 + shock + mean_reversion * (anchor - level) / anchor;
        rows.push(BronzeRow {
            date: Some(date),
            series_id: source.series_id().to_string(),
            value: Some((level * 100.0).round() / 100.0),
            source_type: source,
            ingested_at,
        });
    }
    rows
}

/// Write one synthetic bronze table per source
pub fn seed_bronze(tiers: &TierStore, opts: &DemoOptions, at: DateTime<Utc>) -> Result<Vec<(SourceType, TierWrite)>> {
    let mut written = Vec::new();
    for source in SourceType::ALL {
        let rows = synthetic_rows(source, opts, at);
        let write = tiers.write(Tier::Bronze, source.bronze_table(), &rows, at)?;
        info!(source = %source, rows = write.rows, "seeded demo bronze table");
        written.push((source, write));
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_reproducible_and_on_expected_days() {
        let opts = DemoOptions { weeks: 4, ..DemoOptions::default() };
        let at = Utc::now();
        let a = synthetic_rows(SourceType::Prices, &opts, at);
        let b = synthetic_rows(SourceType::Prices, &opts, at);
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);

        let inventory = synthetic_rows(SourceType::Storage, &opts, at);
        assert_eq!(inventory.len(), 4);
        assert!(inventory
            .iter()
            .all(|r| r.date.map(|d| d.weekday()) == Some(Weekday::Fri)));
    }
}
