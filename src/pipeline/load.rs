use super::tiers::{Tier, TierStore};
use crate::constants::{SourceType, GOLD_FORECASTS_TABLE, GOLD_REGIMES_TABLE};
use crate::error::Result;
use crate::storage::Store;
use crate::types::{
    Forecast, GoldFeature, GoldPriceRow, GoldStorageRow, GoldSupplyRow, RegimeState,
};
use chrono::NaiveDate;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub features: usize,
    pub regimes: usize,
    pub forecasts: usize,
}

fn push(out: &mut Vec<GoldFeature>, commodity: &str, week: NaiveDate, name: &str, value: Option<f64>) {
    if let Some(v) = value {
        out.push(GoldFeature {
            commodity: commodity.to_string(),
            week,
            feature_name: name.to_string(),
            feature_value: v,
        });
    }
}

/// Wide gold tables to `(week, feature_name, feature_value)` rows.
/// Each table's level column is named after its source; missing values are skipped.
pub fn long_features(
    commodity: &str,
    prices: &[GoldPriceRow],
    supply: &[GoldSupplyRow],
    storage: &[GoldStorageRow],
) -> Vec<GoldFeature> {
    let mut out = Vec::new();
    for p in prices {
        push(&mut out, commodity, p.week, "price", Some(p.value));
        push(&mut out, commodity, p.week, "return_1w", p.return_1w);
        push(&mut out, commodity, p.week, "vol_4w", p.vol_4w);
    }
    for s in supply {
        push(&mut out, commodity, s.week, "supply", Some(s.value));
        push(&mut out, commodity, s.week, "supply_delta", s.supply_delta);
    }
    for s in storage {
        push(&mut out, commodity, s.week, "inventory", Some(s.value));
        push(&mut out, commodity, s.week, "inventory_delta", s.inventory_delta);
    }
    out
}

/// Upsert the latest gold tables into the store
#[instrument(skip(tiers, store))]
pub async fn run_load(tiers: &TierStore, store: &dyn Store, commodity: &str) -> Result<LoadSummary> {
    store.migrate().await?;

    let prices: Vec<GoldPriceRow> = tiers.read_latest(Tier::Gold, SourceType::Prices.gold_table())?;
    let supply: Vec<GoldSupplyRow> = tiers.read_latest(Tier::Gold, SourceType::Supply.gold_table())?;
    let storage: Vec<GoldStorageRow> =
        tiers.read_latest(Tier::Gold, SourceType::Storage.gold_table())?;
    let regimes: Vec<RegimeState> = tiers.read_latest(Tier::Gold, GOLD_REGIMES_TABLE)?;
    let forecasts: Vec<Forecast> = tiers.read_latest(Tier::Gold, GOLD_FORECASTS_TABLE)?;

    let features = long_features(commodity, &prices, &supply, &storage);
    let summary = LoadSummary {
        features: store.upsert_features(&features).await?,
        regimes: store.upsert_regimes(&regimes).await?,
        forecasts: store.upsert_forecasts(&forecasts).await?,
    };
    info!(
        features = summary.features,
        regimes = summary.regimes,
        forecasts = summary.forecasts,
        "gold tables loaded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshapes_wide_rows_and_skips_missing_values() {
        let week = NaiveDate::from_ymd_opt(2024, 1, 12).unwrap();
        let features = long_features(
            "wti",
            &[GoldPriceRow { week, value: 72.0, return_1w: Some(0.01), vol_4w: None }],
            &[GoldSupplyRow { week, value: 13.2, supply_delta: None }],
            &[GoldStorageRow { week, value: 430.0, inventory_delta: Some(-2.5) }],
        );
        let names: Vec<_> = features.iter().map(|f| f.feature_name.as_str()).collect();
        assert_eq!(names, vec!["price", "return_1w", "supply", "inventory", "inventory_delta"]);
        assert!(features.iter().all(|f| f.commodity == "wti" && f.week == week));
        assert_eq!(features[4].feature_value, -2.5);
    }
}
