use super::gold::{mean, VOL_WINDOW};
use super::tiers::{Tier, TierStore, TierWrite};
use crate::config::PipelineConfig;
use crate::constants::{SourceType, GOLD_FORECASTS_TABLE, GOLD_REGIMES_TABLE};
use crate::error::Result;
use crate::types::{Forecast, GoldPriceRow, GoldStorageRow, RegimeLabel, RegimeState};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Largest absolute AR coefficient the forecaster will use
pub const MAX_AR_COEFFICIENT: f64 = 0.99;

const MIN_FORECAST_WINDOW: usize = 3;

pub fn classify(
    return_1w: f64,
    vol_4w: Option<f64>,
    inventory_delta: Option<f64>,
    high_vol_threshold: f64,
) -> RegimeLabel {
    let high_vol = vol_4w.map_or(false, |v| v > high_vol_threshold);
    if high_vol && return_1w < 0.0 {
        return RegimeLabel::RiskOff;
    }
    match inventory_delta {
        Some(d) if d < 0.0 && return_1w > 0.0 => RegimeLabel::TightSupply,
        Some(d) if d > 0.0 && return_1w < 0.0 => RegimeLabel::Oversupplied,
        _ => RegimeLabel::Balanced,
    }
}

/// Label every week that has a return. `prices` must be sorted by week.
pub fn regimes(
    prices: &[GoldPriceRow],
    storage: &[GoldStorageRow],
    commodity: &str,
    high_vol_threshold: f64,
) -> Vec<RegimeState> {
    let inventory: HashMap<NaiveDate, Option<f64>> =
        storage.iter().map(|s| (s.week, s.inventory_delta)).collect();

    prices
        .iter()
        .enumerate()
        .filter_map(|(i, row)| {
            let ret = row.return_1w?;
            let inventory_delta = inventory.get(&row.week).copied().flatten();
            let label = classify(ret, row.vol_4w, inventory_delta, high_vol_threshold);
            Some(RegimeState {
                commodity: commodity.to_string(),
                week: row.week,
                regime_label: label.as_str().to_string(),
                regime_score: regime_score(prices, i),
            })
        })
        .collect()
}

// Mean of the trailing returns per unit of volatility. A present vol_4w implies
// the four trailing returns are present.
fn regime_score(prices: &[GoldPriceRow], i: usize) -> Option<f64> {
    let vol = prices[i].vol_4w.filter(|v| *v > 0.0)?;
    let start = (i + 1).checked_sub(VOL_WINDOW)?;
    let returns: Option<Vec<f64>> = prices[start..=i].iter().map(|r| r.return_1w).collect();
    Some(mean(&returns?) / vol)
}

/// AR(1) with intercept: `r_t = c + phi * r_{t-1}`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ar1 {
    pub intercept: f64,
    pub phi: f64,
}

impl Ar1 {
    /// Ordinary least squares on consecutive pairs. A window with no variance
    /// in the lagged values becomes a pure drift model at the window mean.
    pub fn fit(returns: &[f64]) -> Option<Self> {
        if returns.len() < MIN_FORECAST_WINDOW {
            return None;
        }
        let x = &returns[..returns.len() - 1];
        let y = &returns[1..];
        let (mx, my) = (mean(x), mean(y));
        let var_x: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
        if var_x < 1e-12 {
            return Some(Self {
                intercept: mean(returns),
                phi: 0.0,
            });
        }
        let cov: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
        let phi = (cov / var_x).clamp(-MAX_AR_COEFFICIENT, MAX_AR_COEFFICIENT);
        Some(Self {
            intercept: my - phi * mx,
            phi,
        })
    }

    /// Compound `horizon` predicted returns onto `value`
    pub fn project(&self, value: f64, last_return: f64, horizon: u32) -> f64 {
        let mut r = last_return;
        let mut level = value;
        for _ in 0..horizon {
            r = self.intercept + self.phi * r;
            level *= 1.0 + r;
        }
        level
    }
}

/// Sorted, de-duplicated, positive horizons
pub fn normalize_horizons(horizons: &[u32]) -> Vec<u32> {
    let mut h: Vec<u32> = horizons.iter().copied().filter(|h| *h > 0).collect();
    h.sort_unstable();
    h.dedup();
    h
}

/// Forecasts for every week with a complete trailing window of returns.
/// `prices` must be sorted by week.
pub fn forecasts(
    prices: &[GoldPriceRow],
    commodity: &str,
    window: usize,
    horizons: &[u32],
) -> Vec<Forecast> {
    let window = window.max(MIN_FORECAST_WINDOW);
    let horizons = normalize_horizons(horizons);
    let mut out = Vec::new();
    if horizons.is_empty() {
        return out;
    }

    for i in window..prices.len() {
        let returns: Option<Vec<f64>> =
            prices[i + 1 - window..=i].iter().map(|r| r.return_1w).collect();
        let Some(returns) = returns else { continue };
        let Some(model) = Ar1::fit(&returns) else { continue };
        let last = returns[returns.len() - 1];
        for &h in &horizons {
            out.push(Forecast {
                commodity: commodity.to_string(),
                week: prices[i].week,
                horizon_weeks: h,
                forecast_value: model.project(prices[i].value, last, h),
            });
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub regimes: TierWrite,
    pub forecasts: TierWrite,
}

#[instrument(skip(tiers, cfg), fields(commodity = %cfg.commodity))]
pub fn run_model(tiers: &TierStore, cfg: &PipelineConfig, at: DateTime<Utc>) -> Result<ModelSummary> {
    let mut prices: Vec<GoldPriceRow> =
        tiers.read_latest(Tier::Gold, SourceType::Prices.gold_table())?;
    let storage: Vec<GoldStorageRow> =
        tiers.read_latest(Tier::Gold, SourceType::Storage.gold_table())?;
    prices.sort_by_key(|r| r.week);

    let regime_rows = regimes(&prices, &storage, &cfg.commodity, cfg.high_vol_threshold);
    let forecast_rows = forecasts(
        &prices,
        &cfg.commodity,
        cfg.forecast_window_weeks,
        &cfg.forecast_horizons,
    );

    let regimes = tiers.write(Tier::Gold, GOLD_REGIMES_TABLE, &regime_rows, at)?;
    let forecasts = tiers.write(Tier::Gold, GOLD_FORECASTS_TABLE, &forecast_rows, at)?;
    info!(
        regimes = regimes.rows,
        forecasts = forecasts.rows,
        "model tables written"
    );
    Ok(ModelSummary { regimes, forecasts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn week(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap() + Duration::weeks(i as i64)
    }

    fn price_rows(values: &[f64]) -> Vec<GoldPriceRow> {
        let silver: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, v)| crate::types::SilverRow {
                week: week(i),
                series_id: "PET.RWTC.D".to_string(),
                source_type: SourceType::Prices,
                value: *v,
                source_date: week(i),
                filled: false,
            })
            .collect();
        super::super::gold::price_features(&silver)
    }

    #[test]
    fn classification_precedence() {
        assert_eq!(classify(-0.02, Some(0.08), Some(5.0), 0.05), RegimeLabel::RiskOff);
        assert_eq!(classify(0.02, Some(0.08), Some(-5.0), 0.05), RegimeLabel::TightSupply);
        assert_eq!(classify(-0.02, Some(0.01), Some(5.0), 0.05), RegimeLabel::Oversupplied);
        assert_eq!(classify(-0.02, None, Some(-5.0), 0.05), RegimeLabel::Balanced);
        assert_eq!(classify(0.02, None, None, 0.05), RegimeLabel::Balanced);
        assert_eq!(classify(0.0, Some(0.01), Some(-1.0), 0.05), RegimeLabel::Balanced);
    }

    #[test]
    fn regimes_skip_weeks_without_returns() {
        let prices = price_rows(&[100.0, 101.0, 99.0, 102.0, 103.0]);
        let storage = vec![GoldStorageRow {
            week: week(1),
            value: 420.0,
            inventory_delta: Some(-3.0),
        }];
        let states = regimes(&prices, &storage, "wti", 0.05);
        assert_eq!(states.len(), 4);
        assert_eq!(states[0].week, week(1));
        assert_eq!(states[0].regime_label, "tight_supply");
        assert!(states[..3].iter().all(|s| s.regime_score.is_none()));
        assert!(states[3].regime_score.is_some());
    }

    #[test]
    fn flat_prices_have_no_regime_score() {
        let prices = price_rows(&[100.0; 7]);
        assert_eq!(prices[4].vol_4w, Some(0.0));
        let states = regimes(&prices, &[], "wti", 0.05);
        assert_eq!(states.len(), 6);
        assert!(states.iter().all(|s| s.regime_label == "balanced"));
        assert!(states.iter().all(|s| s.regime_score.is_none()));
    }

    #[test]
    fn ar1_recovers_a_persistent_process() {
        let mut r = vec![0.05];
        for _ in 0..40 {
            let prev = r[r.len() - 1];
            r.push(0.001 + 0.5 * prev);
        }
        let model = Ar1::fit(&r).unwrap();
        assert!((model.phi - 0.5).abs() < 1e-9);
        assert!((model.intercept - 0.001).abs() < 1e-9);
    }

    #[test]
    fn flat_window_falls_back_to_drift() {
        let model = Ar1::fit(&[0.01, 0.01, 0.01, 0.01]).unwrap();
        assert_eq!(model.phi, 0.0);
        assert!((model.project(100.0, 0.01, 2) - 100.0 * 1.01 * 1.01).abs() < 1e-9);
    }

    #[test]
    fn coefficient_is_clamped() {
        let model = Ar1::fit(&[0.01, 0.02, 0.04, 0.08, 0.16]).unwrap();
        assert!(model.phi <= MAX_AR_COEFFICIENT);
    }

    #[test]
    fn forecasts_emit_each_horizon_once_per_eligible_week() {
        let values: Vec<f64> = (0..12).map(|i| 100.0 + (i as f64 * 1.3).sin() * 4.0).collect();
        let prices = price_rows(&values);
        let out = forecasts(&prices, "wti", 5, &[4, 1, 4, 0]);
        // weeks 5..=11 have five prior returns
        assert_eq!(out.len(), 7 * 2);
        assert_eq!(out[0].week, week(5));
        assert_eq!((out[0].horizon_weeks, out[1].horizon_weeks), (1, 4));
        assert!(out.iter().all(|f| f.forecast_value.is_finite() && f.forecast_value > 0.0));
    }

    #[test]
    fn horizons_are_normalized() {
        assert_eq!(normalize_horizons(&[13, 1, 0, 4, 1]), vec![1, 4, 13]);
    }
}
