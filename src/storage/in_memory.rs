use super::Store;
use crate::error::Result;
use crate::types::{Forecast, GoldFeature, RegimeState};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct Tables {
    features: BTreeMap<(String, NaiveDate, String), f64>,
    regimes: BTreeMap<(String, NaiveDate), (String, Option<f64>)>,
    forecasts: BTreeMap<(String, NaiveDate, u32), f64>,
}

/// In-process store for tests and `memory://`
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn migrate(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_features(&self, rows: &[GoldFeature]) -> Result<usize> {
        let mut t = self.tables();
        for row in rows {
            t.features.insert(
                (row.commodity.clone(), row.week, row.feature_name.clone()),
                row.feature_value,
            );
        }
        debug!(rows = rows.len(), "upserted features");
        Ok(rows.len())
    }

    async fn upsert_regimes(&self, rows: &[RegimeState]) -> Result<usize> {
        let mut t = self.tables();
        for row in rows {
            t.regimes.insert(
                (row.commodity.clone(), row.week),
                (row.regime_label.clone(), row.regime_score),
            );
        }
        Ok(rows.len())
    }

    async fn upsert_forecasts(&self, rows: &[Forecast]) -> Result<usize> {
        let mut t = self.tables();
        for row in rows {
            t.forecasts.insert(
                (row.commodity.clone(), row.week, row.horizon_weeks),
                row.forecast_value,
            );
        }
        Ok(rows.len())
    }

    async fn latest_regime(&self, commodity: &str) -> Result<Option<RegimeState>> {
        let t = self.tables();
        let latest = t
            .regimes
            .iter()
            .filter(|((c, _), _)| c == commodity)
            .next_back()
            .map(|((c, week), (label, score))| RegimeState {
                commodity: c.clone(),
                week: *week,
                regime_label: label.clone(),
                regime_score: *score,
            });
        Ok(latest)
    }

    async fn recent_features(&self, commodity: &str, limit: usize) -> Result<Vec<GoldFeature>> {
        let t = self.tables();
        let mut rows: Vec<GoldFeature> = t
            .features
            .iter()
            .filter(|((c, _, _), _)| c == commodity)
            .map(|((c, week, name), value)| GoldFeature {
                commodity: c.clone(),
                week: *week,
                feature_name: name.clone(),
                feature_value: *value,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.week
                .cmp(&a.week)
                .then_with(|| a.feature_name.cmp(&b.feature_name))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn latest_forecast(&self, commodity: &str, horizon_weeks: u32) -> Result<Option<Forecast>> {
        let t = self.tables();
        let latest = t
            .forecasts
            .iter()
            .filter(|((c, _, h), _)| c == commodity && *h == horizon_weeks)
            .max_by_key(|((_, week, _), _)| *week)
            .map(|((c, week, h), value)| Forecast {
                commodity: c.clone(),
                week: *week,
                horizon_weeks: *h,
                forecast_value: *value,
            });
        Ok(latest)
    }

    async fn clear(&self) -> Result<()> {
        *self.tables() = Tables::default();
        Ok(())
    }
}
