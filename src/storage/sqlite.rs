use super::Store;
use crate::error::{PipelineError, Result};
use crate::metrics::StoreMetrics;
use crate::types::{Forecast, GoldFeature, RegimeState};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS gold_features (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    commodity     VARCHAR(32)  NOT NULL,
    week          DATE         NOT NULL,
    feature_name  VARCHAR(128) NOT NULL,
    feature_value REAL         NOT NULL,
    created_at    TIMESTAMP    NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (commodity, week, feature_name)
);
CREATE INDEX IF NOT EXISTS idx_gold_features_commodity ON gold_features (commodity);
CREATE INDEX IF NOT EXISTS idx_gold_features_week ON gold_features (week);
CREATE INDEX IF NOT EXISTS idx_gold_features_feature_name ON gold_features (feature_name);

CREATE TABLE IF NOT EXISTS regime_states (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    commodity     VARCHAR(32) NOT NULL,
    week          DATE        NOT NULL,
    regime_label  VARCHAR(64) NOT NULL,
    regime_score  REAL,
    created_at    TIMESTAMP   NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (commodity, week)
);
CREATE INDEX IF NOT EXISTS idx_regime_states_commodity ON regime_states (commodity);
CREATE INDEX IF NOT EXISTS idx_regime_states_week ON regime_states (week);
CREATE INDEX IF NOT EXISTS idx_regime_states_label ON regime_states (regime_label);

CREATE TABLE IF NOT EXISTS forecasts (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    commodity      VARCHAR(32) NOT NULL,
    week           DATE        NOT NULL,
    horizon_weeks  INTEGER     NOT NULL,
    forecast_value REAL        NOT NULL,
    created_at     TIMESTAMP   NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (commodity, week, horizon_weeks)
);
CREATE INDEX IF NOT EXISTS idx_forecasts_commodity ON forecasts (commodity);
CREATE INDEX IF NOT EXISTS idx_forecasts_week ON forecasts (week);
CREATE INDEX IF NOT EXISTS idx_forecasts_horizon ON forecasts (horizon_weeks);
"#;

/// Where a `database_url` points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    Memory,
    File(PathBuf),
}

/// Accepts `sqlite://path`, `sqlite:path`, `sqlite::memory:`, `:memory:` or a bare path
pub fn parse_database_url(url: &str) -> Result<SqliteTarget> {
    let url = url.trim();
    if url.is_empty() {
        return Err(PipelineError::Config("database url is empty".to_string()));
    }
    if url == ":memory:" || url == "sqlite::memory:" || url == "sqlite://:memory:" {
        return Ok(SqliteTarget::Memory);
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    if path.contains("://") {
        return Err(PipelineError::Config(format!(
            "unsupported database url '{url}' (expected a sqlite url or path)"
        )));
    }
    if path.is_empty() {
        return Err(PipelineError::Config(format!("database url '{url}' has no path")));
    }
    Ok(SqliteTarget::File(PathBuf::from(path)))
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(database_url: &str) -> Result<Self> {
        let conn = match parse_database_url(database_url)? {
            SqliteTarget::Memory => Connection::open_in_memory()?,
            SqliteTarget::File(path) => {
                ensure_parent(&path)?;
                info!(path = %path.display(), "opening sqlite store");
                Connection::open(path)?
            }
        };
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn parse_week(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| PipelineError::Parse(format!("stored week '{raw}': {e}")))
}

fn observe<T>(operation: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let result = f();
    if result.is_err() {
        StoreMetrics::record_query_error(operation);
    }
    result
}

#[async_trait]
impl Store for SqliteStore {
    async fn migrate(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        debug!("sqlite schema ready");
        Ok(())
    }

    async fn upsert_features(&self, rows: &[GoldFeature]) -> Result<usize> {
        let written = observe("upsert_features", || {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO gold_features (commodity, week, feature_name, feature_value)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (commodity, week, feature_name)
                     DO UPDATE SET feature_value = excluded.feature_value",
                )?;
                for row in rows {
                    stmt.execute(params![
                        row.commodity,
                        row.week.format(DATE_FORMAT).to_string(),
                        row.feature_name,
                        row.feature_value
                    ])?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })?;
        StoreMetrics::record_rows_upserted("gold_features", written);
        Ok(written)
    }

    async fn upsert_regimes(&self, rows: &[RegimeState]) -> Result<usize> {
        let written = observe("upsert_regimes", || {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO regime_states (commodity, week, regime_label, regime_score)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (commodity, week)
                     DO UPDATE SET regime_label = excluded.regime_label,
                                   regime_score = excluded.regime_score",
                )?;
                for row in rows {
                    stmt.execute(params![
                        row.commodity,
                        row.week.format(DATE_FORMAT).to_string(),
                        row.regime_label,
                        row.regime_score
                    ])?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })?;
        StoreMetrics::record_rows_upserted("regime_states", written);
        Ok(written)
    }

    async fn upsert_forecasts(&self, rows: &[Forecast]) -> Result<usize> {
        let written = observe("upsert_forecasts", || {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO forecasts (commodity, week, horizon_weeks, forecast_value)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (commodity, week, horizon_weeks)
                     DO UPDATE SET forecast_value = excluded.forecast_value",
                )?;
                for row in rows {
                    stmt.execute(params![
                        row.commodity,
                        row.week.format(DATE_FORMAT).to_string(),
                        row.horizon_weeks,
                        row.forecast_value
                    ])?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })?;
        StoreMetrics::record_rows_upserted("forecasts", written);
        Ok(written)
    }

    async fn latest_regime(&self, commodity: &str) -> Result<Option<RegimeState>> {
        let row = observe("latest_regime", || {
            self.conn()
                .query_row(
                    "SELECT week, regime_label, regime_score FROM regime_states
                     WHERE commodity = ?1 ORDER BY week DESC LIMIT 1",
                    params![commodity],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, Option<f64>>(2)?,
                        ))
                    },
                )
                .optional()
                .map_err(PipelineError::from)
        })?;
        row.map(|(week, regime_label, regime_score)| {
            Ok(RegimeState {
                commodity: commodity.to_string(),
                week: parse_week(&week)?,
                regime_label,
                regime_score,
            })
        })
        .transpose()
    }

    async fn recent_features(&self, commodity: &str, limit: usize) -> Result<Vec<GoldFeature>> {
        let rows = observe("recent_features", || {
            let conn = self.conn();
            let mut stmt = conn.prepare_cached(
                "SELECT week, feature_name, feature_value FROM gold_features
                 WHERE commodity = ?1
                 ORDER BY week DESC, feature_name ASC
                 LIMIT ?2",
            )?;
            let mapped = stmt.query_map(params![commodity, limit as i64], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, f64>(2)?,
                ))
            })?;
            mapped
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(PipelineError::from)
        })?;
        rows.into_iter()
            .map(|(week, feature_name, feature_value)| {
                Ok(GoldFeature {
                    commodity: commodity.to_string(),
                    week: parse_week(&week)?,
                    feature_name,
                    feature_value,
                })
            })
            .collect()
    }

    async fn latest_forecast(&self, commodity: &str, horizon_weeks: u32) -> Result<Option<Forecast>> {
        let row = observe("latest_forecast", || {
            self.conn()
                .query_row(
                    "SELECT week, forecast_value FROM forecasts
                     WHERE commodity = ?1 AND horizon_weeks = ?2
                     ORDER BY week DESC LIMIT 1",
                    params![commodity, horizon_weeks],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?)),
                )
                .optional()
                .map_err(PipelineError::from)
        })?;
        row.map(|(week, forecast_value)| {
            Ok(Forecast {
                commodity: commodity.to_string(),
                week: parse_week(&week)?,
                horizon_weeks,
                forecast_value,
            })
        })
        .transpose()
    }

    async fn clear(&self) -> Result<()> {
        self.conn().execute_batch(
            "DELETE FROM gold_features; DELETE FROM regime_states; DELETE FROM forecasts;",
        )?;
        info!("cleared all store tables");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn week(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    async fn memory_store() -> SqliteStore {
        let store = SqliteStore::open("sqlite::memory:").unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[test]
    fn url_forms() {
        assert_eq!(parse_database_url("sqlite::memory:").unwrap(), SqliteTarget::Memory);
        assert_eq!(parse_database_url(":memory:").unwrap(), SqliteTarget::Memory);
        assert_eq!(
            parse_database_url("sqlite://data/oil.db").unwrap(),
            SqliteTarget::File(PathBuf::from("data/oil.db"))
        );
        assert_eq!(
            parse_database_url("sqlite:///var/lib/oil.db").unwrap(),
            SqliteTarget::File(PathBuf::from("/var/lib/oil.db"))
        );
        assert_eq!(
            parse_database_url("oil.db").unwrap(),
            SqliteTarget::File(PathBuf::from("oil.db"))
        );
        assert!(parse_database_url("postgresql://localhost/oil").is_err());
        assert!(parse_database_url("  ").is_err());
    }

    #[tokio::test]
    async fn file_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("oil.db");
        let store = SqliteStore::open(&format!("sqlite://{}", path.display())).unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn upserts_are_idempotent() {
        let store = memory_store().await;
        let features = vec![
            GoldFeature {
                commodity: "wti".into(),
                week: week(5),
                feature_name: "price".into(),
                feature_value: 72.0,
            },
            GoldFeature {
                commodity: "wti".into(),
                week: week(5),
                feature_name: "inventory".into(),
                feature_value: 430.0,
            },
        ];
        store.upsert_features(&features).await.unwrap();
        store.upsert_features(&features).await.unwrap();
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM gold_features", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let mut changed = features[0].clone();
        changed.feature_value = 73.5;
        store.upsert_features(&[changed]).await.unwrap();
        let rows = store.recent_features("wti", 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].feature_name, "inventory");
        assert_eq!(rows[1].feature_value, 73.5);
    }

    #[tokio::test]
    async fn latest_rows_are_by_week() {
        let store = memory_store().await;
        store
            .upsert_regimes(&[
                RegimeState {
                    commodity: "wti".into(),
                    week: week(12),
                    regime_label: "risk_off".into(),
                    regime_score: None,
                },
                RegimeState {
                    commodity: "wti".into(),
                    week: week(5),
                    regime_label: "balanced".into(),
                    regime_score: Some(0.4),
                },
            ])
            .await
            .unwrap();
        let latest = store.latest_regime("wti").await.unwrap().unwrap();
        assert_eq!((latest.week, latest.regime_label.as_str()), (week(12), "risk_off"));
        assert_eq!(latest.regime_score, None);
        assert!(store.latest_regime("brent").await.unwrap().is_none());

        store
            .upsert_forecasts(&[
                Forecast { commodity: "wti".into(), week: week(5), horizon_weeks: 4, forecast_value: 70.0 },
                Forecast { commodity: "wti".into(), week: week(12), horizon_weeks: 4, forecast_value: 71.0 },
                Forecast { commodity: "wti".into(), week: week(19), horizon_weeks: 1, forecast_value: 72.0 },
            ])
            .await
            .unwrap();
        let f = store.latest_forecast("wti", 4).await.unwrap().unwrap();
        assert_eq!((f.week, f.forecast_value), (week(12), 71.0));
        assert!(store.latest_forecast("wti", 13).await.unwrap().is_none());

        store.clear().await.unwrap();
        assert!(store.latest_forecast("wti", 4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_week_is_a_parse_error() {
        let store = memory_store().await;
        store
            .conn()
            .execute(
                "INSERT INTO regime_states (commodity, week, regime_label) VALUES ('wti', 'soon', 'balanced')",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.latest_regime("wti").await,
            Err(PipelineError::Parse(_))
        ));
    }
}
