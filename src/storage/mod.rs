pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::{Forecast, GoldFeature, RegimeState};
use async_trait::async_trait;
use std::sync::Arc;

/// Serving store for the gold outputs.
///
/// Writes are upserts on the natural key of each table, so reloading the same
/// gold files leaves the store unchanged.
#[async_trait]
pub trait Store: Send + Sync {
    /// Create tables and indexes if they do not exist
    async fn migrate(&self) -> Result<()>;

    async fn upsert_features(&self, rows: &[GoldFeature]) -> Result<usize>;
    async fn upsert_regimes(&self, rows: &[RegimeState]) -> Result<usize>;
    async fn upsert_forecasts(&self, rows: &[Forecast]) -> Result<usize>;

    /// Regime of the most recent week
    async fn latest_regime(&self, commodity: &str) -> Result<Option<RegimeState>>;

    /// Newest weeks first, feature names ascending within a week
    async fn recent_features(&self, commodity: &str, limit: usize) -> Result<Vec<GoldFeature>>;

    /// Forecast for `horizon_weeks` made in the most recent week
    async fn latest_forecast(&self, commodity: &str, horizon_weeks: u32) -> Result<Option<Forecast>>;

    /// Delete every row of every table
    async fn clear(&self) -> Result<()>;
}

/// Open the store named by `database_url` and make sure its schema exists.
///
/// `memory://` selects the in-process store; anything else is handed to SQLite.
pub async fn open_store(database_url: &str) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = if database_url.trim() == "memory://" {
        Arc::new(InMemoryStore::new())
    } else {
        Arc::new(SqliteStore::open(database_url)?)
    };
    store.migrate().await?;
    Ok(store)
}
