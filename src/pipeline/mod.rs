//! Batch ETL: bronze ingest, silver weekly alignment, gold features and
//! model outputs, then load into the serving store.
//!
//! Every stage reads the newest file the previous stage wrote under
//! `{data_root}/{tier}/{table}/` and writes a new timestamped file of its own.

pub mod bronze;
pub mod demo;
pub mod gold;
pub mod load;
pub mod model;
pub mod silver;
pub mod tiers;

use crate::apis::eia::EiaClient;
use crate::config::Config;
use crate::constants::SourceType;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::metrics::TierMetrics;
use crate::storage::Store;
use bronze::{BronzeOptions, BronzeSummary};
use chrono::Utc;
use load::LoadSummary;
use model::ModelSummary;
use std::time::Instant;
use tiers::{TierStore, TierWrite};
use tracing::info;

/// Stage outputs of a full run
#[derive(Debug)]
pub struct RunSummary {
    /// `None` when the run started from existing bronze files
    pub bronze: Option<BronzeSummary>,
    pub silver: Vec<(SourceType, TierWrite)>,
    pub gold: Vec<(SourceType, TierWrite)>,
    pub model: ModelSummary,
    pub load: LoadSummary,
}

pub struct Pipeline {
    config: Config,
    tiers: TierStore,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let tiers = TierStore::new(config.storage.data_root.clone());
        Self { config, tiers }
    }

    pub fn tiers(&self) -> &TierStore {
        &self.tiers
    }

    pub fn open_gateway(&self) -> anyhow::Result<Gateway> {
        Gateway::open(self.config.storage.data_root.join("raw"))
    }

    pub async fn ingest(
        &self,
        client: &EiaClient,
        gateway: &Gateway,
        sources: Vec<SourceType>,
        bypass_cadence: bool,
    ) -> Result<BronzeSummary> {
        let opts = BronzeOptions {
            sources,
            bypass_cadence,
            min_fetch_interval_secs: self.config.pipeline.min_fetch_interval_secs,
        };
        timed("bronze", bronze::run_bronze(client, gateway, &self.tiers, &opts)).await
    }

    pub fn clean(&self) -> Result<Vec<(SourceType, TierWrite)>> {
        let started = Instant::now();
        let out = silver::run_silver(&self.tiers, self.config.pipeline.max_fill_weeks, Utc::now());
        TierMetrics::record_stage_duration("silver", started.elapsed().as_secs_f64());
        out
    }

    pub fn features(&self) -> Result<Vec<(SourceType, TierWrite)>> {
        let started = Instant::now();
        let out = gold::run_gold(&self.tiers, Utc::now());
        TierMetrics::record_stage_duration("gold", started.elapsed().as_secs_f64());
        out
    }

    pub fn model(&self) -> Result<ModelSummary> {
        let started = Instant::now();
        let out = model::run_model(&self.tiers, &self.config.pipeline, Utc::now());
        TierMetrics::record_stage_duration("model", started.elapsed().as_secs_f64());
        out
    }

    pub async fn load(&self, store: &dyn Store) -> Result<LoadSummary> {
        timed(
            "load",
            load::run_load(&self.tiers, store, &self.config.pipeline.commodity),
        )
        .await
    }

    /// Every stage after ingest, in order
    pub async fn transform_and_load(&self, store: &dyn Store) -> Result<RunSummary> {
        let silver = self.clean()?;
        let gold = self.features()?;
        let model = self.model()?;
        let load = self.load(store).await?;
        Ok(RunSummary {
            bronze: None,
            silver,
            gold,
            model,
            load,
        })
    }

    pub async fn run_all(
        &self,
        client: &EiaClient,
        gateway: &Gateway,
        store: &dyn Store,
        sources: Vec<SourceType>,
        bypass_cadence: bool,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let bronze = self.ingest(client, gateway, sources, bypass_cadence).await?;
        let mut summary = self.transform_and_load(store).await?;
        summary.bronze = Some(bronze);
        info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            features = summary.load.features,
            regimes = summary.load.regimes,
            forecasts = summary.load.forecasts,
            "pipeline run complete"
        );
        Ok(summary)
    }
}

async fn timed<T>(stage: &str, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    let started = Instant::now();
    let out = fut.await;
    TierMetrics::record_stage_duration(stage, started.elapsed().as_secs_f64());
    out
}
