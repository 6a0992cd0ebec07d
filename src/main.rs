use anyhow::Context;
use clap::{Parser, Subcommand};
use oil_regime::apis::eia::EiaClient;
use oil_regime::config::Config;
use oil_regime::constants::{parse_source_list, SourceType};
use oil_regime::infra::http_client::ReqwestHttp;
use oil_regime::pipeline::bronze::{BronzeSummary, SourceOutcome};
use oil_regime::pipeline::tiers::TierWrite;
use oil_regime::pipeline::{Pipeline, RunSummary};
use oil_regime::storage::{open_store, Store};
use oil_regime::{logging, metrics, server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "oil-regime")]
#[command(about = "Energy-market ETL and regime/forecast API")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $OIL_REGIME_CONFIG or ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch EIA series into bronze tables
    Ingest {
        /// Sources to fetch (comma-separated). Available: prices, storage, supply
        #[arg(long)]
        sources: Option<String>,
        /// Fetch even when a series was fetched recently
        #[arg(long)]
        bypass_cadence: bool,
    },
    /// Align the latest bronze tables to the weekly grid
    Clean,
    /// Build gold feature tables from silver
    Features,
    /// Classify regimes and produce forecasts from gold features
    Model,
    /// Upsert gold tables into the database
    Load,
    /// Every stage in order, ingest through load
    Run {
        #[arg(long)]
        sources: Option<String>,
        #[arg(long)]
        bypass_cadence: bool,
    },
    /// Serve the read-only HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Delete all rows from the database tables
    ClearDatabase,
}

fn eia_client(config: &Config) -> anyhow::Result<EiaClient> {
    let api_key = config.require_api_key()?;
    let http = ReqwestHttp::new(config.eia.timeout_seconds)?;
    Ok(EiaClient::new(Arc::new(http), config.eia.base_url.clone(), api_key))
}

async fn database(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    let url = config.require_database_url()?;
    open_store(url)
        .await
        .with_context(|| "opening database")
}

fn selected_sources(list: Option<&str>) -> anyhow::Result<Vec<SourceType>> {
    parse_source_list(list).map_err(anyhow::Error::msg)
}

fn print_bronze(summary: &BronzeSummary) {
    println!("📥 Bronze:");
    for (source, outcome) in &summary.outcomes {
        match outcome {
            SourceOutcome::Written {
                path,
                rows,
                duplicate,
                ..
            } => {
                let note = if *duplicate { " (payload unchanged)" } else { "" };
                println!("   {source}: {rows} rows -> {}{note}", path.display());
            }
            SourceOutcome::SkippedCadence => println!("   {source}: skipped, fetched recently"),
            SourceOutcome::Failed(msg) => println!("   {source}: FAILED {msg}"),
        }
    }
}

fn print_tables(stage: &str, written: &[(SourceType, TierWrite)]) {
    println!("{stage}:");
    for (_, w) in written {
        println!("   {} rows -> {}", w.rows, w.path.display());
    }
}

fn print_run(summary: &RunSummary) {
    if let Some(bronze) = &summary.bronze {
        print_bronze(bronze);
    }
    print_tables("🧹 Silver", &summary.silver);
    print_tables("🏅 Gold", &summary.gold);
    println!(
        "📈 Model: {} regimes, {} forecasts",
        summary.model.regimes.rows, summary.model.forecasts.rows
    );
    println!(
        "💾 Loaded: {} features, {} regimes, {} forecasts",
        summary.load.features, summary.load.regimes, summary.load.forecasts
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    metrics::init_metrics();

    let cli = Cli::parse();
    let config = Config::load_from(cli.config.as_deref())?;
    let pipeline = Pipeline::new(config.clone());

    let outcome = match cli.command {
        Commands::Ingest {
            sources,
            bypass_cadence,
        } => {
            let sources = selected_sources(sources.as_deref())?;
            let client = eia_client(&config)?;
            let gateway = pipeline.open_gateway()?;
            pipeline
                .ingest(&client, &gateway, sources, bypass_cadence)
                .await
                .map(|s| print_bronze(&s))
        }
        Commands::Clean => pipeline.clean().map(|w| print_tables("🧹 Silver", &w)),
        Commands::Features => pipeline.features().map(|w| print_tables("🏅 Gold", &w)),
        Commands::Model => pipeline.model().map(|m| {
            println!(
                "📈 Model: {} regimes, {} forecasts",
                m.regimes.rows, m.forecasts.rows
            )
        }),
        Commands::Load => {
            let store = database(&config).await?;
            pipeline.load(store.as_ref()).await.map(|s| {
                println!(
                    "💾 Loaded: {} features, {} regimes, {} forecasts",
                    s.features, s.regimes, s.forecasts
                )
            })
        }
        Commands::Run {
            sources,
            bypass_cadence,
        } => {
            let sources = selected_sources(sources.as_deref())?;
            let client = eia_client(&config)?;
            let gateway = pipeline.open_gateway()?;
            let store = database(&config).await?;
            pipeline
                .run_all(&client, &gateway, store.as_ref(), sources, bypass_cadence)
                .await
                .map(|s| print_run(&s))
        }
        Commands::Serve { port } => {
            let store = database(&config).await?;
            let port = port.unwrap_or(config.server.port);
            server::start_server(store, port).await?;
            Ok(())
        }
        Commands::ClearDatabase => {
            let store = database(&config).await?;
            store.clear().await.map(|_| println!("🗑️  Database cleared"))
        }
    };

    if let Err(e) = outcome {
        error!("command failed: {}", e);
        return Err(e.into());
    }
    info!("done");
    Ok(())
}
