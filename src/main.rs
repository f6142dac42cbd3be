//! Funding Rate Forecaster
//!
//! Fetches venue data, trains fold ensembles, forecasts the next funding
//! payment and serves the dashboard API.

use chrono::Utc;
use clap::{Parser, Subcommand};
use funding_forecast::{
    client::HyperliquidClient,
    config::Config,
    ml::Task,
    monitor::{start_dashboard, DashboardState},
    service::ForecastService,
    types::next_hour_ms,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "funding-forecast")]
#[command(about = "Forecast the next perpetual funding payment")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch funding history and candles, align them and write the CSVs
    Fetch {
        #[arg(long)]
        coin: Option<String>,
        #[arg(long)]
        interval: Option<String>,
        /// Days of history to fetch
        #[arg(long)]
        days: Option<i64>,
    },
    /// Train a fold ensemble from the merged CSV
    Train {
        /// regression | classification
        #[arg(long, default_value = "regression")]
        task: Task,
        #[arg(long)]
        merged_csv: Option<PathBuf>,
    },
    /// Forecast the next funding payment
    Infer {
        #[arg(long, default_value = "regression")]
        task: Task,
        /// Use a stored merged CSV instead of fresh venue data
        #[arg(long)]
        merged_csv: Option<PathBuf>,
    },
    /// Fetch, retrain the direction model, predict and log
    Live {
        /// Repeat at every funding hour
        #[arg(long = "loop")]
        repeat: bool,
    },
    /// Serve the dashboard API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show rolling accuracy of logged predictions
    Accuracy {
        #[arg(long)]
        days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Fetch {
            coin,
            interval,
            days,
        } => {
            if let Some(coin) = coin {
                config.api.coin = coin;
            }
            if let Some(interval) = interval {
                config.api.interval = interval;
            }
            if let Some(days) = days {
                config.api.history_days = days;
            }
            fetch(config).await
        }
        Commands::Train { task, merged_csv } => {
            let (service, _) = build_service(config)?;
            print_json(&service.train_from_csv(task, merged_csv.as_deref())?)
        }
        Commands::Infer { task, merged_csv } => infer(config, task, merged_csv).await,
        Commands::Live { repeat } => live(config, repeat).await,
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Commands::Accuracy { days } => {
            let (service, _) = build_service(config)?;
            let now = Utc::now();
            let days = days.unwrap_or(service.config().accuracy.window_days);
            let accuracy = service.rolling_accuracy(days, now).await;
            let last = service.last_comparison(now).await;
            print_json(&json!({ "accuracy": accuracy, "lastComparison": last }))
        }
    }
}

fn build_service(config: Config) -> anyhow::Result<(ForecastService, Arc<HyperliquidClient>)> {
    let client = Arc::new(HyperliquidClient::new(&config.api)?);
    let service = ForecastService::new(config, client.clone(), client.clone());
    Ok((service, client))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn fetch(config: Config) -> anyhow::Result<()> {
    let (service, client) = build_service(config)?;
    let coin = service.coin().to_string();
    if !client.coin_in_universe(&coin).await {
        anyhow::bail!("Coin {} not found in Hyperliquid universe", coin);
    }
    let report = service.fetch(Utc::now()).await?;
    print_json(&report)
}

async fn infer(config: Config, task: Task, merged_csv: Option<PathBuf>) -> anyhow::Result<()> {
    let (service, _) = build_service(config)?;

    match (merged_csv, task) {
        (Some(path), Task::Regression) => {
            let records = service.load_merged(&path)?;
            print_json(&service.regression_from_records(&records))
        }
        (Some(path), Task::Classification) => {
            let records = service.load_merged(&path)?;
            print_json(&service.classification_from_records(&records))
        }
        (None, Task::Regression) => print_json(&service.predict_regression(Utc::now()).await),
        (None, Task::Classification) => {
            print_json(&service.predict_classification(Utc::now()).await)
        }
    }
}

async fn live(config: Config, repeat: bool) -> anyhow::Result<()> {
    let (service, _) = build_service(config)?;
    tracing::info!("Starting live cycle for {}", service.coin());

    loop {
        match service.live_cycle(Utc::now()).await {
            Ok(report) => print_json(&report)?,
            Err(e) if repeat => tracing::error!("Live cycle failed: {}", e),
            Err(e) => return Err(e.into()),
        }
        if !repeat {
            return Ok(());
        }

        // Wake one second after the next funding hour
        let now_ms = Utc::now().timestamp_millis();
        let wait_ms = next_hour_ms(now_ms) - now_ms + 1_000;
        tracing::info!("Next cycle in {}s", wait_ms / 1_000);
        tokio::time::sleep(Duration::from_millis(wait_ms.max(0) as u64)).await;
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let (service, _) = build_service(config)?;

    let state = Arc::new(DashboardState::new(service));
    start_dashboard(state, &host, port)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}
