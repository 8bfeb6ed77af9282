//! Stock Price Forecasting CLI
//!
//! Train LSTM forecasters on daily price history and serve multi-day
//! closing price forecasts.

use clap::{Parser, Subcommand};
use stockcast::{
    config::Config,
    data::HistoryRange,
    service::{ForecastRequest, Services, TrainingJob},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stockcast")]
#[command(about = "LSTM stock price forecasting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast closing prices for a ticker
    Forecast {
        symbol: String,
        /// Days to forecast
        #[arg(long)]
        horizon: Option<usize>,
        /// Artifact key
        #[arg(long)]
        key: Option<String>,
        /// History to fetch, e.g. 2y or 2022-01-01..2024-01-01
        #[arg(long)]
        range: Option<String>,
    },
    /// Train a forecaster and publish it as a new artifact version
    Train {
        #[arg(long)]
        key: Option<String>,
        /// Comma-separated tickers (defaults to training.symbols)
        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,
        #[arg(long)]
        range: Option<String>,
    },
    /// Score a stored forecaster on a ticker's history
    Evaluate {
        symbol: String,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        range: Option<String>,
    },
    /// Print closing price history
    History {
        symbol: String,
        #[arg(long)]
        range: Option<String>,
    },
    /// List stored artifacts
    Artifacts {
        /// Only this key
        #[arg(long)]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Forecast {
            symbol,
            horizon,
            key,
            range,
        } => forecast(config, symbol, horizon, key, range).await,
        Commands::Train { key, symbols, range } => train(config, key, symbols, range).await,
        Commands::Evaluate { symbol, key, range } => evaluate(config, &symbol, key, range).await,
        Commands::History { symbol, range } => history(config, &symbol, range).await,
        Commands::Artifacts { key } => list_artifacts(config, key),
    }
}

fn parse_range(range: Option<String>) -> anyhow::Result<Option<HistoryRange>> {
    Ok(range.as_deref().map(HistoryRange::parse).transpose()?)
}

async fn forecast(
    config: Config,
    symbol: String,
    horizon: Option<usize>,
    key: Option<String>,
    range: Option<String>,
) -> anyhow::Result<()> {
    let services = Services::from_config(&config)?;
    let request = ForecastRequest {
        symbol,
        range: parse_range(range)?,
        horizon,
        key,
    };

    let result = services.forecast.forecast(request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn train(
    config: Config,
    key: Option<String>,
    symbols: Option<Vec<String>>,
    range: Option<String>,
) -> anyhow::Result<()> {
    let services = Services::from_config(&config)?;
    let job = TrainingJob {
        key: key.unwrap_or_else(|| config.forecast.default_key.clone()),
        symbols: symbols.unwrap_or_else(|| config.training.symbols.clone()),
        range: match parse_range(range)? {
            Some(range) => range,
            None => HistoryRange::parse(&config.training.range)?,
        },
    };

    tracing::info!("Starting training job for '{}'", job.key);
    let artifact = services.training.spawn(job).await??;
    let manifest = &artifact.manifest;

    println!("\n✅ Trained {} {}\n", manifest.key, manifest.version_label());
    println!("Run:      {}", manifest.run_id);
    println!("Symbols:  {}", manifest.symbols.join(", "));
    for skipped in &manifest.skipped_symbols {
        println!("Skipped:  {} ({})", skipped.symbol, skipped.reason);
    }
    println!(
        "Epochs:   {} (best {} at loss {:.6}{})",
        manifest.report.epochs_run,
        manifest.report.best_epoch,
        manifest.report.best_loss,
        if manifest.report.stopped_early { ", stopped early" } else { "" }
    );
    Ok(())
}

async fn evaluate(
    config: Config,
    symbol: &str,
    key: Option<String>,
    range: Option<String>,
) -> anyhow::Result<()> {
    let services = Services::from_config(&config)?;
    let key = key.unwrap_or_else(|| config.forecast.default_key.clone());
    let range = match parse_range(range)? {
        Some(range) => range,
        None => HistoryRange::parse(&config.forecast.range)?,
    };

    let report = services.evaluation.evaluate(symbol, &key, &range).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn history(config: Config, symbol: &str, range: Option<String>) -> anyhow::Result<()> {
    let services = Services::from_config(&config)?;
    let history = services.forecast.history(symbol, parse_range(range)?).await?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}

fn list_artifacts(config: Config, key: Option<String>) -> anyhow::Result<()> {
    let services = Services::from_config(&config)?;
    let store = services.registry.store();

    let keys = match key {
        Some(key) => vec![key],
        None => store.keys()?,
    };
    if keys.is_empty() {
        println!("No artifacts in {}", store.root().display());
        return Ok(());
    }

    println!("\n📦 Artifacts in {}\n", store.root().display());
    println!(
        "{:<12} {:>7} {:>8} {:<20} {:>10} {}",
        "Key", "Version", "Current", "Created", "Loss", "Symbols"
    );
    println!("{}", "-".repeat(80));

    for key in keys {
        let current = store.current_version(&key)?;
        for manifest in store.manifests(&key)? {
            println!(
                "{:<12} {:>7} {:>8} {:<20} {:>10.6} {}",
                key,
                manifest.version_label(),
                if current == Some(manifest.version) { "*" } else { "" },
                manifest.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                manifest.report.best_loss,
                manifest.symbols.join(",")
            );
        }
    }
    Ok(())
}
