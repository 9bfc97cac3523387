use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use tokenseer::config;
use tokenseer::monitoring::ReportLogger;
use tokenseer::TokenAnalyzer;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more tokens by symbol, name or CoinGecko id
    Analyze {
        #[arg(required = true)]
        tokens: Vec<String>,

        /// Append a summary of each analysis to the report log
        #[arg(long)]
        save: bool,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Create cache and report directories and check API keys
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    match cli.command {
        Some(Commands::Analyze {
            tokens,
            save,
            pretty,
        }) => run_analysis(&tokens, save, pretty).await?,
        Some(Commands::Init) => {
            info!("Initializing TokenSeer configuration...");
            config::initialize_config().await?;
        }
        None => {
            info!("No command specified. Use --help for available commands.");
        }
    }

    Ok(())
}

async fn run_analysis(tokens: &[String], save: bool, pretty: bool) -> Result<()> {
    info!("Loading configuration...");
    let config = Arc::new(config::load_config().await?);

    let analyzer = TokenAnalyzer::new(config.clone())
        .await
        .context("building token analyzer")?;
    let logger = if save {
        Some(ReportLogger::new(&config.reports_dir)?)
    } else {
        None
    };

    let analyses = analyzer.analyze_many(tokens).await;

    if let Some(logger) = &logger {
        for analysis in &analyses {
            if let Err(e) = logger.log_analysis(analysis).await {
                error!("Failed to log analysis of {}: {}", analysis.query, e);
            }
        }
    }

    let output = if analyses.len() == 1 {
        serde_json::to_value(&analyses[0])?
    } else {
        serde_json::to_value(&analyses)?
    };
    let rendered = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);

    let metrics = analyzer.cache().metrics();
    info!(
        "Cache: {} hits, {} misses, {} writes",
        metrics.hits, metrics.misses, metrics.writes
    );

    Ok(())
}
