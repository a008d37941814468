//! Tabula CLI: run the analytics pipeline over CSV files from the terminal.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Tabula: analytics and forecasting for messy tabular data
#[derive(Parser, Debug)]
#[command(name = "tabula", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (holds .tabula/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Directory datasets are read from (defaults to the workspace)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// LLM model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Try the remote offload platform before computing locally
    #[arg(long, conflicts_with = "no_offload")]
    offload: bool,

    /// Always compute locally
    #[arg(long)]
    no_offload: bool,

    /// Language for narrative output (e.g. en, es, de)
    #[arg(short, long)]
    language: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the full dashboard pipeline and print the result as JSON
    Dashboard {
        /// Dataset id (file name without extension)
        dataset: String,
    },
    /// Show how each column was typed after refinement
    Refine {
        /// Dataset id
        dataset: String,
    },
    /// Forecast a value column by month
    Forecast {
        /// Dataset id
        dataset: String,
        /// Date column
        #[arg(long, default_value = "date")]
        date_column: String,
        /// Value column to forecast
        #[arg(long, default_value = "value")]
        value_column: String,
        /// Months to predict
        #[arg(long, default_value = "3")]
        horizon: usize,
    },
    /// Build the causal network over numeric columns
    Causal {
        /// Dataset id
        dataset: String,
    },
    /// Audit raw data quality and suggest cleaning steps
    Clean {
        /// Dataset id
        dataset: String,
    },
    /// Compare two datasets
    Compare {
        /// First dataset id
        first: String,
        /// Second dataset id
        second: String,
        /// Extra instructions for the comparison narrative
        #[arg(long)]
        instructions: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a default .tabula/config.toml into the workspace
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = tabula_core::config::log_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tabula.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Commands::Config { action } = cli.command {
        return commands::handle_config(action, &workspace);
    }

    let mut config = tabula_core::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    // Apply CLI overrides
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if cli.offload {
        config.offload.enabled = true;
    } else if cli.no_offload {
        config.offload.enabled = false;
    }
    if let Some(language) = &cli.language {
        config.pipeline.language = Some(language.clone());
    }

    let data_dir = cli.data_dir.unwrap_or_else(|| workspace.clone());
    let session = commands::Session::new(config, workspace, data_dir);
    commands::handle_command(cli.command, &session).await
}
