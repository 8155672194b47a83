use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "edutrack",
    version,
    about = "Learning-management backend with progress tracking and CRM sync",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (defaults to EDUTRACK_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API server
    Serve,

    /// Run one CRM sync and exit
    Sync,

    /// Recompute course completion flags
    Reconcile {
        /// Only this course id
        #[arg(long)]
        course: Option<String>,
    },

    /// Create the database schema
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = edutrack::metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    tracing::info!("edutrack starting");

    match cli.command {
        Commands::Serve => {
            tracing::info!(bind = %config.server.bind_address, "Starting serve command");
            commands::serve(config).await?;
        }

        Commands::Sync => {
            tracing::info!(base_url = %config.sync.base_url, "Starting sync command");
            commands::sync(config).await?;
        }

        Commands::Reconcile { course } => {
            tracing::info!(course = ?course, "Starting reconcile command");
            commands::reconcile(config, course).await?;
        }

        Commands::Migrate => {
            tracing::info!("Starting migrate command");
            commands::migrate(config).await?;
        }
    }

    tracing::info!("edutrack completed successfully");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("edutrack=debug,tower_http=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("edutrack={level},warn")))?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        "text" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        other => anyhow::bail!("unknown log format '{other}', expected text or json"),
    }

    Ok(())
}
