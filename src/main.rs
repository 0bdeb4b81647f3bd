//! Conduit CLI entry point

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "Incremental route code generator for Go API services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// File to write logs to, in addition to stderr
    #[arg(long, global = true)]
    logfile: Option<PathBuf>,

    /// Project root path (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate route files and the route registry, then exit
    Generate,
    /// Generate, then watch the project and regenerate on change
    Dev {
        /// Quiet period before regenerating, in milliseconds
        #[arg(long, default_value = "500")]
        debounce_ms: u64,
    },
    /// Run one generation pass and print cache statistics
    Stats,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let file_layer = match &cli.logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("conduit={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    tracing::debug!("Conduit v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Project root: {}", cli.root.display());

    match cli.command {
        Commands::Generate => commands::generate(&cli.root).map(|_| ()),
        Commands::Dev { debounce_ms } => commands::dev(&cli.root, debounce_ms).await,
        Commands::Stats => commands::stats(&cli.root),
        Commands::Version => {
            println!("Conduit v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
