//! Grove CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use config::GroveConfig;

#[derive(Parser)]
#[command(name = "grove")]
#[command(about = "Incremental explorer for a remote code graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to ./grove.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the local explorer server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Open browser automatically
        #[arg(short, long)]
        open: bool,
    },
    /// Print the top-level nodes
    Roots,
    /// Print the children of a node
    Expand { id: String },
    /// Print the breadcrumb chain leading to a node
    Focus { id: String },
    /// Search the graph by name
    Search {
        query: String,

        #[arg(short, long)]
        limit: Option<u32>,

        /// Only return nodes of this type
        #[arg(short = 't', long = "type")]
        kind: Option<String>,
    },
    /// Clear the local cache
    ClearCache,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("grove={}", log_level)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = GroveConfig::load(cli.config.as_deref())?;
    tracing::debug!("Grove v{} with {:?}", env!("CARGO_PKG_VERSION"), config);

    match cli.command {
        Commands::Serve { port, host, open } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            commands::serve(config, open).await
        }
        Commands::Roots => commands::roots(config).await,
        Commands::Expand { id } => commands::expand(config, id).await,
        Commands::Focus { id } => commands::focus(config, id).await,
        Commands::Search { query, limit, kind } => {
            commands::search(config, query, limit, kind).await
        }
        Commands::ClearCache => commands::clear_cache(config).await,
        Commands::Version => {
            println!("Grove v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
