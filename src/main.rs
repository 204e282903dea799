use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cofounder::commands::{ask, check, reindex, serve, show_status};
use cofounder::config::{Config, get_config_dir, run_interactive_config, show_config};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cofounder")]
#[command(about = "An AI co-founder that answers questions from your team's history")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the model provider and server settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Start the HTTP API and the background indexer
    Serve {
        /// Address to bind, overrides the configured host
        #[arg(long)]
        host: Option<String>,
        /// Port to bind, overrides the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ask the co-founder a question about a space
    Ask {
        /// Space whose history is searched
        #[arg(long)]
        space: String,
        /// Number of history rows to retrieve
        #[arg(long)]
        limit: Option<usize>,
        query: String,
    },
    /// Show embedding queue statistics
    Status,
    /// Re-embed every source, or only those of one space
    Reindex {
        #[arg(long)]
        space: Option<String>,
        /// Drop all stored embeddings first
        #[arg(long)]
        reset: bool,
    },
    /// Compare stored embeddings with the team data
    Check {
        /// Remove orphaned embeddings and queue missing ones
        #[arg(long)]
        fix: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            let base_dir = get_config_dir()?;
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Serve { host, port } => {
            serve(load_config()?, host, port).await?;
        }
        Commands::Ask {
            space,
            limit,
            query,
        } => {
            ask(load_config()?, space, query, limit).await?;
        }
        Commands::Status => {
            show_status(load_config()?).await?;
        }
        Commands::Reindex { space, reset } => {
            reindex(load_config()?, space, reset).await?;
        }
        Commands::Check { fix } => {
            check(load_config()?, fix).await?;
        }
    }

    Ok(())
}

fn load_config() -> Result<Config> {
    Config::load_default().context("Failed to load configuration")
}
