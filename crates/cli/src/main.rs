//! Ragent CLI: the main entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP API
//! - `ask`: Run one query through the orchestration loop
//! - `tools`: List the built-in tools
//! - `doctor`: Check configuration and model backend
//! - `onboard`: Write the default config and data directories

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ragent",
    about = "Ragent: local retrieval-augmented agent with tools",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a single question and stream the answer
    Ask {
        query: String,

        /// Document collection to retrieve from
        #[arg(short, long)]
        collection: Option<String>,

        /// Conversation id for history replay
        #[arg(long)]
        conversation: Option<String>,

        /// Skip document retrieval
        #[arg(long)]
        no_rag: bool,
    },

    /// List the tools the model can call
    Tools,

    /// Diagnose configuration and backend health
    Doctor,

    /// Initialize configuration and data directories
    Onboard,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ask {
            query,
            collection,
            conversation,
            no_rag,
        } => commands::ask::run(query, collection, conversation, no_rag).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}
