//! Floodgate CLI entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use floodgate::infrastructure::config::ConfigLoader;
use floodgate::infrastructure::counter::{server, CounterClient};
use floodgate::infrastructure::logging::init_tracing;

#[derive(Parser)]
#[command(
    name = "floodgate",
    version,
    about = "Distributed per-minute quota counter for LLM and speech-to-text workers"
)]
struct Cli {
    /// Path to a configuration file (defaults to ./floodgate.yaml plus
    /// FLOODGATE_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the counter service
    Counter {
        /// Override the configured listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Query a running counter and print all group snapshots
    Status {
        /// Override the configured counter base URL
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config.logging);

    match cli.command {
        Commands::Counter { port } => {
            let mut counter_config = config.counter.clone();
            if let Some(port) = port {
                counter_config.port = port;
            }
            server::serve(&counter_config).await
        }
        Commands::Status { base_url } => {
            let mut client_config = config.client.clone();
            if let Some(base_url) = base_url {
                client_config.base_url = base_url;
            }
            let client = CounterClient::new(&client_config)?;

            let completion = client
                .status()
                .await
                .context("Failed to fetch completion status")?;
            let embedding = client
                .status_embedding()
                .await
                .context("Failed to fetch embedding status")?;
            let transcription = client
                .status_transcription()
                .await
                .context("Failed to fetch transcription status")?;

            let report = serde_json::json!({
                "completion": completion,
                "embedding": embedding,
                "transcription": transcription,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
