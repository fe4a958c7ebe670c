//! objsearch binary.
//!
//! Three operating modes: run the HTTP service, pre-load a catalog of known
//! objects into the vector store, or detect the main object of a single
//! image from disk.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use objsearch::config::AppConfig;
use objsearch::embedding::EmbedderClient;
use objsearch::server::{start_server, ServerState};
use objsearch::service::{Catalog, DetectorService};
use objsearch::store::PineconeStore;

#[derive(Parser)]
#[command(
    name = "objsearch",
    version,
    about = "Zero-shot object detection over a vector-store catalog"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service.
    Serve,
    /// Embed and upsert every item of a catalog file.
    Load {
        /// Path to the catalog JSON file.
        catalog: PathBuf,
    },
    /// Detect the main object of an image and print the ranked matches.
    Detect {
        /// Path to the image file.
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .with_target(false)
        .init();

    let service = build_service(&config)?;

    match cli.command {
        Command::Serve => {
            let state = Arc::new(ServerState::new(config, service)?);
            start_server(state).await?;
        }
        Command::Load { catalog } => {
            let catalog = Catalog::load(&catalog)?;
            service.load_catalog(&catalog).await?;
            println!("loaded {} catalog items", catalog.items.len());
        }
        Command::Detect { image } => {
            let results = service.detect(&image).await?;
            if results.is_empty() {
                println!("no match found");
            }
            for result in &results {
                let attributes = serde_json::Value::Object(result.attributes.clone());
                println!("{:.4} => {attributes}", result.score);
            }
        }
    }
    Ok(())
}

fn build_service(config: &AppConfig) -> anyhow::Result<Arc<DetectorService>> {
    let embedder = EmbedderClient::new(&config.backend_url, &config.backend_token)
        .with_retry(config.retry());
    let mut store = PineconeStore::new(
        &config.store_host,
        &config.store_api_key,
        &config.store_namespace,
    )?;
    if let Some(dimension) = config.store_dimension {
        store = store.with_dimension(dimension);
    }
    Ok(Arc::new(DetectorService::new(
        Arc::new(embedder),
        Arc::new(store),
    )))
}
