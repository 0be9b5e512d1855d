//!
//! src/main.rs  Oct 18th, 2025
//!
//! Wires configuration, logging, storage, and the catalog client into the
//! track service and exposes its operations as subcommands.
//!

mod acquisition;
mod cache;
mod config;
mod download;
mod errors;
mod fetch;
mod logging;
mod persistent;
mod service;
mod sink;
mod token;
mod types;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::errors::ServiceError;

/// Track metadata acquisition keyed by ISRC
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a track from the catalog unless it is already stored
    Create {
        isrc: String
    },
    /// Show a stored track
    Get {
        isrc: String
    },
    /// Write a stored track's cover image to a file
    Cover {
        isrc: String,
        #[arg(short, long)]
        out: PathBuf
    }
}

async fn build_service(cfgs: &config::AppConfig) -> Result<service::TrackService, ServiceError> {
    let db     = persistent::Persistent::init(&cfgs.persistence.db_url).await?;
    let covers = sink::LocalCoverStore::new(&cfgs.persistence.cover_root)?;

    let spotify = fetch::SpotifyClient::new(&cfgs.http, &cfgs.spotify)?;
    let catalog = fetch::SpotifyCatalog::new(spotify);
    let fetcher: Arc<dyn download::ByteFetcher> = Arc::new(fetch::HttpByteFetcher::new(&cfgs.http)?);
    let downloader = download::RetryingDownloader::new(fetcher, cfgs.http.retry.clone());

    let acquirer = acquisition::Acquirer::new(
        Arc::new(db),
        Arc::new(covers),
        Arc::new(catalog),
        downloader
    );
    Ok(service::TrackService::new(Arc::new(acquirer), cfgs.service.public_base_url.clone()))
}

async fn run(cli: Cli, svc: &service::TrackService) -> Result<(), ServiceError> {
    match cli.command {
        Commands::Create { isrc } => {
            let (status, body) = svc.create_track(&isrc).await?;
            info!(status, isrc = %body.isrc, "cli.create");
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Get { isrc } => {
            let (_, body) = svc.get_track(&isrc).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Cover { isrc, out } => {
            let cover = svc.get_cover(&isrc).await?;
            tokio::fs::write(&out, &cover.bytes).await?;
            println!("{} ({}, {} bytes)", out.display(), cover.content_type, cover.bytes.len());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfgs = match config::load_config() {
        Ok(cfgs) => cfgs,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let _logger = match logging::init_logging(&cfgs.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match build_service(&cfgs).await {
        Ok(svc) => run(cli, &svc).await,
        Err(e) => Err(e)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, status = e.status_code(), "cli.failed");
            eprintln!("{} {}", e.status_code(), e.public_message());
            ExitCode::FAILURE
        }
    }
}
