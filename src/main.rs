//! Tile Loader - fetch and cache raster map tiles from the command line.
//!
//! This binary builds a loader from CLI arguments, loads the requested tiles
//! concurrently and reports each outcome.

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_loader::{
    Config, FileStore, HttpFetcher, LoaderStats, MemoryStore, PersistentStore, RasterDecoder,
    TileId, TileImage, TileLoader,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let fetcher = match HttpFetcher::with_user_agent(&config.user_agent) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.cache_dir.clone() {
        Some(dir) => {
            info!("Persisting tiles under {}", dir.display());
            run(&config, fetcher, FileStore::new(dir)).await
        }
        None => {
            info!("No cache directory given; tiles are kept in memory only");
            run(&config, fetcher, MemoryStore::new()).await
        }
    }
}

/// Outcome of one tile, as printed with `--json`.
#[derive(Debug, Serialize)]
struct TileReport {
    tile: TileId,
    url: String,
    width: Option<u32>,
    height: Option<u32>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    tiles: Vec<TileReport>,
    stats: LoaderStats,
}

async fn run<S: PersistentStore + 'static>(
    config: &Config,
    fetcher: HttpFetcher,
    store: S,
) -> ExitCode {
    let loader_config = config.loader_config();

    info!("Configuration:");
    info!("  Base URL: {}", loader_config.base_url);
    info!("  Parallelism: {}", loader_config.parallelism);
    info!("  Cache capacity: {} tiles", loader_config.cache_capacity);
    match loader_config.fetch_timeout {
        Some(timeout) => info!("  Fetch timeout: {:?}", timeout),
        None => info!("  Fetch timeout: none"),
    }

    let loader = TileLoader::new(fetcher, store, RasterDecoder::new(), loader_config);

    let results = loader.load_tiles(config.tiles.iter().copied()).await;

    let tiles: Vec<TileReport> = config
        .tiles
        .iter()
        .zip(results)
        .map(|(id, result)| {
            let url = loader.urls().url(*id);
            match result {
                Ok(tile) => {
                    let (width, height) = tile.image.dimensions();
                    TileReport {
                        tile: *id,
                        url,
                        width: Some(width),
                        height: Some(height),
                        error: None,
                    }
                }
                Err(e) => TileReport {
                    tile: *id,
                    url,
                    width: None,
                    height: None,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    let failed = tiles.iter().filter(|t| t.error.is_some()).count();
    let report = RunReport {
        tiles,
        stats: loader.stats().await,
    };

    if config.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&report);
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_report(report: &RunReport) {
    for tile in &report.tiles {
        match (&tile.error, tile.width, tile.height) {
            (None, Some(width), Some(height)) => {
                println!("✓ {}  {}x{}", tile.tile, width, height)
            }
            (Some(e), _, _) => println!("✗ {}  {}", tile.tile, e),
            _ => println!("? {}", tile.tile),
        }
    }

    let stats = &report.stats;
    println!();
    println!(
        "{} network fetch(es), {} persisted hit(s), {} coalesced, {} failure(s)",
        stats.network_fetches, stats.persisted_hits, stats.coalesced, stats.failures
    );
    if stats.corrupt_recovered > 0 {
        println!("{} corrupt persisted tile(s) replaced", stats.corrupt_recovered);
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_loader=debug"
    } else {
        "tile_loader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
