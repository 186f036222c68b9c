//! Headless streaming probe
//!
//! Points a headless camera at a location, streams the tiles under it and
//! prints what would be rendered. Handy for checking a deployed tile set.
//!
//! Usage:
//!   cargo run --bin stream_probe -- --source http://localhost:8080/
//!   cargo run --bin stream_probe -- --source data/czml --lon 139.8 --lat 35.6 --altitude 60000 --search flood

use clap::Parser;
use streamer::{
    DirFetcher, HeadlessRenderer, HttpFetcher, StartMode, StreamerConfig, TileFetcher, TileStreamer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(author, version, about = "Stream report tiles for one camera position")]
struct Args {
    /// Base URL (http://...) or local directory holding the tile set
    #[arg(long, default_value = "data/czml")]
    source: String,

    /// Camera longitude in degrees
    #[arg(long, default_value_t = 139.8, allow_hyphen_values = true)]
    lon: f64,

    /// Camera latitude in degrees
    #[arg(long, default_value_t = 35.6, allow_hyphen_values = true)]
    lat: f64,

    /// Camera altitude in meters
    #[arg(long, default_value_t = 60_000.0)]
    altitude: f64,

    #[arg(long, default_value_t = 1280.0)]
    width: f64,

    #[arg(long, default_value_t = 720.0)]
    height: f64,

    /// Apply a text search after loading
    #[arg(long)]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,streamer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = StreamerConfig::from_env();
    tracing::info!("🛰️  Probe parameters:");
    tracing::info!("  Source: {}", args.source);
    tracing::info!("  Camera: ({}, {}) at {} m", args.lon, args.lat, args.altitude);

    if args.source.starts_with("http://") || args.source.starts_with("https://") {
        let fetcher = HttpFetcher::new(&args.source)?;
        probe(config, fetcher, &args).await
    } else {
        probe(config, DirFetcher::new(&args.source), &args).await
    }
}

async fn probe<F: TileFetcher>(
    config: StreamerConfig,
    fetcher: F,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut renderer = HeadlessRenderer::new(args.width, args.height);
    renderer.look_at(args.lon, args.lat, args.altitude);
    let streamer = TileStreamer::new(config, fetcher, renderer);

    match streamer.start().await? {
        StartMode::Tiled {
            zoom,
            tiles,
            total_reports,
        } => {
            println!("Manifest: {tiles} tiles, {total_reports} reports at z={zoom}");
            let mut loaded: Vec<_> = streamer.loaded_tile_keys().into_iter().collect();
            loaded.sort();
            println!("Loaded tiles ({}):", loaded.len());
            for key in loaded {
                println!("  {key}");
            }
        }
        StartMode::Legacy { reports } => {
            println!("Legacy report file: {reports} reports");
        }
    }

    if let Some(query) = &args.search {
        let matches = streamer.apply_search(query).unwrap_or(0);
        println!("Search {query:?}: {matches} matching reports");
    }

    let stats = streamer.update_visibility();
    println!(
        "Rendered {} reports, {} visible, {} culled",
        streamer.current_loaded_report_count(),
        stats.shown,
        stats.hidden
    );
    streamer.teardown();
    Ok(())
}
