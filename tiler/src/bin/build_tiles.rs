//! Tile generation tool for the disaster report globe
//!
//! Splits the monolithic report file into fixed-zoom tiles plus a manifest
//! and a flattened search index.
//!
//! Usage:
//!   cargo run --release --bin build_tiles
//!   cargo run --release --bin build_tiles -- \
//!     --input data/czml/weathernews.json \
//!     --output data/czml/weathernews-tiles \
//!     --zoom 9

use std::path::PathBuf;

use clap::Parser;
use tiler::{TileBuilder, TileBuilderConfig, build_timestamp, source::read_source};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(author, version, about = "Partition the report collection into map tiles")]
struct Args {
    /// Monolithic report file (JSON array of records with position.cartographicDegrees)
    #[arg(long, default_value = "data/czml/weathernews.json")]
    input: PathBuf,

    /// Directory receiving index.json, search.json and tiles/
    #[arg(long, default_value = "data/czml/weathernews-tiles")]
    output: PathBuf,

    /// Tile grid zoom level
    #[arg(long, default_value_t = shared::DEFAULT_TILE_ZOOM, value_parser = clap::value_parser!(u8).range(0..=20))]
    zoom: u8,

    /// Skip writing search.json
    #[arg(long)]
    no_search: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    tracing::info!("🔧 Tile build parameters:");
    tracing::info!("  Input: {}", args.input.display());
    tracing::info!("  Output dir: {}", args.output.display());
    tracing::info!("  Zoom: {}", args.zoom);

    let records = read_source(&args.input)?;
    let builder = TileBuilder::new(TileBuilderConfig {
        zoom: args.zoom,
        write_search: !args.no_search,
    });
    let tile_set = builder.build(records);
    let manifest = tile_set.write_to(&args.output, build_timestamp())?;

    tracing::info!("🎉 Tile build complete!");
    tracing::info!("  Processed: {} records", tile_set.stats.processed);
    tracing::info!("  Dropped: {} records", tile_set.stats.dropped());

    println!(
        "Generated {} tiles for {} reports at z={} ({} records processed, {} dropped)",
        manifest.tiles.len(),
        manifest.total_reports,
        manifest.zoom,
        tile_set.stats.processed,
        tile_set.stats.dropped()
    );

    Ok(())
}
