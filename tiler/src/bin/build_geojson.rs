//! Exports the report collection as a GeoJSON point layer.
//!
//! Usage:
//!   cargo run --release --bin build_geojson
//!   cargo run --release --bin build_geojson -- \
//!     --input data/czml/weathernews.json \
//!     --output data/czml/weathernews.geojson

use std::path::PathBuf;

use clap::Parser;
use tiler::{build_timestamp, geojson::write_geojson, source::read_source};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(author, version, about = "Export reports as a GeoJSON FeatureCollection")]
struct Args {
    #[arg(long, default_value = "data/czml/weathernews.json")]
    input: PathBuf,

    #[arg(long, default_value = "data/czml/weathernews.geojson")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    tracing::info!("exporting {:?} to {:?}", args.input, args.output);

    let records = read_source(&args.input)?;
    let source = args.input.display().to_string();
    let collection = write_geojson(&records, &source, &args.output, build_timestamp())?;

    println!(
        "Wrote {} features to {}",
        collection.metadata.total_features,
        args.output.display()
    );
    Ok(())
}
