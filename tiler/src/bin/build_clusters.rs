use std::path::PathBuf;

use clap::Parser;
use tiler::{
    build_timestamp,
    clusters::{DEFAULT_CLUSTER_ZOOMS, write_clusters},
    source::read_source,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(author, version, about = "Precompute per-zoom report clusters")]
struct Args {
    #[arg(long, default_value = "data/czml/weathernews.json")]
    input: PathBuf,

    #[arg(long, default_value = "data/czml/weathernews-clusters")]
    output: PathBuf,

    /// Comma separated zoom levels (defaults to 4 through 12)
    #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u8).range(0..=20))]
    zooms: Vec<u8>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let zooms = if args.zooms.is_empty() {
        DEFAULT_CLUSTER_ZOOMS.to_vec()
    } else {
        args.zooms
    };
    tracing::info!("building clusters from {:?} into {:?}", args.input, args.output);

    let records = read_source(&args.input)?;
    let index = write_clusters(&records, &zooms, &args.output, build_timestamp())?;

    let summary: Vec<String> = index
        .levels
        .iter()
        .map(|level| format!("z{}={}", level.zoom, level.cluster_count))
        .collect();
    println!("Generated precomputed clusters: {}", summary.join(", "));

    Ok(())
}
