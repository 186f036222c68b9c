use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use tiler::create_router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(author, version, about = "Serve generated report data for local development")]
struct Args {
    /// Directory to serve (contains weathernews-tiles/ and the legacy file)
    #[arg(long, default_value = "data/czml")]
    dir: PathBuf,

    #[arg(long, default_value = "0.0.0.0:8080")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiler=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let app = create_router(&args.dir);

    tracing::info!("serving {} on http://{}", args.dir.display(), args.addr);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
