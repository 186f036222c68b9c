pub mod builder;
pub mod clusters;
pub mod error;
pub mod geojson;
pub mod source;

use std::path::Path;

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};

pub use builder::{BuildStats, TileBuilder, TileBuilderConfig, TileSet};
pub use error::BuildError;

/// Static router over a generated tile directory. Missing files answer 404.
pub fn create_router(tiles_root: impl AsRef<Path>) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(tiles_root.as_ref()))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
}

/// `generatedAt` stamp for build output: `SOURCE_DATE_EPOCH` when set, so a
/// rebuild of the same input is byte-identical, otherwise the current time.
pub fn build_timestamp() -> DateTime<Utc> {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}
