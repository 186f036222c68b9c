use std::path::PathBuf;

use shared::TileKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid resource location: {0}")]
    InvalidUrl(String),
    #[error("invalid JSON document: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("tile manifest unavailable: {0}")]
    ManifestUnavailable(#[source] FetchError),
    #[error("tile {key} could not be loaded: {source}")]
    TileFetchFailed {
        key: TileKey,
        #[source]
        source: FetchError,
    },
    #[error("legacy report file unavailable: {0}")]
    LegacyFetchFailed(#[source] FetchError),
    #[error("no manifest has been loaded")]
    NotInitialized,
}
