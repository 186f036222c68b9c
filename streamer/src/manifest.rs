use std::collections::HashMap;

use shared::{TileEntry, TileKey, TileManifest, FORMAT_VERSION};

use crate::error::StreamError;
use crate::fetch::{fetch_json, TileFetcher};

/// Manifest keyed for constant-time membership checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestIndex {
    pub zoom: u8,
    pub total_reports: usize,
    entries: HashMap<TileKey, TileEntry>,
}

impl ManifestIndex {
    /// Entries at a zoom other than the manifest's are dropped.
    pub fn from_manifest(manifest: TileManifest) -> Self {
        if manifest.version != FORMAT_VERSION {
            tracing::warn!(
                "manifest format version {} (expected {FORMAT_VERSION})",
                manifest.version
            );
        }
        let zoom = manifest.zoom;
        let mut entries = HashMap::with_capacity(manifest.tiles.len());
        for entry in manifest.tiles {
            if entry.key.zoom != zoom {
                tracing::warn!("ignoring tile {} listed in a z={zoom} manifest", entry.key);
                continue;
            }
            entries.insert(entry.key, entry);
        }
        Self {
            zoom,
            total_reports: manifest.total_reports,
            entries,
        }
    }

    /// Single-tile manifest wrapping a fully materialized dataset.
    pub fn single(key: TileKey, path: impl Into<String>, count: usize) -> Self {
        let entry = TileEntry {
            key,
            path: path.into(),
            count,
        };
        Self {
            zoom: key.zoom,
            total_reports: count,
            entries: HashMap::from([(key, entry)]),
        }
    }

    pub fn get(&self, key: &TileKey) -> Option<&TileEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &TileKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub async fn load_manifest<F: TileFetcher>(fetcher: &F, path: &str) -> Result<ManifestIndex, StreamError> {
    let manifest: TileManifest = fetch_json(fetcher, path)
        .await
        .map_err(StreamError::ManifestUnavailable)?;
    let index = ManifestIndex::from_manifest(manifest);
    tracing::info!(
        "manifest loaded: {} tiles, {} reports at z={}",
        index.len(),
        index.total_reports,
        index.zoom
    );
    Ok(index)
}
