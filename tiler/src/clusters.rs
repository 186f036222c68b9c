//! Precomputed per-zoom cluster summaries for overview rendering.

use std::{collections::HashMap, fs, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{FORMAT_VERSION, LegacyRecord, TileKey};

use crate::error::BuildError;

pub const DEFAULT_CLUSTER_ZOOMS: [u8; 9] = [4, 5, 6, 7, 8, 9, 10, 11, 12];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub tile: TileKey,
    pub count: usize,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterFile {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub zoom: u8,
    pub cluster_count: usize,
    pub total_reports: usize,
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLevel {
    pub zoom: u8,
    pub file: String,
    pub cluster_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIndex {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub total_reports: usize,
    pub levels: Vec<ClusterLevel>,
}

struct Accumulator {
    key: TileKey,
    count: usize,
    lon_sum: f64,
    lat_sum: f64,
}

/// Valid `(lon, lat)` pairs of a source collection.
pub fn valid_points(records: &[Value]) -> Vec<(f64, f64)> {
    records
        .iter()
        .filter_map(|value| LegacyRecord::from_value(value.clone()).ok()?.coordinates().ok())
        .collect()
}

/// One cluster per non-empty tile at `zoom`, positioned at the mean of its
/// members and sorted by descending size.
pub fn build_clusters(points: &[(f64, f64)], zoom: u8) -> Vec<Cluster> {
    let mut buckets: Vec<Accumulator> = Vec::new();
    let mut slots: HashMap<TileKey, usize> = HashMap::new();

    for &(lon, lat) in points {
        let key = TileKey::containing(lon, lat, zoom);
        let slot = *slots.entry(key).or_insert_with(|| {
            buckets.push(Accumulator {
                key,
                count: 0,
                lon_sum: 0.0,
                lat_sum: 0.0,
            });
            buckets.len() - 1
        });
        let bucket = &mut buckets[slot];
        bucket.count += 1;
        bucket.lon_sum += lon;
        bucket.lat_sum += lat;
    }

    let mut clusters: Vec<Cluster> = buckets
        .into_iter()
        .map(|b| Cluster {
            id: format!("cluster-{}", b.key),
            tile: b.key,
            count: b.count,
            lon: b.lon_sum / b.count as f64,
            lat: b.lat_sum / b.count as f64,
        })
        .collect();
    clusters.sort_by(|a, b| b.count.cmp(&a.count));
    clusters
}

/// Write `clusters-z{zoom}.json` for every zoom plus an `index.json`.
pub fn write_clusters(
    records: &[Value],
    zooms: &[u8],
    out_dir: &Path,
    generated_at: DateTime<Utc>,
) -> Result<ClusterIndex, BuildError> {
    fs::create_dir_all(out_dir)?;
    let points = valid_points(records);
    let mut levels = Vec::with_capacity(zooms.len());

    for &zoom in zooms {
        let clusters = build_clusters(&points, zoom);
        let file = format!("clusters-z{zoom}.json");
        let document = ClusterFile {
            version: FORMAT_VERSION,
            generated_at,
            zoom,
            cluster_count: clusters.len(),
            total_reports: records.len(),
            clusters,
        };
        fs::write(out_dir.join(&file), serde_json::to_vec(&document)?)?;
        tracing::debug!("z={} -> {} clusters", zoom, document.cluster_count);
        levels.push(ClusterLevel {
            zoom,
            file,
            cluster_count: document.cluster_count,
        });
    }

    let index = ClusterIndex {
        version: FORMAT_VERSION,
        generated_at,
        total_reports: records.len(),
        levels,
    };
    fs::write(out_dir.join("index.json"), serde_json::to_vec(&index)?)?;
    Ok(index)
}
