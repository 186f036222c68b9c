#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::DateTime;
use serde::Serialize;
use serde_json::{json, Value};
use shared::TileKey;
use streamer::{FetchError, HeadlessRenderer, StreamerConfig, TileFetcher};
use tiler::{TileBuilder, TileBuilderConfig, TileSet};
use tokio::sync::Semaphore;

pub const INDEX_PATH: &str = "weathernews-tiles/index.json";
pub const SEARCH_PATH: &str = "weathernews-tiles/search.json";
pub const LEGACY_PATH: &str = "weathernews.json";

pub const TOKYO: (f64, f64) = (139.8, 35.6);
pub const OSAKA: (f64, f64) = (135.5, 34.69);
pub const ALTITUDE_M: f64 = 60_000.0;

#[derive(Default)]
struct Files {
    files: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// In-memory document store that records every fetch and can hold a path
/// until the test releases it.
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    inner: Arc<Files>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, bytes: Vec<u8>) {
        self.inner.files.lock().unwrap().insert(path.to_string(), bytes);
    }

    pub fn insert_json<T: Serialize>(&self, path: &str, value: &T) {
        self.insert(path, serde_json::to_vec(value).unwrap());
    }

    pub fn remove(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.files.lock().unwrap().remove(path)
    }

    /// Fetches of `path` wait for a permit on the returned semaphore.
    pub fn gate(&self, path: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.inner
            .gates
            .lock()
            .unwrap()
            .insert(path.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn calls_for(&self, path: &str) -> usize {
        self.inner.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    pub fn total_calls(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }
}

impl TileFetcher for MemoryFetcher {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        self.inner.calls.lock().unwrap().push(path.to_string());
        let gate = self.inner.gates.lock().unwrap().get(path).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let found = self.inner.files.lock().unwrap().get(path).cloned();
        found.ok_or_else(|| FetchError::Status {
            url: path.to_string(),
            status: 404,
        })
    }
}

pub fn record(id: &str, lon: f64, lat: f64, text: &str) -> Value {
    json!({
        "id": id,
        "text": text,
        "position": {"cartographicDegrees": [lon, lat, 0]}
    })
}

/// Four reports around Tokyo Bay (three on screen from the default camera,
/// one just east of it) and three elsewhere in Japan.
pub fn japan_records() -> Vec<Value> {
    vec![
        record("bay-1", 139.80, 35.60, "<p>Flooded underpass in Shinagawa</p>"),
        record("bay-2", 139.85, 35.62, "Power outage"),
        record("bay-3", 139.95, 35.35, "Shelter open at school"),
        record("bay-edge", 140.60, 35.60, "Landslide warning"),
        record("sendai", 140.87, 38.26, "River level rising"),
        record("osaka", 135.50, 34.69, "Road closed"),
        record("sapporo", 141.35, 43.06, "Heavy snow"),
    ]
}

pub fn bay_ids() -> [&'static str; 4] {
    ["bay-1", "bay-2", "bay-3", "bay-edge"]
}

pub fn build(records: Vec<Value>) -> TileSet {
    TileBuilder::new(TileBuilderConfig::default()).build(records)
}

/// Publishes manifest, search file and tiles under the default paths.
pub fn publish(fetcher: &MemoryFetcher, records: Vec<Value>) -> TileSet {
    let set = build(records);
    let generated_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    fetcher.insert_json(INDEX_PATH, &set.manifest(generated_at));
    fetcher.insert_json(SEARCH_PATH, &set.search_file(generated_at));
    for payload in &set.tiles {
        fetcher.insert_json(&tile_fetch_path(&payload.tile), payload);
    }
    set
}

pub fn tile_fetch_path(key: &TileKey) -> String {
    format!("weathernews-tiles/tiles/{}", key.filename())
}

pub fn tile_of(lon: f64, lat: f64) -> TileKey {
    TileKey::containing(lon, lat, shared::DEFAULT_TILE_ZOOM)
}

pub fn renderer_at((lon, lat): (f64, f64)) -> HeadlessRenderer {
    let mut renderer = HeadlessRenderer::new(1280.0, 720.0);
    renderer.look_at(lon, lat, ALTITUDE_M);
    renderer
}

pub fn config() -> StreamerConfig {
    StreamerConfig::default()
}
