use std::{
    collections::{HashMap, HashSet},
    fs,
    path::Path,
};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde_json::Value;
use shared::{
    CompactReport, FORMAT_VERSION, LegacyRecord, SearchEntry, SearchFile, TileEntry, TileKey,
    TileManifest, TilePayload,
};

use crate::error::BuildError;

pub const MANIFEST_FILE: &str = "index.json";
pub const SEARCH_FILE: &str = "search.json";
pub const TILES_DIR: &str = "tiles";

#[derive(Debug, Clone, Copy)]
pub struct TileBuilderConfig {
    pub zoom: u8,
    /// Also emit the flattened search file.
    pub write_search: bool,
}

impl Default for TileBuilderConfig {
    fn default() -> Self {
        Self {
            zoom: shared::DEFAULT_TILE_ZOOM,
            write_search: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Records present in the source collection.
    pub processed: usize,
    /// Records written into some tile.
    pub valid: usize,
    /// Records without usable coordinates.
    pub dropped_invalid: usize,
    /// Records whose id was already taken by an earlier record.
    pub dropped_duplicate: usize,
}

impl BuildStats {
    pub fn dropped(&self) -> usize {
        self.dropped_invalid + self.dropped_duplicate
    }
}

/// In-memory result of bucketing a report collection.
#[derive(Debug, Clone)]
pub struct TileSet {
    pub zoom: u8,
    /// Non-empty tiles, ordered by the first report each received.
    pub tiles: Vec<TilePayload>,
    pub search: Vec<SearchEntry>,
    /// Whether `search` was collected and belongs on disk.
    pub write_search: bool,
    pub stats: BuildStats,
}

pub struct TileBuilder {
    config: TileBuilderConfig,
}

impl TileBuilder {
    pub fn new(config: TileBuilderConfig) -> Self {
        Self { config }
    }

    /// Bucket every record with valid coordinates into its tile.
    ///
    /// Records keep their source order inside a tile and tiles keep the order
    /// of their first record, so equal input always yields equal output.
    pub fn build(&self, records: Vec<Value>) -> TileSet {
        let zoom = self.config.zoom;
        let mut stats = BuildStats {
            processed: records.len(),
            ..BuildStats::default()
        };
        let mut tiles: Vec<TilePayload> = Vec::new();
        let mut tile_slots: HashMap<TileKey, usize> = HashMap::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut search = Vec::new();

        for (index, value) in records.into_iter().enumerate() {
            let compact = match LegacyRecord::from_value(value).and_then(|r| r.to_compact(index)) {
                Ok(compact) => compact,
                Err(_) => {
                    stats.dropped_invalid += 1;
                    continue;
                }
            };
            if !seen_ids.insert(compact.id.clone()) {
                stats.dropped_duplicate += 1;
                continue;
            }

            let key = compact_tile_key(&compact, zoom);
            if self.config.write_search {
                search.push(SearchEntry {
                    id: compact.id.clone(),
                    text: format!("{} {}", compact.name, compact.text).trim().to_string(),
                    tile: key,
                });
            }

            let slot = *tile_slots.entry(key).or_insert_with(|| {
                tiles.push(TilePayload {
                    version: FORMAT_VERSION,
                    tile: key,
                    count: 0,
                    reports: Vec::new(),
                });
                tiles.len() - 1
            });
            let payload = &mut tiles[slot];
            payload.reports.push(compact);
            payload.count = payload.reports.len();
            stats.valid += 1;
        }

        if stats.dropped() > 0 {
            tracing::warn!(
                "dropped {} records ({} without usable coordinates, {} duplicate ids)",
                stats.dropped(),
                stats.dropped_invalid,
                stats.dropped_duplicate
            );
        }

        TileSet {
            zoom,
            tiles,
            search,
            write_search: self.config.write_search,
            stats,
        }
    }
}

impl TileSet {
    pub fn manifest(&self, generated_at: DateTime<Utc>) -> TileManifest {
        TileManifest {
            version: FORMAT_VERSION,
            generated_at,
            zoom: self.zoom,
            total_reports: self.stats.valid,
            tiles: self
                .tiles
                .iter()
                .map(|payload| TileEntry {
                    key: payload.tile,
                    path: tile_path(&payload.tile),
                    count: payload.count,
                })
                .collect(),
        }
    }

    pub fn search_file(&self, generated_at: DateTime<Utc>) -> SearchFile {
        SearchFile {
            version: FORMAT_VERSION,
            generated_at,
            total_reports: self.search.len(),
            reports: self.search.clone(),
        }
    }

    /// Write payloads, manifest and (when built) the search file under `out_dir`.
    ///
    /// Files left in `tiles/` by an earlier build are removed first, as is an
    /// earlier `search.json` when this build has none.
    pub fn write_to(&self, out_dir: &Path, generated_at: DateTime<Utc>) -> Result<TileManifest, BuildError> {
        let tiles_dir = out_dir.join(TILES_DIR);
        fs::create_dir_all(&tiles_dir)?;
        let removed = clean_dir_files(&tiles_dir)?;
        if removed > 0 {
            tracing::info!("removed {} stale tile files from {}", removed, tiles_dir.display());
        }

        self.tiles.par_iter().try_for_each(|payload| -> Result<(), BuildError> {
            let bytes = serde_json::to_vec(payload)?;
            fs::write(out_dir.join(tile_path(&payload.tile)), bytes)?;
            Ok(())
        })?;

        let manifest = self.manifest(generated_at);
        fs::write(out_dir.join(MANIFEST_FILE), serde_json::to_vec(&manifest)?)?;

        let search_path = out_dir.join(SEARCH_FILE);
        if self.write_search {
            let search = self.search_file(generated_at);
            fs::write(&search_path, serde_json::to_vec(&search)?)?;
        } else if search_path.is_file() {
            fs::remove_file(&search_path)?;
            tracing::info!("removed stale {}", search_path.display());
        }

        tracing::debug!("wrote {} tile payloads to {}", self.tiles.len(), tiles_dir.display());
        Ok(manifest)
    }
}

/// Manifest-relative path of a tile payload.
pub fn tile_path(key: &TileKey) -> String {
    format!("{TILES_DIR}/{}", key.filename())
}

fn compact_tile_key(report: &CompactReport, zoom: u8) -> TileKey {
    // `to_compact` only succeeds with both coordinates present.
    TileKey::containing(report.lon.unwrap_or_default(), report.lat.unwrap_or_default(), zoom)
}

fn clean_dir_files(dir: &Path) -> Result<usize, BuildError> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn report(id: &str, lon: f64, lat: f64) -> Value {
        json!({
            "id": id,
            "name": id,
            "text": format!("<p>{id} text</p>"),
            "position": {"cartographicDegrees": [lon, lat, 0.0]}
        })
    }

    fn build(records: Vec<Value>) -> TileSet {
        TileBuilder::new(TileBuilderConfig::default()).build(records)
    }

    fn timestamp() -> DateTime<Utc> {
        DateTime::from_timestamp(1_300_000_000, 0).unwrap()
    }

    #[test]
    fn buckets_by_tile_in_encounter_order() {
        let set = build(vec![
            report("sendai", 140.87, 38.26),
            report("tokyo", 139.767, 35.681),
            report("sendai-2", 140.871, 38.261),
        ]);
        assert_eq!(set.tiles.len(), 2);
        assert_eq!(set.tiles[0].tile, TileKey::containing(140.87, 38.26, 9));
        assert_eq!(set.tiles[1].tile, TileKey::new(9, 454, 201));
        let ids: Vec<_> = set.tiles[0].reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["sendai", "sendai-2"]);
        assert_eq!(set.tiles[0].count, 2);
    }

    #[test]
    fn invalid_and_duplicate_records_are_counted_not_fatal() {
        let set = build(vec![
            report("a", 140.0, 38.0),
            json!({"id": "b", "position": {"cartographicDegrees": [140.0, "NaN"]}}),
            json!({"id": "c"}),
            json!(17),
            report("a", 141.0, 39.0),
        ]);
        assert_eq!(
            set.stats,
            BuildStats {
                processed: 5,
                valid: 1,
                dropped_invalid: 3,
                dropped_duplicate: 1,
            }
        );
    }

    #[test]
    fn non_string_display_fields_do_not_drop_a_record() {
        let set = build(vec![json!({
            "id": "n",
            "name": 311,
            "text": "Flood",
            "position": {"cartographicDegrees": [139.8, 35.6]}
        })]);
        assert_eq!(set.stats.valid, 1);
        assert_eq!(set.stats.dropped_invalid, 0);
        assert_eq!(set.tiles.len(), 1);
        assert_eq!(set.tiles[0].reports[0].name, "311");
        assert_eq!(set.search[0].text, "311 Flood");
    }

    #[test]
    fn manifest_totals_match_tile_counts() {
        let set = build(vec![
            report("a", 140.0, 38.0),
            report("b", -73.9, 40.7),
            report("c", 140.0, 38.0),
        ]);
        let manifest = set.manifest(timestamp());
        assert_eq!(manifest.total_reports, 3);
        assert_eq!(manifest.tile_report_sum(), 3);
        assert!(manifest.tiles.iter().all(|t| t.count > 0));
        assert_eq!(manifest.tiles[0].path, "tiles/9_455_197.json");
    }

    #[test]
    fn search_entries_point_at_owning_tile() {
        let set = build(vec![report("a", 140.0, 38.0)]);
        assert_eq!(set.search.len(), 1);
        assert_eq!(set.search[0].text, "a a text");
        assert_eq!(set.search[0].tile, set.tiles[0].tile);
    }

    #[test]
    fn search_can_be_disabled() {
        let builder = TileBuilder::new(TileBuilderConfig {
            write_search: false,
            ..TileBuilderConfig::default()
        });
        assert!(builder.build(vec![report("a", 140.0, 38.0)]).search.is_empty());
    }

    #[test]
    fn writes_files_and_removes_stale_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(TILES_DIR).join("9_0_0.json");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "{}").unwrap();

        let set = build(vec![report("a", 140.0, 38.0), report("b", 139.767, 35.681)]);
        let manifest = set.write_to(dir.path(), timestamp()).unwrap();

        assert!(!stale.exists());
        for entry in &manifest.tiles {
            let bytes = fs::read(dir.path().join(&entry.path)).unwrap();
            let payload: TilePayload = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(payload.tile, entry.key);
            assert_eq!(payload.count, entry.count);
        }
        let on_disk: TileManifest =
            serde_json::from_slice(&fs::read(dir.path().join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(on_disk, manifest);
        assert!(dir.path().join(SEARCH_FILE).exists());
    }

    #[test]
    fn rebuild_without_search_removes_the_previous_search_file() {
        let dir = tempfile::tempdir().unwrap();
        build(vec![report("old", 139.8, 35.6)]).write_to(dir.path(), timestamp()).unwrap();
        assert!(dir.path().join(SEARCH_FILE).exists());

        let builder = TileBuilder::new(TileBuilderConfig {
            write_search: false,
            ..TileBuilderConfig::default()
        });
        builder
            .build(vec![report("new", 139.8, 35.6)])
            .write_to(dir.path(), timestamp())
            .unwrap();
        assert!(!dir.path().join(SEARCH_FILE).exists());
    }

    #[test]
    fn empty_rebuild_still_replaces_the_search_file() {
        let dir = tempfile::tempdir().unwrap();
        build(vec![report("old", 139.8, 35.6)]).write_to(dir.path(), timestamp()).unwrap();

        build(vec![json!({"id": "bad"})]).write_to(dir.path(), timestamp()).unwrap();
        let search: SearchFile =
            serde_json::from_slice(&fs::read(dir.path().join(SEARCH_FILE)).unwrap()).unwrap();
        assert!(search.reports.is_empty());
        assert_eq!(search.total_reports, 0);
    }

    #[test]
    fn output_is_byte_identical_across_runs() {
        let input = vec![
            report("a", 140.0, 38.0),
            report("b", 139.767, 35.681),
            report("c", 140.0, 38.0),
        ];
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        build(input.clone()).write_to(first.path(), timestamp()).unwrap();
        build(input).write_to(second.path(), timestamp()).unwrap();

        for name in [MANIFEST_FILE, SEARCH_FILE, "tiles/9_455_197.json", "tiles/9_454_201.json"] {
            assert_eq!(
                fs::read(first.path().join(name)).unwrap(),
                fs::read(second.path().join(name)).unwrap(),
                "{name} differs"
            );
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn coordinate() -> impl Strategy<Value = (f64, f64)> {
            (-180.0f64..=180.0, -90.0f64..=90.0)
        }

        proptest! {
            #[test]
            fn prop_every_report_lives_in_its_computed_tile(
                coords in prop::collection::vec(coordinate(), 0..60),
                zoom in 0u8..=12
            ) {
                let records = coords
                    .iter()
                    .enumerate()
                    .map(|(i, (lon, lat))| report(&format!("r{i}"), *lon, *lat))
                    .collect();
                let set = TileBuilder::new(TileBuilderConfig { zoom, write_search: false }).build(records);
                for payload in &set.tiles {
                    prop_assert!(!payload.reports.is_empty());
                    for r in &payload.reports {
                        let key = TileKey::containing(r.lon.unwrap(), r.lat.unwrap(), zoom);
                        prop_assert_eq!(key, payload.tile);
                    }
                }
                let manifest = set.manifest(timestamp());
                prop_assert_eq!(manifest.tile_report_sum(), manifest.total_reports);
                prop_assert_eq!(manifest.total_reports, coords.len());
            }
        }
    }
}
