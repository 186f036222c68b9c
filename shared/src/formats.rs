//! JSON documents exchanged between the tile builder and the runtime client.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};

use crate::tile::TileKey;

pub const FORMAT_VERSION: u32 = 1;

/// Top-level index listing every non-empty tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileManifest {
    #[serde(default = "default_version")]
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub zoom: u8,
    pub total_reports: usize,
    /// Tiles in the order their first report was encountered.
    #[serde(with = "ordered_tiles")]
    pub tiles: Vec<TileEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileEntry {
    pub key: TileKey,
    pub path: String,
    pub count: usize,
}

impl TileManifest {
    pub fn entry(&self, key: &TileKey) -> Option<&TileEntry> {
        self.tiles.iter().find(|entry| entry.key == *key)
    }

    pub fn tile_report_sum(&self) -> usize {
        self.tiles.iter().map(|entry| entry.count).sum()
    }
}

/// One tile file: every report whose coordinates fall inside `tile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilePayload {
    #[serde(default = "default_version")]
    pub version: u32,
    pub tile: TileKey,
    pub count: usize,
    #[serde(default)]
    pub reports: Vec<CompactReport>,
}

/// Report as stored inside a tile payload.
///
/// Fields are optional on the read side so a hand-edited or truncated payload
/// degrades to dropped records instead of a failed tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactReport {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub desc: String,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    #[serde(default)]
    pub img: String,
}

/// Flattened id → searchable text file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFile {
    #[serde(default = "default_version")]
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub total_reports: usize,
    #[serde(default)]
    pub reports: Vec<SearchEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub id: String,
    pub text: String,
    pub tile: TileKey,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Serialize, Deserialize)]
struct TileEntryBody {
    path: String,
    count: usize,
}

/// `tiles` is a JSON object keyed by tile key; the builder needs it written in
/// encounter order, so it is kept as a `Vec` rather than a hashed map.
mod ordered_tiles {
    use super::*;

    pub fn serialize<S: Serializer>(tiles: &[TileEntry], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(tiles.len()))?;
        for entry in tiles {
            map.serialize_entry(
                &entry.key,
                &TileEntryBody {
                    path: entry.path.clone(),
                    count: entry.count,
                },
            )?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<TileEntry>, D::Error> {
        deserializer.deserialize_map(EntriesVisitor)
    }

    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<TileEntry>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of tile keys to {path, count}")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, body)) = access.next_entry::<TileKey, TileEntryBody>()? {
                entries.push(TileEntry {
                    key,
                    path: body.path,
                    count: body.count,
                });
            }
            Ok(entries)
        }
    }
}
