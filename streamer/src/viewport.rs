use std::collections::HashSet;

use shared::{tile_for, tiles_per_axis, TileKey};

use crate::geometry::ViewRectangle;
use crate::manifest::ManifestIndex;

/// Inclusive tile index range at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Tiles touching the `[west, east]` span, grown by `margin` tiles and
    /// clipped to the grid.
    pub fn covering(west: f64, east: f64, south: f64, north: f64, zoom: u8, margin: u32) -> Self {
        let (x0, y0) = tile_for(west, north, zoom);
        let (x1, y1) = tile_for(east, south, zoom);
        let last = tiles_per_axis(zoom) - 1;
        Self {
            zoom,
            min_x: x0.min(x1).saturating_sub(margin),
            max_x: x0.max(x1).saturating_add(margin).min(last),
            min_y: y0.min(y1).saturating_sub(margin),
            max_y: y0.max(y1).saturating_add(margin).min(last),
        }
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        key.zoom == self.zoom
            && (self.min_x..=self.max_x).contains(&key.x)
            && (self.min_y..=self.max_y).contains(&key.y)
    }

    pub fn tile_count(&self) -> u64 {
        (u64::from(self.max_x - self.min_x) + 1) * (u64::from(self.max_y - self.min_y) + 1)
    }

    fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        (self.min_x..=self.max_x)
            .flat_map(move |x| (self.min_y..=self.max_y).map(move |y| TileKey::new(self.zoom, x, y)))
    }
}

/// Tile ranges for a view rectangle; two when it crosses the antimeridian.
pub fn tile_ranges(view: &ViewRectangle, zoom: u8, margin: u32) -> Vec<TileRange> {
    view.lon_spans()
        .into_iter()
        .map(|(west, east)| TileRange::covering(west, east, view.south, view.north, zoom, margin))
        .collect()
}

/// Manifest tiles intersecting the view, including a `margin` ring.
pub fn compute_visible_tile_keys(view: &ViewRectangle, manifest: &ManifestIndex, margin: u32) -> HashSet<TileKey> {
    let mut keys = HashSet::new();
    for range in tile_ranges(view, manifest.zoom, margin) {
        // Wide views at high zoom cover far more grid cells than the manifest lists.
        if range.tile_count() > manifest.len() as u64 {
            keys.extend(manifest.keys().filter(|key| range.contains(key)).copied());
        } else {
            keys.extend(range.keys().filter(|key| manifest.contains(key)));
        }
    }
    keys
}
