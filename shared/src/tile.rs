use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Latitude bound of the square web-mercator world.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Zoom level used by deployed report tiles.
pub const DEFAULT_TILE_ZOOM: u8 = 9;

/// Highest zoom a `TileKey` may carry; keeps `1 << zoom` inside `u32`.
pub const MAX_TILE_ZOOM: u8 = 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TileKeyError {
    #[error("tile key `{0}` is not of the form zoom/x/y")]
    Format(String),
    #[error("tile key `{0}` is outside the grid of its zoom level")]
    OutOfRange(String),
}

/// One cell of the slippy-tile grid, canonically written `"{zoom}/{x}/{y}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Key of the tile containing the given point.
    pub fn containing(lon: f64, lat: f64, zoom: u8) -> Self {
        let (x, y) = tile_for(lon, lat, zoom);
        Self { zoom, x, y }
    }

    /// Payload file name used by the builder, e.g. `9_454_201.json`.
    pub fn filename(&self) -> String {
        format!("{}_{}_{}.json", self.zoom, self.x, self.y)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

impl FromStr for TileKey {
    type Err = TileKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let (Some(zoom), Some(x), Some(y), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TileKeyError::Format(s.to_string()));
        };

        let parse_err = |_| TileKeyError::Format(s.to_string());
        let zoom: u8 = zoom.parse().map_err(parse_err)?;
        let x: u32 = x.parse().map_err(parse_err)?;
        let y: u32 = y.parse().map_err(parse_err)?;

        if zoom > MAX_TILE_ZOOM || x >= tiles_per_axis(zoom) || y >= tiles_per_axis(zoom) {
            return Err(TileKeyError::OutOfRange(s.to_string()));
        }
        Ok(Self { zoom, x, y })
    }
}

impl Serialize for TileKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TileKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Number of tiles along one axis at `zoom`.
pub fn tiles_per_axis(zoom: u8) -> u32 {
    1u32 << zoom.min(MAX_TILE_ZOOM)
}

/// Web-mercator slippy tile containing `(lon, lat)` at `zoom`.
///
/// Latitude is clamped to the mercator bound before projection and both
/// results are clamped into `[0, 2^zoom - 1]`. The builder and the runtime
/// client must both go through this function; any other rounding order would
/// place reports in different tiles at build time and at view time.
pub fn tile_for(lon: f64, lat: f64, zoom: u8) -> (u32, u32) {
    let lat_clamped = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let n = f64::from(tiles_per_axis(zoom));
    let max_index = n - 1.0;

    let x = (((lon + 180.0) / 360.0) * n).floor();
    let lat_rad = lat_clamped.to_radians();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0 * n)
        .floor();

    // `as` saturates NaN to 0, which the clamp already covers for finite input.
    (x.clamp(0.0, max_index) as u32, y.clamp(0.0, max_index) as u32)
}
