//! Types and pure functions shared by the offline tile builder and the
//! runtime streaming client.

pub mod formats;
pub mod record;
pub mod text;
pub mod tile;

pub use formats::{
    CompactReport, FORMAT_VERSION, SearchEntry, SearchFile, TileEntry, TileManifest, TilePayload,
};
pub use record::{LegacyPosition, LegacyRecord, RecordError, Report, field_text};
pub use tile::{DEFAULT_TILE_ZOOM, MAX_MERCATOR_LAT, TileKey, TileKeyError, tile_for, tiles_per_axis};
