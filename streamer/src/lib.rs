//! Runtime client that streams report tiles into a 3D globe as the camera
//! moves and culls markers that cannot be seen.

pub mod client;
pub mod config;
pub mod culler;
pub mod error;
pub mod fetch;
pub mod geometry;
pub mod headless;
pub mod legacy;
pub mod manifest;
pub mod renderer;
pub mod schedule;
pub mod search;
pub mod viewport;

pub use client::{LoadStatus, ReconcileSummary, StartMode, TileStreamer};
pub use config::StreamerConfig;
pub use error::{FetchError, StreamError};
pub use fetch::{DirFetcher, HttpFetcher, TileFetcher};
pub use geometry::{Cartographic, ScreenPoint, Vec3, ViewRectangle, ViewportSize};
pub use headless::HeadlessRenderer;
pub use manifest::ManifestIndex;
pub use renderer::{MarkerHandle, MarkerSpec, SceneRenderer};
pub use viewport::compute_visible_tile_keys;
