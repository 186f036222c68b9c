use std::time::Duration;

pub const DEFAULT_INDEX_PATH: &str = "weathernews-tiles/index.json";
pub const DEFAULT_SEARCH_PATH: &str = "weathernews-tiles/search.json";
pub const DEFAULT_LEGACY_PATH: &str = "weathernews.json";
pub const DEFAULT_ICON_DIR: &str = "data/icon/flags";

/// Runtime knobs of the streaming client.
///
/// Paths are resolved by the configured fetcher; tile payload paths from the
/// manifest are relative to the directory holding the index.
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    pub index_path: String,
    pub search_path: Option<String>,
    pub legacy_path: String,
    /// Directory prefixed to each report's icon file name.
    pub icon_dir: String,
    pub tile_debounce: Duration,
    pub cull_debounce: Duration,
    /// Extra tile rings loaded around the visible range.
    pub prefetch_margin: u32,
    /// Pixels beyond the canvas edge at which markers stay shown.
    pub cull_margin_px: f64,
    /// Hide labels regardless of geometry (small-screen devices).
    pub suppress_labels: bool,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            index_path: DEFAULT_INDEX_PATH.to_string(),
            search_path: Some(DEFAULT_SEARCH_PATH.to_string()),
            legacy_path: DEFAULT_LEGACY_PATH.to_string(),
            icon_dir: DEFAULT_ICON_DIR.to_string(),
            tile_debounce: Duration::from_millis(120),
            cull_debounce: Duration::from_millis(50),
            prefetch_margin: 1,
            cull_margin_px: 32.0,
            suppress_labels: false,
        }
    }
}

impl StreamerConfig {
    /// Defaults overridden by `TILE_INDEX_URL`, `TILE_SEARCH_URL` (empty
    /// disables the search file), `LEGACY_REPORT_URL` and `SUPPRESS_LABELS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup("TILE_INDEX_URL") {
            config.index_path = path;
        }
        if let Some(path) = lookup("TILE_SEARCH_URL") {
            config.search_path = (!path.trim().is_empty()).then_some(path);
        }
        if let Some(path) = lookup("LEGACY_REPORT_URL") {
            config.legacy_path = path;
        }
        if let Some(flag) = lookup("SUPPRESS_LABELS") {
            config.suppress_labels = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        config
    }

    pub fn icon_path(&self, icon: &str) -> String {
        format!("{}/{}", self.icon_dir.trim_end_matches('/'), icon)
    }

    /// Fetcher path of a tile payload listed in the manifest.
    pub fn tile_path(&self, manifest_relative: &str) -> String {
        match self.index_path.rfind('/') {
            Some(idx) => format!("{}{}", &self.index_path[..=idx], manifest_relative),
            None => manifest_relative.to_string(),
        }
    }
}
