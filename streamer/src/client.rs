use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::{Report, SearchFile, TileKey, TilePayload};
use tokio::task::JoinSet;

use crate::config::StreamerConfig;
use crate::culler::{cull_markers, CullSettings, CullStats, CullTarget};
use crate::error::StreamError;
use crate::fetch::{fetch_json, TileFetcher};
use crate::geometry::{Cartographic, Vec3};
use crate::legacy::{parse_legacy_reports, LEGACY_TILE};
use crate::manifest::{load_manifest, ManifestIndex};
use crate::renderer::{MarkerHandle, MarkerSpec, SceneRenderer};
use crate::schedule::{settle_all, Debouncer};
use crate::search::SearchIndex;
use crate::viewport::compute_visible_tile_keys;

const LOAD_FAILED_MESSAGE: &str = "Failed to load report data.";
const MARKER_BASE_HEIGHT_M: f64 = 400.0;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading {
        rendered: usize,
        total: usize,
    },
    Complete,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Tiled {
        zoom: u8,
        tiles: usize,
        total_reports: usize,
    },
    Legacy {
        reports: usize,
    },
}

/// Outcome of one reconciliation, passed to completion listeners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Manifest tiles in the target set.
    pub requested: usize,
    pub fetched: usize,
    pub failed: usize,
    /// Fetches whose result arrived after the tile left the target set.
    pub stale: usize,
    pub evicted: usize,
    /// Reports rendered once the reconciliation settled.
    pub rendered: usize,
}

pub type CompletionListener = Arc<dyn Fn(&ReconcileSummary) + Send + Sync>;

enum TileOutcome {
    Loaded,
    Failed,
    Stale,
}

#[derive(Debug, Clone, Default)]
enum Mode {
    #[default]
    Uninitialized,
    Tiled(Arc<ManifestIndex>),
    Legacy(Arc<ManifestIndex>),
}

impl Mode {
    fn manifest(&self) -> Option<&Arc<ManifestIndex>> {
        match self {
            Mode::Uninitialized => None,
            Mode::Tiled(manifest) | Mode::Legacy(manifest) => Some(manifest),
        }
    }
}

#[derive(Debug)]
struct RenderedReport {
    handle: MarkerHandle,
    tile: TileKey,
    position: Cartographic,
    world: Vec3,
    description: String,
}

#[derive(Debug, Default)]
struct StreamState {
    mode: Mode,
    /// Bumped on every reset; completions from older sessions are ignored.
    generation: u64,
    loaded: HashMap<TileKey, Vec<String>>,
    loading: HashSet<TileKey>,
    wanted: HashSet<TileKey>,
    rendered: HashMap<String, RenderedReport>,
    search: SearchIndex,
    filter: Option<HashSet<String>>,
    initial_load_complete: bool,
    status: LoadStatus,
}

impl StreamState {
    fn tiled_manifest(&self) -> Option<Arc<ManifestIndex>> {
        match &self.mode {
            Mode::Tiled(manifest) => Some(Arc::clone(manifest)),
            _ => None,
        }
    }

    /// Returns the id when a new marker was placed; duplicates of an
    /// already rendered id are skipped.
    fn insert_report<R: SceneRenderer>(
        &mut self,
        report: Report,
        tile: TileKey,
        renderer: &mut R,
        config: &StreamerConfig,
    ) -> Option<String> {
        if report.id.is_empty() || self.rendered.contains_key(&report.id) {
            return None;
        }
        let position = Cartographic::new(report.lon, report.lat, marker_height(&report.id));
        let handle = renderer.add_marker(MarkerSpec {
            id: report.id.clone(),
            position,
            icon: config.icon_path(&report.icon_url),
            label: report.label(),
            show_label: !config.suppress_labels,
        });
        self.search.insert(report.id.clone(), &report.search_text());
        self.rendered.insert(
            report.id.clone(),
            RenderedReport {
                handle,
                tile,
                position,
                world: position.to_world(),
                description: report.description_html,
            },
        );
        Some(report.id)
    }

    fn insert_tile<R: SceneRenderer>(
        &mut self,
        key: TileKey,
        payload: TilePayload,
        renderer: &mut R,
        config: &StreamerConfig,
    ) -> usize {
        if payload.tile != key {
            tracing::warn!("payload for {key} is labelled {}", payload.tile);
        }
        let mut ids = Vec::with_capacity(payload.reports.len());
        let mut skipped = 0usize;
        for item in &payload.reports {
            let inserted = Report::from_compact(item)
                .ok()
                .and_then(|report| self.insert_report(report, key, renderer, config));
            match inserted {
                Some(id) => ids.push(id),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!("tile {key}: {skipped} reports skipped");
        }
        let count = ids.len();
        self.loaded.insert(key, ids);
        count
    }

    /// Removes the tile's markers; search entries are kept.
    fn evict_tile<R: SceneRenderer>(&mut self, key: &TileKey, renderer: &mut R) -> usize {
        let Some(ids) = self.loaded.remove(key) else {
            return 0;
        };
        let mut removed = 0;
        for id in ids {
            if self.rendered.get(&id).is_some_and(|r| r.tile == *key) {
                if let Some(report) = self.rendered.remove(&id) {
                    renderer.remove_marker(report.handle);
                    removed += 1;
                }
            }
        }
        removed
    }

    fn clear<R: SceneRenderer>(&mut self, renderer: &mut R) {
        for report in self.rendered.values() {
            renderer.remove_marker(report.handle);
        }
        self.rendered.clear();
        self.loaded.clear();
        self.loading.clear();
        self.wanted.clear();
        self.search.clear();
        self.filter = None;
        self.initial_load_complete = false;
        self.status = LoadStatus::Idle;
        self.generation += 1;
    }

    fn refresh_progress(&mut self) {
        if self.initial_load_complete {
            return;
        }
        let Some(manifest) = self.mode.manifest() else {
            return;
        };
        let total = self
            .wanted
            .iter()
            .filter_map(|key| manifest.get(key))
            .map(|entry| entry.count)
            .sum::<usize>();
        self.status = LoadStatus::Loading {
            rendered: self.rendered.len(),
            total,
        };
    }

    fn cull_targets(&self) -> impl Iterator<Item = CullTarget<'_>> {
        self.rendered.iter().map(|(id, report)| CullTarget {
            id: id.as_str(),
            handle: report.handle,
            position: report.position,
            world: report.world,
        })
    }
}

/// Deterministic per-id altitude in `[400, 800)` meters so co-located
/// markers do not z-fight.
fn marker_height(id: &str) -> f64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in id.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    MARKER_BASE_HEIGHT_M + (hash % 4000) as f64 / 10.0
}

struct ReconcilePlan {
    generation: u64,
    requested: usize,
    evicted: usize,
    fetches: Vec<(TileKey, String)>,
}

struct Inner<F, R> {
    config: StreamerConfig,
    fetcher: F,
    state: Mutex<StreamState>,
    renderer: Mutex<R>,
    tile_debounce: Debouncer,
    cull_debounce: Debouncer,
    listeners: Mutex<Vec<CompletionListener>>,
}

// Lock order: state, then renderer. Neither is held across an await.
impl<F, R> Inner<F, R> {
    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn renderer(&self) -> MutexGuard<'_, R> {
        self.renderer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, summary: &ReconcileSummary) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener(summary);
        }
    }
}

/// Clears a tile's loading flag if its fetch task ends without settling.
struct LoadingGuard<'a, F, R> {
    inner: &'a Inner<F, R>,
    key: TileKey,
    generation: u64,
    armed: bool,
}

impl<F, R> Drop for LoadingGuard<'_, F, R> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.inner.state();
            if state.generation == self.generation {
                state.loading.remove(&self.key);
            }
        }
    }
}

impl<F: TileFetcher, R: SceneRenderer> Inner<F, R> {
    async fn load_tile(self: Arc<Self>, key: TileKey, path: String, generation: u64) -> TileOutcome {
        let mut guard = LoadingGuard {
            inner: &*self,
            key,
            generation,
            armed: true,
        };
        let fetched = fetch_json::<TilePayload, F>(&self.fetcher, &path).await;

        let mut state = self.state();
        guard.armed = false;
        if state.generation != generation {
            return TileOutcome::Stale;
        }
        state.loading.remove(&key);

        let payload = match fetched {
            Ok(payload) => payload,
            Err(source) => {
                tracing::warn!("{}", StreamError::TileFetchFailed { key, source });
                return TileOutcome::Failed;
            }
        };
        if !state.wanted.contains(&key) {
            tracing::debug!("tile {key} left the view while loading; discarded");
            return TileOutcome::Stale;
        }

        let mut renderer = self.renderer();
        let reports = state.insert_tile(key, payload, &mut *renderer, &self.config);
        state.refresh_progress();
        tracing::debug!("tile {key} loaded: {reports} reports");
        TileOutcome::Loaded
    }
}

/// Viewport-driven tile streaming client.
///
/// Keeps the rendered report set equal to the manifest tiles intersecting
/// the camera view (plus a prefetch ring), fetching each tile at most once
/// while it stays wanted and evicting tiles that leave the view.
pub struct TileStreamer<F, R> {
    inner: Arc<Inner<F, R>>,
}

impl<F, R> Clone for TileStreamer<F, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: TileFetcher, R: SceneRenderer> TileStreamer<F, R> {
    pub fn new(config: StreamerConfig, fetcher: F, renderer: R) -> Self {
        let tile_debounce = Debouncer::new(config.tile_debounce);
        let cull_debounce = Debouncer::new(config.cull_debounce);
        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                state: Mutex::new(StreamState::default()),
                renderer: Mutex::new(renderer),
                tile_debounce,
                cull_debounce,
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.inner.config
    }

    /// Loads the manifest and the tiles of the current view, falling back to
    /// the legacy report file when no manifest can be read.
    pub async fn start(&self) -> Result<StartMode, StreamError> {
        let manifest = match load_manifest(&self.inner.fetcher, &self.inner.config.index_path).await {
            Ok(manifest) => Arc::new(manifest),
            Err(err) => {
                tracing::warn!("{err}; falling back to {}", self.inner.config.legacy_path);
                return self.start_legacy().await;
            }
        };

        self.install(Mode::Tiled(Arc::clone(&manifest)));
        self.load_search_index().await;
        let summary = self.reconcile_view().await;
        tracing::info!(
            "streaming {} of {} tiles ({} reports rendered)",
            summary.fetched,
            manifest.len(),
            summary.rendered
        );
        Ok(StartMode::Tiled {
            zoom: manifest.zoom,
            tiles: manifest.len(),
            total_reports: manifest.total_reports,
        })
    }

    async fn start_legacy(&self) -> Result<StartMode, StreamError> {
        let path = self.inner.config.legacy_path.clone();
        let dataset = match self
            .inner
            .fetcher
            .fetch(&path)
            .await
            .and_then(|bytes| parse_legacy_reports(&bytes))
        {
            Ok(dataset) => dataset,
            Err(err) => {
                tracing::error!("legacy report file {path} unavailable: {err}");
                let mut state = self.inner.state();
                let mut renderer = self.inner.renderer();
                state.clear(&mut *renderer);
                state.mode = Mode::Uninitialized;
                state.status = LoadStatus::Failed(LOAD_FAILED_MESSAGE.to_string());
                return Err(StreamError::LegacyFetchFailed(err));
            }
        };

        let generation = self.install(Mode::Legacy(Arc::new(dataset.manifest(&path))));
        {
            let mut state = self.inner.state();
            let mut renderer = self.inner.renderer();
            let mut ids = Vec::with_capacity(dataset.reports.len());
            for report in dataset.reports {
                if let Some(id) = state.insert_report(report, LEGACY_TILE, &mut *renderer, &self.inner.config) {
                    ids.push(id);
                }
            }
            state.wanted = HashSet::from([LEGACY_TILE]);
            state.loaded.insert(LEGACY_TILE, ids);
        }

        let summary = self.finish_reconciliation(generation, ReconcileSummary {
            requested: 1,
            fetched: 1,
            ..ReconcileSummary::default()
        });
        tracing::info!("legacy mode: {} reports rendered", summary.rendered);
        Ok(StartMode::Legacy {
            reports: summary.rendered,
        })
    }

    /// Starts a new session on `mode` and returns its generation.
    fn install(&self, mode: Mode) -> u64 {
        let mut state = self.inner.state();
        let mut renderer = self.inner.renderer();
        state.clear(&mut *renderer);
        let total = mode.manifest().map_or(0, |manifest| manifest.total_reports);
        state.mode = mode;
        state.status = LoadStatus::Loading { rendered: 0, total };
        state.generation
    }

    async fn load_search_index(&self) {
        let Some(path) = self.inner.config.search_path.as_deref() else {
            return;
        };
        match fetch_json::<SearchFile, F>(&self.inner.fetcher, path).await {
            Ok(file) => {
                let count = file.reports.len();
                self.inner.state().search.extend(file.reports);
                tracing::debug!("search index loaded: {count} entries");
            }
            Err(err) => tracing::warn!("search index unavailable ({err}); only loaded reports are searchable"),
        }
    }

    /// Manifest of the running session; the synthetic single-tile one in
    /// legacy mode.
    pub fn manifest(&self) -> Result<Arc<ManifestIndex>, StreamError> {
        self.inner
            .state()
            .mode
            .manifest()
            .cloned()
            .ok_or(StreamError::NotInitialized)
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self.inner.state().mode, Mode::Legacy(_))
    }

    /// Manifest tiles under the current view plus the prefetch ring. Empty in
    /// legacy mode or when the globe is out of view.
    pub fn visible_tile_keys(&self) -> HashSet<TileKey> {
        let Some(manifest) = self.inner.state().tiled_manifest() else {
            return HashSet::new();
        };
        let view = self.inner.renderer().current_view_rectangle();
        view.map(|view| compute_visible_tile_keys(&view, &manifest, self.inner.config.prefetch_margin))
            .unwrap_or_default()
    }

    pub async fn reconcile_view(&self) -> ReconcileSummary {
        let target = self.visible_tile_keys();
        self.reconcile(target).await
    }

    /// Makes the loaded tile set converge on `target`.
    ///
    /// Tiles outside the target are evicted immediately; target tiles that are
    /// neither loaded nor loading are fetched concurrently. Resolves after every
    /// fetch started here has settled, then runs a cull pass and notifies
    /// completion listeners. A no-op before a tiled manifest is installed.
    pub async fn reconcile(&self, target: HashSet<TileKey>) -> ReconcileSummary {
        let Some(plan) = self.plan_reconciliation(target) else {
            return ReconcileSummary::default();
        };

        let mut tasks = JoinSet::new();
        for (key, path) in plan.fetches {
            let inner = Arc::clone(&self.inner);
            let generation = plan.generation;
            tasks.spawn(inner.load_tile(key, path, generation));
        }

        let mut summary = ReconcileSummary {
            requested: plan.requested,
            evicted: plan.evicted,
            ..ReconcileSummary::default()
        };
        for outcome in settle_all(tasks).await {
            match outcome {
                TileOutcome::Loaded => summary.fetched += 1,
                TileOutcome::Failed => summary.failed += 1,
                TileOutcome::Stale => summary.stale += 1,
            }
        }
        tracing::debug!(
            "reconciled {} tiles: {} fetched, {} evicted, {} failed, {} stale",
            summary.requested,
            summary.fetched,
            summary.evicted,
            summary.failed,
            summary.stale
        );
        if summary.failed > 0 {
            tracing::warn!("{} tile(s) failed to load; they will be retried on the next view change", summary.failed);
        }
        self.finish_reconciliation(plan.generation, summary)
    }

    fn plan_reconciliation(&self, target: HashSet<TileKey>) -> Option<ReconcilePlan> {
        let mut state = self.inner.state();
        let manifest = state.tiled_manifest()?;
        let target: HashSet<TileKey> = target.into_iter().filter(|key| manifest.contains(key)).collect();

        let leaving: Vec<TileKey> = state
            .loaded
            .keys()
            .filter(|key| !target.contains(*key))
            .copied()
            .collect();
        if !leaving.is_empty() {
            let mut renderer = self.inner.renderer();
            let removed: usize = leaving
                .iter()
                .map(|key| state.evict_tile(key, &mut *renderer))
                .sum();
            tracing::debug!("evicted {} tiles ({removed} reports)", leaving.len());
        }

        let fetches: Vec<(TileKey, String)> = target
            .iter()
            .filter(|key| !state.loaded.contains_key(*key) && !state.loading.contains(*key))
            .filter_map(|key| {
                manifest
                    .get(key)
                    .map(|entry| (*key, self.inner.config.tile_path(&entry.path)))
            })
            .collect();
        state.loading.extend(fetches.iter().map(|(key, _)| *key));

        let requested = target.len();
        state.wanted = target;
        state.refresh_progress();
        Some(ReconcilePlan {
            generation: state.generation,
            requested,
            evicted: leaving.len(),
            fetches,
        })
    }

    /// Listeners are notified even when the session was reset meanwhile; the
    /// initial-load transition and the cull pass only apply to the live session.
    fn finish_reconciliation(&self, generation: u64, mut summary: ReconcileSummary) -> ReconcileSummary {
        let (current, first) = {
            let mut state = self.inner.state();
            summary.rendered = state.rendered.len();
            let current = state.generation == generation;
            let first = current && !state.initial_load_complete;
            if first {
                state.initial_load_complete = true;
                state.status = LoadStatus::Complete;
            }
            (current, first)
        };
        if first {
            tracing::info!("initial load complete: {} reports", summary.rendered);
        }
        if current {
            self.update_visibility();
        }
        self.inner.notify(&summary);
        summary
    }

    /// Camera moved or zoomed. Debounces a reconciliation (tiled mode only)
    /// and a cull pass.
    pub fn on_camera_changed(&self) {
        let (tiled, culling) = {
            let state = self.inner.state();
            (matches!(state.mode, Mode::Tiled(_)), state.initial_load_complete)
        };
        if tiled {
            let streamer = self.clone();
            self.inner.tile_debounce.schedule(move || async move {
                streamer.reconcile_view().await;
            });
        }
        if culling {
            let streamer = self.clone();
            self.inner.cull_debounce.schedule(move || async move {
                streamer.update_visibility();
            });
        }
    }

    pub fn on_resize(&self) {
        self.on_camera_changed();
    }

    /// Registers a listener fired once per settled reconciliation.
    pub fn on_reconciliation_complete(&self, listener: impl Fn(&ReconcileSummary) + Send + Sync + 'static) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Recomputes marker visibility. Does nothing until the initial load
    /// has completed.
    pub fn update_visibility(&self) -> CullStats {
        let state = self.inner.state();
        if !state.initial_load_complete {
            return CullStats::default();
        }
        let mut renderer = self.inner.renderer();
        let settings = CullSettings {
            margin_px: self.inner.config.cull_margin_px,
            suppress_labels: self.inner.config.suppress_labels,
        };
        let stats = cull_markers(&mut *renderer, state.cull_targets(), state.filter.as_ref(), settings);
        renderer.request_render();
        stats
    }

    /// Restricts visible markers to `ids`; `None` shows everything.
    pub fn set_text_filter(&self, ids: Option<HashSet<String>>) {
        self.inner.state().filter = ids;
        self.update_visibility();
    }

    /// Ids whose text contains `query`; `None` for a blank query.
    pub fn search(&self, query: &str) -> Option<HashSet<String>> {
        self.inner.state().search.matching(query)
    }

    /// Filters markers by `query` and returns the number of matching ids.
    pub fn apply_search(&self, query: &str) -> Option<usize> {
        let matches = self.search(query);
        let count = matches.as_ref().map(HashSet::len);
        self.set_text_filter(matches);
        count
    }

    /// Description HTML of a rendered report.
    pub fn description(&self, id: &str) -> Option<String> {
        self.inner
            .state()
            .rendered
            .get(id)
            .map(|report| report.description.clone())
    }

    pub fn current_loaded_report_count(&self) -> usize {
        self.inner.state().rendered.len()
    }

    pub fn loaded_tile_keys(&self) -> HashSet<TileKey> {
        self.inner.state().loaded.keys().copied().collect()
    }

    pub fn loading_tile_keys(&self) -> HashSet<TileKey> {
        self.inner.state().loading.clone()
    }

    pub fn status(&self) -> LoadStatus {
        self.inner.state().status.clone()
    }

    /// Runs `f` with exclusive access to the host renderer.
    pub fn with_renderer<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        let mut renderer = self.inner.renderer();
        f(&mut *renderer)
    }

    /// Removes every marker and forgets the session. Fetches still in flight
    /// settle as stale.
    pub fn teardown(&self) {
        let mut state = self.inner.state();
        let mut renderer = self.inner.renderer();
        state.clear(&mut *renderer);
        state.mode = Mode::Uninitialized;
        renderer.request_render();
        tracing::info!("streamer torn down");
    }
}
