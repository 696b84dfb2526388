//! The engine facade: cache tiers, scheduler and lifecycle wired together.
//!
//! [`TileEngine`] owns the memory tier, the optional persistent tier, the
//! job list and the execution loop, and exposes the redraw entry points to
//! the UI layer. Construction wires the tiers together: memory evictions
//! spill to disk, and completed background reads promote into the memory
//! tier and request a repaint through the caller's [`RedrawNotifier`].

mod config;

pub use config::{EngineConfig, DEFAULT_MEMORY_CAPACITY};

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheError, CacheStats, DiskCache, MemoryCache};
use crate::coord::CoordError;
use crate::scheduler::{
    CanvasSize, Frame, JobList, RedrawNotifier, RenderJob, RenderLoop, TileDraw, TileSpan,
    TileState, Viewport,
};
use crate::tile::{Bitmap, RenderError, RenderParams, SourceId, TileKey, TileRenderer};

/// Errors surfaced by the engine API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A redraw was requested before a map source was loaded.
    #[error("no map source loaded")]
    NoSource,

    /// The engine has been destroyed.
    #[error("engine has been destroyed")]
    Destroyed,

    /// The backing map-data source could not be opened.
    #[error("failed to open map source: {0}")]
    SourceOpen(#[source] RenderError),

    /// The viewport position was outside the projectable range.
    #[error(transparent)]
    Coord(#[from] CoordError),

    /// A cache tier failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Viewport, canvas and source, read and written together.
struct ViewState {
    viewport: Viewport,
    canvas: CanvasSize,
    source: Option<SourceId>,
}

/// Tile engine for a scrollable, zoomable map canvas.
///
/// Must live inside a Tokio runtime: the persistent tier's workers and the
/// execution loop run as tasks on the ambient runtime.
pub struct TileEngine {
    renderer: Arc<dyn TileRenderer>,
    memory: Arc<MemoryCache>,
    disk: Option<Arc<DiskCache>>,
    jobs: Arc<JobList>,
    render_loop: Arc<RenderLoop>,
    params: RenderParams,
    state: Mutex<ViewState>,
    paused: Arc<AtomicBool>,
    destroyed: AtomicBool,
}

impl TileEngine {
    /// Build an engine and wire its tiers together.
    ///
    /// # Errors
    ///
    /// Fails if the persistent tier cannot be opened.
    pub fn new(
        config: EngineConfig,
        renderer: Arc<dyn TileRenderer>,
        notifier: Arc<dyn RedrawNotifier>,
    ) -> Result<Self, EngineError> {
        let memory = Arc::new(MemoryCache::with_policy(
            config.memory_capacity,
            config.auto_clear,
            config.clear_factor,
            config.use_disk_cache,
        ));

        let disk = match config.disk {
            Some(disk_config) => {
                let disk = Arc::new(DiskCache::open(disk_config)?);

                // Completed background reads promote into the memory tier
                // and announce the stale picture.
                let promote_memory = Arc::clone(&memory);
                let promote_notifier = Arc::clone(&notifier);
                disk.set_on_read_complete(move |key, bitmap| {
                    promote_memory.put(key, bitmap);
                    promote_notifier.request_redraw();
                });

                memory.attach_disk(Arc::clone(&disk));
                Some(disk)
            }
            None => None,
        };

        let jobs = Arc::new(JobList::new());
        let paused = Arc::new(AtomicBool::new(false));
        let render_loop = Arc::new(RenderLoop::new(
            Arc::clone(&jobs),
            Arc::clone(&renderer),
            Arc::clone(&memory),
            notifier,
            Arc::clone(&paused),
            config.job_timeout,
        ));

        Ok(Self {
            renderer,
            memory,
            disk,
            jobs,
            render_loop,
            params: config.render_params,
            state: Mutex::new(ViewState {
                viewport: Viewport::new(0.0, 0.0, 0),
                canvas: CanvasSize::new(0, 0),
                source: None,
            }),
            paused,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Open a map-data source.
    ///
    /// # Errors
    ///
    /// An open failure is fatal to this call and leaves the engine exactly
    /// as it was: no source is recorded and no jobs will reference it.
    pub fn load(&self, path: &Path) -> Result<(), EngineError> {
        self.ensure_alive()?;
        let source = self
            .renderer
            .open(path)
            .map_err(EngineError::SourceOpen)?;

        self.state.lock().source = Some(source);
        info!(path = %path.display(), %source, "map source loaded");
        Ok(())
    }

    /// Whether a map source is loaded.
    pub fn has_loaded(&self) -> bool {
        self.state.lock().source.is_some()
    }

    /// Move the viewport.
    pub fn set_viewport(&self, viewport: Viewport) {
        self.state.lock().viewport = viewport;
    }

    /// Current viewport.
    pub fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    /// Resize the canvas.
    pub fn set_canvas_size(&self, canvas: CanvasSize) {
        self.state.lock().canvas = canvas;
    }

    /// One redraw cycle: resolve every visible tile through the cache
    /// tiers and return the draw list.
    ///
    /// With `create_jobs`, tiles missing from both tiers become render
    /// jobs, sorted nearest-to-center, atomically replacing the live job
    /// list; not-yet-started jobs from earlier cycles are dropped. Without
    /// it, the existing list is left untouched (repaint only).
    ///
    /// The frame reflects cache state at the moment this call runs.
    ///
    /// # Errors
    ///
    /// Fails when no source is loaded, the viewport is out of range, or
    /// the engine is destroyed.
    pub fn redraw(&self, create_jobs: bool) -> Result<Frame, EngineError> {
        self.ensure_alive()?;
        let (viewport, canvas, source) = {
            let state = self.state.lock();
            (state.viewport, state.canvas, state.source)
        };
        let source = source.ok_or(EngineError::NoSource)?;

        let span = TileSpan::compute(&viewport, canvas)?;
        let use_disk = self.memory.use_disk();

        let mut tiles = Vec::with_capacity(span.len());
        let mut candidates = Vec::new();

        for coord in span.iter() {
            let key = TileKey::new(coord, source, self.params);
            let (canvas_x, canvas_y) = span.canvas_position(&coord);

            let resolved = self
                .memory
                .get(&key)
                .map(|bitmap| (bitmap, TileState::Ready))
                .or_else(|| {
                    if !use_disk {
                        return None;
                    }
                    self.disk
                        .as_ref()
                        .and_then(|disk| disk.get(&key))
                        .map(|bitmap| (bitmap, TileState::Promoted))
                });

            let (bitmap, state) = match resolved {
                Some(hit) => hit,
                None => {
                    if create_jobs {
                        candidates.push(RenderJob::new(key, span.distance_to_center(&coord)));
                    }
                    (Bitmap::placeholder(), TileState::Loading)
                }
            };

            tiles.push(TileDraw {
                coord,
                canvas_x,
                canvas_y,
                bitmap,
                state,
            });
        }

        if create_jobs {
            debug!(jobs = candidates.len(), "job list replaced");
            self.jobs.replace(candidates);
        }

        Ok(Frame { span, tiles })
    }

    /// Start draining the job list, if not paused and not already running.
    pub fn execute(&self) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        self.render_loop.execute();
    }

    /// Pause or resume job execution. Pausing never cancels the job
    /// already mid-render; resuming does not auto-start the loop — call
    /// [`execute`](Self::execute) to continue draining.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        debug!(paused, "tile rendering pause gate changed");
    }

    /// Whether job execution is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Tear the engine down: pause rendering, destroy the persistent tier
    /// (workers joined, backing files removed) and drop all cached tiles.
    /// Safe to call more than once.
    pub async fn destroy(&self) -> Result<(), EngineError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.set_paused(true);
        self.jobs.clear();
        if let Some(disk) = &self.disk {
            disk.destroy().await?;
        }
        self.memory.clear();

        info!("tile engine destroyed");
        Ok(())
    }

    /// Whether [`destroy`](Self::destroy) has been initiated.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Tiles currently held by the memory tier.
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Memory-tier capacity.
    pub fn memory_capacity(&self) -> usize {
        self.memory.capacity()
    }

    /// Change the memory-tier capacity (shrinking evicts immediately).
    pub fn set_memory_capacity(&self, capacity: usize) {
        self.memory.set_capacity(capacity);
    }

    /// Tiles currently persisted by the disk tier.
    pub fn disk_load(&self) -> usize {
        self.disk.as_ref().map(|disk| disk.load()).unwrap_or(0)
    }

    /// Disk-tier capacity, if a disk tier is attached.
    pub fn disk_capacity(&self) -> Option<usize> {
        self.disk.as_ref().map(|disk| disk.capacity())
    }

    /// Enable or disable persistent-tier use (lookups and eviction
    /// spill) at runtime.
    pub fn set_use_disk_cache(&self, use_disk: bool) {
        self.memory.set_use_disk(use_disk);
    }

    /// Whether the persistent tier participates in lookups and spills.
    pub fn use_disk_cache(&self) -> bool {
        self.memory.use_disk()
    }

    /// Memory-tier traffic counters.
    pub fn stats(&self) -> CacheStats {
        self.memory.stats()
    }

    /// Number of pending render jobs.
    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the execution loop is currently draining.
    pub fn is_rendering(&self) -> bool {
        self.render_loop.is_running()
    }

    fn ensure_alive(&self) -> Result<(), EngineError> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(EngineError::Destroyed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileCoord;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    /// Renderer that draws a solid tile tagged with the tile column,
    /// records render order, and refuses to open "missing.map".
    struct StubRenderer {
        rendered: parking_lot::Mutex<Vec<TileCoord>>,
    }

    impl StubRenderer {
        fn new() -> Self {
            Self {
                rendered: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    impl TileRenderer for StubRenderer {
        fn open(&self, path: &Path) -> Result<SourceId, RenderError> {
            if path.ends_with("missing.map") {
                return Err(RenderError::SourceOpen {
                    path: PathBuf::from(path),
                    reason: "no such file".into(),
                });
            }
            Ok(SourceId::new(7))
        }

        fn render(&self, key: &TileKey) -> Result<Bitmap, RenderError> {
            self.rendered.lock().push(key.coord);
            Ok(Bitmap::solid(1, 1, [key.coord.x as u8, 0, 0, 255]))
        }
    }

    struct NullNotifier;

    impl RedrawNotifier for NullNotifier {
        fn request_redraw(&self) {}
    }

    fn engine() -> (TileEngine, Arc<StubRenderer>) {
        let renderer = Arc::new(StubRenderer::new());
        let engine = TileEngine::new(
            EngineConfig::new().with_memory_capacity(64),
            Arc::clone(&renderer) as Arc<dyn TileRenderer>,
            Arc::new(NullNotifier),
        )
        .unwrap();
        (engine, renderer)
    }

    fn viewport() -> Viewport {
        Viewport::new(0.0, 0.0, 4)
    }

    async fn wait_until(mut predicate: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_redraw_without_source_fails() {
        let (engine, _) = engine();
        assert!(matches!(engine.redraw(true), Err(EngineError::NoSource)));
    }

    #[tokio::test]
    async fn test_failed_load_is_fatal_and_leaves_no_state() {
        let (engine, _) = engine();
        let result = engine.load(Path::new("missing.map"));
        assert!(matches!(result, Err(EngineError::SourceOpen(_))));
        assert!(!engine.has_loaded());
        assert!(matches!(engine.redraw(true), Err(EngineError::NoSource)));
    }

    #[tokio::test]
    async fn test_misses_draw_placeholder_and_queue_jobs() {
        let (engine, _) = engine();
        engine.load(Path::new("demo.map")).unwrap();
        engine.set_viewport(viewport());
        engine.set_canvas_size(CanvasSize::new(512, 512));

        let frame = engine.redraw(true).unwrap();
        assert!(!frame.tiles.is_empty());
        assert!(frame
            .tiles
            .iter()
            .all(|tile| tile.state == TileState::Loading));
        assert_eq!(engine.pending_jobs(), frame.tiles.len());
    }

    #[tokio::test]
    async fn test_repaint_only_redraw_leaves_jobs_untouched() {
        let (engine, _) = engine();
        engine.load(Path::new("demo.map")).unwrap();
        engine.set_viewport(viewport());
        engine.set_canvas_size(CanvasSize::new(512, 512));

        engine.redraw(true).unwrap();
        let pending = engine.pending_jobs();
        assert!(pending > 0);

        engine.redraw(false).unwrap();
        assert_eq!(engine.pending_jobs(), pending);
    }

    #[tokio::test]
    async fn test_full_cycle_renders_all_visible_tiles() {
        let (engine, _) = engine();
        engine.load(Path::new("demo.map")).unwrap();
        engine.set_viewport(viewport());
        engine.set_canvas_size(CanvasSize::new(512, 512));

        engine.redraw(true).unwrap();
        engine.execute();

        assert!(wait_until(|| engine.pending_jobs() == 0 && !engine.is_rendering()).await);
        let frame = engine.redraw(false).unwrap();
        assert!(frame.is_complete());

        // Rendered content, not placeholders.
        let tile = &frame.tiles[0];
        assert_eq!(tile.bitmap.pixels()[0], tile.coord.x as u8);
    }

    #[tokio::test]
    async fn test_tiles_render_in_distance_order() {
        let (engine, renderer) = engine();
        engine.load(Path::new("demo.map")).unwrap();
        engine.set_viewport(viewport());
        engine.set_canvas_size(CanvasSize::new(768, 256));

        let frame = engine.redraw(true).unwrap();
        engine.execute();
        assert!(wait_until(|| engine.pending_jobs() == 0 && !engine.is_rendering()).await);

        let order: Vec<TileCoord> = renderer.rendered.lock().clone();
        assert_eq!(order.len(), frame.tiles.len());

        let distances: Vec<f64> = order
            .iter()
            .map(|coord| frame.span.distance_to_center(coord))
            .collect();
        assert!(
            distances.windows(2).all(|pair| pair[0] <= pair[1]),
            "tiles must render nearest-to-center first: {distances:?}"
        );
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_blocks_use() {
        let (engine, _) = engine();
        engine.load(Path::new("demo.map")).unwrap();

        engine.destroy().await.unwrap();
        assert!(engine.is_destroyed());
        assert!(engine.is_paused());
        assert!(matches!(engine.redraw(true), Err(EngineError::Destroyed)));

        engine.destroy().await.unwrap();
    }
}
