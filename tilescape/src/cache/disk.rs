//! Persistent tile cache backed by asynchronous workers.
//!
//! The disk tier looks unbounded to callers but is capacity-limited on
//! disk. All I/O happens on two background workers:
//!
//! ```text
//!  put ──► pending-write set ──► write channel ──► writer worker
//!                                                    │ free slots (oldest mtime first)
//!                                                    │ encode + write file
//!                                                    ▼ clear pending entry
//!  get ──► placeholder now ────► read channel ────► reader worker
//!                                     ▲               │ still pending write? re-queue
//!                                     └───(bounded)───┘ else decode + completion callback
//! ```
//!
//! An entry is readable only once its file has durably reached disk;
//! `contains_key` consults the backing directory, never in-flight state.
//! A read that races a pending write is re-queued with a bounded retry
//! budget and abandoned with a warning when the budget runs out.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coord::TileCoord;
use crate::tile::{Bitmap, TileKey};

use super::CacheError;

/// Default suffix of persisted tile files.
pub const DEFAULT_FILE_SUFFIX: &str = ".tile";

/// Default number of times a read of a still-pending entry is re-queued
/// before it is abandoned.
pub const DEFAULT_READ_RETRY_BUDGET: u32 = 16;

/// Pause between re-queue passes of a read that raced a pending write.
const READ_REQUEUE_BACKOFF: Duration = Duration::from_millis(25);

/// Configuration for a [`DiskCache`].
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Backing directory for persisted tiles.
    pub directory: PathBuf,

    /// Maximum number of persisted tiles. Insertions evict the file with
    /// the oldest modification time until a slot is free.
    pub capacity: usize,

    /// Suffix appended to every tile file name.
    pub file_suffix: String,

    /// Retry budget for reads racing a pending write.
    pub read_retry_budget: u32,
}

impl DiskCacheConfig {
    /// Create a configuration with an effectively unbounded capacity and
    /// the default file suffix.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            capacity: usize::MAX,
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
            read_retry_budget: DEFAULT_READ_RETRY_BUDGET,
        }
    }

    /// Set the maximum number of persisted tiles.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the tile file suffix.
    pub fn with_file_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.file_suffix = suffix.into();
        self
    }
}

/// Callback invoked by the reader worker once a background decode lands.
///
/// Runs on the reader task: implementations must only schedule follow-up
/// work (typically a redraw request), never perform it inline.
pub type ReadCompleteFn = dyn Fn(TileKey, Arc<Bitmap>) + Send + Sync;

/// An entry travelling to the writer worker.
struct WriteRequest {
    key: TileKey,
    bitmap: Arc<Bitmap>,
}

/// An entry travelling to the reader worker.
struct ReadRequest {
    key: TileKey,
    retries_left: u32,
}

/// State shared between the cache handle and its workers.
struct Shared {
    directory: PathBuf,
    suffix: String,
    capacity: AtomicUsize,
    /// Entries accepted by `put` whose file has not reached disk yet.
    pending_writes: DashMap<TileKey, Arc<Bitmap>>,
    /// Keys with a read currently queued, for enqueue coalescing.
    queued_reads: DashSet<TileKey>,
    on_read_complete: RwLock<Option<Arc<ReadCompleteFn>>>,
}

impl Shared {
    fn file_path(&self, key: &TileKey) -> PathBuf {
        self.directory.join(tile_file_name(&key.coord, &self.suffix))
    }
}

/// Stable, collision-free file name for a tile.
fn tile_file_name(coord: &TileCoord, suffix: &str) -> String {
    format!("x={},y={},z={}{}", coord.x, coord.y, coord.zoom, suffix)
}

/// Persistent tier of the tile cache.
///
/// Must be created inside a Tokio runtime; the workers are spawned as
/// tasks on the ambient runtime.
pub struct DiskCache {
    shared: Arc<Shared>,
    write_tx: mpsc::UnboundedSender<WriteRequest>,
    read_tx: mpsc::UnboundedSender<ReadRequest>,
    read_retry_budget: u32,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl DiskCache {
    /// Open the cache: create the backing directory if needed and start
    /// the writer and reader workers.
    ///
    /// # Errors
    ///
    /// Fails if the backing path exists but is not a directory, or if it
    /// cannot be created.
    pub fn open(config: DiskCacheConfig) -> Result<Self, CacheError> {
        if config.directory.exists() && !config.directory.is_dir() {
            return Err(CacheError::NotADirectory(config.directory));
        }
        std::fs::create_dir_all(&config.directory)?;

        let shared = Arc::new(Shared {
            directory: config.directory,
            suffix: config.file_suffix,
            capacity: AtomicUsize::new(config.capacity),
            pending_writes: DashMap::new(),
            queued_reads: DashSet::new(),
            on_read_complete: RwLock::new(None),
        });

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (read_tx, read_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let writer = tokio::spawn(writer_loop(
            Arc::clone(&shared),
            write_rx,
            shutdown.clone(),
        ));
        let reader = tokio::spawn(reader_loop(
            Arc::clone(&shared),
            read_rx,
            read_tx.clone(),
            shutdown.clone(),
        ));

        info!(
            directory = %shared.directory.display(),
            capacity = config.capacity,
            "disk tile cache opened"
        );

        Ok(Self {
            shared,
            write_tx,
            read_tx,
            read_retry_budget: config.read_retry_budget,
            shutdown,
            workers: Mutex::new(vec![writer, reader]),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Whether an entry for `key` has durably reached disk.
    ///
    /// Pending writes are not reported present; presence is decided by the
    /// backing directory alone.
    pub fn contains_key(&self, key: &TileKey) -> bool {
        if self.destroyed.load(Ordering::SeqCst) {
            return false;
        }
        self.shared.file_path(key).exists()
    }

    /// Request a persisted tile.
    ///
    /// Returns `None` unless [`contains_key`](Self::contains_key) holds.
    /// Otherwise the shared placeholder bitmap is returned immediately and
    /// a background read is enqueued; when the decode lands, the
    /// read-complete callback fires so the caller can re-query for the
    /// decoded content. Repeat requests while a read is queued coalesce.
    pub fn get(&self, key: &TileKey) -> Option<Arc<Bitmap>> {
        if self.destroyed.load(Ordering::SeqCst) {
            return None;
        }
        if !self.contains_key(key) {
            return None;
        }

        if self.shared.queued_reads.insert(*key) {
            let _ = self.read_tx.send(ReadRequest {
                key: *key,
                retries_left: self.read_retry_budget,
            });
        }
        Some(Bitmap::placeholder())
    }

    /// Persist a tile unless an entry for `key` already exists or is
    /// already on its way to disk (never overwrites).
    ///
    /// Ownership of the bitmap moves to the write queue; the write happens
    /// in the background and failures are logged, not surfaced here.
    pub fn put(&self, key: &TileKey, bitmap: Arc<Bitmap>) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        if self.contains_key(key) {
            return;
        }

        use dashmap::mapref::entry::Entry;
        match self.shared.pending_writes.entry(*key) {
            Entry::Occupied(_) => return,
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&bitmap));
            }
        }

        let _ = self.write_tx.send(WriteRequest { key: *key, bitmap });
    }

    /// Register the callback invoked after each background decode.
    pub fn set_on_read_complete<F>(&self, callback: F)
    where
        F: Fn(TileKey, Arc<Bitmap>) + Send + Sync + 'static,
    {
        *self.shared.on_read_complete.write() = Some(Arc::new(callback));
    }

    /// Number of persisted tiles, recomputed from the backing directory.
    ///
    /// The directory is authoritative: evictions and external deletions
    /// are reflected on the next call.
    pub fn load(&self) -> usize {
        count_matching(&self.shared.directory, &self.shared.suffix).unwrap_or(0)
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.shared.capacity.load(Ordering::SeqCst)
    }

    /// Update the capacity used by subsequent slot frees. Does not evict
    /// retroactively.
    pub fn set_capacity(&self, capacity: usize) {
        self.shared.capacity.store(capacity, Ordering::SeqCst);
    }

    /// The backing directory.
    pub fn directory(&self) -> &Path {
        &self.shared.directory
    }

    /// The tile file suffix.
    pub fn file_suffix(&self) -> &str {
        &self.shared.suffix
    }

    /// Path of the file a tile persists to.
    pub fn tile_path(&self, key: &TileKey) -> PathBuf {
        self.shared.file_path(key)
    }

    /// Shut down both workers, wait for them to finish, then delete every
    /// matching-suffix file in the backing directory.
    ///
    /// Safe to call more than once; later calls return immediately. The
    /// caller must not issue `get`/`put` concurrently with or after
    /// destruction.
    pub async fn destroy(&self) -> Result<(), CacheError> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!(directory = %self.shared.directory.display(), "destroying disk tile cache");
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            handle
                .await
                .map_err(|e| CacheError::Worker(e.to_string()))?;
        }

        let directory = self.shared.directory.clone();
        let suffix = self.shared.suffix.clone();
        let removed = tokio::task::spawn_blocking(move || remove_matching(&directory, &suffix))
            .await
            .map_err(|e| CacheError::Worker(e.to_string()))??;

        info!(removed, "disk tile cache destroyed");
        Ok(())
    }

    /// Whether [`destroy`](Self::destroy) has been initiated.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for DiskCache {
    fn drop(&mut self) {
        // Stop the workers; file cleanup only happens through destroy().
        self.shutdown.cancel();
    }
}

// =============================================================================
// Writer worker
// =============================================================================

/// Drains the write queue one entry at a time: free a slot, serialize,
/// write, then clear the entry's pending state. Blocks on the channel when
/// idle; woken by new entries or shutdown.
async fn writer_loop(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<WriteRequest>,
    shutdown: CancellationToken,
) {
    info!("disk cache writer started");
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            request = rx.recv() => {
                let Some(request) = request else { break };
                if let Err(e) = write_entry(&shared, &request).await {
                    match e {
                        CacheError::Exhausted { .. } => error!(
                            tile = %request.key.coord,
                            error = %e,
                            "cannot free disk cache slots; dropping tile write"
                        ),
                        _ => warn!(
                            tile = %request.key.coord,
                            error = %e,
                            "dropping tile write"
                        ),
                    }
                }
                // Written or dropped: either way no longer pending.
                shared.pending_writes.remove(&request.key);
            }
        }
    }
    info!("disk cache writer stopped");
}

async fn write_entry(shared: &Arc<Shared>, request: &WriteRequest) -> Result<(), CacheError> {
    free_slots(shared, 1).await?;

    let bytes = bincode::serialize(request.bitmap.as_ref())
        .map_err(|e| CacheError::Encode(e.to_string()))?;
    let path = shared.file_path(&request.key);
    tokio::fs::write(&path, bytes).await?;

    debug!(path = %path.display(), "tile persisted");
    Ok(())
}

/// Delete oldest-modified files until `amount` more entries fit.
///
/// The load is recomputed from the directory on every pass so external
/// deletions are accounted for.
async fn free_slots(shared: &Arc<Shared>, amount: usize) -> Result<(), CacheError> {
    let capacity = shared.capacity.load(Ordering::SeqCst);
    if capacity < amount {
        return Err(CacheError::Exhausted {
            needed: amount,
            capacity,
        });
    }

    let mut load = scan_load(shared).await?;
    while load + amount > capacity {
        match scan_oldest(shared).await? {
            Some(path) => {
                tokio::fs::remove_file(&path).await?;
                debug!(path = %path.display(), "evicted oldest persisted tile");
            }
            None => {
                return Err(CacheError::Exhausted {
                    needed: amount,
                    capacity,
                });
            }
        }
        load = scan_load(shared).await?;
    }
    Ok(())
}

async fn scan_load(shared: &Arc<Shared>) -> Result<usize, CacheError> {
    let directory = shared.directory.clone();
    let suffix = shared.suffix.clone();
    tokio::task::spawn_blocking(move || count_matching(&directory, &suffix))
        .await
        .map_err(|e| CacheError::Worker(e.to_string()))?
        .map_err(CacheError::Io)
}

async fn scan_oldest(shared: &Arc<Shared>) -> Result<Option<PathBuf>, CacheError> {
    let directory = shared.directory.clone();
    let suffix = shared.suffix.clone();
    tokio::task::spawn_blocking(move || oldest_matching(&directory, &suffix))
        .await
        .map_err(|e| CacheError::Worker(e.to_string()))?
        .map_err(CacheError::Io)
}

// =============================================================================
// Reader worker
// =============================================================================

/// Drains the read queue: an entry whose write is still pending goes back
/// on the queue with its retry budget decremented; a readable entry is
/// decoded and announced through the read-complete callback.
async fn reader_loop(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<ReadRequest>,
    requeue: mpsc::UnboundedSender<ReadRequest>,
    shutdown: CancellationToken,
) {
    info!("disk cache reader started");
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            request = rx.recv() => {
                let Some(request) = request else { break };
                read_entry(&shared, &requeue, request).await;
            }
        }
    }
    info!("disk cache reader stopped");
}

async fn read_entry(
    shared: &Arc<Shared>,
    requeue: &mpsc::UnboundedSender<ReadRequest>,
    request: ReadRequest,
) {
    let key = request.key;

    // Not written yet: come back later, within the retry budget.
    if shared.pending_writes.contains_key(&key) {
        retry_or_abandon(shared, requeue, request, "write still pending").await;
        return;
    }

    let path = shared.file_path(&key);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            shared.queued_reads.remove(&key);
            warn!(tile = %key.coord, "persisted tile vanished before read");
            return;
        }
        Err(e) => {
            retry_or_abandon(shared, requeue, request, &e.to_string()).await;
            return;
        }
    };

    let bitmap: Bitmap = match bincode::deserialize(&bytes) {
        Ok(bitmap) => bitmap,
        Err(e) => {
            shared.queued_reads.remove(&key);
            warn!(tile = %key.coord, error = %e, "dropping undecodable persisted tile");
            return;
        }
    };

    shared.queued_reads.remove(&key);
    debug!(tile = %key.coord, "background tile read complete");

    let callback = shared.on_read_complete.read().clone();
    if let Some(callback) = callback {
        callback(key, Arc::new(bitmap));
    }
}

async fn retry_or_abandon(
    shared: &Arc<Shared>,
    requeue: &mpsc::UnboundedSender<ReadRequest>,
    request: ReadRequest,
    reason: &str,
) {
    if request.retries_left == 0 {
        shared.queued_reads.remove(&request.key);
        warn!(tile = %request.key.coord, reason, "abandoning tile read");
        return;
    }

    tokio::time::sleep(READ_REQUEUE_BACKOFF).await;
    let _ = requeue.send(ReadRequest {
        key: request.key,
        retries_left: request.retries_left - 1,
    });
}

// =============================================================================
// Directory scans
// =============================================================================

fn matching_entries(directory: &Path, suffix: &str) -> io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().ends_with(suffix) {
            paths.push(entry.path());
        }
    }
    Ok(paths)
}

fn count_matching(directory: &Path, suffix: &str) -> io::Result<usize> {
    Ok(matching_entries(directory, suffix)?.len())
}

fn oldest_matching(directory: &Path, suffix: &str) -> io::Result<Option<PathBuf>> {
    let mut oldest: Option<(SystemTime, PathBuf)> = None;
    for path in matching_entries(directory, suffix)? {
        let modified = std::fs::metadata(&path)?.modified()?;
        let is_older = oldest
            .as_ref()
            .map(|(time, _)| modified < *time)
            .unwrap_or(true);
        if is_older {
            oldest = Some((modified, path));
        }
    }
    Ok(oldest.map(|(_, path)| path))
}

fn remove_matching(directory: &Path, suffix: &str) -> io::Result<usize> {
    let mut removed = 0;
    for path in matching_entries(directory, suffix)? {
        std::fs::remove_file(&path)?;
        removed += 1;
    }
    Ok(removed)
}
