//! Serialized render-job execution.
//!
//! One loop instance at a time drains the job list: pop the nearest job,
//! rasterize it on a blocking worker, store the result in the memory tier,
//! request a repaint, continue. A compare-and-set on an atomic flag
//! guarantees at most one active loop; a pause flag is checked before the
//! loop starts and at every iteration boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::MemoryCache;
use crate::tile::TileRenderer;

use super::jobs::{JobList, RenderJob};
use super::RedrawNotifier;

/// Default bound on one rasterize-and-store round trip.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// The singleton job-execution loop.
pub struct RenderLoop {
    jobs: Arc<JobList>,
    renderer: Arc<dyn TileRenderer>,
    memory: Arc<MemoryCache>,
    notifier: Arc<dyn RedrawNotifier>,
    paused: Arc<AtomicBool>,
    running: AtomicBool,
    job_timeout: Duration,
}

impl RenderLoop {
    /// Create the loop. `paused` is shared with the owning engine so the
    /// gate and the loop observe the same flag.
    pub fn new(
        jobs: Arc<JobList>,
        renderer: Arc<dyn TileRenderer>,
        memory: Arc<MemoryCache>,
        notifier: Arc<dyn RedrawNotifier>,
        paused: Arc<AtomicBool>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            jobs,
            renderer,
            memory,
            notifier,
            paused,
            running: AtomicBool::new(false),
            job_timeout,
        }
    }

    /// Start draining the job list unless paused or already draining.
    ///
    /// The drain runs as a background task, never on the caller's thread.
    /// A re-entrant trigger while a loop instance is active is a no-op;
    /// once the loop exits it can be started again. Must be called from
    /// within a Tokio runtime.
    pub fn execute(self: &Arc<Self>) {
        if self.paused.load(Ordering::SeqCst) {
            return;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drain().await;
            this.running.store(false, Ordering::SeqCst);
        });
    }

    /// Whether a loop instance is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn drain(&self) {
        while !self.paused.load(Ordering::SeqCst) {
            let Some(job) = self.jobs.pop() else { break };
            self.run_job(job).await;
        }
    }

    /// One rasterize-and-store round trip, bounded by the job timeout.
    /// Failures are isolated to the job.
    async fn run_job(&self, job: RenderJob) {
        let renderer = Arc::clone(&self.renderer);
        let key = job.key;
        let render = tokio::task::spawn_blocking(move || renderer.render(&key));

        match tokio::time::timeout(self.job_timeout, render).await {
            Ok(Ok(Ok(bitmap))) => {
                self.memory.put(key, Arc::new(bitmap));
                debug!(tile = %key.coord, "tile rendered");
                self.notifier.request_redraw();
            }
            Ok(Ok(Err(e))) => {
                warn!(tile = %key.coord, error = %e, "tile rasterization failed");
            }
            Ok(Err(e)) => {
                warn!(tile = %key.coord, error = %e, "render worker failed");
            }
            Err(_) => {
                warn!(
                    tile = %key.coord,
                    timeout_secs = self.job_timeout.as_secs(),
                    "tile rasterization timed out; result will be discarded"
                );
            }
        }
    }
}
