//! The pending render-job list.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::tile::TileKey;

/// A unit of work: render one missing tile.
///
/// `distance` is the Euclidean distance, in tile units, from the job's
/// tile to the canvas center at the moment the job was created; it decides
/// execution order (nearest first).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderJob {
    /// Identity of the tile to render.
    pub key: TileKey,
    /// Distance to the canvas center at enqueue time.
    pub distance: f64,
}

impl RenderJob {
    /// Create a render job.
    pub fn new(key: TileKey, distance: f64) -> Self {
        Self { key, distance }
    }
}

/// Ordered list of pending render jobs.
///
/// A job-creating redraw replaces the whole list atomically: the execution
/// loop pops one job at a time and never observes a partially updated
/// list. Jobs dropped by a replacement are simply forgotten.
#[derive(Default)]
pub struct JobList {
    jobs: Mutex<VecDeque<RenderJob>>,
}

impl JobList {
    /// Create an empty job list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort the candidates nearest-to-center first and swap them in as the
    /// new live list, discarding any not-yet-started jobs.
    pub fn replace(&self, mut candidates: Vec<RenderJob>) {
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        *self.jobs.lock() = VecDeque::from(candidates);
    }

    /// Take the nearest pending job.
    pub fn pop(&self) -> Option<RenderJob> {
        self.jobs.lock().pop_front()
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Whether no jobs are pending.
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Drop all pending jobs.
    pub fn clear(&self) {
        self.jobs.lock().clear();
    }
}
