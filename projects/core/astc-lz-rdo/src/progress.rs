//! Completion reporting shared by the workers of one optimization.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Counts completed blocks and forwards the percentage to an optional callback.
///
/// Workers finish items in any order, so the callback may observe percentages from different
/// threads; each reported value is never lower than a value reported before it by the same
/// thread.
pub struct ProgressTracker<'a> {
    total: usize,
    completed: AtomicUsize,
    callback: Option<&'a (dyn Fn(f32) + Sync)>,
}

impl<'a> ProgressTracker<'a> {
    /// Creates a tracker for `total` units of work.
    pub fn new(total: usize, callback: Option<&'a (dyn Fn(f32) + Sync)>) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            callback,
        }
    }

    /// Records `count` more completed units and returns the new percentage.
    pub fn complete(&self, count: usize) -> f32 {
        let completed = self.completed.fetch_add(count, Ordering::Relaxed) + count;
        let percent = Self::percent_of(completed, self.total);
        if let Some(callback) = self.callback {
            callback(percent);
        }
        percent
    }

    /// Units completed so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Completion in `[0, 100]`.
    pub fn percent(&self) -> f32 {
        Self::percent_of(self.completed(), self.total)
    }

    fn percent_of(completed: usize, total: usize) -> f32 {
        if total == 0 {
            return 100.0;
        }
        (completed.min(total) as f64 * 100.0 / total as f64) as f32
    }
}
