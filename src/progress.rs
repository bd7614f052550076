use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

/// Receives a record counter while a block build runs.
///
/// Called from worker threads, possibly out of order; `current` is the
/// number of query records finished so far.
pub trait ProgressObserver: Sync {
    fn on_progress(&self, current: usize, total: usize);
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize) + Sync,
{
    fn on_progress(&self, current: usize, total: usize) {
        self(current, total);
    }
}

/// Discards progress updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _current: usize, _total: usize) {}
}

/// Emits a `debug!` event every `every` records and at completion.
#[derive(Clone, Copy, Debug)]
pub struct LogProgress {
    pub every: usize,
}

impl Default for LogProgress {
    fn default() -> Self {
        Self { every: 1000 }
    }
}

impl ProgressObserver for LogProgress {
    fn on_progress(&self, current: usize, total: usize) {
        if current == total || (self.every > 0 && current % self.every == 0) {
            debug!(current, total, "blocking progress");
        }
    }
}

/// Shared counter that turns per-record completions into observer calls.
pub(crate) struct ProgressCounter<'a> {
    done: AtomicUsize,
    total: usize,
    observer: &'a dyn ProgressObserver,
}

impl<'a> ProgressCounter<'a> {
    pub(crate) fn new(total: usize, observer: &'a dyn ProgressObserver) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
            observer,
        }
    }

    pub(crate) fn tick(&self) {
        let current = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        self.observer.on_progress(current, self.total);
    }
}
