use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerCounters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    stages_run: AtomicU64,
    rows_loaded: AtomicU64,
}

/// Live, in-process progress of a run. The persisted run record stays the
/// source of truth; these counters only feed logs and the final summary.
#[derive(Debug, Clone, Default)]
pub struct RunCounters {
    inner: Arc<InnerCounters>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub stages_run: u64,
    pub rows_loaded: u64,
}

impl CountersSnapshot {
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }

    pub fn in_flight(&self) -> u64 {
        self.dispatched.saturating_sub(self.finished())
    }
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_dispatched(&self) {
        self.inner.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_completed(&self) {
        self.inner.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.inner.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_stages(&self, count: u64) {
        self.inner.stages_run.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_rows(&self, count: u64) {
        self.inner.rows_loaded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            dispatched: self.inner.dispatched.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            stages_run: self.inner.stages_run.load(Ordering::Relaxed),
            rows_loaded: self.inner.rows_loaded.load(Ordering::Relaxed),
        }
    }
}
