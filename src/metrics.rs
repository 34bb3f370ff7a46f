use std::sync::atomic::{AtomicU64, Ordering};

/// Dropped-job/notification counters, exposed through `Pipeline::dropped_jobs`
/// / `Pipeline::dropped_notifications`. Plain atomics, matching the teacher's
/// preference for simple shared counters over a metrics crate.
#[derive(Default)]
pub struct Metrics {
    dropped_jobs: AtomicU64,
    dropped_notifications: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub fn record_dropped_job(&self) {
        self.dropped_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_notification(&self) {
        self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_jobs(&self) -> u64 {
        self.dropped_jobs.load(Ordering::Relaxed)
    }

    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }
}
