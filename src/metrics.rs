use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing service activity.
#[derive(Default)]
pub struct ServiceMetrics {
    files_uploaded: AtomicU64,
    files_processed: AtomicU64,
    searches_run: AtomicU64,
    webhook_events: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed upload registration.
    pub fn record_upload(&self) {
        self.files_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the number of files handled by a completed process batch.
    pub fn record_processed(&self, file_count: u64) {
        self.files_processed.fetch_add(file_count, Ordering::Relaxed);
    }

    /// Record a completed search query.
    pub fn record_search(&self) {
        self.searches_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handled identity webhook event.
    pub fn record_webhook_event(&self) {
        self.webhook_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_uploaded: self.files_uploaded.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            searches_run: self.searches_run.load(Ordering::Relaxed),
            webhook_events: self.webhook_events.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of upload registrations since startup.
    pub files_uploaded: u64,
    /// Number of files run through the process pipeline since startup.
    pub files_processed: u64,
    /// Number of search queries since startup.
    pub searches_run: u64,
    /// Number of identity webhook events handled since startup.
    pub webhook_events: u64,
}
