// Watcher metrics module
//
// Lightweight counters for the long-running `watch` command

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for one directory-watch session
///
/// Uses atomic operations so the watcher task and the synchronizer callback can both
/// record without locks. Logged once when the watcher stops.
#[derive(Debug)]
pub struct WatchMetrics {
    /// Poll ticks that produced a snapshot
    pub ticks: AtomicU64,

    /// Poll ticks skipped because the directory could not be read
    pub ticks_skipped: AtomicU64,

    /// Source entries added to the document
    pub files_created: AtomicU64,

    /// Source entries removed from the document
    pub files_removed: AtomicU64,

    /// Creations skipped because the file is ignored
    pub files_ignored: AtomicU64,

    /// Whole-document rewrites
    pub document_writes: AtomicU64,

    /// Callback failures (document unreadable or invalid)
    pub sync_errors: AtomicU64,

    start_time: Instant,
}

impl WatchMetrics {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            files_created: AtomicU64::new(0),
            files_removed: AtomicU64::new(0),
            files_ignored: AtomicU64::new(0),
            document_writes: AtomicU64::new(0),
            sync_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an added source entry (one document write)
    pub fn record_file_created(&self) {
        self.files_created.fetch_add(1, Ordering::Relaxed);
        self.document_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a removed source entry (one document write)
    pub fn record_file_removed(&self) {
        self.files_removed.fetch_add(1, Ordering::Relaxed);
        self.document_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file_ignored(&self) {
        self.files_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sync_error(&self) {
        self.sync_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Watch Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Ticks: {} polled, {} skipped",
            self.ticks.load(Ordering::Relaxed),
            self.ticks_skipped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Files: {} added, {} removed, {} ignored",
            self.files_created.load(Ordering::Relaxed),
            self.files_removed.load(Ordering::Relaxed),
            self.files_ignored.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Document writes: {}, sync errors: {}",
            self.document_writes.load(Ordering::Relaxed),
            self.sync_errors.load(Ordering::Relaxed)
        );
    }
}

impl Default for WatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
