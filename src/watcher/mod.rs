//! Polling directory watcher.
//!
//! [`DirectoryWatcher`] snapshots the regular files of one directory at a fixed interval
//! and reports creations and removals to a callback. It runs as a tokio task and stops
//! when its cancellation channel flips to `true` (or its sender is dropped).
//!
//! ```text
//! Idle --interval--> Polling --diff--> Idle ... --cancel--> Stopped
//! ```

mod sync;

pub use sync::{SourceSync, SyncOutcome};

use crate::metrics::WatchMetrics;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::watch;

/// Default poll interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Directory does not exist: {0}")]
    NotADirectory(Utf8PathBuf),

    #[error("Failed to read {path}: {source}")]
    Snapshot {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A change between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(String),
    Removed(String),
}

impl FileEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::Created(name) | Self::Removed(name) => name,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// File name to modification time for the regular files directly inside one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: HashMap<String, SystemTime>,
}

impl Snapshot {
    /// Read the directory. Entries whose metadata cannot be read are left out;
    /// symlinks are followed.
    pub fn capture(dir: &Utf8Path) -> std::io::Result<Self> {
        let mut entries = HashMap::new();

        for entry in fs::read_dir(dir)? {
            let Ok(entry) = entry else { continue };
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let Ok(metadata) = fs::metadata(entry.path()) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            entries.insert(name, modified);
        }

        Ok(Self { entries })
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, SystemTime)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names present only in `next` are created; names present only in `self` are
    /// removed. Modification times are not compared.
    pub fn diff(&self, next: &Snapshot) -> Vec<FileEvent> {
        let created = next
            .entries
            .keys()
            .filter(|name| !self.entries.contains_key(*name))
            .map(|name| FileEvent::Created(name.clone()));
        let removed = self
            .entries
            .keys()
            .filter(|name| !next.entries.contains_key(*name))
            .map(|name| FileEvent::Removed(name.clone()));
        created.chain(removed).collect()
    }
}

/// Polls one directory and calls `callback(file_name, created)` for each change.
pub struct DirectoryWatcher<F> {
    dir: Utf8PathBuf,
    interval: Duration,
    callback: F,
    snapshot: Snapshot,
    metrics: Option<Arc<WatchMetrics>>,
}

impl<F> DirectoryWatcher<F>
where
    F: FnMut(&str, bool) + Send,
{
    /// Create a watcher and take the initial snapshot.
    ///
    /// Files already present are not reported.
    pub fn new(dir: impl Into<Utf8PathBuf>, interval: Duration, callback: F) -> Result<Self, WatchError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(WatchError::NotADirectory(dir));
        }
        let snapshot = Snapshot::capture(&dir).map_err(|source| WatchError::Snapshot {
            path: dir.clone(),
            source,
        })?;

        Ok(Self {
            dir,
            interval,
            callback,
            snapshot,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<WatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Take one snapshot, fire callbacks and replace the stored snapshot.
    ///
    /// # Returns
    /// The number of events, or `None` when the directory could not be read (the old
    /// snapshot is kept and no callback fires)
    pub fn tick(&mut self) -> Option<usize> {
        let next = match Snapshot::capture(&self.dir) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!("Skipping poll of {}: {}", self.dir, e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_tick_skipped();
                }
                return None;
            }
        };

        let events = self.snapshot.diff(&next);
        for event in &events {
            tracing::debug!("{:?} in {}", event, self.dir);
            (self.callback)(event.name(), event.is_created());
        }
        self.snapshot = next;

        if let Some(metrics) = &self.metrics {
            metrics.record_tick();
        }
        Some(events.len())
    }

    /// Poll until `cancel` becomes `true` or its sender is dropped.
    ///
    /// The flag is checked before every wait and raced against the interval sleep, so
    /// cancellation never waits out a full interval. A tick that has started always
    /// finishes. Ticks run on the blocking pool since they read the directory and the
    /// callback may rewrite the project document.
    pub async fn run(self, mut cancel: watch::Receiver<bool>)
    where
        F: 'static,
    {
        let dir = self.dir.clone();
        let interval = self.interval;
        let metrics = self.metrics.clone();
        tracing::info!("Watching {} every {}ms", dir, interval.as_millis());

        let mut watcher = self;
        loop {
            if *cancel.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let polled = tokio::task::spawn_blocking(move || {
                        watcher.tick();
                        watcher
                    })
                    .await;
                    watcher = match polled {
                        Ok(watcher) => watcher,
                        Err(e) => {
                            tracing::error!("Poll of {} failed: {}", dir, e);
                            break;
                        }
                    };
                }
                changed = cancel.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Cancellation sender dropped");
                        break;
                    }
                }
            }
        }

        tracing::info!("Stopped watching {}", dir);
        if let Some(metrics) = &metrics {
            metrics.log_summary();
        }
    }
}
