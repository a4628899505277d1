use crate::config::{
    ConfigError, ConfigStore, DocumentStorage, FileStorage, IGNORED_FILES, SRC_FILES, Section,
};
use crate::metrics::WatchMetrics;
use camino::Utf8Path;
use std::sync::Arc;

/// What one watcher event did to the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Added,
    AlreadyPresent,
    /// Creation of a file listed in `[ignore] files`
    Ignored,
    Removed,
    NotPresent,
}

/// Keeps `[source] "src files"` in step with a watched directory.
///
/// Entries are written as `<watched dir relative to the project root>/<file name>`,
/// e.g. `src/main.cpp`. Each event loads and rewrites the document on its own.
#[derive(Debug)]
pub struct SourceSync<S: DocumentStorage = FileStorage> {
    store: ConfigStore<S>,
    prefix: String,
    metrics: Option<Arc<WatchMetrics>>,
}

impl<S: DocumentStorage> SourceSync<S> {
    /// Directories outside the project root are recorded by their full path.
    pub fn new(store: ConfigStore<S>, watched_dir: &Utf8Path) -> Self {
        let prefix = match watched_dir.strip_prefix(store.root()) {
            Ok(relative) => relative
                .components()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => watched_dir.as_str().trim_end_matches('/').to_string(),
        };

        Self {
            store,
            prefix,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<WatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &ConfigStore<S> {
        &self.store
    }

    /// Document entry for a file in the watched directory
    pub fn entry_for(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    /// Apply one creation or removal to the document.
    pub fn apply(&self, name: &str, created: bool) -> Result<SyncOutcome, ConfigError> {
        let entry = self.entry_for(name);

        let outcome = if created {
            self.store.update(|document| {
                let ignored = document.strings(Section::Ignore, IGNORED_FILES)?;
                if ignored.iter().any(|f| f == name || *f == entry) {
                    return Ok(SyncOutcome::Ignored);
                }
                let added = document.section(Section::Source)?.add_unique(SRC_FILES, &entry)?;
                Ok(if added {
                    SyncOutcome::Added
                } else {
                    SyncOutcome::AlreadyPresent
                })
            })?
        } else {
            let removed = self.store.remove_source_files(&[entry.as_str()])?;
            if removed > 0 {
                SyncOutcome::Removed
            } else {
                SyncOutcome::NotPresent
            }
        };

        match outcome {
            SyncOutcome::Added => {
                tracing::info!("File added: {}", entry);
                self.record(WatchMetrics::record_file_created);
            }
            SyncOutcome::Removed => {
                tracing::info!("File removed: {}", entry);
                self.record(WatchMetrics::record_file_removed);
            }
            SyncOutcome::Ignored => {
                tracing::info!("Ignoring file: {}", name);
                self.record(WatchMetrics::record_file_ignored);
            }
            SyncOutcome::AlreadyPresent | SyncOutcome::NotPresent => {
                tracing::debug!("{} already in sync", entry);
            }
        }

        Ok(outcome)
    }

    /// Callback for [`DirectoryWatcher`](super::DirectoryWatcher).
    ///
    /// Failures are logged and counted; the watcher keeps running.
    pub fn into_callback(self) -> impl FnMut(&str, bool) + Send
    where
        S: 'static,
    {
        move |name: &str, created: bool| {
            if let Err(e) = self.apply(name, created) {
                tracing::error!("Error during watch callback for {}: {}", name, e);
                self.record(WatchMetrics::record_sync_error);
            }
        }
    }

    fn record(&self, f: fn(&WatchMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}
