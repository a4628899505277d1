//! Whole-document storage backends.
//!
//! The configuration store never edits a document in place: it reads the whole text,
//! edits a parsed copy and hands the whole text back. [`DocumentStorage`] is the seam
//! where locking or revision checks can be added without touching callers.

use super::ConfigError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Read-whole / write-whole access to one document
pub trait DocumentStorage: Send + Sync {
    /// Return the full document text
    fn read(&self) -> Result<String, ConfigError>;

    /// Replace the full document text
    fn write(&self, contents: &str) -> Result<(), ConfigError>;

    /// Human-readable location used in error messages
    fn location(&self) -> String;
}

/// File-backed storage with write-to-temp-then-rename replacement.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: Utf8PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl DocumentStorage for FileStorage {
    fn read(&self) -> Result<String, ConfigError> {
        fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ConfigError::MissingDocument(self.path.clone())
            } else {
                ConfigError::io(&self.path, e)
            }
        })
    }

    fn write(&self, contents: &str) -> Result<(), ConfigError> {
        write_atomic(&self.path, contents)
    }

    fn location(&self) -> String {
        self.path.to_string()
    }
}

/// Write `contents` next to `path` and rename it into place.
///
/// Readers observe either the old or the new document, never a truncated one.
pub fn write_atomic(path: &Utf8Path, contents: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
    }

    let temp_path = path.with_file_name(format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or("document"),
        std::process::id()
    ));

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| ConfigError::io(&temp_path, e))?;

    temp_file
        .write_all(contents.as_bytes())
        .map_err(|e| ConfigError::io(&temp_path, e))?;
    temp_file.sync_all().map_err(|e| ConfigError::io(&temp_path, e))?;
    drop(temp_file);

    fs::rename(&temp_path, path).map_err(|e| ConfigError::io(path, e))?;

    tracing::debug!("Rewrote {}", path);
    Ok(())
}

/// In-memory storage, mostly for tests. Counts writes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    contents: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
            writes: AtomicUsize::new(0),
        }
    }

    /// Current document text, if any
    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of completed writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl DocumentStorage for MemoryStorage {
    fn read(&self) -> Result<String, ConfigError> {
        self.contents()
            .ok_or_else(|| ConfigError::MissingDocument(Utf8PathBuf::from(self.location())))
    }

    fn write(&self, contents: &str) -> Result<(), ConfigError> {
        *self
            .contents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(contents.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_storage_missing_document() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let storage = FileStorage::new(root.join("config.toml"));

        assert!(matches!(storage.read(), Err(ConfigError::MissingDocument(_))));
    }

    #[test]
    fn test_file_storage_write_replaces_whole_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let storage = FileStorage::new(root.join("config.toml"));

        storage.write("name = \"first\"\nextra = 1\n").unwrap();
        storage.write("name = \"second\"\n").unwrap();

        assert_eq!(storage.read().unwrap(), "name = \"second\"\n");

        // No temporary files are left behind
        let leftovers: Vec<_> = fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_memory_storage_counts_writes() {
        let storage = MemoryStorage::new("name = \"demo\"\n");
        assert_eq!(storage.write_count(), 0);

        storage.write("name = \"other\"\n").unwrap();
        storage.write("name = \"third\"\n").unwrap();

        assert_eq!(storage.write_count(), 2);
        assert_eq!(storage.read().unwrap(), "name = \"third\"\n");
    }
}
