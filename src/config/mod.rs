//! Configuration store for project documents and the global document.

mod document;
mod error;
mod global;
mod storage;

pub use document::{
    Document, INCLUDE_DIRS, INCLUDE_FILES, IGNORED_DIRS, IGNORED_FILES, SRC_FILES, STATIC_LINKED,
    STATIC_LINKED_DIRS, Section, SectionMut,
};
pub use error::{ConfigError, SchemaProblem};
pub use global::{ENV_PREFIX, GLOBAL_FILE, GlobalStore};
pub use storage::{DocumentStorage, FileStorage, MemoryStorage, write_atomic};

use crate::models::{Metadata, ProjectConfig, ProjectSettings};
use camino::{Utf8Path, Utf8PathBuf};
use toml::Value;

/// Typed access to one project's `config.toml`.
///
/// Every read re-parses the whole document and every write re-serializes it. There is
/// no cache, so two stores (or a store and an editor) pointed at the same file see each
/// other's changes on their next operation. Concurrent writers are last-writer-wins.
#[derive(Debug)]
pub struct ConfigStore<S: DocumentStorage = FileStorage> {
    storage: S,
    root: Utf8PathBuf,
    project_name: String,
}

impl ConfigStore<FileStorage> {
    /// Store backed by `<project>/config.toml`
    pub fn open(project: &ProjectConfig) -> Self {
        Self::with_storage(
            FileStorage::new(project.config_path()),
            project.path.clone(),
            project.name.clone(),
        )
    }
}

impl<S: DocumentStorage> ConfigStore<S> {
    /// Create a store over any storage backend.
    ///
    /// # Arguments
    /// * `storage` - Where the document text lives
    /// * `root` - Project root used to resolve relative paths
    /// * `project_name` - Name used when the document has none
    pub fn with_storage(storage: S, root: impl Into<Utf8PathBuf>, project_name: impl Into<String>) -> Self {
        Self {
            storage,
            root: root.into(),
            project_name: project_name.into(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Read and parse the raw document
    pub fn read_document(&self) -> Result<Document, ConfigError> {
        let text = self.storage.read()?;
        Document::parse(&text, &self.storage.location())
    }

    /// Load and validate the project settings.
    pub fn load(&self) -> Result<ProjectSettings, ConfigError> {
        let settings = self
            .read_document()?
            .to_settings(&self.root, &self.project_name)?;
        tracing::debug!("Loaded project settings from {}", self.storage.location());
        Ok(settings)
    }

    /// Replace the whole document with one derived from `settings`
    pub fn save(&self, settings: &ProjectSettings) -> Result<(), ConfigError> {
        let text = Document::from_settings(settings).to_text()?;
        self.storage.write(&text)?;
        tracing::info!("Saved project settings to {}", self.storage.location());
        Ok(())
    }

    /// Read, edit and rewrite the whole document.
    ///
    /// The document must pass schema validation before and after `edit`. Nothing is
    /// written when either check fails, when `edit` fails, or when the edit left the
    /// document unchanged.
    pub fn update<R, F>(&self, edit: F) -> Result<R, ConfigError>
    where
        F: FnOnce(&mut Document) -> Result<R, ConfigError>,
    {
        let original = self.read_document()?;
        original.to_settings(&self.root, &self.project_name)?;

        let mut document = original.clone();
        let result = edit(&mut document)?;

        if document != original {
            document.to_settings(&self.root, &self.project_name)?;
            self.storage.write(&document.to_text()?)?;
        }
        Ok(result)
    }

    /// [`update`](Self::update) scoped to one section
    pub fn mutate<R, F>(&self, section: Section, edit: F) -> Result<R, ConfigError>
    where
        F: FnOnce(&mut SectionMut<'_>) -> Result<R, ConfigError>,
    {
        self.update(|document| {
            let mut section = document.section(section)?;
            edit(&mut section)
        })
    }

    /// Add one entry to `[source] "src files"`. Returns whether it was new.
    pub fn add_source_file(&self, entry: &str) -> Result<bool, ConfigError> {
        let added = self.mutate(Section::Source, |source| source.add_unique(SRC_FILES, entry))?;
        if added {
            tracing::info!("Added {} to source files", entry);
        }
        Ok(added)
    }

    /// Remove entries from `[source] "src files"`. Returns how many were removed.
    pub fn remove_source_files<T: AsRef<str>>(&self, entries: &[T]) -> Result<usize, ConfigError> {
        let removed = self.mutate(Section::Source, |source| source.remove_all(SRC_FILES, entries))?;
        if removed > 0 {
            tracing::info!("Removed {} source file entr{}", removed, if removed == 1 { "y" } else { "ies" });
        }
        Ok(removed)
    }

    /// Set one `[extra]` override
    pub fn set_extra(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.mutate(Section::Extra, |extra| {
            extra.set(key, value);
            Ok(())
        })
    }

    /// Replace the `[metadata]` section
    pub fn set_metadata(&self, metadata: &Metadata) -> Result<(), ConfigError> {
        self.mutate(Section::Metadata, |section| {
            section.set("version", metadata.version.as_str());
            section.set(
                "authors",
                Value::Array(metadata.authors.iter().cloned().map(Value::String).collect()),
            );
            section.set("description", metadata.description.as_str());
            section.set("license", metadata.license.as_str());
            section.set("github_username", metadata.github_username.as_str());
            section.set("github_repo", metadata.github_repo.as_str());
            Ok(())
        })
    }
}
