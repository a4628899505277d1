//! Parsed project document and section-level editing.
//!
//! [`Document`] owns the raw TOML table. Loading projects it into a typed
//! [`ProjectSettings`]; mutation goes through [`SectionMut`], which treats every
//! array-valued key as an ordered set.

use super::{ConfigError, SchemaProblem};
use crate::models::{BuildKind, Metadata, NamedConfiguration, ProjectSettings};
use camino::Utf8Path;
use indexmap::IndexMap;
use toml::{Table, Value};

pub const SRC_FILES: &str = "src files";
pub const INCLUDE_FILES: &str = "include files";
pub const INCLUDE_DIRS: &str = "include directories";
pub const STATIC_LINKED: &str = "static_linked";
pub const STATIC_LINKED_DIRS: &str = "static_linked_dirs";
pub const IGNORED_FILES: &str = "files";
pub const IGNORED_DIRS: &str = "dirs";

/// Top-level sections that can be edited through [`Document::section`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Source,
    Ignore,
    Dependencies,
    Extra,
    Build,
    Metadata,
    Defines,
}

impl Section {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Ignore => "ignore",
            Self::Dependencies => "dependencies",
            Self::Extra => "extra",
            Self::Build => "build",
            Self::Metadata => "metadata",
            Self::Defines => "defines",
        }
    }
}

/// A whole project document, parsed but not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    table: Table,
}

impl Document {
    /// Parse document text. `location` is only used in the error message.
    pub fn parse(text: &str, location: &str) -> Result<Self, ConfigError> {
        let table = toml::from_str::<Table>(text).map_err(|e| ConfigError::Parse {
            location: location.to_string(),
            message: e.message().to_string(),
        })?;
        Ok(Self { table })
    }

    pub fn from_table(table: Table) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn to_text(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(&self.table)?)
    }

    /// Top-level `name`, if present and a string
    pub fn name(&self) -> Option<&str> {
        self.table.get("name").and_then(Value::as_str)
    }

    /// String elements of `[section] key` without creating anything; empty when absent
    pub fn strings(&self, section: Section, key: &str) -> Result<Vec<String>, ConfigError> {
        match optional_table(&self.table, section.key())? {
            Some(table) => optional_string_array(table, section.key(), key),
            None => Ok(Vec::new()),
        }
    }

    /// Mutable view of one section, created empty when absent
    pub fn section(&mut self, section: Section) -> Result<SectionMut<'_>, ConfigError> {
        let name = section.key();
        let value = self
            .table
            .entry(name.to_string())
            .or_insert(Value::Table(Table::new()));

        match value {
            Value::Table(table) => Ok(SectionMut { name, table }),
            _ => Err(ConfigError::schema(name, name, SchemaProblem::NotATable)),
        }
    }

    /// Validate the document and project it into typed settings.
    ///
    /// # Arguments
    /// * `root` - Project root stored on the result
    /// * `fallback_name` - Used when the document has no top-level `name`
    pub fn to_settings(&self, root: &Utf8Path, fallback_name: &str) -> Result<ProjectSettings, ConfigError> {
        let name = match self.table.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => return Err(ConfigError::schema("", "name", SchemaProblem::NotAString)),
            None => fallback_name.to_string(),
        };
        let mut settings = ProjectSettings::new(root, name);

        let source = required_table(&self.table, "source")?;
        settings.src_files = required_string_array(source, "source", SRC_FILES)?;
        settings.include_files = required_string_array(source, "source", INCLUDE_FILES)?;
        settings.include_dirs = required_string_array(source, "source", INCLUDE_DIRS)?;
        settings.static_linked = required_string_array(source, "source", STATIC_LINKED)?;
        settings.static_linked_dirs = required_string_array(source, "source", STATIC_LINKED_DIRS)?;

        if let Some(ignore) = optional_table(&self.table, "ignore")? {
            settings.ignored_files = optional_string_array(ignore, "ignore", IGNORED_FILES)?;
            settings.ignored_dirs = optional_string_array(ignore, "ignore", IGNORED_DIRS)?;
        }

        settings.dependencies = string_map(&self.table, "dependencies")?;
        settings.extra = string_map(&self.table, "extra")?;
        settings.defines = string_map(&self.table, "defines")?;

        if let Some(build) = optional_table(&self.table, "build")? {
            if let Some(output_name) = optional_string(build, "build", "build_name")? {
                if !output_name.is_empty() {
                    settings.build.output_name = output_name;
                }
            }
            if let Some(kind) = optional_string(build, "build", "build_type")? {
                settings.build.kind = BuildKind::parse(&kind)
                    .ok_or(ConfigError::UnsupportedBuildType(kind))?;
            }
        }

        if let Some(metadata) = optional_table(&self.table, "metadata")? {
            settings.metadata = parse_metadata(metadata)?;
        }

        if let Some(configurations) = optional_table(&self.table, "configurations")? {
            for (name, value) in configurations {
                let table = value
                    .as_table()
                    .ok_or_else(|| ConfigError::schema("configurations", name, SchemaProblem::NotATable))?;
                let section = format!("configurations.{}", name);
                settings.configurations.insert(
                    name.clone(),
                    NamedConfiguration {
                        flags: optional_string_array(table, &section, "flags")?,
                        output: optional_string(table, &section, "output")?,
                    },
                );
            }
        }

        Ok(settings)
    }

    /// Build a complete document from typed settings
    pub fn from_settings(settings: &ProjectSettings) -> Self {
        let mut table = Table::new();
        table.insert("name".to_string(), Value::String(settings.name.clone()));

        let mut source = Table::new();
        source.insert(SRC_FILES.to_string(), string_array(&settings.src_files));
        source.insert(INCLUDE_FILES.to_string(), string_array(&settings.include_files));
        source.insert(INCLUDE_DIRS.to_string(), string_array(&settings.include_dirs));
        source.insert(STATIC_LINKED.to_string(), string_array(&settings.static_linked));
        source.insert(STATIC_LINKED_DIRS.to_string(), string_array(&settings.static_linked_dirs));
        table.insert("source".to_string(), Value::Table(source));

        let mut ignore = Table::new();
        ignore.insert(IGNORED_FILES.to_string(), string_array(&settings.ignored_files));
        ignore.insert(IGNORED_DIRS.to_string(), string_array(&settings.ignored_dirs));
        table.insert("ignore".to_string(), Value::Table(ignore));

        table.insert("dependencies".to_string(), string_table(&settings.dependencies));
        table.insert("extra".to_string(), string_table(&settings.extra));

        let mut build = Table::new();
        build.insert(
            "build_name".to_string(),
            Value::String(settings.build.output_name.clone()),
        );
        build.insert(
            "build_type".to_string(),
            Value::String(settings.build.kind.as_str().to_string()),
        );
        table.insert("build".to_string(), Value::Table(build));

        if !settings.metadata.is_empty() {
            table.insert("metadata".to_string(), metadata_table(&settings.metadata));
        }

        table.insert("defines".to_string(), string_table(&settings.defines));

        if !settings.configurations.is_empty() {
            let mut configurations = Table::new();
            for (name, configuration) in &settings.configurations {
                let mut entry = Table::new();
                entry.insert("flags".to_string(), string_array(&configuration.flags));
                if let Some(output) = &configuration.output {
                    entry.insert("output".to_string(), Value::String(output.clone()));
                }
                configurations.insert(name.clone(), Value::Table(entry));
            }
            table.insert("configurations".to_string(), Value::Table(configurations));
        }

        Self { table }
    }
}

/// Mutable handle on one top-level section.
#[derive(Debug)]
pub struct SectionMut<'a> {
    name: &'static str,
    table: &'a mut Table,
}

impl SectionMut<'_> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Append `value` to the array at `key` unless it is already present.
    ///
    /// Returns `true` when the array changed. A missing key starts a new array.
    pub fn add_unique(&mut self, key: &str, value: &str) -> Result<bool, ConfigError> {
        let items = self.array_mut(key)?;
        if items.iter().any(|item| item.as_str() == Some(value)) {
            tracing::debug!("[{}] '{}' already contains {}", self.name, key, value);
            return Ok(false);
        }
        items.push(Value::String(value.to_string()));
        Ok(true)
    }

    /// [`add_unique`](Self::add_unique) for every value, returning how many were added
    pub fn add_all<I, S>(&mut self, key: &str, values: I) -> Result<usize, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for value in values {
            if self.add_unique(key, value.as_ref())? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Drop every element of the array at `key` equal to any of `values`.
    ///
    /// Remaining elements keep their order. A missing key is a no-op.
    pub fn remove_all<S: AsRef<str>>(&mut self, key: &str, values: &[S]) -> Result<usize, ConfigError> {
        if !self.table.contains_key(key) {
            tracing::debug!("[{}] has no '{}', nothing to remove", self.name, key);
            return Ok(0);
        }
        let items = self.array_mut(key)?;
        let before = items.len();
        items.retain(|item| {
            !item
                .as_str()
                .is_some_and(|s| values.iter().any(|v| v.as_ref() == s))
        });
        let removed = before - items.len();
        if removed == 0 {
            tracing::debug!("[{}] '{}' had nothing to remove", self.name, key);
        }
        Ok(removed)
    }

    /// String elements of the array at `key`; empty when absent
    pub fn strings(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        optional_string_array(self.table, self.name, key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.table.get(key).and_then(Value::as_str)
    }

    /// Insert or replace a scalar or array value
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.table.insert(key.to_string(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.table.remove(key)
    }

    fn array_mut(&mut self, key: &str) -> Result<&mut Vec<Value>, ConfigError> {
        let name = self.name;
        match self
            .table
            .entry(key.to_string())
            .or_insert(Value::Array(Vec::new()))
        {
            Value::Array(items) => Ok(items),
            _ => Err(ConfigError::schema(name, key, SchemaProblem::NotAnArray)),
        }
    }
}

fn required_table<'t>(table: &'t Table, key: &str) -> Result<&'t Table, ConfigError> {
    optional_table(table, key)?.ok_or_else(|| ConfigError::schema(key, key, SchemaProblem::MissingSection))
}

fn optional_table<'t>(table: &'t Table, key: &str) -> Result<Option<&'t Table>, ConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(Value::Table(inner)) => Ok(Some(inner)),
        Some(_) => Err(ConfigError::schema(key, key, SchemaProblem::NotATable)),
    }
}

fn required_string_array(table: &Table, section: &str, key: &str) -> Result<Vec<String>, ConfigError> {
    match table.get(key) {
        None => Err(ConfigError::schema(section, key, SchemaProblem::MissingKey)),
        Some(value) => string_items(value, section, key),
    }
}

fn optional_string_array(table: &Table, section: &str, key: &str) -> Result<Vec<String>, ConfigError> {
    match table.get(key) {
        None => Ok(Vec::new()),
        Some(value) => string_items(value, section, key),
    }
}

fn string_items(value: &Value, section: &str, key: &str) -> Result<Vec<String>, ConfigError> {
    let items = value
        .as_array()
        .ok_or_else(|| ConfigError::schema(section, key, SchemaProblem::NotAnArray))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::schema(section, key, SchemaProblem::NotAString))
        })
        .collect()
}

fn optional_string(table: &Table, section: &str, key: &str) -> Result<Option<String>, ConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ConfigError::schema(section, key, SchemaProblem::NotAString)),
    }
}

fn string_map(table: &Table, section: &str) -> Result<IndexMap<String, String>, ConfigError> {
    let Some(inner) = optional_table(table, section)? else {
        return Ok(IndexMap::new());
    };
    inner
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key.clone(), s.clone())),
            _ => Err(ConfigError::schema(section, key, SchemaProblem::NotAString)),
        })
        .collect()
}

fn parse_metadata(table: &Table) -> Result<Metadata, ConfigError> {
    let text = |key: &str| optional_string(table, "metadata", key).map(Option::unwrap_or_default);

    // `authors` is written as a single string by older projects
    let authors = match table.get("authors") {
        None => Vec::new(),
        Some(Value::String(author)) => vec![author.clone()],
        Some(value) => string_items(value, "metadata", "authors")?,
    };

    Ok(Metadata {
        version: text("version")?,
        authors,
        description: text("description")?,
        license: text("license")?,
        github_username: text("github_username")?,
        github_repo: text("github_repo")?,
    })
}

fn metadata_table(metadata: &Metadata) -> Value {
    let mut table = Table::new();
    table.insert("version".to_string(), Value::String(metadata.version.clone()));
    table.insert("authors".to_string(), string_array(&metadata.authors));
    table.insert("description".to_string(), Value::String(metadata.description.clone()));
    table.insert("license".to_string(), Value::String(metadata.license.clone()));
    table.insert(
        "github_username".to_string(),
        Value::String(metadata.github_username.clone()),
    );
    table.insert("github_repo".to_string(), Value::String(metadata.github_repo.clone()));
    Value::Table(table)
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn string_table(map: &IndexMap<String, String>) -> Value {
    Value::Table(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}
