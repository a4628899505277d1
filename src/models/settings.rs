use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fmt;

/// Build-output strategy selected by `[build] build_type`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BuildKind {
    /// One compiler invocation producing a binary
    #[default]
    Executable,
    /// Per-file object compilation followed by an archiver step
    StaticArchive,
    /// One compiler invocation producing a position-independent shared object
    SharedLibrary,
}

impl BuildKind {
    /// Parse the document spelling. `dynamic` is accepted as an alias of `shared`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "executable" => Some(Self::Executable),
            "static" => Some(Self::StaticArchive),
            "shared" | "dynamic" => Some(Self::SharedLibrary),
            _ => None,
        }
    }

    /// Canonical document spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executable => "executable",
            Self::StaticArchive => "static",
            Self::SharedLibrary => "shared",
        }
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    /// Artifact base name; defaults to the project name
    pub output_name: String,
    pub kind: BuildKind,
}

/// `[metadata]` section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub version: String,
    pub authors: Vec<String>,
    pub description: String,
    pub license: String,
    pub github_username: String,
    pub github_repo: String,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One entry of the optional `[configurations]` table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedConfiguration {
    pub flags: Vec<String>,
    pub output: Option<String>,
}

/// Typed projection of a project's `config.toml`.
///
/// Built by [`ConfigStore::load`](crate::config::ConfigStore::load) and discarded after
/// the operation that asked for it. Array fields keep document order; map fields use
/// [`IndexMap`] so a load/save cycle does not reorder entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSettings {
    /// Project root every relative path is resolved against
    pub root: Utf8PathBuf,
    pub name: String,

    pub src_files: Vec<String>,
    pub include_files: Vec<String>,
    pub include_dirs: Vec<String>,
    pub static_linked: Vec<String>,
    pub static_linked_dirs: Vec<String>,

    pub ignored_files: Vec<String>,
    pub ignored_dirs: Vec<String>,

    pub dependencies: IndexMap<String, String>,
    pub extra: IndexMap<String, String>,
    pub defines: IndexMap<String, String>,

    pub build: BuildSettings,
    pub metadata: Metadata,
    pub configurations: IndexMap<String, NamedConfiguration>,
}

impl ProjectSettings {
    /// Empty settings for a project, with every default applied
    pub fn new(root: impl Into<Utf8PathBuf>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            root: root.into(),
            build: BuildSettings {
                output_name: name.clone(),
                kind: BuildKind::Executable,
            },
            name,
            src_files: Vec::new(),
            include_files: Vec::new(),
            include_dirs: Vec::new(),
            static_linked: Vec::new(),
            static_linked_dirs: Vec::new(),
            ignored_files: Vec::new(),
            ignored_dirs: Vec::new(),
            dependencies: IndexMap::new(),
            extra: IndexMap::new(),
            defines: IndexMap::new(),
            metadata: Metadata::default(),
            configurations: IndexMap::new(),
        }
    }

    /// Resolve a document path against the project root unless it is already absolute
    pub fn resolve(&self, path: &str) -> Utf8PathBuf {
        let path = Utf8Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Compiler override from `[extra] compiler`
    pub fn compiler_override(&self) -> Option<&str> {
        self.extra.get("compiler").map(String::as_str).filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_kind_parse() {
        assert_eq!(BuildKind::parse("executable"), Some(BuildKind::Executable));
        assert_eq!(BuildKind::parse("static"), Some(BuildKind::StaticArchive));
        assert_eq!(BuildKind::parse("shared"), Some(BuildKind::SharedLibrary));
        assert_eq!(BuildKind::parse("dynamic"), Some(BuildKind::SharedLibrary));
        assert_eq!(BuildKind::parse("Static"), None);
        assert_eq!(BuildKind::SharedLibrary.to_string(), "shared");
    }

    #[test]
    fn test_output_name_defaults_to_project_name() {
        let settings = ProjectSettings::new("/work/demo", "demo");
        assert_eq!(settings.build.output_name, "demo");
        assert_eq!(settings.build.kind, BuildKind::Executable);
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let settings = ProjectSettings::new("/work/demo", "demo");

        assert_eq!(settings.resolve("src/main.cpp"), Utf8PathBuf::from("/work/demo/src/main.cpp"));
        assert_eq!(settings.resolve("/opt/include"), Utf8PathBuf::from("/opt/include"));
    }

    #[test]
    fn test_compiler_override() {
        let mut settings = ProjectSettings::new("/work/demo", "demo");
        assert_eq!(settings.compiler_override(), None);

        settings.extra.insert("compiler".to_string(), "clang".to_string());
        assert_eq!(settings.compiler_override(), Some("clang"));
    }
}
