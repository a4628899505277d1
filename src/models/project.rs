use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Name of the per-project configuration document
pub const PROJECT_FILE: &str = "config.toml";

/// Compiler identity recorded by `cppx profile`.
///
/// Immutable once discovered; the build planner uses `path` unless the project
/// overrides the compiler through `[extra] compiler`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainInfo {
    #[serde(rename = "compiler")]
    pub name: String,
    pub path: Utf8PathBuf,
    pub version: String,
}

/// The `[project]` table of the global document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub name: String,
    pub path: Utf8PathBuf,
}

/// Global document (`~/.cppxglobal.toml`)
///
/// Both tables are optional on disk; [`GlobalStore`](crate::config::GlobalStore)
/// turns a missing table into a `NotConfigured` error when a complete
/// [`ProjectConfig`] is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainInfo>,
}

/// The project every operation works on.
///
/// Passed explicitly into each operation instead of living in process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub path: Utf8PathBuf,
    pub name: String,
    pub toolchain: ToolchainInfo,
}

impl ProjectConfig {
    pub fn new(path: impl Into<Utf8PathBuf>, name: impl Into<String>, toolchain: ToolchainInfo) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            toolchain,
        }
    }

    /// Path of the project's `config.toml`
    pub fn config_path(&self) -> Utf8PathBuf {
        self.path.join(PROJECT_FILE)
    }

    /// Directory receiving build artifacts
    pub fn build_dir(&self) -> Utf8PathBuf {
        self.path.join("build")
    }

    /// Directory the dependency installer writes into
    pub fn vendor_dir(&self) -> Utf8PathBuf {
        self.path.join("vendor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolchain() -> ToolchainInfo {
        ToolchainInfo {
            name: "g++".to_string(),
            path: Utf8PathBuf::from("/usr/bin/g++"),
            version: "13.2.0".to_string(),
        }
    }

    #[test]
    fn test_project_paths() {
        let project = ProjectConfig::new("/work/demo", "demo", toolchain());

        assert_eq!(project.config_path(), Utf8PathBuf::from("/work/demo/config.toml"));
        assert_eq!(project.build_dir(), Utf8PathBuf::from("/work/demo/build"));
        assert_eq!(project.vendor_dir(), Utf8PathBuf::from("/work/demo/vendor"));
    }

    #[test]
    fn test_global_document_toml_shape() {
        let document = GlobalDocument {
            project: Some(ProjectEntry {
                name: "demo".to_string(),
                path: Utf8PathBuf::from("/work/demo"),
            }),
            toolchain: Some(toolchain()),
        };

        let text = toml::to_string(&document).unwrap();
        assert!(text.contains("[project]"));
        assert!(text.contains("compiler = \"g++\""));

        let parsed: GlobalDocument = toml::from_str(&text).unwrap();
        assert_eq!(parsed, document);
    }

    #[test]
    fn test_empty_global_document() {
        let parsed: GlobalDocument = toml::from_str("").unwrap();
        assert!(parsed.project.is_none());
        assert!(parsed.toolchain.is_none());
    }
}
