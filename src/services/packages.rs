//! Dependency installation through Conan and extraction of its install report.
//!
//! `conan install ... -f json --out-file vendor/install_log.json` leaves a graph of
//! resolved packages behind. [`InstallReport`] parses it once into normalized
//! [`InstalledPackage`] records; [`PackageManager`] runs the installer and answers
//! questions about what is installed.

use super::build::{Invocation, Stage, ToolRunner};
use crate::models::{PackageInfo, ProjectConfig};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use thiserror::Error;

/// Report file written by the installer inside the vendor directory
pub const REPORT_FILE: &str = "install_log.json";

/// Characters that may follow a package name or version inside a full reference
const REFERENCE_BOUNDARIES: [char; 3] = ['/', '#', '@'];

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Failed to install package '{package_ref}' (exit code {code})")]
    InstallTool { package_ref: String, code: i32 },

    #[error("Failed to remove package '{package_ref}' (exit code {code})")]
    RemoveTool { package_ref: String, code: i32 },

    #[error("{0} not found, install a package first")]
    MissingReport(Utf8PathBuf),

    #[error("Failed to parse {path}: {source}")]
    ReportParse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Package '{0}' is not installed")]
    NotInstalled(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawReport {
    #[serde(default)]
    graph: Option<RawGraph>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGraph {
    #[serde(default)]
    nodes: IndexMap<String, RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default)]
    cpp_info: Option<RawCppInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCppInfo {
    #[serde(rename = "_fmt", default)]
    formatted: Option<RawComponent>,
    #[serde(default)]
    root: Option<RawComponent>,
}

#[derive(Debug, Default, Deserialize)]
struct RawComponent {
    #[serde(default)]
    libs: Option<Vec<String>>,
    #[serde(default)]
    includedirs: Option<Vec<String>>,
    #[serde(default)]
    libdirs: Option<Vec<String>>,
}

/// One package from the install report, with both `cpp_info` forms already merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub reference: String,
    pub libs: Vec<String>,
    pub include_dirs: Vec<String>,
    pub lib_dirs: Vec<String>,
}

impl InstalledPackage {
    fn from_raw(reference: String, cpp_info: Option<RawCppInfo>, base_dir: &Utf8Path) -> Self {
        let RawCppInfo { formatted, root } = cpp_info.unwrap_or_default();
        let formatted = formatted.unwrap_or_default();
        let root = root.unwrap_or_default();

        // The formatted shorthand wins field by field
        let libs = formatted.libs.or(root.libs).unwrap_or_default();
        let include_dirs = formatted.includedirs.or(root.includedirs).unwrap_or_default();
        let lib_dirs = formatted.libdirs.or(root.libdirs).unwrap_or_default();

        Self {
            reference,
            libs,
            include_dirs: absolutize(include_dirs, base_dir),
            lib_dirs: absolutize(lib_dirs, base_dir),
        }
    }

    /// Facts about this package, labelled with the reference the caller asked for
    pub fn to_info(&self, requested: &str) -> PackageInfo {
        PackageInfo {
            package_ref: requested.to_string(),
            libs: self.libs.clone(),
            include_paths: self.include_dirs.clone(),
            lib_paths: self.lib_dirs.clone(),
        }
    }
}

fn absolutize(paths: Vec<String>, base_dir: &Utf8Path) -> Vec<String> {
    paths
        .into_iter()
        .map(|p| {
            if Utf8Path::new(&p).is_absolute() {
                p
            } else {
                base_dir.join(&p).to_string()
            }
        })
        .collect()
}

/// Whether an installed `reference` satisfies a `request`.
///
/// The request must equal the reference or be followed in it by `/`, `#` or `@`.
/// `zlib/1.3.1#abc` matches `zlib` and `zlib/1.3.1` but not `zlib/1.3`.
pub fn reference_matches(reference: &str, request: &str) -> bool {
    if request.is_empty() {
        return false;
    }
    match reference.strip_prefix(request) {
        Some("") => true,
        Some(rest) => rest.starts_with(REFERENCE_BOUNDARIES),
        None => false,
    }
}

/// Parsed installer report
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    packages: Vec<InstalledPackage>,
}

impl InstallReport {
    /// Parse report JSON. Relative directories are resolved against `base_dir`.
    pub fn parse(json: &str, base_dir: &Utf8Path) -> Result<Self, serde_json::Error> {
        let raw: RawReport = serde_json::from_str(json)?;

        let packages = raw
            .graph
            .map(|graph| graph.nodes)
            .unwrap_or_default()
            .into_values()
            .filter_map(|node| {
                let reference = node.reference.filter(|r| !r.is_empty())?;
                Some(InstalledPackage::from_raw(reference, node.cpp_info, base_dir))
            })
            .collect();

        Ok(Self { packages })
    }

    pub fn packages(&self) -> &[InstalledPackage] {
        &self.packages
    }

    /// First package in report order whose reference matches `request`
    pub fn find(&self, request: &str) -> Option<&InstalledPackage> {
        self.packages
            .iter()
            .find(|p| reference_matches(&p.reference, request))
    }
}

/// Runs the Conan installer for one project and reads back its report.
#[derive(Debug, Clone)]
pub struct PackageManager {
    vendor_dir: Utf8PathBuf,
    working_dir: Utf8PathBuf,
    program: String,
}

impl PackageManager {
    /// Manager for a project; creates `vendor/` when missing.
    pub fn new(project: &ProjectConfig) -> Result<Self, PackageError> {
        Self::with_dirs(project.vendor_dir(), project.path.clone())
    }

    pub fn with_dirs(
        vendor_dir: impl Into<Utf8PathBuf>,
        working_dir: impl Into<Utf8PathBuf>,
    ) -> Result<Self, PackageError> {
        let vendor_dir = vendor_dir.into();
        if !vendor_dir.exists() {
            fs::create_dir_all(&vendor_dir).map_err(|source| PackageError::Io {
                path: vendor_dir.clone(),
                source,
            })?;
        }

        Ok(Self {
            vendor_dir,
            working_dir: working_dir.into(),
            program: "conan".to_string(),
        })
    }

    /// Use another installer executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn vendor_dir(&self) -> &Utf8Path {
        &self.vendor_dir
    }

    pub fn report_path(&self) -> Utf8PathBuf {
        self.vendor_dir.join(REPORT_FILE)
    }

    /// Install a package reference such as `zlib/1.3.1`.
    ///
    /// Fails when the installer exits non-zero or leaves no report behind.
    pub async fn install<R: ToolRunner + ?Sized>(&self, runner: &R, package_ref: &str) -> Result<(), PackageError> {
        let report_path = self.report_path();
        let invocation = Invocation::new(
            Stage::Tool,
            &self.program,
            vec![
                "install".to_string(),
                "--requires".to_string(),
                package_ref.to_string(),
                "--build".to_string(),
                "missing".to_string(),
                "-of".to_string(),
                self.vendor_dir.to_string(),
                "-f".to_string(),
                "json".to_string(),
                "--out-file".to_string(),
                report_path.to_string(),
            ],
        );

        tracing::info!("Installing {}...", package_ref);
        let code = self.run(runner, &invocation).await?;
        if code != 0 {
            return Err(PackageError::InstallTool {
                package_ref: package_ref.to_string(),
                code,
            });
        }

        if !report_path.exists() {
            return Err(PackageError::MissingReport(report_path));
        }

        tracing::info!("Installed {}", package_ref);
        Ok(())
    }

    /// Load and normalize the current report
    pub fn load_report(&self) -> Result<InstallReport, PackageError> {
        let path = self.report_path();
        let json = fs::read_to_string(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                PackageError::MissingReport(path.clone())
            } else {
                PackageError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        InstallReport::parse(&json, &self.working_dir)
            .map_err(|source| PackageError::ReportParse { path, source })
    }

    /// Libraries and directories of an installed package
    pub fn info(&self, package_ref: &str) -> Result<PackageInfo, PackageError> {
        let report = self.load_report()?;
        report
            .find(package_ref)
            .map(|package| package.to_info(package_ref))
            .ok_or_else(|| PackageError::NotInstalled(package_ref.to_string()))
    }

    /// Whether the report lists a matching package. A missing or unreadable report
    /// counts as not installed.
    pub fn is_installed(&self, package_ref: &str) -> bool {
        match self.load_report() {
            Ok(report) => report.find(package_ref).is_some(),
            Err(PackageError::MissingReport(_)) => false,
            Err(e) => {
                tracing::warn!("Cannot check whether {} is installed: {}", package_ref, e);
                false
            }
        }
    }

    /// Remove a package from the Conan cache and the vendor directory.
    ///
    /// # Returns
    /// The package facts captured before removal, or `None` when it was not installed
    /// (nothing is run in that case)
    pub async fn remove<R: ToolRunner + ?Sized>(
        &self,
        runner: &R,
        package_ref: &str,
    ) -> Result<Option<PackageInfo>, PackageError> {
        if !self.is_installed(package_ref) {
            tracing::info!("Package {} is not installed", package_ref);
            return Ok(None);
        }
        let info = self.info(package_ref)?;

        let invocation = Invocation::new(
            Stage::Tool,
            &self.program,
            vec!["remove".to_string(), package_ref.to_string(), "-c".to_string()],
        );
        let code = self.run(runner, &invocation).await?;
        if code != 0 {
            return Err(PackageError::RemoveTool {
                package_ref: package_ref.to_string(),
                code,
            });
        }
        tracing::info!("Removed {} from the Conan cache", package_ref);

        let local_dir = self.vendor_dir.join(package_ref);
        if local_dir.exists() {
            fs::remove_dir_all(&local_dir).map_err(|source| PackageError::Io {
                path: local_dir.clone(),
                source,
            })?;
            tracing::debug!("Removed local package directory {}", local_dir);
        }

        Ok(Some(info))
    }

    async fn run<R: ToolRunner + ?Sized>(&self, runner: &R, invocation: &Invocation) -> Result<i32, PackageError> {
        runner
            .run(invocation)
            .await
            .map_err(|source| PackageError::Spawn {
                program: invocation.program.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::build::MockToolRunner;
    use tempfile::TempDir;

    const REPORT: &str = r#"{
  "graph": {
    "nodes": {
      "0": { "ref": "conanfile", "cpp_info": null },
      "1": {
        "ref": "zlib/1.3.1#f52e03ae3d251dec704634230cd806a2",
        "cpp_info": {
          "root": {
            "libs": ["z-root"],
            "includedirs": ["/cache/zlib/include"],
            "libdirs": ["cache/zlib/lib"]
          },
          "_fmt": { "libs": ["z"] }
        }
      },
      "2": {
        "ref": "fmt/10.2.1#aaaa",
        "cpp_info": {
          "root": { "libs": ["fmt"], "includedirs": null, "libdirs": ["/cache/fmt/lib"] }
        }
      }
    }
  }
}"#;

    fn create_test_manager() -> (PackageManager, Utf8PathBuf, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = PackageManager::with_dirs(root.join("vendor"), &root).unwrap();
        (manager, root, temp_dir)
    }

    #[test]
    fn test_reference_boundaries() {
        let reference = "zlib/1.3.1#abc123";
        assert!(reference_matches(reference, "zlib/1.3.1"));
        assert!(reference_matches(reference, "zlib"));
        assert!(reference_matches(reference, reference));
        assert!(!reference_matches(reference, "zlib/1.3"));
        assert!(!reference_matches(reference, "zli"));
        assert!(!reference_matches(reference, ""));
        assert!(reference_matches("boost/1.84.0@user/stable", "boost/1.84.0"));
    }

    #[test]
    fn test_report_normalization() {
        let report = InstallReport::parse(REPORT, Utf8Path::new("/work/demo")).unwrap();

        assert_eq!(report.packages().len(), 3);
        let zlib = report.find("zlib/1.3.1").unwrap();
        assert_eq!(zlib.libs, vec!["z"]);
        assert_eq!(zlib.include_dirs, vec!["/cache/zlib/include"]);
        assert_eq!(zlib.lib_dirs, vec!["/work/demo/cache/zlib/lib"]);

        let fmt = report.find("fmt").unwrap();
        assert!(fmt.include_dirs.is_empty());
        assert_eq!(fmt.lib_dirs, vec!["/cache/fmt/lib"]);

        assert!(report.find("zlib/1.3").is_none());
    }

    #[test]
    fn test_report_without_graph() {
        let report = InstallReport::parse("{}", Utf8Path::new("/work")).unwrap();
        assert!(report.packages().is_empty());
    }

    #[test]
    fn test_info_and_is_installed() {
        let (manager, _root, _temp_dir) = create_test_manager();
        assert!(!manager.is_installed("zlib"));
        assert!(matches!(manager.info("zlib"), Err(PackageError::MissingReport(_))));

        fs::write(manager.report_path(), REPORT).unwrap();

        assert!(manager.is_installed("zlib"));
        let info = manager.info("zlib").unwrap();
        assert_eq!(info.package_ref, "zlib");
        assert_eq!(info.libs, vec!["z"]);

        assert!(matches!(manager.info("openssl"), Err(PackageError::NotInstalled(_))));
    }

    #[tokio::test]
    async fn test_install_requires_report() {
        let (manager, _root, _temp_dir) = create_test_manager();

        let mut runner = MockToolRunner::new();
        runner.expect_run().times(1).returning(|_| Ok(0));

        let error = manager.install(&runner, "zlib/1.3.1").await.unwrap_err();
        assert!(matches!(error, PackageError::MissingReport(_)));
    }

    #[tokio::test]
    async fn test_install_failure_exit_code() {
        let (manager, _root, _temp_dir) = create_test_manager();

        let mut runner = MockToolRunner::new();
        runner.expect_run().returning(|_| Ok(1));

        let error = manager.install(&runner, "zlib/1.3.1").await.unwrap_err();
        assert!(matches!(error, PackageError::InstallTool { code: 1, .. }));
    }

    #[tokio::test]
    async fn test_install_command_line() {
        let (manager, _root, _temp_dir) = create_test_manager();
        let report_path = manager.report_path();

        let mut runner = MockToolRunner::new();
        let expected_report = report_path.to_string();
        runner
            .expect_run()
            .withf(move |invocation| {
                invocation.program == "conan"
                    && invocation.args[..3] == ["install", "--requires", "zlib/1.3.1"]
                    && invocation.args.contains(&expected_report)
            })
            .returning(move |_| {
                fs::write(&report_path, REPORT).unwrap();
                Ok(0)
            });

        tokio_test::assert_ok!(manager.install(&runner, "zlib/1.3.1").await);
        assert!(manager.is_installed("zlib/1.3.1"));
    }

    #[tokio::test]
    async fn test_remove_not_installed_runs_nothing() {
        let (manager, _root, _temp_dir) = create_test_manager();

        let mut runner = MockToolRunner::new();
        runner.expect_run().never();

        assert_eq!(manager.remove(&runner, "zlib").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_captures_info_and_deletes_vendor_dir() {
        let (manager, _root, _temp_dir) = create_test_manager();
        fs::write(manager.report_path(), REPORT).unwrap();
        let local = manager.vendor_dir().join("zlib");
        fs::create_dir_all(&local).unwrap();

        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .withf(|invocation| invocation.args == ["remove", "zlib", "-c"])
            .times(1)
            .returning(|_| Ok(0));

        let info = manager.remove(&runner, "zlib").await.unwrap().unwrap();
        assert_eq!(info.libs, vec!["z"]);
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_remove_tool_failure() {
        let (manager, _root, _temp_dir) = create_test_manager();
        fs::write(manager.report_path(), REPORT).unwrap();

        let mut runner = MockToolRunner::new();
        runner.expect_run().returning(|_| Ok(2));

        let error = manager.remove(&runner, "fmt").await.unwrap_err();
        assert!(matches!(error, PackageError::RemoveTool { code: 2, .. }));
    }
}
