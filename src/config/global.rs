use super::{ConfigError, storage::write_atomic};
use crate::models::{GlobalDocument, ProjectConfig, ProjectEntry, ToolchainInfo};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;
use std::io::ErrorKind;

/// File name of the global document inside the home directory
pub const GLOBAL_FILE: &str = ".cppxglobal.toml";

/// Prefix for environment overrides, e.g. `CPPX__PROJECT__PATH`
pub const ENV_PREFIX: &str = "CPPX";

/// The per-user document naming the current project and the toolchain.
///
/// Reads are layered: the TOML file first, then `CPPX__<TABLE>__<KEY>` environment
/// variables. Writes only ever touch the file, so an environment override never
/// leaks into the document.
#[derive(Debug, Clone)]
pub struct GlobalStore {
    path: Utf8PathBuf,
}

impl GlobalStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `~/.cppxglobal.toml`
    pub fn default_location() -> Result<Self, ConfigError> {
        let home = dirs::home_dir()
            .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
            .ok_or(ConfigError::NotConfigured {
                what: "Home directory",
                hint: "export HOME",
            })?;
        Ok(Self::new(home.join(GLOBAL_FILE)))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Load the document with environment overrides applied
    pub fn load(&self) -> Result<GlobalDocument, ConfigError> {
        let layered = Config::builder()
            .add_source(
                File::from(self.path.as_std_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(layered.try_deserialize::<GlobalDocument>()?)
    }

    /// The current project with its toolchain.
    ///
    /// Fails with `NotConfigured` when either table is missing.
    pub fn current_project(&self) -> Result<ProjectConfig, ConfigError> {
        let document = self.load()?;

        let project = document.project.ok_or(ConfigError::NotConfigured {
            what: "Project",
            hint: "cppx project set --name <NAME> --path <PATH>",
        })?;
        let toolchain = document.toolchain.ok_or(ConfigError::NotConfigured {
            what: "Toolchain",
            hint: "cppx profile",
        })?;

        Ok(ProjectConfig::new(project.path, project.name, toolchain))
    }

    /// Record the current project. The path is canonicalized first.
    pub fn set_current_project(&self, name: &str, path: &Utf8Path) -> Result<ProjectEntry, ConfigError> {
        let canonical = path
            .canonicalize_utf8()
            .map_err(|e| ConfigError::io(path, e))?;

        let entry = ProjectEntry {
            name: name.to_string(),
            path: canonical,
        };

        let mut document = self.read_file()?;
        document.project = Some(entry.clone());
        self.write_file(&document)?;

        tracing::info!("Current project set to {} ({})", entry.name, entry.path);
        Ok(entry)
    }

    /// Record the discovered toolchain, keeping `[project]` untouched
    pub fn set_toolchain(&self, toolchain: &ToolchainInfo) -> Result<(), ConfigError> {
        let mut document = self.read_file()?;
        document.toolchain = Some(toolchain.clone());
        self.write_file(&document)?;

        tracing::info!(
            "Toolchain set to {} {} ({})",
            toolchain.name,
            toolchain.version,
            toolchain.path
        );
        Ok(())
    }

    /// The file alone, without environment overrides; missing file is empty
    fn read_file(&self) -> Result<GlobalDocument, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(GlobalDocument::default()),
            Err(e) => return Err(ConfigError::io(&self.path, e)),
        };

        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            location: self.path.to_string(),
            message: e.message().to_string(),
        })
    }

    fn write_file(&self, document: &GlobalDocument) -> Result<(), ConfigError> {
        let text = toml::to_string(document)?;
        write_atomic(&self.path, &text)
    }
}
