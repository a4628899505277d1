//! Command handlers behind the `cppx` binary.
//!
//! Each handler takes an explicit [`ProjectContext`] (or the [`GlobalStore`] for the
//! handlers that select the project), re-reads the project document as needed and
//! returns a value for `main` to print. Errors are `anyhow` with context attached.

use crate::config::{
    ConfigStore, GlobalStore, IGNORED_DIRS, IGNORED_FILES, INCLUDE_DIRS, STATIC_LINKED,
    STATIC_LINKED_DIRS, Section,
};
use crate::metrics::WatchMetrics;
use crate::models::{BuildKind, Metadata, PackageInfo, ProjectConfig, ProjectEntry, ProjectSettings, ToolchainInfo};
use crate::services::{
    BuildPlanner, BuildReport, ExportFormat, Invocation, PackageManager, ProcessRunner, Stage,
    ToolRunner, clean_outputs, discover_tests, export, toolchain,
};
use crate::watcher::{DirectoryWatcher, SourceSync};
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Compilers accepted by `config compiler=<name>`
pub const SUPPORTED_COMPILERS: [&str; 4] = ["clang", "clang++", "gcc", "g++"];

/// The project an invocation works on, loaded once and passed to every handler
#[derive(Debug)]
pub struct ProjectContext {
    pub project: ProjectConfig,
    pub store: ConfigStore,
}

impl ProjectContext {
    pub fn new(project: ProjectConfig) -> Self {
        let store = ConfigStore::open(&project);
        Self { project, store }
    }

    /// Context for the current project recorded in the global document
    pub fn current(global: &GlobalStore) -> Result<Self> {
        let project = global.current_project()?;
        tracing::debug!("Current project: {} at {}", project.name, project.path);
        Ok(Self::new(project))
    }

    pub fn settings(&self) -> Result<ProjectSettings> {
        self.store
            .load()
            .with_context(|| format!("Failed to load {}", self.project.config_path()))
    }

    /// Tool runner working from the project root
    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::in_dir(&self.project.path)
    }
}

/// `project set`: record the current project
pub fn set_project(global: &GlobalStore, name: &str, path: &Utf8Path) -> Result<ProjectEntry> {
    global
        .set_current_project(name, path)
        .with_context(|| format!("Failed to set current project to {}", path))
}

/// `profile`: discover compilers and record one as the toolchain
pub async fn profile(global: &GlobalStore, requested: Option<&str>) -> Result<ToolchainInfo> {
    let found = toolchain::discover().await;
    let chosen = toolchain::select(found, requested)?;
    global.set_toolchain(&chosen)?;
    Ok(chosen)
}

/// `build`: plan and execute a build
pub async fn build<R: ToolRunner + ?Sized>(
    ctx: &ProjectContext,
    runner: &R,
    debug: bool,
    named_config: Option<&str>,
) -> Result<BuildReport> {
    let settings = ctx.settings()?;
    let planner = BuildPlanner::new(&ctx.project, &settings);
    let plan = planner.plan(&settings, debug, named_config)?;

    tracing::info!(
        "Building {} ({}) with {}",
        settings.name,
        settings.build.kind,
        planner.compiler()
    );
    Ok(plan.execute(runner).await?)
}

/// `run`: build when the executable is missing, then run it.
///
/// # Returns
/// The program's exit code
pub async fn run<R: ToolRunner + ?Sized>(ctx: &ProjectContext, runner: &R, args: &[String]) -> Result<i32> {
    let settings = ctx.settings()?;
    if settings.build.kind != BuildKind::Executable {
        bail!(
            "Cannot run a {} build, only executables can be run",
            settings.build.kind
        );
    }
    let executable = BuildPlanner::new(&ctx.project, &settings).artifact_path(&settings, None);

    if !executable.exists() {
        tracing::warn!("{} does not exist, building first", executable);
        build(ctx, runner, false, None).await?;
    }

    let invocation = Invocation::new(Stage::Tool, executable.as_str(), args.to_vec());
    let code = runner
        .run(&invocation)
        .await
        .with_context(|| format!("Failed to run {}", executable))?;
    Ok(code)
}

/// How a single test program ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Failed(i32),
    /// The test program did not compile; it was not run
    CompileFailed(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub name: String,
    pub status: TestStatus,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            TestStatus::Passed => write!(f, "{} passed", self.name),
            TestStatus::Failed(code) => write!(f, "{} failed with exit code {}", self.name, code),
            TestStatus::CompileFailed(code) => {
                write!(f, "{} did not compile (exit code {})", self.name, code)
            }
        }
    }
}

/// `test`: compile and run every program under `tests/`.
///
/// A test that fails to compile or exits non-zero is recorded and the
/// remaining tests still run.
pub async fn test<R: ToolRunner + ?Sized>(ctx: &ProjectContext, runner: &R) -> Result<Vec<TestOutcome>> {
    let settings = ctx.settings()?;
    let sources = discover_tests(&ctx.project.path.join("tests"))?;
    let planner = BuildPlanner::new(&ctx.project, &settings);

    let build_dir = ctx.project.build_dir();
    std::fs::create_dir_all(&build_dir).with_context(|| format!("Failed to create {}", build_dir))?;

    let mut outcomes = Vec::with_capacity(sources.len());
    for source in &sources {
        let name = source.file_stem().unwrap_or(source.as_str()).to_string();
        let compile = planner.plan_test(&settings, source);

        let code = runner
            .run(&compile)
            .await
            .with_context(|| format!("Failed to start {}", compile.program))?;
        if code != 0 {
            tracing::error!("Test {} failed to compile with exit code {}", name, code);
            outcomes.push(TestOutcome {
                name,
                status: TestStatus::CompileFailed(code),
            });
            continue;
        }

        let executable = planner.test_executable(source);
        let code = runner
            .run(&Invocation::new(Stage::Tool, executable.as_str(), Vec::new()))
            .await
            .with_context(|| format!("Failed to run {}", executable))?;

        let status = if code == 0 {
            tracing::info!("Test {} passed", name);
            TestStatus::Passed
        } else {
            tracing::warn!("Test {} failed with exit code {}", name, code);
            TestStatus::Failed(code)
        };
        outcomes.push(TestOutcome { name, status });
    }

    Ok(outcomes)
}

/// `clean`: remove generated directories
pub fn clean(ctx: &ProjectContext) -> Result<Vec<Utf8PathBuf>> {
    Ok(clean_outputs(&ctx.project.path)?)
}

/// `pkg install`: install `name/version` and fold its paths into the document
pub async fn install_package<R: ToolRunner + ?Sized>(
    ctx: &ProjectContext,
    runner: &R,
    name: &str,
    version: &str,
) -> Result<PackageInfo> {
    let package_ref = format!("{}/{}", name, version);
    let manager = PackageManager::new(&ctx.project)?;

    manager.install(runner, &package_ref).await?;
    let info = manager.info(&package_ref)?;
    if info.is_empty() {
        tracing::warn!("{} exposes no libraries or directories", package_ref);
    }
    tracing::debug!(
        "{}: includes {:?}, libs {:?}, lib dirs {:?}",
        package_ref,
        info.include_paths,
        info.libs,
        info.lib_paths
    );

    ctx.store
        .update(|document| {
            document.section(Section::Dependencies)?.set(name, version);
            let mut source = document.section(Section::Source)?;
            source.add_all(INCLUDE_DIRS, &info.include_paths)?;
            source.add_all(STATIC_LINKED, &info.libs)?;
            source.add_all(STATIC_LINKED_DIRS, &info.lib_paths)?;
            Ok(())
        })
        .context("Failed to update configuration after install")?;

    Ok(info)
}

/// `pkg remove`: remove a package and undo what install folded in
pub async fn remove_package<R: ToolRunner + ?Sized>(
    ctx: &ProjectContext,
    runner: &R,
    package_ref: &str,
) -> Result<PackageInfo> {
    let manager = PackageManager::new(&ctx.project)?;
    let Some(info) = manager.remove(runner, package_ref).await? else {
        bail!("Package '{}' is not installed", package_ref);
    };

    let dependency = package_ref.split('/').next().unwrap_or(package_ref);
    ctx.store
        .update(|document| {
            document.section(Section::Dependencies)?.remove(dependency);
            let mut source = document.section(Section::Source)?;
            source.remove_all(INCLUDE_DIRS, &info.include_paths)?;
            source.remove_all(STATIC_LINKED, &info.libs)?;
            source.remove_all(STATIC_LINKED_DIRS, &info.lib_paths)?;
            Ok(())
        })
        .context("Failed to update configuration after removal")?;

    Ok(info)
}

/// Result of `ignore`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IgnoreSummary {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
    pub missing: Vec<String>,
}

/// `ignore`: add existing paths to `[ignore] dirs` or `[ignore] files`
pub fn ignore(ctx: &ProjectContext, paths: &[Utf8PathBuf]) -> Result<IgnoreSummary> {
    let mut summary = IgnoreSummary::default();
    for path in paths {
        let entry = path.to_string();
        if path.is_dir() {
            summary.dirs.push(entry);
        } else if path.exists() {
            summary.files.push(entry);
        } else {
            tracing::warn!("Path does not exist: {}", path);
            summary.missing.push(entry);
        }
    }

    ctx.store.mutate(Section::Ignore, |ignore| {
        ignore.add_all(IGNORED_DIRS, &summary.dirs)?;
        ignore.add_all(IGNORED_FILES, &summary.files)?;
        Ok(())
    })?;

    Ok(summary)
}

/// `config key=value`. Only `compiler` is settable.
pub fn set_config(ctx: &ProjectContext, assignment: &str) -> Result<(String, String)> {
    let Some((key, value)) = assignment.split_once('=') else {
        bail!("Invalid configuration '{}', use the form key=value", assignment);
    };
    let (key, value) = (key.trim(), value.trim());

    match key {
        "compiler" => {
            if !SUPPORTED_COMPILERS.contains(&value) {
                bail!(
                    "Unsupported compiler '{}', expected one of: {}",
                    value,
                    SUPPORTED_COMPILERS.join(", ")
                );
            }
            ctx.store.set_extra(key, value)?;
            tracing::info!("Set {}={}", key, value);
            Ok((key.to_string(), value.to_string()))
        }
        _ => bail!("Unknown setting: {}", key),
    }
}

/// Fields given to `metadata`; `None` leaves the stored value alone
#[derive(Debug, Default, Clone)]
pub struct MetadataUpdate {
    pub version: Option<String>,
    pub authors: Option<Vec<String>>,
    pub description: Option<String>,
    pub license: Option<String>,
    pub github_username: Option<String>,
    pub github_repo: Option<String>,
}

impl MetadataUpdate {
    pub fn apply_to(self, metadata: &mut Metadata) {
        if let Some(version) = self.version {
            metadata.version = version;
        }
        if let Some(authors) = self.authors {
            metadata.authors = authors;
        }
        if let Some(description) = self.description {
            metadata.description = description;
        }
        if let Some(license) = self.license {
            metadata.license = license;
        }
        if let Some(user) = self.github_username {
            metadata.github_username = user;
        }
        if let Some(repo) = self.github_repo {
            metadata.github_repo = repo;
        }
    }
}

/// `metadata`: merge the given fields into `[metadata]`
pub fn set_metadata(ctx: &ProjectContext, update: MetadataUpdate) -> Result<Metadata> {
    let mut metadata = ctx.settings()?.metadata;
    update.apply_to(&mut metadata);
    ctx.store.set_metadata(&metadata)?;
    Ok(metadata)
}

/// `watch`: keep `src files` in step with a directory until Ctrl-C.
///
/// `dir` defaults to `<project>/src`; relative paths are taken from the project root.
pub async fn watch(ctx: &ProjectContext, dir: Option<&Utf8Path>, interval: Duration) -> Result<()> {
    let watched = match dir {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => ctx.project.path.join(dir),
        None => ctx.project.path.join("src"),
    };

    let metrics = Arc::new(WatchMetrics::new());
    let sync = SourceSync::new(ConfigStore::open(&ctx.project), &watched).with_metrics(metrics.clone());
    let watcher = DirectoryWatcher::new(&watched, interval, sync.into_callback())?.with_metrics(metrics);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let task = tokio::spawn(watcher.run(cancel_rx));

    println!("Monitoring directory: {} (Ctrl-C to stop)", watched);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Received Ctrl-C, stopping watcher");

    let _ = cancel_tx.send(true);
    task.await.context("Watcher task failed")?;
    Ok(())
}

/// `export <format>`
pub fn export_project(ctx: &ProjectContext, format: &str) -> Result<Utf8PathBuf> {
    let format: ExportFormat = format.parse()?;
    let settings = ctx.settings()?;
    Ok(export::export(&settings, format)?)
}

/// What `info` prints
#[derive(Debug, Clone)]
pub struct ProjectSummary {
    pub project: ProjectConfig,
    pub settings: ProjectSettings,
}

impl fmt::Display for ProjectSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings = &self.settings;
        let metadata = &settings.metadata;
        let rows = [
            ("Project Name", settings.name.clone()),
            ("Version", metadata.version.clone()),
            ("Authors", metadata.authors.join(", ")),
            ("Description", metadata.description.clone()),
            ("License", metadata.license.clone()),
            ("Project Path", self.project.path.to_string()),
            (
                "Toolchain",
                format!(
                    "{} {} ({})",
                    self.project.toolchain.name, self.project.toolchain.version, self.project.toolchain.path
                ),
            ),
            (
                "Build",
                format!("{} -> {}", settings.build.kind, settings.build.output_name),
            ),
            ("Source Files", settings.src_files.len().to_string()),
            ("Include Dirs", settings.include_dirs.len().to_string()),
            ("Build Dir", self.project.build_dir().to_string()),
            ("Vendor Dir", self.project.vendor_dir().to_string()),
        ];

        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        for (label, value) in rows {
            writeln!(f, "  {:<width$} : {}", label, value, width = width)?;
        }

        writeln!(f)?;
        writeln!(f, "Dependencies:")?;
        if settings.dependencies.is_empty() {
            writeln!(f, "  No dependencies found.")?;
        }
        for (name, version) in &settings.dependencies {
            writeln!(f, "  {} : {}", name, version)?;
        }
        Ok(())
    }
}

/// `info`
pub fn info(ctx: &ProjectContext) -> Result<ProjectSummary> {
    Ok(ProjectSummary {
        project: ctx.project.clone(),
        settings: ctx.settings()?,
    })
}
