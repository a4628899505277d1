use crate::models::{BuildKind, ProjectConfig, ProjectSettings};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// Extensions that mark a `static_linked` entry as a library file rather than a name
const NATIVE_LIBRARY_EXTENSIONS: [&str; 5] = ["a", "so", "lib", "dylib", "dll"];

/// Project source left out of test programs, which bring their own `main`
const ENTRY_POINT: &str = "main.cpp";

/// Extensions recognized under `tests/`
const TEST_EXTENSIONS: [&str; 2] = ["cpp", "cc"];

/// Directories removed by [`clean_outputs`]
const GENERATED_DIRS: [&str; 2] = ["build", "docs"];

/// Which part of a build an invocation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// `-c` object compilation (static archives only)
    Compile,
    /// Compile-and-link into the final executable or shared library
    Link,
    Archive,
    /// Any other external tool: the package installer or a built executable
    Tool,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Compile => "compile",
            Self::Link => "link",
            Self::Archive => "archive",
            Self::Tool => "tool",
        };
        f.write_str(name)
    }
}

/// One external tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub stage: Stage,
    pub program: String,
    pub args: Vec<String>,
    /// Source file for per-file compile steps
    pub source: Option<Utf8PathBuf>,
}

impl Invocation {
    pub fn new(stage: Stage, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            stage,
            program: program.into(),
            args,
            source: None,
        }
    }

    /// Printable command line, for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn failure(&self, artifact: &Utf8Path, code: i32) -> BuildError {
        match self.stage {
            Stage::Compile => BuildError::Compile {
                file: self
                    .source
                    .clone()
                    .unwrap_or_else(|| Utf8PathBuf::from(&self.program)),
                code,
            },
            Stage::Link => BuildError::Link {
                artifact: artifact.to_path_buf(),
                code,
            },
            Stage::Archive => BuildError::Archive {
                artifact: artifact.to_path_buf(),
                code,
            },
            Stage::Tool => BuildError::Run {
                program: self.program.clone(),
                code,
            },
        }
    }
}

/// Non-fatal conditions found while planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanWarning {
    /// A named configuration was requested but the project does not define it
    UnknownConfig(String),
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownConfig(name) => {
                write!(f, "configuration '{}' not found, using defaults", name)
            }
        }
    }
}

/// Errors that can occur while building
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("No source files configured")]
    NoSources,

    #[error("The tests directory {0} does not exist or has no test sources")]
    NoTests(Utf8PathBuf),

    #[error("Compilation of {file} failed with exit code {code}")]
    Compile { file: Utf8PathBuf, code: i32 },

    #[error("Linking {artifact} failed with exit code {code}")]
    Link { artifact: Utf8PathBuf, code: i32 },

    #[error("Archiving {artifact} failed with exit code {code}")]
    Archive { artifact: Utf8PathBuf, code: i32 },

    #[error("{program} exited with code {code}")]
    Run { program: String, code: i32 },

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

/// Runs external tools. Returns the exit code; `-1` when killed by a signal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<i32>;
}

/// [`ToolRunner`] backed by real subprocesses
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    working_dir: Option<Utf8PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every tool from `dir`
    pub fn in_dir(dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<i32> {
        tracing::info!("Executing: {}", invocation.command_line());

        let start = Instant::now();
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let status = cmd.status().await?;
        let exit_code = status.code().unwrap_or(-1);

        tracing::info!(
            "{} finished in {:.2}s with exit code {}",
            invocation.program,
            start.elapsed().as_secs_f32(),
            exit_code
        );

        Ok(exit_code)
    }
}

/// Outcome of a successful [`CommandPlan::execute`]
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub artifact: Utf8PathBuf,
    pub elapsed: Duration,
    pub invocations: usize,
}

/// Ordered invocations that produce one artifact
#[derive(Debug, Clone)]
pub struct CommandPlan {
    pub kind: BuildKind,
    pub output_dir: Utf8PathBuf,
    pub artifact: Utf8PathBuf,
    pub steps: Vec<Invocation>,
    pub warnings: Vec<PlanWarning>,
}

impl CommandPlan {
    /// Run every step in order, stopping at the first failure.
    ///
    /// The output directory is created first. A failing compile step names its source
    /// file and nothing after it runs.
    pub async fn execute<R: ToolRunner + ?Sized>(&self, runner: &R) -> Result<BuildReport, BuildError> {
        let start = Instant::now();

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| BuildError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        for step in &self.steps {
            let code = runner.run(step).await.map_err(|source| BuildError::Spawn {
                program: step.program.clone(),
                source,
            })?;

            if code != 0 {
                return Err(step.failure(&self.artifact, code));
            }
        }

        let elapsed = start.elapsed();
        tracing::info!(
            "Built {} ({}) in {:.2}s",
            self.artifact,
            self.kind,
            elapsed.as_secs_f32()
        );

        Ok(BuildReport {
            artifact: self.artifact.clone(),
            elapsed,
            invocations: self.steps.len(),
        })
    }
}

/// Turns project settings into a [`CommandPlan`].
///
/// The compiler is the toolchain's path unless `[extra] compiler` overrides it; the
/// archiver is `ar` unless `[extra] archiver` overrides it.
#[derive(Debug, Clone)]
pub struct BuildPlanner {
    compiler: String,
    archiver: String,
    output_dir: Utf8PathBuf,
}

impl BuildPlanner {
    pub fn new(project: &ProjectConfig, settings: &ProjectSettings) -> Self {
        let compiler = settings
            .compiler_override()
            .map(str::to_string)
            .unwrap_or_else(|| project.toolchain.path.to_string());
        let archiver = settings
            .extra
            .get("archiver")
            .filter(|a| !a.is_empty())
            .cloned()
            .unwrap_or_else(|| "ar".to_string());

        Self {
            compiler,
            archiver,
            output_dir: project.build_dir(),
        }
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<Utf8PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn compiler(&self) -> &str {
        &self.compiler
    }

    /// Path of the artifact a plan would produce, without planning the steps
    pub fn artifact_path(&self, settings: &ProjectSettings, named_config: Option<&str>) -> Utf8PathBuf {
        let output_name = named_config
            .and_then(|name| settings.configurations.get(name))
            .and_then(|c| c.output.clone())
            .unwrap_or_else(|| settings.build.output_name.clone());
        self.output_dir
            .join(artifact_file_name(settings.build.kind, &output_name))
    }

    /// Build the invocation list.
    ///
    /// # Arguments
    /// * `settings` - Freshly loaded project settings
    /// * `debug` - Add `-g` to executable builds
    /// * `named_config` - Optional `[configurations.<name>]` overlay
    pub fn plan(
        &self,
        settings: &ProjectSettings,
        debug: bool,
        named_config: Option<&str>,
    ) -> Result<CommandPlan, BuildError> {
        if settings.src_files.is_empty() {
            return Err(BuildError::NoSources);
        }

        let mut warnings = Vec::new();
        let mut flags = Vec::new();

        if let Some(name) = named_config {
            match settings.configurations.get(name) {
                Some(configuration) => flags.extend(configuration.flags.iter().cloned()),
                None => {
                    let warning = PlanWarning::UnknownConfig(name.to_string());
                    tracing::warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }
        // Debug info applies to executables only
        if debug && settings.build.kind == BuildKind::Executable {
            flags.push("-g".to_string());
        } else if debug {
            tracing::debug!("Ignoring debug flag for {} build", settings.build.kind);
        }

        let artifact = self.artifact_path(settings, named_config);

        let defines = define_args(settings);
        let includes = include_args(settings);
        let sources: Vec<Utf8PathBuf> = settings
            .src_files
            .iter()
            .map(|src| settings.resolve(src))
            .collect();
        let link_args = link_args(settings);

        let steps = match settings.build.kind {
            BuildKind::Executable | BuildKind::SharedLibrary => {
                let mut args = flags;
                if settings.build.kind == BuildKind::SharedLibrary {
                    args.push("-shared".to_string());
                    args.push("-fPIC".to_string());
                }
                args.extend(defines);
                args.extend(includes);
                args.extend(sources.iter().map(|s| s.to_string()));
                args.push("-o".to_string());
                args.push(artifact.to_string());
                args.extend(link_args);

                vec![Invocation::new(Stage::Link, &self.compiler, args)]
            }
            BuildKind::StaticArchive => {
                let mut steps = Vec::with_capacity(sources.len() + 1);
                let mut objects = Vec::with_capacity(sources.len());
                let mut seen_stems: HashMap<String, usize> = HashMap::new();

                for source in &sources {
                    let object = self.output_dir.join(object_file_name(source, &mut seen_stems));

                    let mut args = flags.clone();
                    args.extend(defines.iter().cloned());
                    args.extend(includes.iter().cloned());
                    args.push("-c".to_string());
                    args.push(source.to_string());
                    args.push("-o".to_string());
                    args.push(object.to_string());

                    let mut step = Invocation::new(Stage::Compile, &self.compiler, args);
                    step.source = Some(source.clone());
                    steps.push(step);
                    objects.push(object.to_string());
                }

                let mut args = vec!["rcs".to_string(), artifact.to_string()];
                args.extend(objects);
                steps.push(Invocation::new(Stage::Archive, &self.archiver, args));
                steps
            }
        };

        tracing::debug!(
            "Planned {} build of {} with {} step(s)",
            settings.build.kind,
            artifact,
            steps.len()
        );

        Ok(CommandPlan {
            kind: settings.build.kind,
            output_dir: self.output_dir.clone(),
            artifact,
            steps,
            warnings,
        })
    }

    /// Where [`plan_test`](Self::plan_test) puts the program built from `test_source`
    pub fn test_executable(&self, test_source: &Utf8Path) -> Utf8PathBuf {
        let stem = test_source.file_stem().unwrap_or("test");
        self.output_dir
            .join(artifact_file_name(BuildKind::Executable, stem))
    }

    /// Compile-and-link a single test program.
    ///
    /// The test source is built together with every project source except
    /// `main.cpp`, with debug info, into `<output_dir>/<stem>`.
    pub fn plan_test(&self, settings: &ProjectSettings, test_source: &Utf8Path) -> Invocation {
        let executable = self.test_executable(test_source);

        let mut args = vec![test_source.to_string()];
        args.extend(define_args(settings));
        args.extend(include_args(settings));
        args.extend(
            settings
                .src_files
                .iter()
                .map(|src| settings.resolve(src))
                .filter(|src| src.file_name() != Some(ENTRY_POINT))
                .map(|src| src.to_string()),
        );
        args.push("-o".to_string());
        args.push(executable.to_string());
        args.push("-g".to_string());
        args.extend(link_args(settings));

        let mut invocation = Invocation::new(Stage::Link, &self.compiler, args);
        invocation.source = Some(test_source.to_path_buf());
        invocation
    }
}

fn define_args(settings: &ProjectSettings) -> Vec<String> {
    settings
        .defines
        .iter()
        .map(|(name, value)| {
            if value.is_empty() {
                format!("-D{}", name)
            } else {
                format!("-D{}={}", name, value)
            }
        })
        .collect()
}

fn include_args(settings: &ProjectSettings) -> Vec<String> {
    settings
        .include_dirs
        .iter()
        .map(|dir| format!("-I{}", settings.resolve(dir)))
        .collect()
}

fn link_args(settings: &ProjectSettings) -> Vec<String> {
    let mut args: Vec<String> = settings
        .static_linked_dirs
        .iter()
        .map(|dir| format!("-L{}", settings.resolve(dir)))
        .collect();
    args.extend(settings.static_linked.iter().map(|entry| {
        if is_native_library(entry) {
            settings.resolve(entry).to_string()
        } else {
            format!("-l{}", entry)
        }
    }));
    args
}

/// Whether a `static_linked` entry names a library file
pub fn is_native_library(entry: &str) -> bool {
    Utf8Path::new(entry)
        .extension()
        .is_some_and(|ext| NATIVE_LIBRARY_EXTENSIONS.contains(&ext))
}

/// Platform file name for an artifact of `kind` called `output_name`
pub fn artifact_file_name(kind: BuildKind, output_name: &str) -> String {
    match kind {
        BuildKind::Executable => {
            if cfg!(windows) {
                format!("{}.exe", output_name)
            } else {
                output_name.to_string()
            }
        }
        BuildKind::StaticArchive => {
            if cfg!(windows) {
                format!("{}.lib", output_name)
            } else {
                format!("lib{}.a", output_name)
            }
        }
        BuildKind::SharedLibrary => {
            if cfg!(windows) {
                format!("{}.dll", output_name)
            } else if cfg!(target_os = "macos") {
                format!("lib{}.dylib", output_name)
            } else {
                format!("lib{}.so", output_name)
            }
        }
    }
}

/// `<stem>.o`, or `<stem>-<n>.o` when an earlier source had the same stem
fn object_file_name(source: &Utf8Path, seen: &mut HashMap<String, usize>) -> String {
    let stem = source.file_stem().unwrap_or("object").to_string();
    let count = seen.entry(stem.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        format!("{}.o", stem)
    } else {
        format!("{}-{}.o", stem, count)
    }
}

/// Test sources directly under `tests_dir`, sorted by name
pub fn discover_tests(tests_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, BuildError> {
    let entries = match tests_dir.read_dir_utf8() {
        Ok(entries) => entries,
        Err(_) => return Err(BuildError::NoTests(tests_dir.to_path_buf())),
    };

    let mut tests = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| BuildError::Io {
            path: tests_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_test = path
            .extension()
            .is_some_and(|ext| TEST_EXTENSIONS.contains(&ext));
        if is_test && path.is_file() {
            tests.push(path.to_path_buf());
        }
    }

    if tests.is_empty() {
        return Err(BuildError::NoTests(tests_dir.to_path_buf()));
    }
    tests.sort();
    Ok(tests)
}

/// Remove generated output directories under `root`.
///
/// # Returns
/// The directories that existed and were removed
pub fn clean_outputs(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, BuildError> {
    let mut removed = Vec::new();
    for name in GENERATED_DIRS {
        let dir = root.join(name);
        if dir.is_dir() {
            fs::remove_dir_all(&dir).map_err(|source| BuildError::Io {
                path: dir.clone(),
                source,
            })?;
            tracing::info!("Removed {}", dir);
            removed.push(dir);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NamedConfiguration, ToolchainInfo};
    use tempfile::TempDir;

    fn project(root: &str) -> ProjectConfig {
        ProjectConfig::new(
            root,
            "demo",
            ToolchainInfo {
                name: "g++".to_string(),
                path: Utf8PathBuf::from("/usr/bin/g++"),
                version: "13.2.0".to_string(),
            },
        )
    }

    fn settings(kind: BuildKind) -> ProjectSettings {
        let mut settings = ProjectSettings::new("/work/demo", "demo");
        settings.build.kind = kind;
        settings.src_files = vec!["src/a.cpp".to_string(), "src/b.cpp".to_string()];
        settings.include_dirs = vec!["include".to_string()];
        settings
    }

    #[test]
    fn test_executable_plan() {
        let mut settings = settings(BuildKind::Executable);
        settings.static_linked = vec!["m".to_string(), "lib/libfoo.a".to_string()];
        settings.static_linked_dirs = vec!["/opt/lib".to_string()];
        settings.defines.insert("LEVEL".to_string(), "2".to_string());

        let planner = BuildPlanner::new(&project("/work/demo"), &settings);
        let plan = planner.plan(&settings, true, None).unwrap();

        assert_eq!(plan.steps.len(), 1);
        let step = &plan.steps[0];
        assert_eq!(step.program, "/usr/bin/g++");
        assert_eq!(step.stage, Stage::Link);
        for expected in [
            "-g",
            "-DLEVEL=2",
            "-I/work/demo/include",
            "/work/demo/src/a.cpp",
            "-L/opt/lib",
            "-lm",
            "/work/demo/lib/libfoo.a",
        ] {
            assert!(step.args.contains(&expected.to_string()), "missing {}", expected);
        }
        assert_eq!(
            plan.artifact,
            Utf8PathBuf::from("/work/demo/build").join(artifact_file_name(BuildKind::Executable, "demo"))
        );
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_shared_plan_flags() {
        let settings = settings(BuildKind::SharedLibrary);
        let planner = BuildPlanner::new(&project("/work/demo"), &settings);
        let plan = planner.plan(&settings, false, None).unwrap();

        let args = &plan.steps[0].args;
        assert!(args.contains(&"-shared".to_string()));
        assert!(args.contains(&"-fPIC".to_string()));
        assert!(!args.contains(&"-g".to_string()));
        assert_eq!(
            plan.artifact.file_name(),
            Some(artifact_file_name(BuildKind::SharedLibrary, "demo").as_str())
        );
    }

    #[test]
    fn test_debug_only_for_executables() {
        for kind in [BuildKind::StaticArchive, BuildKind::SharedLibrary] {
            let settings = settings(kind);
            let planner = BuildPlanner::new(&project("/work/demo"), &settings);
            let plan = planner.plan(&settings, true, None).unwrap();

            for step in &plan.steps {
                assert!(!step.args.contains(&"-g".to_string()), "{} build got -g", kind);
            }
        }
    }

    #[test]
    fn test_static_plan_steps() {
        let mut settings = settings(BuildKind::StaticArchive);
        settings.build.output_name = "core".to_string();
        settings.extra.insert("archiver".to_string(), "llvm-ar".to_string());

        let planner = BuildPlanner::new(&project("/work/demo"), &settings);
        let plan = planner.plan(&settings, false, None).unwrap();

        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].stage, Stage::Compile);
        assert_eq!(plan.steps[0].source, Some(Utf8PathBuf::from("/work/demo/src/a.cpp")));
        assert!(plan.steps[0].args.contains(&"-c".to_string()));
        assert!(plan.steps[1].args.contains(&"/work/demo/build/b.o".to_string()));

        let archive = &plan.steps[2];
        assert_eq!(archive.stage, Stage::Archive);
        assert_eq!(archive.program, "llvm-ar");
        assert_eq!(archive.args[0], "rcs");
        assert!(archive.args[1].ends_with(&artifact_file_name(BuildKind::StaticArchive, "core")));
        assert_eq!(&archive.args[2..], ["/work/demo/build/a.o", "/work/demo/build/b.o"]);
    }

    #[test]
    fn test_duplicate_object_stems() {
        let mut settings = settings(BuildKind::StaticArchive);
        settings.src_files = vec!["src/util.cpp".to_string(), "lib/util.cpp".to_string()];

        let planner = BuildPlanner::new(&project("/work/demo"), &settings);
        let plan = planner.plan(&settings, false, None).unwrap();

        let archive = plan.steps.last().unwrap();
        assert!(archive.args.contains(&"/work/demo/build/util.o".to_string()));
        assert!(archive.args.contains(&"/work/demo/build/util-2.o".to_string()));
    }

    #[test]
    fn test_named_configuration_overlay() {
        let mut settings = settings(BuildKind::Executable);
        settings.configurations.insert(
            "release".to_string(),
            NamedConfiguration {
                flags: vec!["-O2".to_string()],
                output: Some("demo-release".to_string()),
            },
        );

        let planner = BuildPlanner::new(&project("/work/demo"), &settings);
        let plan = planner.plan(&settings, false, Some("release")).unwrap();

        assert!(plan.steps[0].args.contains(&"-O2".to_string()));
        assert_eq!(
            plan.artifact.file_name(),
            Some(artifact_file_name(BuildKind::Executable, "demo-release").as_str())
        );
    }

    #[test]
    fn test_unknown_configuration_is_warning() {
        let settings = settings(BuildKind::Executable);
        let planner = BuildPlanner::new(&project("/work/demo"), &settings);
        let plan = planner.plan(&settings, false, Some("profiling")).unwrap();

        assert_eq!(plan.warnings, vec![PlanWarning::UnknownConfig("profiling".to_string())]);
        assert!(plan.artifact.as_str().contains("demo"));
    }

    #[test]
    fn test_compiler_override() {
        let mut settings = settings(BuildKind::Executable);
        settings.extra.insert("compiler".to_string(), "clang++".to_string());

        let planner = BuildPlanner::new(&project("/work/demo"), &settings);
        assert_eq!(planner.compiler(), "clang++");
    }

    #[test]
    fn test_no_sources() {
        let mut settings = settings(BuildKind::Executable);
        settings.src_files.clear();

        let planner = BuildPlanner::new(&project("/work/demo"), &settings);
        assert!(matches!(planner.plan(&settings, false, None), Err(BuildError::NoSources)));
    }

    #[test]
    fn test_is_native_library() {
        assert!(is_native_library("libz.a"));
        assert!(is_native_library("vendor/lib/foo.so"));
        assert!(is_native_library("zlib.lib"));
        assert!(!is_native_library("pthread"));
        assert!(!is_native_library("boost_system"));
    }

    #[tokio::test]
    async fn test_static_build_stops_at_failing_source() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let mut settings = ProjectSettings::new(&root, "demo");
        settings.build.kind = BuildKind::StaticArchive;
        settings.src_files = vec![
            "src/a.cpp".to_string(),
            "src/b.cpp".to_string(),
            "src/c.cpp".to_string(),
        ];

        let planner = BuildPlanner::new(&project(root.as_str()), &settings);
        let plan = planner.plan(&settings, false, None).unwrap();

        // Only the first two compile steps run; the archiver is never called
        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .withf(|invocation| invocation.stage == Stage::Compile)
            .times(2)
            .returning(|invocation| {
                let failing = invocation
                    .source
                    .as_ref()
                    .is_some_and(|s| s.file_name() == Some("b.cpp"));
                Ok(if failing { 1 } else { 0 })
            });

        let error = plan.execute(&runner).await.unwrap_err();
        match error {
            BuildError::Compile { file, code } => {
                assert_eq!(file, root.join("src/b.cpp"));
                assert_eq!(code, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(root.join("build").is_dir());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

        let mut settings = ProjectSettings::new(&root, "demo");
        settings.src_files = vec!["main.cpp".to_string()];

        let planner = BuildPlanner::new(&project(root.as_str()), &settings);
        let plan = planner.plan(&settings, false, None).unwrap();

        let mut runner = MockToolRunner::new();
        runner
            .expect_run()
            .returning(|_| Err(std::io::Error::from(std::io::ErrorKind::NotFound)));

        let error = plan.execute(&runner).await.unwrap_err();
        assert!(matches!(error, BuildError::Spawn { program, .. } if program == "/usr/bin/g++"));
    }

    #[test]
    fn test_plan_test_leaves_out_entry_point() {
        let mut settings = settings(BuildKind::StaticArchive);
        settings.src_files.push("src/main.cpp".to_string());
        settings.static_linked = vec!["m".to_string()];

        let planner = BuildPlanner::new(&project("/work/demo"), &settings);
        let step = planner.plan_test(&settings, Utf8Path::new("/work/demo/tests/parse.cpp"));

        assert_eq!(step.stage, Stage::Link);
        assert_eq!(step.source.as_deref(), Some(Utf8Path::new("/work/demo/tests/parse.cpp")));
        assert_eq!(step.args[0], "/work/demo/tests/parse.cpp");
        assert!(step.args.contains(&"/work/demo/src/a.cpp".to_string()));
        assert!(!step.args.contains(&"/work/demo/src/main.cpp".to_string()));
        assert!(step.args.contains(&"-g".to_string()));
        assert!(step.args.contains(&"-lm".to_string()));
        let output = step.args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(
            step.args[output + 1],
            format!("/work/demo/build/{}", artifact_file_name(BuildKind::Executable, "parse"))
        );
    }

    #[test]
    fn test_discover_tests() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let tests_dir = root.join("tests");

        assert!(matches!(discover_tests(&tests_dir), Err(BuildError::NoTests(_))));

        fs::create_dir(&tests_dir).unwrap();
        fs::write(tests_dir.join("README.md"), "").unwrap();
        assert!(matches!(discover_tests(&tests_dir), Err(BuildError::NoTests(_))));

        fs::write(tests_dir.join("b.cc"), "").unwrap();
        fs::write(tests_dir.join("a.cpp"), "").unwrap();
        fs::create_dir(tests_dir.join("fixtures.cpp")).unwrap();

        let found = discover_tests(&tests_dir).unwrap();
        assert_eq!(found, vec![tests_dir.join("a.cpp"), tests_dir.join("b.cc")]);
    }

    #[test]
    fn test_clean_outputs() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("build/obj")).unwrap();
        fs::write(root.join("build/obj/a.o"), b"").unwrap();

        let removed = clean_outputs(&root).unwrap();

        assert_eq!(removed, vec![root.join("build")]);
        assert!(!root.join("build").exists());
        assert!(clean_outputs(&root).unwrap().is_empty());
    }
}
