//! cppx - project manager and build orchestrator for C/C++ projects
//!
//! Main entry point for the command-line application.
//!
//! # Overview
//!
//! The binary is a thin layer over [`cppx::commands`]. It:
//! - Parses the command line with clap
//! - Initializes logging (console, plus a rotating file log for `watch`)
//! - Creates a tokio runtime (4 worker threads for subprocesses and the watcher)
//! - Resolves the current project from `~/.cppxglobal.toml`
//! - Dispatches to one handler and prints its result
//!
//! # Documents
//!
//! - `~/.cppxglobal.toml`: current project and toolchain (`cppx project set`, `cppx profile`)
//! - `<project>/config.toml`: sources, dependencies, build settings, metadata

use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use cppx::commands::{self, MetadataUpdate, ProjectContext};
use cppx::config::GlobalStore;
use cppx::{APP_NAME, VERSION};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cppx", version, about = "Project manager and build orchestrator for C/C++ projects")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select the current project
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Discover compilers on PATH and record one as the toolchain
    Profile {
        /// Compiler to record instead of the first one found
        #[arg(long)]
        compiler: Option<String>,
    },

    /// Build the current project
    Build {
        /// Build with debug info
        #[arg(short, long)]
        debug: bool,

        /// Named configuration from [configurations]
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Build if needed, then run the executable
    Run {
        /// Arguments passed to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Compile and run every program under <project>/tests
    Test,

    /// Keep the source list in step with a directory until Ctrl-C
    Watch {
        /// Directory to watch (default: <project>/src)
        #[arg(long)]
        dir: Option<Utf8PathBuf>,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },

    /// Add files or directories to the ignore lists
    Ignore {
        #[arg(required = true)]
        paths: Vec<Utf8PathBuf>,
    },

    /// Install or remove dependencies
    Pkg {
        #[command(subcommand)]
        action: PkgAction,
    },

    /// Export the project to another build system
    Export {
        /// Target format (cmake)
        format: String,
    },

    /// Set a project setting (key=value)
    Config { assignment: String },

    /// Update project metadata
    Metadata {
        #[arg(long = "version")]
        project_version: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        license: Option<String>,

        /// Author name (repeatable)
        #[arg(long = "author")]
        authors: Vec<String>,

        #[arg(long)]
        github_user: Option<String>,

        #[arg(long)]
        github_repo: Option<String>,
    },

    /// Remove build and docs output
    Clean,

    /// Show project information
    Info,
}

#[derive(Subcommand, Debug)]
enum ProjectAction {
    /// Record a project as current
    Set {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = ".")]
        path: Utf8PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum PkgAction {
    /// Install <name>/<version> through conan
    Install {
        name: String,

        #[arg(long = "version")]
        pkg_version: String,
    },

    /// Remove an installed package
    Remove { package_ref: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Only the long-running watcher keeps a file log
    let log_dir = match &cli.command {
        Command::Watch { .. } => GlobalStore::default_location()
            .and_then(|global| global.current_project())
            .ok()
            .map(|project| project.path.join(".cppx").join("logs")),
        _ => None,
    };

    let _guard = match cppx::logging::setup_logging(cli.verbose, log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("[ERROR] {e:#}");
            return ExitCode::FAILURE;
        }
    };

    tracing::debug!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("cppx-worker")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("[ERROR] Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(dispatch(cli.command));
    runtime.shutdown_timeout(Duration::from_secs(5));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            eprintln!("[ERROR] {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Command) -> Result<()> {
    let global = GlobalStore::default_location()?;

    match command {
        Command::Project {
            action: ProjectAction::Set { name, path },
        } => {
            let entry = commands::set_project(&global, &name, &path)?;
            println!("Current project: {} ({})", entry.name, entry.path);
        }
        Command::Profile { compiler } => {
            let toolchain = commands::profile(&global, compiler.as_deref()).await?;
            println!(
                "Toolchain: {} {} ({})",
                toolchain.name, toolchain.version, toolchain.path
            );
        }
        Command::Build { debug, config } => {
            let ctx = ProjectContext::current(&global)?;
            let report = commands::build(&ctx, &ctx.runner(), debug, config.as_deref()).await?;
            println!(
                "Built {} in {:.2}s",
                report.artifact,
                report.elapsed.as_secs_f32()
            );
        }
        Command::Run { args } => {
            let ctx = ProjectContext::current(&global)?;
            let code = commands::run(&ctx, &ctx.runner(), &args).await?;
            if code != 0 {
                bail!("Program exited with code {}", code);
            }
        }
        Command::Test => {
            let ctx = ProjectContext::current(&global)?;
            let outcomes = commands::test(&ctx, &ctx.runner()).await?;
            for outcome in &outcomes {
                println!("{}", outcome);
            }
            let failed = outcomes.iter().filter(|o| !o.passed()).count();
            println!("{} passed, {} failed", outcomes.len() - failed, failed);
            if failed > 0 {
                bail!("{} test(s) failed", failed);
            }
        }
        Command::Watch { dir, interval_ms } => {
            let ctx = ProjectContext::current(&global)?;
            commands::watch(&ctx, dir.as_deref(), Duration::from_millis(interval_ms)).await?;
        }
        Command::Ignore { paths } => {
            let ctx = ProjectContext::current(&global)?;
            let summary = commands::ignore(&ctx, &paths)?;
            for dir in &summary.dirs {
                println!("Ignoring directory: {}", dir);
            }
            for file in &summary.files {
                println!("Ignoring file: {}", file);
            }
            for missing in &summary.missing {
                eprintln!("Path does not exist: {}", missing);
            }
        }
        Command::Pkg { action } => {
            let ctx = ProjectContext::current(&global)?;
            match action {
                PkgAction::Install { name, pkg_version } => {
                    let info = commands::install_package(&ctx, &ctx.runner(), &name, &pkg_version).await?;
                    println!("Installed {}", info.package_ref);
                }
                PkgAction::Remove { package_ref } => {
                    let info = commands::remove_package(&ctx, &ctx.runner(), &package_ref).await?;
                    println!("Removed {}", info.package_ref);
                }
            }
        }
        Command::Export { format } => {
            let ctx = ProjectContext::current(&global)?;
            let path = commands::export_project(&ctx, &format)?;
            println!("Exported {}", path);
        }
        Command::Config { assignment } => {
            let ctx = ProjectContext::current(&global)?;
            let (key, value) = commands::set_config(&ctx, &assignment)?;
            println!("{} = {}", key, value);
        }
        Command::Metadata {
            project_version,
            description,
            license,
            authors,
            github_user,
            github_repo,
        } => {
            let ctx = ProjectContext::current(&global)?;
            let update = MetadataUpdate {
                version: project_version,
                authors: (!authors.is_empty()).then_some(authors),
                description,
                license,
                github_username: github_user,
                github_repo,
            };
            let metadata = commands::set_metadata(&ctx, update)?;
            tracing::debug!("Metadata now {:?}", metadata);
            println!("Metadata updated");
        }
        Command::Clean => {
            let ctx = ProjectContext::current(&global)?;
            let removed = commands::clean(&ctx)?;
            if removed.is_empty() {
                println!("Nothing to clean");
            }
            for path in removed {
                println!("Removed {}", path);
            }
        }
        Command::Info => {
            let ctx = ProjectContext::current(&global)?;
            print!("{}", commands::info(&ctx)?);
        }
    }

    Ok(())
}
