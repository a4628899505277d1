//! Services module - build planning, dependency installation and toolchain discovery.
//!
//! Everything here takes its inputs explicitly (a [`ProjectConfig`](crate::models::ProjectConfig)
//! and freshly loaded [`ProjectSettings`](crate::models::ProjectSettings)) and has no
//! knowledge of the command line.
//!
//! # Components
//!
//! - [`BuildPlanner`]: turns settings into a [`CommandPlan`] for one of the three build
//!   kinds, with optional named-configuration overlays.
//! - [`ToolRunner`]: seam over external tools. [`ProcessRunner`] runs real subprocesses;
//!   tests substitute a mock.
//! - [`PackageManager`]: runs `conan install` / `conan remove` and reads the JSON install
//!   report through [`InstallReport`].
//! - [`toolchain`]: compiler discovery on `PATH`.
//! - [`export`]: CMake export.
//!
//! # Usage Example
//!
//! ```ignore
//! use cppx::services::{BuildPlanner, ProcessRunner};
//!
//! let settings = store.load()?;
//! let plan = BuildPlanner::new(&project, &settings).plan(&settings, true, None)?;
//! let report = plan.execute(&ProcessRunner::in_dir(&project.path)).await?;
//! println!("built {} in {:.2}s", report.artifact, report.elapsed.as_secs_f32());
//! ```

pub mod build;
pub mod export;
pub mod packages;
pub mod toolchain;

pub use build::{
    BuildError, BuildPlanner, BuildReport, CommandPlan, Invocation, PlanWarning, ProcessRunner, Stage,
    ToolRunner, artifact_file_name, clean_outputs, discover_tests, is_native_library,
};
pub use export::{ExportError, ExportFormat};
pub use packages::{InstallReport, InstalledPackage, PackageError, PackageManager, reference_matches};
pub use toolchain::ToolchainError;
