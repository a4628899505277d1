// cppx - project manager and build orchestrator for C/C++ projects
//
// This is the library crate containing the configuration store, build planner,
// dependency extractor and directory synchronizer.
// The binary crate (main.rs) provides the command-line entry point.

pub mod commands;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod watcher;

// Re-export commonly used types for convenience
pub use config::{ConfigError, ConfigStore, GlobalStore};
pub use models::{ProjectConfig, ProjectSettings, ToolchainInfo};
pub use watcher::{DirectoryWatcher, SourceSync};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
