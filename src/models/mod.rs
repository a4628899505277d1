//! Data models for cppx.
//!
//! This module contains the core data structures shared by every subsystem:
//! - [`ProjectConfig`]: The current project (root path, name) and its [`ToolchainInfo`]
//! - [`ProjectSettings`]: Typed projection of a project's `config.toml`
//! - [`BuildSettings`] / [`BuildKind`]: Output name and build-output strategy
//! - [`PackageInfo`]: Facts recovered from the dependency installer's report
//!
//! # Architecture Note
//!
//! None of these values are cached between operations. The on-disk documents are the
//! source of truth; every operation re-reads them through
//! [`ConfigStore`](crate::config::ConfigStore) or [`GlobalStore`](crate::config::GlobalStore)
//! and drops the projection when it is done.

pub mod package;
pub mod project;
pub mod settings;

pub use package::PackageInfo;
pub use project::{GlobalDocument, ProjectConfig, ProjectEntry, ToolchainInfo};
pub use settings::{BuildKind, BuildSettings, Metadata, NamedConfiguration, ProjectSettings};
