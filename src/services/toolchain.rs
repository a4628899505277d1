//! Compiler discovery for `cppx profile`.
//!
//! Compilers are looked up on `PATH` in a fixed preference order and identified by the
//! first line of their `--version` output.

use crate::models::ToolchainInfo;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;
use tokio::process::Command;

/// Compilers `profile` looks for, in preference order
pub const KNOWN_COMPILERS: [&str; 4] = ["gcc", "g++", "clang", "clang++"];

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+(?:\.\d+)?)").expect("Invalid version regex"));

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("No supported compiler found on PATH (looked for {})", KNOWN_COMPILERS.join(", "))]
    NoneFound,

    #[error("Compiler '{0}' was not found on PATH")]
    NotFound(String),
}

/// Extract a dotted version number from a `--version` line.
///
/// # Examples
///
/// ```
/// use cppx::services::toolchain::parse_version;
///
/// assert_eq!(parse_version("g++ (GCC) 13.2.1 20230801"), Some("13.2.1".to_string()));
/// assert_eq!(parse_version("no digits here"), None);
/// ```
pub fn parse_version(line: &str) -> Option<String> {
    VERSION_PATTERN
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Locate `name` in the directories of `PATH`
pub fn find_in_path(name: &str) -> Option<Utf8PathBuf> {
    let path = std::env::var_os("PATH").unwrap_or_else(OsString::new);
    find_in(name, std::env::split_paths(&path))
}

/// Locate `name` in the given directories
pub fn find_in<I>(name: &str, dirs: I) -> Option<Utf8PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let file_name = if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    };

    dirs.into_iter()
        .filter_map(|dir| Utf8PathBuf::from_path_buf(dir).ok())
        .map(|dir| dir.join(&file_name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Utf8Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Utf8Path) -> bool {
    path.is_file()
}

/// Run `<path> --version` and build the toolchain record.
///
/// The version falls back to the whole first output line when it has no dotted number.
pub async fn query_version(name: &str, path: &Utf8Path) -> Option<ToolchainInfo> {
    let output = match Command::new(path).arg("--version").output().await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("Failed to run {} --version: {}", path, e);
            return None;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().unwrap_or("").trim();
    let version = parse_version(first_line).unwrap_or_else(|| first_line.to_string());

    tracing::debug!("{} at {} reports version {}", name, path, version);
    Some(ToolchainInfo {
        name: name.to_string(),
        path: path.to_path_buf(),
        version,
    })
}

/// Every known compiler available on `PATH`, in preference order
pub async fn discover() -> Vec<ToolchainInfo> {
    let mut found = Vec::new();
    for name in KNOWN_COMPILERS {
        let Some(path) = find_in_path(name) else {
            tracing::debug!("{} not found on PATH", name);
            continue;
        };
        if let Some(info) = query_version(name, &path).await {
            tracing::info!("Found {} {} at {}", info.name, info.version, info.path);
            found.push(info);
        }
    }
    found
}

/// Pick the requested compiler, or the first one found
pub fn select(found: Vec<ToolchainInfo>, requested: Option<&str>) -> Result<ToolchainInfo, ToolchainError> {
    match requested {
        Some(name) => found
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ToolchainError::NotFound(name.to_string())),
        None => found.into_iter().next().ok_or(ToolchainError::NoneFound),
    }
}
