//! Integration tests for the directory synchronizer
//!
//! These tests verify:
//! - Created and removed files flow into `[source] "src files"`
//! - Ignored files are skipped
//! - The watcher task stops on cancellation with metrics recorded

use camino::Utf8PathBuf;
use cppx::config::ConfigStore;
use cppx::metrics::WatchMetrics;
use cppx::models::{ProjectConfig, ToolchainInfo};
use cppx::watcher::{DirectoryWatcher, SourceSync, WatchError};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio_test::assert_ok;

const DOCUMENT: &str = r#"name = "demo"

[source]
"src files" = ["src/main.cpp"]
"include files" = []
"include directories" = []
static_linked = []
static_linked_dirs = []

[ignore]
files = ["scratch.cpp"]
dirs = []
"#;

fn create_test_project() -> (ProjectConfig, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    fs::write(root.join("config.toml"), DOCUMENT).unwrap();
    fs::create_dir(root.join("src")).unwrap();
    fs::write(root.join("src/main.cpp"), "int main() {}").unwrap();

    let project = ProjectConfig::new(
        &root,
        "demo",
        ToolchainInfo {
            name: "g++".to_string(),
            path: Utf8PathBuf::from("/usr/bin/g++"),
            version: "13.2.0".to_string(),
        },
    );
    (project, temp_dir)
}

fn src_files(project: &ProjectConfig) -> Vec<String> {
    ConfigStore::open(project).load().unwrap().src_files
}

#[test]
fn test_ticks_update_document() {
    let (project, _temp_dir) = create_test_project();
    let src = project.path.join("src");
    let metrics = Arc::new(WatchMetrics::new());

    let sync = SourceSync::new(ConfigStore::open(&project), &src).with_metrics(metrics.clone());
    let mut watcher = DirectoryWatcher::new(&src, Duration::from_millis(10), sync.into_callback())
        .unwrap()
        .with_metrics(metrics.clone());

    // Existing files are part of the initial snapshot
    assert_eq!(watcher.tick(), Some(0));

    fs::write(src.join("util.cpp"), "").unwrap();
    fs::write(src.join("scratch.cpp"), "").unwrap();
    assert_eq!(watcher.tick(), Some(2));
    assert_eq!(src_files(&project), vec!["src/main.cpp", "src/util.cpp"]);

    fs::remove_file(src.join("main.cpp")).unwrap();
    assert_eq!(watcher.tick(), Some(1));
    assert_eq!(src_files(&project), vec!["src/util.cpp"]);

    assert_eq!(metrics.files_created.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.files_ignored.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.files_removed.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.document_writes.load(Ordering::Relaxed), 2);
    assert_eq!(metrics.ticks.load(Ordering::Relaxed), 3);
}

#[test]
fn test_subdirectories_not_reported() {
    let (project, _temp_dir) = create_test_project();
    let src = project.path.join("src");

    let sync = SourceSync::new(ConfigStore::open(&project), &src);
    let mut watcher = DirectoryWatcher::new(&src, Duration::from_millis(10), sync.into_callback()).unwrap();

    fs::create_dir(src.join("detail")).unwrap();
    assert_eq!(watcher.tick(), Some(0));
    assert_eq!(src_files(&project), vec!["src/main.cpp"]);
}

#[test]
fn test_missing_directory_rejected() {
    let (project, _temp_dir) = create_test_project();
    let missing = project.path.join("generated");

    let sync = SourceSync::new(ConfigStore::open(&project), &missing);
    let result = DirectoryWatcher::new(&missing, Duration::from_millis(10), sync.into_callback());

    assert!(matches!(result, Err(WatchError::NotADirectory(_))));
}

#[tokio::test]
async fn test_watcher_task_syncs_until_cancelled() {
    let (project, _temp_dir) = create_test_project();
    let src = project.path.join("src");
    let metrics = Arc::new(WatchMetrics::new());

    let sync = SourceSync::new(ConfigStore::open(&project), &src).with_metrics(metrics.clone());
    let watcher = DirectoryWatcher::new(&src, Duration::from_millis(20), sync.into_callback())
        .unwrap()
        .with_metrics(metrics.clone());

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let handle = tokio::spawn(watcher.run(cancel_rx));

    fs::write(src.join("added.cpp"), "").unwrap();

    let mut synced = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if src_files(&project).contains(&"src/added.cpp".to_string()) {
            synced = true;
            break;
        }
    }
    assert!(synced, "watcher never added src/added.cpp");

    cancel_tx.send(true).unwrap();
    let stopped = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert_ok!(assert_ok!(stopped));

    assert_eq!(metrics.files_created.load(Ordering::Relaxed), 1);
    assert!(metrics.ticks.load(Ordering::Relaxed) >= 1);
}
