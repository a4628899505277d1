use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix of the rotating log files
pub const LOG_PREFIX: &str = "cppx";

/// Build the level filter. `RUST_LOG` wins when set.
fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    })
}

/// Setup logging to stderr, optionally also to a daily rotating file.
///
/// Console output goes to stderr so command output on stdout stays clean. The
/// file layer is used by long-running commands such as `watch`.
///
/// # Arguments
/// * `verbose` - If true, use debug level; otherwise use info level
/// * `log_dir` - Directory for rotating log files; `None` logs to the console only
///
/// # Returns
/// A guard that must be held for the duration of the program when a file layer
/// was installed
pub fn setup_logging(verbose: bool, log_dir: Option<&Utf8Path>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir))?;

            let file_appender = rolling::daily(dir, LOG_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false) // No ANSI codes in log files
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Logging was already initialized")?;

    tracing::debug!(
        "Logging initialized: verbose={}, file={}",
        verbose,
        log_dir.map(Utf8Path::as_str).unwrap_or("none")
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    #[allow(unused_variables)]
    fn test_setup_logging_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::try_from(temp_dir.path().join("logs")).unwrap();

        // Only one subscriber per process; the result may be an error if another
        // test got there first, but the directory is created before that point
        let result = setup_logging(false, Some(&log_dir));

        assert!(log_dir.exists());
    }
}
