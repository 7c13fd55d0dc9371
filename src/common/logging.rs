//! Logging and tracing configuration
//!
//! Logs go to stderr so they never interleave with the test report on
//! stdout. An optional log file receives the full, uncolored stream.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize tracing for the CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies; `verbose`
/// raises the crate to DEBUG.
///
/// The returned guard must be held for the life of the process when a log
/// file is used, otherwise buffered lines are lost.
pub fn init_cli(verbose: bool, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let default_filter = if verbose {
        "harness=debug,warn"
    } else {
        "harness=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let (file_layer, guard) = match log_file.map(open_log_file) {
        Some(Ok(file)) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer.boxed()), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("Warning: Could not open log file: {}", e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}
