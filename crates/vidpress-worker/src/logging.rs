//! Tracing bootstrap shared by the worker binary.

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `LOG_FORMAT=json` switches to JSON output; `LOG_FILE=<path>` tees events
/// into an append-only file. The returned guard must stay alive for the
/// process lifetime so buffered file output is flushed.
pub fn init(default_directive: &str) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let (file_writer, guard) = file_writer();

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .with(env_filter)
            .init();
    }

    guard
}

/// Non-blocking appender for `LOG_FILE`, when configured and openable.
fn file_writer() -> (Option<NonBlocking>, Option<WorkerGuard>) {
    let Ok(path) = std::env::var("LOG_FILE") else {
        return (None, None);
    };
    if path.trim().is_empty() {
        return (None, None);
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            (Some(writer), Some(guard))
        }
        Err(e) => {
            eprintln!("Failed to open LOG_FILE {}: {}", path, e);
            (None, None)
        }
    }
}
