use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling::daily};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Install the tracing subscriber.
///
/// Compact console output goes to stderr so stdout stays machine-readable.
/// `RUST_LOG` overrides the default level (info, debug in debug builds).
/// With `log_dir` set, JSON events are also appended to a daily-rolling
/// file; keep the returned guard alive until exit so it gets flushed.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let level = if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()))
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter());

    match log_dir {
        Some(dir) => {
            let (writer, guard) = non_blocking(daily(dir, "intake.log"));
            let file_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(env_filter());
            tracing_subscriber::registry()
                .with(console_layer)
                .with(file_layer)
                .init();
            tracing::debug!(dir = %dir.display(), "file logging enabled");
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(console_layer).init();
            None
        }
    }
}
