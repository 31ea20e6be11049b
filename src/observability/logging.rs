use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Installs the global subscriber: console output (plain or JSON) plus a
/// daily-rotated JSON file when a log directory is configured. `RUST_LOG`
/// takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = config.directory.as_ref().map(|dir| {
        let _ = fs::create_dir_all(dir);
        let file_appender = tracing_appender::rolling::daily(dir, "collector.log");
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
        // Flushes on drop; the subscriber lives for the whole process.
        std::mem::forget(guard);
        fmt::layer().json().with_writer(non_blocking_writer)
    });

    let (json_console, plain_console) = if config.json {
        (Some(fmt::layer().json().with_writer(std::io::stdout)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stdout)))
    };

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(json_console)
        .with(plain_console)
        .try_init();
}
