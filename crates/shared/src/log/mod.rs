// Logging module
// Console and rolling-file logging on top of the tracing crate.
//
// Every crate in the workspace logs through the `tracing` macros. The tools
// call `initialize_logging` once at startup; library code never installs a
// subscriber on its own.

use std::path::Path;

use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Map a numeric console log level (0..=4) to a filter directive.
///
/// 0 = errors only, 1 = warnings, 2 = info (default), 3 = debug, 4 = trace.
pub fn map_log_level(level: i32) -> &'static str {
    match level {
        i32::MIN..=0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence over `log_level`. When `log_dir` is given a
/// daily rolling file named `file_name` (default `navgen.log`) is written
/// alongside the console output.
pub fn initialize_logging(log_dir: Option<&str>, log_level: &str, file_name: Option<&str>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console = fmt::layer()
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false);

    let Some(dir) = log_dir else {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .try_init();
        return;
    };

    let path = Path::new(dir);
    if !path.exists() {
        let _ = std::fs::create_dir_all(path);
    }

    let file_appender = rolling::daily(dir, file_name.unwrap_or("navgen.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The guard flushes the file on drop; it has to live for the whole process.
    std::mem::forget(guard);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_log_level() {
        assert_eq!(map_log_level(-3), "error");
        assert_eq!(map_log_level(0), "error");
        assert_eq!(map_log_level(2), "info");
        assert_eq!(map_log_level(3), "debug");
        assert_eq!(map_log_level(9), "trace");
    }
}
