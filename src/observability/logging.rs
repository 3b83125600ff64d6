use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "flight_delay_etl=info,sqlx=warn";
const LOG_FILE_NAME: &str = "flight_etl.log";

/// Initializes logging to stderr and, when `log_dir` is given, to a daily
/// rotated JSON file in that directory.
///
/// The returned guard flushes the file writer when dropped, so the caller has
/// to hold it until the process exits. Stdout is left free for command output.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (file_layer, guard) = match log_dir {
        Some(dir) => match fs::create_dir_all(dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
                let (writer, guard) = tracing_appender::non_blocking(file_appender);
                (Some(fmt::layer().json().with_writer(writer)), Some(guard))
            }
            Err(e) => {
                eprintln!("cannot create log directory {}: {e}", dir.display());
                (None, None)
            }
        },
        None => (None, None),
    };

    let console_layer = fmt::layer().with_writer(std::io::stderr);

    // A subscriber may already be installed (tests, embedding); keep it.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}
