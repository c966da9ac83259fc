//! Tracing subscriber setup for the binary.
//!
//! Logs go to stdout and, optionally, to a file written by a background
//! thread. The level comes from `RUST_LOG` and defaults to `mail_harvest=info`.

use chrono::Local;
use std::ffi::OsStr;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, format::Writer, time::FormatTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "mail_harvest=info";

const DEFAULT_LOG_FILE: &str = "mail-harvest.log";

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Installs the global subscriber.
///
/// The returned guard must be held until exit so buffered file output is flushed.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(log_file: Option<&Path>) -> Result<Option<WorkerGuard>, TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stdout_layer = fmt::layer()
        .with_timer(LocalTimer)
        .with_target(true)
        .with_writer(std::io::stdout);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

            let layer = fmt::layer()
                .with_timer(LocalTimer)
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
