//! Tracing setup for hosts embedding the engine.
//!
//! Logs go to stdout; a daily-rotated file sink is added when the
//! environment asks for one. Installation is idempotent so test binaries
//! and embedding applications can both call [`init`] without coordinating.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer flushing. Hold it for the process
/// lifetime whenever file logging is enabled.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Resolved logging options. `file_dir` of `None` means stdout only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub filter: String,
    pub file_dir: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file_dir: None,
        }
    }
}

impl LogOptions {
    /// Reads `FLUENCY_LOG` (filter directive), `FLUENCY_FILE_LOGS`
    /// (truthy switch), and `FLUENCY_LOG_DIR` (sink directory, default
    /// `./logs`).
    pub fn from_env() -> Self {
        let filter = std::env::var("FLUENCY_LOG").unwrap_or_else(|_| "info".to_string());
        let file_on = std::env::var("FLUENCY_FILE_LOGS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let file_dir = file_on.then(|| {
            std::env::var("FLUENCY_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./logs"))
        });
        Self { filter, file_dir }
    }
}

/// Installs the global subscriber. Returns the file guard when a file sink
/// was installed; a second call leaves the existing subscriber in place and
/// returns `None`.
pub fn init(options: &LogOptions) -> Option<FileLogGuard> {
    let env_filter =
        EnvFilter::try_new(&options.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);

    if let Some(dir) = &options.file_dir {
        match std::fs::create_dir_all(dir) {
            Err(err) => {
                eprintln!("cannot create log directory {}: {err}", dir.display());
            }
            Ok(()) => {
                let appender = RollingFileAppender::new(Rotation::DAILY, dir, "engine.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let file_layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);
                let installed = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(stdout_layer)
                    .with(file_layer)
                    .try_init()
                    .is_ok();
                return installed.then_some(FileLogGuard { _guard: guard });
            }
        }
    }

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_stdout_only() {
        let options = LogOptions::default();
        assert_eq!(options.filter, "info");
        assert!(options.file_dir.is_none());
    }

    #[test]
    fn init_tolerates_repeated_calls() {
        let options = LogOptions::default();
        let first = init(&options);
        let second = init(&options);
        assert!(first.is_none());
        assert!(second.is_none());
        tracing::debug!("logging smoke event");
    }
}
