use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "lingua-progress.log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    /// Daily-rolling file output next to stdout when set.
    pub file_dir: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let file_logs = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let file_dir = file_logs.then(|| {
            PathBuf::from(std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()))
        });

        Self { filter, file_dir }
    }
}

/// Held by `main` for the process lifetime so buffered lines get flushed.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn init_tracing(config: &LoggingConfig) -> LogGuard {
    let env_filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true));

    let Some(dir) = config.file_dir.as_ref() else {
        registry.init();
        return LogGuard { _file: None };
    };

    if let Err(err) = std::fs::create_dir_all(dir) {
        registry.init();
        tracing::warn!(dir = %dir.display(), error = %err, "file logging disabled");
        return LogGuard { _file: None };
    }

    let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    registry
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
        .init();

    LogGuard { _file: Some(guard) }
}
