//! Structured logging setup, generalized from the teacher's
//! `server_speak.rs::setup_logging`: a console layer plus an optional
//! daily-rotating JSON file layer, driven by [`LoggingConfig`] instead of
//! bare `env::var` calls.

use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::process_info::ProcessInfo;

/// Logging knobs, normally populated from [`crate::config::ServerConfig`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `RUST_LOG`-style filter string, e.g. `"info"` or `"pode_core=debug"`.
    pub level: String,
    /// Directory rotated log files are written to. `None` disables file
    /// logging entirely (console-only).
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Guard returned by [`init_logging`]; must be kept alive for the lifetime
/// of the process or the non-blocking file writer stops flushing.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global `tracing` subscriber. Safe to call once per process;
/// a second call returns an error which the caller may ignore in tests.
pub fn init_logging(cfg: &LoggingConfig, process: &ProcessInfo) -> io::Result<LoggingGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.level.clone()));

    let console_layer = fmt::layer().with_target(true).with_ansi(true);

    let (file_layer, file_guard) = match &cfg.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = rolling::daily(dir, &process.basename);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(non_blocking).json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(console_layer);

    // `file_layer` is an `Option`, which itself implements `Layer` so this
    // composes cleanly whether or not file logging is enabled.
    let _ = registry.with(file_layer).try_init();

    tracing::info!(pid = process.pid, host = %process.hostname, "logging initialized");

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
