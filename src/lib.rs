pub mod app;
pub mod auth;
pub mod config;
pub mod errors;
pub mod models;
pub mod notes;
pub mod notify;
pub mod reminders;
pub mod settings;
pub mod store;
pub mod tasks;

pub use crate::app::{AppCore, EvaluatorHandle, PurgeSummary};
pub use crate::auth::AuthState;
pub use crate::config::AppConfig;
pub use crate::errors::{AppError, AppResult};
pub use crate::notify::{LogNotifier, Notification, Notifier};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Route the log stream into daily rolling files under the data directory.
/// Call once at startup.
pub fn init_tracing(app_data_dir: &Path) -> Result<(), String> {
    let log_dir = app_data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "daybook.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
