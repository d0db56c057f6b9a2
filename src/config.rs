use std::path::PathBuf;

/// Fixed period of the reminder evaluator tick.
pub const EVALUATION_PERIOD_SECS: u64 = 10;

/// Trailing window in which an occurrence still counts as due. Occurrences
/// older than this are skipped, not retroactively fired.
pub const DUE_WINDOW_SECS: i64 = 60;

/// Offset applied to the reminder date of a freshly created reminder.
pub const DEFAULT_REMINDER_OFFSET_HOURS: i64 = 3;

/// Redraw period for live task-progress bars. Advisory for hosts: nothing
/// in the core ticks on it, since progress is derived on demand via
/// `tasks::task_progress` and never persisted.
pub const PROGRESS_REDRAW_SECS: u64 = 3;

/// Serialization version stamped on saved block content when absent.
pub const EDITOR_VERSION: &str = "2.26.5";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
}

impl AppConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Platform data directory, falling back to the current directory when
    /// the platform gives us nothing.
    pub fn resolve() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join("daybook"))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("daybook.sqlite")
    }

    pub fn theme_cache_path(&self) -> PathBuf {
        self.data_dir.join("theme")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
