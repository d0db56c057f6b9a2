use crate::auth::AuthState;
use crate::config::{AppConfig, EVALUATION_PERIOD_SECS};
use crate::errors::{AppError, AppResult};
use crate::models::NoteMeta;
use crate::notes::NoteService;
use crate::notify::Notifier;
use crate::reminders::ReminderService;
use crate::settings::{SettingsService, ThemeCache};
use crate::store::{decode_documents, DocumentStore, SqliteStore};
use crate::tasks::TaskService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How much data a bulk purge removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeSummary {
    pub notes: usize,
    pub note_contents: usize,
    pub tasks: usize,
    pub reminders: usize,
}

/// Handle on the background reminder evaluator. Dropping it does not stop
/// the loop; call `stop` for a clean shutdown.
pub struct EvaluatorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EvaluatorHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Root of the application core: owns the store, the auth state, and the
/// per-domain services. Hosts construct one of these, sign a user in, and
/// start the evaluator.
pub struct AppCore {
    config: AppConfig,
    store: Arc<dyn DocumentStore>,
    auth: AuthState,
    reminders: Arc<ReminderService>,
    notes: Arc<NoteService>,
    tasks: Arc<TaskService>,
    settings: Arc<SettingsService>,
}

impl AppCore {
    pub fn new(config: AppConfig, notifier: Arc<dyn Notifier>) -> AppResult<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(&config.db_path())?);
        Ok(Self::with_store(config, store, notifier))
    }

    /// Build against an injected store. Tests use this with an in-memory
    /// store.
    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let auth = AuthState::new();
        let reminders = Arc::new(ReminderService::new(store.clone(), auth.clone(), notifier));
        let notes = Arc::new(NoteService::new(store.clone(), auth.clone()));
        let tasks = Arc::new(TaskService::new(store.clone(), auth.clone()));
        let settings = Arc::new(SettingsService::new(
            store.clone(),
            auth.clone(),
            ThemeCache::new(config.theme_cache_path()),
        ));
        Self {
            config,
            store,
            auth,
            reminders,
            notes,
            tasks,
            settings,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn reminders(&self) -> &Arc<ReminderService> {
        &self.reminders
    }

    pub fn notes(&self) -> &Arc<NoteService> {
        &self.notes
    }

    pub fn tasks(&self) -> &Arc<TaskService> {
        &self.tasks
    }

    pub fn settings(&self) -> &Arc<SettingsService> {
        &self.settings
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn sign_in(&self, user_id: &str) {
        self.auth.sign_in(user_id);
        tracing::info!(user_id = %user_id, "signed in");
    }

    pub fn sign_out(&self) {
        self.auth.sign_out();
        tracing::info!("signed out");
    }

    /// Spawn the reminder evaluator on the current runtime. The first tick
    /// runs immediately.
    pub fn start_evaluator(&self) -> EvaluatorHandle {
        self.start_evaluator_with_period(Duration::from_secs(EVALUATION_PERIOD_SECS))
    }

    pub fn start_evaluator_with_period(&self, period: Duration) -> EvaluatorHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.reminders.clone().run(period, rx));
        EvaluatorHandle { shutdown, task }
    }

    /// Delete everything the signed-in user owns: notes and their content
    /// documents, tasks, reminders. Every deletion is attempted even when
    /// earlier ones fail; the error, if any, surfaces at the end.
    pub fn purge_user_data(&self) -> AppResult<PurgeSummary> {
        let Some(user) = self.auth.current_user() else {
            return Ok(PurgeSummary::default());
        };
        let mut summary = PurgeSummary::default();
        let mut failures = 0usize;
        let mut attempt = |result: AppResult<()>, counter: &mut usize| match result {
            Ok(()) => *counter += 1,
            Err(error) => {
                failures += 1;
                tracing::warn!(error = %error, "purge deletion failed");
            }
        };

        let notes_path = NoteService::notes_collection(&user);
        let contents_path = NoteService::contents_collection();
        let note_docs = self.store.list(&notes_path)?;
        for meta in decode_documents::<NoteMeta>(&note_docs) {
            if !meta.content_ref.is_empty() {
                attempt(
                    self.store.delete(&contents_path, &meta.content_ref),
                    &mut summary.note_contents,
                );
            }
            attempt(self.store.delete(&notes_path, &meta.id), &mut summary.notes);
        }

        let tasks_path = TaskService::collection(&user);
        for doc in self.store.list(&tasks_path)? {
            attempt(self.store.delete(&tasks_path, &doc.id), &mut summary.tasks);
        }

        let reminders_path = ReminderService::collection(&user);
        for doc in self.store.list(&reminders_path)? {
            attempt(
                self.store.delete(&reminders_path, &doc.id),
                &mut summary.reminders,
            );
        }

        if failures > 0 {
            return Err(AppError::Internal(format!(
                "purge left {failures} documents behind"
            )));
        }
        tracing::info!(
            user_id = %user,
            notes = summary.notes,
            tasks = summary.tasks,
            reminders = summary.reminders,
            "purged user data"
        );
        Ok(summary)
    }
}
