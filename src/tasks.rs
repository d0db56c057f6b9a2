use crate::auth::AuthState;
use crate::errors::AppResult;
use crate::models::{Task, TaskPriority};
use crate::store::{decode_documents, CollectionPath, DocumentStore};
use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

const TASKS_ROOT: &str = "tasks";
const TASKS_SEGMENT: &str = "userTasks";

/// Fields a caller may change on an existing task. Date fields use a
/// double Option so they can be cleared explicitly.
#[derive(Debug, Default, Clone)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub text: Option<String>,
    pub priority: Option<TaskPriority>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub deadline_date: Option<Option<DateTime<Utc>>>,
}

/// Elapsed share of a task's time span as a percentage in `[0, 100]`.
/// Returns `None` when either endpoint is unset. A bare-date deadline
/// (exactly midnight) means "due by end of that day", so it stretches to
/// the last millisecond; a bare-date start stays at the start of its day.
pub fn task_progress(
    start: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<f64> {
    let start = start?;
    let mut deadline = deadline?;
    if is_midnight(deadline) {
        deadline = end_of_day(deadline);
    }
    if now >= deadline {
        return Some(100.0);
    }
    if now <= start {
        return Some(0.0);
    }
    let total = (deadline - start).num_milliseconds();
    if total <= 0 {
        // now is strictly between the endpoints, so this cannot happen
        // unless the deadline precedes the start; saturate.
        return Some(100.0);
    }
    let elapsed = (now - start).num_milliseconds();
    Some((elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
}

fn is_midnight(t: DateTime<Utc>) -> bool {
    t.hour() == 0 && t.minute() == 0 && t.second() == 0 && t.nanosecond() == 0
}

fn end_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(
        &t.date_naive()
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_else(|| t.naive_utc()),
    )
}

pub struct TaskService {
    store: Arc<dyn DocumentStore>,
    auth: AuthState,
}

impl TaskService {
    pub fn new(store: Arc<dyn DocumentStore>, auth: AuthState) -> Self {
        Self { store, auth }
    }

    pub fn collection(user_id: &str) -> CollectionPath {
        CollectionPath::user_scoped(TASKS_ROOT, user_id, TASKS_SEGMENT)
    }

    /// Create a task that starts now with no deadline. Returns `None`
    /// without touching the store when signed out or when the title is
    /// blank.
    pub fn add(&self, title: &str) -> AppResult<Option<String>> {
        let Some(user) = self.auth.current_user() else {
            return Ok(None);
        };
        let title = title.trim();
        if title.is_empty() {
            return Ok(None);
        }
        let now = Utc::now();
        let body = json!({
            "title": title,
            "text": "",
            "completed": false,
            "type": TaskPriority::Standard.as_str(),
            "createdAt": now,
            "startDate": now,
            "deadlineDate": null,
        });
        let id = self.store.create(&Self::collection(&user), body)?;
        Ok(Some(id))
    }

    /// All tasks for the signed-in user, newest first.
    pub fn list(&self) -> AppResult<Vec<Task>> {
        let Some(user) = self.auth.current_user() else {
            return Ok(Vec::new());
        };
        let docs = self.store.list(&Self::collection(&user))?;
        let mut tasks: Vec<Task> = decode_documents(&docs);
        tasks.sort_by_key(|t| std::cmp::Reverse(t.created_at));
        Ok(tasks)
    }

    pub fn toggle_completed(&self, id: &str, completed: bool) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        self.store
            .update(&Self::collection(&user), id, json!({"completed": completed}))
    }

    pub fn edit(&self, id: &str, edit: TaskEdit) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        let mut patch = serde_json::Map::new();
        if let Some(title) = edit.title {
            patch.insert("title".into(), json!(title.trim()));
        }
        if let Some(text) = edit.text {
            patch.insert("text".into(), json!(text));
        }
        if let Some(priority) = edit.priority {
            patch.insert("type".into(), json!(priority.as_str()));
        }
        if let Some(start) = edit.start_date {
            patch.insert("startDate".into(), json!(start));
        }
        if let Some(deadline) = edit.deadline_date {
            patch.insert("deadlineDate".into(), json!(deadline));
        }
        if patch.is_empty() {
            return Ok(());
        }
        self.store
            .update(&Self::collection(&user), id, Value::Object(patch))
    }

    pub fn delete(&self, id: &str) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        self.store.delete(&Self::collection(&user), id)
    }
}
