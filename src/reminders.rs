use crate::auth::AuthState;
use crate::config::{DEFAULT_REMINDER_OFFSET_HOURS, DUE_WINDOW_SECS};
use crate::errors::AppResult;
use crate::models::{Reminder, RepeatInterval};
use crate::notify::{Notification, Notifier};
use crate::store::{decode_documents, CollectionPath, DocumentStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

const REMINDERS_ROOT: &str = "reminders";
const REMINDERS_SEGMENT: &str = "userReminders";
const DUE_CHANNEL_CAPACITY: usize = 32;

/// The scheduled instant a reminder is currently pointing at. For one-shot
/// reminders this is the stored date. For repeating reminders the stored
/// date may lie far in the past (the app was closed across several cycles),
/// so it is rolled forward one interval at a time until the next occurrence
/// lands in the future; the occurrence at or before `now` is the one that
/// counts.
pub fn effective_check_time(reminder: &Reminder, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let stored = reminder.reminder_date?;
    if !reminder.repeat {
        return Some(stored);
    }
    let mut check = stored;
    while check < now {
        let Some(next) = reminder.repeat_interval.advance(check) else {
            break;
        };
        if next > now {
            break;
        }
        check = next;
    }
    Some(check)
}

/// How a fired reminder must be rewritten.
#[derive(Debug, Clone, PartialEq)]
pub enum FiringPatch {
    /// One-shot reminder: mark it finished so it never fires again.
    Complete,
    /// Repeating reminder: move the schedule one interval past the
    /// occurrence that fired and re-arm the notification.
    Advance { next_date: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct Firing {
    pub reminder_id: String,
    pub notification: Notification,
    pub patch: FiringPatch,
}

impl FiringPatch {
    fn to_json(&self) -> Value {
        match self {
            FiringPatch::Complete => json!({
                "completed": true,
                "notificationShown": true,
            }),
            FiringPatch::Advance { next_date } => json!({
                "reminderDate": next_date,
                "notificationShown": false,
            }),
        }
    }
}

/// Pure due check over a snapshot of reminders. A reminder fires when its
/// effective check time sits inside `[now - window, now]`, both ends
/// inclusive. Anything older than the window is stale and stays silent
/// until the user edits it; anything newer is simply not due yet.
pub fn evaluate_due(
    reminders: &[Reminder],
    now: DateTime<Utc>,
    window: ChronoDuration,
) -> Vec<Firing> {
    let mut firings = Vec::new();
    for reminder in reminders {
        if reminder.completed || reminder.notification_shown {
            continue;
        }
        let Some(check) = effective_check_time(reminder, now) else {
            continue;
        };
        if check > now || check < now - window {
            continue;
        }
        let patch = if reminder.repeat {
            match reminder.repeat_interval.advance(check) {
                Some(next_date) => FiringPatch::Advance { next_date },
                // Unrepresentable next occurrence; leave the reminder alone.
                None => continue,
            }
        } else {
            FiringPatch::Complete
        };
        firings.push(Firing {
            reminder_id: reminder.id.clone(),
            notification: Notification {
                title: reminder.title.clone(),
                body: check.format("%Y-%m-%d %H:%M").to_string(),
                sound: true,
                action: Some("/reminders".to_string()),
            },
            patch,
        });
    }
    firings
}

/// A firing announced to in-process listeners, mirroring what was sent to
/// the notifier.
#[derive(Debug, Clone)]
pub struct DueReminder {
    pub reminder_id: String,
    pub title: String,
    pub fired_at: DateTime<Utc>,
}

/// Fields a caller may change on an existing reminder. `None` leaves the
/// stored value untouched; `reminder_date` uses a double Option so the date
/// can be cleared explicitly.
#[derive(Debug, Default, Clone)]
pub struct ReminderEdit {
    pub title: Option<String>,
    pub text: Option<String>,
    pub reminder_date: Option<Option<DateTime<Utc>>>,
    pub repeat: Option<bool>,
    pub repeat_interval: Option<RepeatInterval>,
}

pub struct ReminderService {
    store: Arc<dyn DocumentStore>,
    auth: AuthState,
    notifier: Arc<dyn Notifier>,
    due_tx: broadcast::Sender<DueReminder>,
}

impl ReminderService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: AuthState,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (due_tx, _) = broadcast::channel(DUE_CHANNEL_CAPACITY);
        Self {
            store,
            auth,
            notifier,
            due_tx,
        }
    }

    pub fn collection(user_id: &str) -> CollectionPath {
        CollectionPath::user_scoped(REMINDERS_ROOT, user_id, REMINDERS_SEGMENT)
    }

    /// Create a reminder scheduled a few hours out. Returns `None` without
    /// touching the store when signed out or when the title is blank.
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
            "reminderDate": now + ChronoDuration::hours(DEFAULT_REMINDER_OFFSET_HOURS),
            "repeat": false,
            "repeatInterval": RepeatInterval::Daily.as_str(),
            "notificationShown": false,
            "createdAt": now,
        });
        let id = self.store.create(&Self::collection(&user), body)?;
        Ok(Some(id))
    }

    /// All reminders for the signed-in user, soonest first; undated ones
    /// sort last.
    pub fn list(&self) -> AppResult<Vec<Reminder>> {
        let Some(user) = self.auth.current_user() else {
            return Ok(Vec::new());
        };
        let docs = self.store.list(&Self::collection(&user))?;
        let mut reminders: Vec<Reminder> = decode_documents(&docs);
        reminders.sort_by_key(|r| match r.reminder_date {
            Some(date) => (0, date),
            None => (1, DateTime::<Utc>::MAX_UTC),
        });
        Ok(reminders)
    }

    pub fn toggle_completed(&self, id: &str, completed: bool) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        self.store
            .update(&Self::collection(&user), id, json!({"completed": completed}))
    }

    /// Apply an edit. Any change re-arms the notification so a rescheduled
    /// reminder can fire again.
    pub fn edit(&self, id: &str, edit: ReminderEdit) -> AppResult<()> {
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
        if let Some(date) = edit.reminder_date {
            patch.insert("reminderDate".into(), json!(date));
        }
        if let Some(repeat) = edit.repeat {
            patch.insert("repeat".into(), json!(repeat));
        }
        if let Some(interval) = edit.repeat_interval {
            patch.insert("repeatInterval".into(), json!(interval.as_str()));
        }
        if patch.is_empty() {
            return Ok(());
        }
        patch.insert("notificationShown".into(), json!(false));
        self.store
            .update(&Self::collection(&user), id, Value::Object(patch))
    }

    pub fn delete(&self, id: &str) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        self.store.delete(&Self::collection(&user), id)
    }

    pub fn subscribe_due(&self) -> broadcast::Receiver<DueReminder> {
        self.due_tx.subscribe()
    }

    /// One evaluation tick: fetch a fresh snapshot, fire what is due,
    /// persist the rewrites. Returns how many reminders fired. A failed
    /// notification or persist is logged and skipped; the stored flags stay
    /// unchanged so the next tick retries.
    pub fn evaluate_once(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let Some(user) = self.auth.current_user() else {
            return Ok(0);
        };
        let collection = Self::collection(&user);
        let docs = self.store.list(&collection)?;
        let reminders: Vec<Reminder> = decode_documents(&docs);
        let firings = evaluate_due(&reminders, now, ChronoDuration::seconds(DUE_WINDOW_SECS));
        let mut fired = 0;
        for firing in firings {
            if let Err(error) = self.notifier.notify(&firing.notification) {
                tracing::warn!(
                    reminder_id = %firing.reminder_id,
                    error = %error,
                    "notification delivery failed"
                );
                continue;
            }
            if let Err(error) =
                self.store
                    .update(&collection, &firing.reminder_id, firing.patch.to_json())
            {
                tracing::warn!(
                    reminder_id = %firing.reminder_id,
                    error = %error,
                    "failed to persist fired reminder"
                );
                continue;
            }
            let _ = self.due_tx.send(DueReminder {
                reminder_id: firing.reminder_id,
                title: firing.notification.title,
                fired_at: now,
            });
            fired += 1;
        }
        Ok(fired)
    }

    /// Background evaluation loop. Ticks immediately on start, then every
    /// `period`, until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(error) = self.evaluate_once(Utc::now()) {
                        tracing::error!(error = %error, "reminder evaluation failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!("reminder evaluator stopping");
                        return;
                    }
                }
            }
        }
    }
}
