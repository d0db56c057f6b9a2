use chrono::{Duration as ChronoDuration, Utc};
use daybook::app::AppCore;
use daybook::config::AppConfig;
use daybook::models::{Block, BlockList, SettingsPatch, TaskPriority, ThemeColor};
use daybook::notify::{Notification, Notifier};
use daybook::reminders::ReminderEdit;
use daybook::store::{DocumentStore, SqliteStore};
use daybook::tasks::TaskEdit;
use daybook::AppResult;
use serde_json::{json, Map};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

struct CaptureNotifier {
    delivered: Mutex<Vec<Notification>>,
}

impl CaptureNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            delivered: Mutex::new(Vec::new()),
        })
    }

    fn titles(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.title.clone())
            .collect()
    }
}

impl Notifier for CaptureNotifier {
    fn notify(&self, notification: &Notification) -> AppResult<()> {
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

fn core_with(dir: &TempDir) -> (AppCore, Arc<CaptureNotifier>) {
    let notifier = CaptureNotifier::new();
    let config = AppConfig::new(dir.path());
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let core = AppCore::with_store(config, store, notifier.clone());
    core.sign_in("itest-user");
    (core, notifier)
}

#[test]
fn due_reminder_fires_once_then_stays_quiet() {
    let dir = TempDir::new().unwrap();
    let (core, notifier) = core_with(&dir);
    let reminders = core.reminders();
    let id = reminders.add("pay rent").unwrap().unwrap();
    let now = Utc::now();
    reminders
        .edit(
            &id,
            ReminderEdit {
                reminder_date: Some(Some(now - ChronoDuration::seconds(5))),
                ..ReminderEdit::default()
            },
        )
        .unwrap();

    assert_eq!(reminders.evaluate_once(now).unwrap(), 1);
    assert_eq!(notifier.titles(), vec!["pay rent".to_string()]);
    let listed = reminders.list().unwrap();
    assert!(listed[0].completed);
    assert!(listed[0].notification_shown);

    // Subsequent ticks see the persisted flags.
    assert_eq!(reminders.evaluate_once(now).unwrap(), 0);
    assert_eq!(reminders.evaluate_once(now + ChronoDuration::seconds(10)).unwrap(), 0);
    assert_eq!(notifier.titles().len(), 1);
}

#[test]
fn repeating_reminder_catches_up_and_advances() {
    let dir = TempDir::new().unwrap();
    let (core, notifier) = core_with(&dir);
    let reminders = core.reminders();
    let id = reminders.add("daily standup").unwrap().unwrap();
    let now = Utc::now();
    // Last fired three days ago; the app was closed since.
    reminders
        .edit(
            &id,
            ReminderEdit {
                reminder_date: Some(Some(now - ChronoDuration::days(3))),
                repeat: Some(true),
                ..ReminderEdit::default()
            },
        )
        .unwrap();

    // The rolled-forward occurrence is exactly now, so it fires once.
    assert_eq!(reminders.evaluate_once(now).unwrap(), 1);
    assert_eq!(notifier.titles().len(), 1);
    let listed = reminders.list().unwrap();
    assert!(!listed[0].completed);
    assert!(!listed[0].notification_shown);
    assert_eq!(listed[0].reminder_date, Some(now + ChronoDuration::days(1)));
}

#[test]
fn stale_one_shot_reminder_never_fires() {
    let dir = TempDir::new().unwrap();
    let (core, notifier) = core_with(&dir);
    let reminders = core.reminders();
    let id = reminders.add("missed it").unwrap().unwrap();
    let now = Utc::now();
    reminders
        .edit(
            &id,
            ReminderEdit {
                reminder_date: Some(Some(now - ChronoDuration::hours(2))),
                ..ReminderEdit::default()
            },
        )
        .unwrap();

    assert_eq!(reminders.evaluate_once(now).unwrap(), 0);
    assert!(notifier.titles().is_empty());
    let listed = reminders.list().unwrap();
    assert!(!listed[0].completed);
    assert!(!listed[0].notification_shown);
}

#[tokio::test]
async fn evaluator_loop_fires_and_stops_cleanly() {
    let dir = TempDir::new().unwrap();
    let (core, notifier) = core_with(&dir);
    let id = core.reminders().add("loop check").unwrap().unwrap();
    core.reminders()
        .edit(
            &id,
            ReminderEdit {
                reminder_date: Some(Some(Utc::now())),
                ..ReminderEdit::default()
            },
        )
        .unwrap();

    let handle = core.start_evaluator_with_period(std::time::Duration::from_millis(20));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    handle.stop().await;

    assert_eq!(notifier.titles(), vec!["loop check".to_string()]);
}

#[test]
fn note_lifecycle_keeps_meta_and_content_in_step() {
    let dir = TempDir::new().unwrap();
    let notifier = CaptureNotifier::new();
    let config = AppConfig::new(dir.path());
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let core = AppCore::with_store(config, store.clone(), notifier);
    core.sign_in("itest-user");
    let notes = core.notes();

    let id = notes.create_note().unwrap().unwrap();
    let (meta, content) = notes.load_note(&id).unwrap().unwrap();
    assert_eq!(meta.title, "New note");
    assert_eq!(meta.note_type, "unsorted");
    assert!(!meta.content_ref.is_empty());
    assert_eq!(content.blocks.len(), 1);
    assert_eq!(content.blocks[0].block_type, "paragraph");

    notes
        .save_content(
            &id,
            BlockList {
                blocks: vec![Block {
                    id: None,
                    block_type: "header".into(),
                    data: json!({"text": "Groceries", "level": 1}),
                    extra: Map::new(),
                }],
                time: None,
                version: None,
            },
        )
        .unwrap();
    notes.rename_note(&id, "Groceries").unwrap();

    let (meta, content) = notes.load_note(&id).unwrap().unwrap();
    assert_eq!(meta.title, "Groceries");
    assert_eq!(content.blocks.len(), 1);
    assert_eq!(content.blocks[0].block_type, "header");
    assert!(content.blocks[0].id.is_some());

    let content_ref = meta.content_ref.clone();
    notes.delete_note(&id).unwrap();
    assert!(notes.load_note(&id).unwrap().is_none());
    // The shared content document went with it.
    let contents = daybook::notes::NoteService::contents_collection();
    assert!(store.get(&contents, &content_ref).unwrap().is_none());
}

#[test]
fn dangling_content_ref_is_repaired_on_load() {
    let dir = TempDir::new().unwrap();
    let notifier = CaptureNotifier::new();
    let config = AppConfig::new(dir.path());
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let core = AppCore::with_store(config, store.clone(), notifier);
    core.sign_in("itest-user");

    let id = core.notes().create_note().unwrap().unwrap();
    let (meta, _) = core.notes().load_note(&id).unwrap().unwrap();
    // Simulate a crash that removed the content but left the meta entry.
    store
        .delete(
            &daybook::notes::NoteService::contents_collection(),
            &meta.content_ref,
        )
        .unwrap();

    let (repaired, content) = core.notes().load_note(&id).unwrap().unwrap();
    assert_ne!(repaired.content_ref, meta.content_ref);
    assert!(content.blocks.is_empty());
    // The repaired ref resolves on the next load.
    let (again, _) = core.notes().load_note(&id).unwrap().unwrap();
    assert_eq!(again.content_ref, repaired.content_ref);
}

#[test]
fn task_edits_and_priorities_persist() {
    let dir = TempDir::new().unwrap();
    let (core, _notifier) = core_with(&dir);
    let tasks = core.tasks();
    let id = tasks.add("write report").unwrap().unwrap();
    let deadline = Utc::now() + ChronoDuration::days(2);
    tasks
        .edit(
            &id,
            TaskEdit {
                priority: Some(TaskPriority::High),
                deadline_date: Some(Some(deadline)),
                text: Some("quarterly numbers".into()),
                ..TaskEdit::default()
            },
        )
        .unwrap();
    let listed = tasks.list().unwrap();
    assert_eq!(listed[0].priority, TaskPriority::High);
    assert_eq!(listed[0].deadline_date, Some(deadline));
    assert_eq!(listed[0].text, "quarterly numbers");
}

#[test]
fn settings_are_created_lazily_and_patched_partially() {
    let dir = TempDir::new().unwrap();
    let (core, _notifier) = core_with(&dir);
    let settings = core.settings();

    let loaded = settings.load_or_create().unwrap().unwrap();
    assert_eq!(loaded.theme_color, ThemeColor::Dark);
    assert_eq!(loaded.language, "en");

    settings
        .update(SettingsPatch {
            theme_color: Some(ThemeColor::Light),
            ..SettingsPatch::default()
        })
        .unwrap();

    let reloaded = settings.load_or_create().unwrap().unwrap();
    assert_eq!(reloaded.theme_color, ThemeColor::Light);
    assert_eq!(reloaded.language, "en");
    assert_eq!(settings.cached_theme(), Some(ThemeColor::Light));
    assert!(dir.path().join("theme").exists());
}

#[test]
fn note_type_list_survives_edits_and_guards_the_sentinel() {
    let dir = TempDir::new().unwrap();
    let (core, _notifier) = core_with(&dir);
    let settings = core.settings();

    settings.add_note_type("recipe").unwrap();
    settings.remove_note_type("document").unwrap();
    settings.remove_note_type("unsorted").unwrap();

    let types = settings.note_types().unwrap();
    assert!(types.iter().any(|t| t == "recipe"));
    assert!(!types.iter().any(|t| t == "document"));
    assert!(types.iter().any(|t| t == "unsorted"));

    // The list lives in the same settings document as everything else.
    let reloaded = settings.load_or_create().unwrap().unwrap();
    assert_eq!(reloaded.note_types, types);
}

#[test]
fn purge_removes_everything_the_user_owns() {
    let dir = TempDir::new().unwrap();
    let (core, _notifier) = core_with(&dir);
    core.notes().create_note().unwrap();
    core.notes().create_note().unwrap();
    core.tasks().add("t1").unwrap();
    core.reminders().add("r1").unwrap();
    core.reminders().add("r2").unwrap();
    core.reminders().add("r3").unwrap();

    let summary = core.purge_user_data().unwrap();
    assert_eq!(summary.notes, 2);
    assert_eq!(summary.note_contents, 2);
    assert_eq!(summary.tasks, 1);
    assert_eq!(summary.reminders, 3);

    assert!(core.notes().list_notes().unwrap().is_empty());
    assert!(core.tasks().list().unwrap().is_empty());
    assert!(core.reminders().list().unwrap().is_empty());
}

#[test]
fn signed_out_core_is_inert() {
    let dir = TempDir::new().unwrap();
    let (core, notifier) = core_with(&dir);
    core.sign_out();

    assert!(core.reminders().add("x").unwrap().is_none());
    assert!(core.notes().create_note().unwrap().is_none());
    assert!(core.tasks().add("x").unwrap().is_none());
    assert!(core.settings().load_or_create().unwrap().is_none());
    assert_eq!(core.purge_user_data().unwrap(), daybook::PurgeSummary::default());
    assert_eq!(core.reminders().evaluate_once(Utc::now()).unwrap(), 0);
    assert!(notifier.titles().is_empty());
}

#[test]
fn users_do_not_see_each_others_documents() {
    let dir = TempDir::new().unwrap();
    let (core, _notifier) = core_with(&dir);
    core.notes().create_note().unwrap();
    core.tasks().add("mine").unwrap();

    core.sign_in("someone-else");
    assert!(core.notes().list_notes().unwrap().is_empty());
    assert!(core.tasks().list().unwrap().is_empty());

    core.sign_in("itest-user");
    assert_eq!(core.notes().list_notes().unwrap().len(), 1);
    assert_eq!(core.tasks().list().unwrap().len(), 1);
}
