use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Recurrence unit for repeating reminders.
///
/// Advancement is calendar-aware: months and years clamp to the last valid
/// day of the target month (Jan 31 + 1 month = Feb 28/29).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatInterval {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Default for RepeatInterval {
    fn default() -> Self {
        Self::Daily
    }
}

impl RepeatInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// One recurrence step forward from `from`. `None` only on date overflow.
    pub fn advance(self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Daily => from.checked_add_days(Days::new(1)),
            Self::Weekly => from.checked_add_days(Days::new(7)),
            Self::Monthly => from.checked_add_months(Months::new(1)),
            Self::Yearly => from.checked_add_months(Months::new(12)),
        }
    }
}

/// A scheduled reminder document.
///
/// Field names mirror the stored document shape; every field defaults so
/// documents written by older app versions still decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub reminder_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub repeat_interval: RepeatInterval,
    #[serde(default)]
    pub notification_shown: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Standard,
    Medium,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Standard
    }
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(rename = "type", default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline_date: Option<DateTime<Utc>>,
}

/// Note metadata document. The block content lives in a separate document
/// addressed by `content_ref`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMeta {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub note_type: String,
    #[serde(default)]
    pub content_ref: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_edited_at: Option<DateTime<Utc>>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// One editor block. Unknown block types and extra keys pass through
/// untouched so newer editor payloads survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockList {
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Body of the standalone content document referenced by a note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteContentDoc {
    #[serde(default)]
    pub content: BlockList,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeColor {
    Light,
    Dark,
}

impl Default for ThemeColor {
    fn default() -> Self {
        Self::Dark
    }
}

impl ThemeColor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Background {
    Solid,
    Noise,
    Gradient,
}

impl Default for Background {
    fn default() -> Self {
        Self::Solid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserGroup {
    Admin,
    Moderator,
    User,
}

impl Default for UserGroup {
    fn default() -> Self {
        Self::User
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// Sentinel note type assigned to new notes; always present in the
/// user's type list and never removable.
pub const DEFAULT_NOTE_TYPE: &str = "unsorted";

fn default_note_types() -> Vec<String> {
    [DEFAULT_NOTE_TYPE, "note", "task", "code", "document"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Per-user settings document, created lazily with these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub theme_color: ThemeColor,
    #[serde(default)]
    pub background: Background,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub hide_note_text: bool,
    #[serde(default)]
    pub group: UserGroup,
    /// Categories the user can assign to notes.
    #[serde(default = "default_note_types")]
    pub note_types: Vec<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            theme_color: ThemeColor::default(),
            background: Background::default(),
            language: default_language(),
            hide_note_text: false,
            group: UserGroup::default(),
            note_types: default_note_types(),
        }
    }
}

/// Partial settings update; only present keys are transmitted to the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<ThemeColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide_note_text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<UserGroup>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.theme_color.is_none()
            && self.background.is_none()
            && self.language.is_none()
            && self.hide_note_text.is_none()
            && self.group.is_none()
    }
}
