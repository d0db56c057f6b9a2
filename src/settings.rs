use crate::auth::AuthState;
use crate::errors::{AppError, AppResult};
use crate::models::{SettingsPatch, ThemeColor, UserSettings, DEFAULT_NOTE_TYPE};
use crate::store::{CollectionPath, DocumentStore, StoreEvent};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

const SETTINGS_ROOT: &str = "userSettings";

/// Plain-text cache of the last applied theme so the next launch can paint
/// the right colors before the store answers.
pub struct ThemeCache {
    path: PathBuf,
}

impl ThemeCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn write(&self, theme: ThemeColor) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        fs::write(&self.path, theme.as_str()).map_err(|err| AppError::Io(err.to_string()))
    }

    pub fn read(&self) -> Option<ThemeColor> {
        match fs::read_to_string(&self.path).ok()?.trim() {
            "light" => Some(ThemeColor::Light),
            "dark" => Some(ThemeColor::Dark),
            _ => None,
        }
    }
}

/// Settings live in a shared collection keyed by user id. The document is
/// created lazily with defaults on first read; writes are diffs so
/// concurrent editors never clobber each other's untouched fields.
pub struct SettingsService {
    store: Arc<dyn DocumentStore>,
    auth: AuthState,
    theme_cache: ThemeCache,
}

/// Changed-keys-only delta between two settings snapshots.
pub fn diff(current: &UserSettings, desired: &UserSettings) -> SettingsPatch {
    SettingsPatch {
        first_name: (current.first_name != desired.first_name)
            .then(|| desired.first_name.clone()),
        last_name: (current.last_name != desired.last_name).then(|| desired.last_name.clone()),
        theme_color: (current.theme_color != desired.theme_color).then_some(desired.theme_color),
        background: (current.background != desired.background).then_some(desired.background),
        language: (current.language != desired.language).then(|| desired.language.clone()),
        hide_note_text: (current.hide_note_text != desired.hide_note_text)
            .then_some(desired.hide_note_text),
        group: (current.group != desired.group).then_some(desired.group),
    }
}

impl SettingsService {
    pub fn new(store: Arc<dyn DocumentStore>, auth: AuthState, theme_cache: ThemeCache) -> Self {
        Self {
            store,
            auth,
            theme_cache,
        }
    }

    pub fn collection() -> CollectionPath {
        CollectionPath::top_level(SETTINGS_ROOT)
    }

    /// The signed-in user's settings, creating the document with defaults
    /// if it does not exist yet.
    pub fn load_or_create(&self) -> AppResult<Option<UserSettings>> {
        let Some(user) = self.auth.current_user() else {
            return Ok(None);
        };
        match self.store.get(&Self::collection(), &user)? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => {
                let defaults = UserSettings::default();
                self.store
                    .set(&Self::collection(), &user, serde_json::to_value(&defaults)?)?;
                tracing::info!(user_id = %user, "created default settings");
                Ok(Some(defaults))
            }
        }
    }

    /// Apply a partial update. An empty patch never reaches the store. A
    /// theme change is mirrored into the local cache; a cache write failure
    /// is logged, the stored settings stay authoritative.
    ///
    /// The settings document must already exist; `load_or_create` is the
    /// creation point, and a patch issued before it has ever run fails
    /// with `NotFound`.
    pub fn update(&self, patch: SettingsPatch) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        if patch.is_empty() {
            return Ok(());
        }
        let theme = patch.theme_color;
        self.store
            .update(&Self::collection(), &user, serde_json::to_value(&patch)?)?;
        if let Some(theme) = theme {
            if let Err(error) = self.theme_cache.write(theme) {
                tracing::warn!(error = %error, "failed to cache theme");
            }
        }
        Ok(())
    }

    /// Convenience for callers that hold a full desired snapshot: compute
    /// the delta against `current` and persist only that.
    pub fn apply_changes(
        &self,
        current: &UserSettings,
        desired: &UserSettings,
    ) -> AppResult<()> {
        self.update(diff(current, desired))
    }

    /// The user's note-type list, creating the settings document with the
    /// default list if needed.
    pub fn note_types(&self) -> AppResult<Vec<String>> {
        Ok(self
            .load_or_create()?
            .map(|settings| settings.note_types)
            .unwrap_or_default())
    }

    /// Append a note type to the user's list. Blank and duplicate entries
    /// are ignored.
    pub fn add_note_type(&self, note_type: &str) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        let note_type = note_type.trim();
        if note_type.is_empty() {
            return Ok(());
        }
        let Some(settings) = self.load_or_create()? else {
            return Ok(());
        };
        let mut types = settings.note_types;
        if types.iter().any(|existing| existing == note_type) {
            return Ok(());
        }
        types.push(note_type.to_string());
        self.store
            .update(&Self::collection(), &user, json!({"noteTypes": types}))
    }

    /// Remove a note type from the user's list. The sentinel type new notes
    /// start with cannot be removed.
    pub fn remove_note_type(&self, note_type: &str) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        if note_type == DEFAULT_NOTE_TYPE {
            return Ok(());
        }
        let Some(settings) = self.load_or_create()? else {
            return Ok(());
        };
        let mut types = settings.note_types;
        let before = types.len();
        types.retain(|existing| existing != note_type);
        if types.len() == before {
            return Ok(());
        }
        self.store
            .update(&Self::collection(), &user, json!({"noteTypes": types}))
    }

    pub fn cached_theme(&self) -> Option<ThemeColor> {
        self.theme_cache.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe(&Self::collection())
    }
}
