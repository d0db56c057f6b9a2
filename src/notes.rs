use crate::auth::AuthState;
use crate::config::EDITOR_VERSION;
use crate::errors::AppResult;
use crate::models::{Block, BlockList, NoteContentDoc, NoteMeta, DEFAULT_NOTE_TYPE};
use crate::store::{decode_documents, CollectionPath, DocumentStore};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

const NOTES_ROOT: &str = "notes";
const NOTES_SEGMENT: &str = "userNotes";
const NOTE_CONTENTS: &str = "noteContents";

const DEFAULT_NOTE_TITLE: &str = "New note";
const DEFAULT_NOTE_TEXT: &str = "Start writing your note here...";

/// Notes live in two documents: a lightweight meta entry in the user's
/// collection and a heavyweight content document in a shared collection,
/// linked by `contentRef`. The order of writes keeps the pair consistent:
/// content first on create, content first on delete, never a meta entry
/// pointing nowhere on purpose.
pub struct NoteService {
    store: Arc<dyn DocumentStore>,
    auth: AuthState,
}

fn default_block_list() -> BlockList {
    BlockList {
        blocks: vec![Block {
            id: Some(Uuid::new_v4().to_string()),
            block_type: "paragraph".to_string(),
            data: json!({"text": DEFAULT_NOTE_TEXT}),
            extra: Map::new(),
        }],
        time: Some(Utc::now().timestamp_millis()),
        version: Some(EDITOR_VERSION.to_string()),
    }
}

/// Prepare editor output for storage: give every block an id, drop null
/// values the editor leaves behind, stamp the save time and editor
/// version. Unknown block types pass through untouched so newer editors
/// stay compatible.
pub fn normalize_blocks(mut list: BlockList) -> BlockList {
    for block in &mut list.blocks {
        if block.id.as_deref().map_or(true, str::is_empty) {
            block.id = Some(Uuid::new_v4().to_string());
        }
        if let Value::Object(data) = &mut block.data {
            data.retain(|_, value| !value.is_null());
        }
        block.extra.retain(|_, value| !value.is_null());
    }
    list.time = Some(Utc::now().timestamp_millis());
    list.version = Some(EDITOR_VERSION.to_string());
    list
}

impl NoteService {
    pub fn new(store: Arc<dyn DocumentStore>, auth: AuthState) -> Self {
        Self { store, auth }
    }

    pub fn notes_collection(user_id: &str) -> CollectionPath {
        CollectionPath::user_scoped(NOTES_ROOT, user_id, NOTES_SEGMENT)
    }

    pub fn contents_collection() -> CollectionPath {
        CollectionPath::top_level(NOTE_CONTENTS)
    }

    /// Create a note with placeholder content. The content document is
    /// written first so the meta entry never points at a missing body.
    pub fn create_note(&self) -> AppResult<Option<String>> {
        let Some(user) = self.auth.current_user() else {
            return Ok(None);
        };
        let now = Utc::now();
        let content_id = self.store.create(
            &Self::contents_collection(),
            serde_json::to_value(NoteContentDoc {
                content: default_block_list(),
                created_at: Some(now),
                last_edited_at: Some(now),
            })?,
        )?;
        let meta_id = self.store.create(
            &Self::notes_collection(&user),
            json!({
                "title": DEFAULT_NOTE_TITLE,
                "type": DEFAULT_NOTE_TYPE,
                "contentRef": content_id,
                "createdAt": now,
                "lastEditedAt": now,
            }),
        )?;
        Ok(Some(meta_id))
    }

    /// All note meta entries, most recently edited first.
    pub fn list_notes(&self) -> AppResult<Vec<NoteMeta>> {
        let Some(user) = self.auth.current_user() else {
            return Ok(Vec::new());
        };
        let docs = self.store.list(&Self::notes_collection(&user))?;
        let mut notes: Vec<NoteMeta> = decode_documents(&docs);
        notes.sort_by_key(|n| std::cmp::Reverse(n.last_edited_at));
        Ok(notes)
    }

    /// Load a note and its content. A meta entry whose content document is
    /// gone gets a fresh empty content document on the spot, so the editor
    /// always opens with something to write into.
    pub fn load_note(&self, id: &str) -> AppResult<Option<(NoteMeta, BlockList)>> {
        let Some(user) = self.auth.current_user() else {
            return Ok(None);
        };
        let Some(doc) = self.store.get(&Self::notes_collection(&user), id)? else {
            return Ok(None);
        };
        let mut meta: NoteMeta = doc.decode()?;
        let content = if meta.content_ref.is_empty() {
            None
        } else {
            self.store
                .get(&Self::contents_collection(), &meta.content_ref)?
        };
        let content = match content {
            Some(doc) => doc.decode::<NoteContentDoc>()?.content,
            None => {
                tracing::warn!(note_id = %id, "note content missing, recreating");
                let replacement = self.repair_content(&user, id)?;
                meta.content_ref = replacement;
                BlockList::default()
            }
        };
        Ok(Some((meta, content)))
    }

    fn repair_content(&self, user: &str, note_id: &str) -> AppResult<String> {
        let now = Utc::now();
        let content_id = self.store.create(
            &Self::contents_collection(),
            serde_json::to_value(NoteContentDoc {
                content: BlockList::default(),
                created_at: Some(now),
                last_edited_at: Some(now),
            })?,
        )?;
        self.store.update(
            &Self::notes_collection(user),
            note_id,
            json!({"contentRef": content_id}),
        )?;
        Ok(content_id)
    }

    /// Persist editor output for a note, touching the edit timestamp on
    /// both documents.
    pub fn save_content(&self, id: &str, content: BlockList) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        let Some(doc) = self.store.get(&Self::notes_collection(&user), id)? else {
            return Ok(());
        };
        let meta: NoteMeta = doc.decode()?;
        let content_ref = if meta.content_ref.is_empty()
            || self
                .store
                .get(&Self::contents_collection(), &meta.content_ref)?
                .is_none()
        {
            self.repair_content(&user, id)?
        } else {
            meta.content_ref
        };
        let now = Utc::now();
        let content = normalize_blocks(content);
        self.store.update(
            &Self::contents_collection(),
            &content_ref,
            json!({
                "content": content,
                "lastEditedAt": now,
            }),
        )?;
        self.store.update(
            &Self::notes_collection(&user),
            id,
            json!({"lastEditedAt": now}),
        )
    }

    pub fn rename_note(&self, id: &str, title: &str) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        self.store.update(
            &Self::notes_collection(&user),
            id,
            json!({"title": title.trim(), "lastEditedAt": Utc::now()}),
        )
    }

    pub fn set_note_type(&self, id: &str, note_type: &str) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        self.store.update(
            &Self::notes_collection(&user),
            id,
            json!({"type": note_type, "lastEditedAt": Utc::now()}),
        )
    }

    /// Delete a note and its content. Content goes first; a crash between
    /// the two writes leaves a dangling meta entry, which `load_note`
    /// repairs on the next open.
    pub fn delete_note(&self, id: &str) -> AppResult<()> {
        let Some(user) = self.auth.current_user() else {
            return Ok(());
        };
        let Some(doc) = self.store.get(&Self::notes_collection(&user), id)? else {
            return Ok(());
        };
        let meta: NoteMeta = doc.decode()?;
        if !meta.content_ref.is_empty() {
            self.store
                .delete(&Self::contents_collection(), &meta.content_ref)?;
        }
        self.store.delete(&Self::notes_collection(&user), id)
    }
}
