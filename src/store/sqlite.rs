use super::{merge_json, CollectionPath, DocChange, Document, DocumentStore, StoreEvent};
use crate::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");
const CHANNEL_CAPACITY: usize = 64;

/// Local document-store adapter backed by a single sqlite file. Documents
/// are opaque JSON bodies keyed by (collection path, document id); change
/// subscribers get one broadcast channel per collection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    channels: Mutex<HashMap<String, broadcast::Sender<StoreEvent>>>,
}

impl SqliteStore {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            channels: Mutex::new(HashMap::new()),
        })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            channels: Mutex::new(HashMap::new()),
        })
    }

    fn lock_conn(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("store mutex poisoned".to_string()))
    }

    fn publish(&self, path: &CollectionPath, doc_id: &str, change: DocChange) {
        let channels = match self.channels.lock() {
            Ok(channels) => channels,
            Err(_) => return,
        };
        if let Some(sender) = channels.get(path.as_str()) {
            // Nobody listening is fine.
            let _ = sender.send(StoreEvent {
                collection: path.as_str().to_string(),
                doc_id: doc_id.to_string(),
                change,
            });
        }
    }

    fn write_document(&self, path: &CollectionPath, id: &str, body: &Value) -> AppResult<bool> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock_conn()?;
        let existed: bool = conn
            .query_row(
                "SELECT 1 FROM documents WHERE collection = ?1 AND id = ?2",
                params![path.as_str(), id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        conn.execute(
            "INSERT INTO documents (collection, id, body_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(collection, id)
             DO UPDATE SET body_json = excluded.body_json, updated_at = excluded.updated_at",
            params![path.as_str(), id, serde_json::to_string(body)?, now],
        )?;
        Ok(existed)
    }
}

impl DocumentStore for SqliteStore {
    fn create(&self, path: &CollectionPath, body: Value) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        self.write_document(path, &id, &body)?;
        self.publish(path, &id, DocChange::Created(body));
        Ok(id)
    }

    fn set(&self, path: &CollectionPath, id: &str, body: Value) -> AppResult<()> {
        let existed = self.write_document(path, id, &body)?;
        let change = if existed {
            DocChange::Updated(body)
        } else {
            DocChange::Created(body)
        };
        self.publish(path, id, change);
        Ok(())
    }

    fn get(&self, path: &CollectionPath, id: &str) -> AppResult<Option<Document>> {
        let conn = self.lock_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT body_json FROM documents WHERE collection = ?1 AND id = ?2",
                params![path.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(Document {
                id: id.to_string(),
                body: serde_json::from_str(&raw)?,
            })),
            None => Ok(None),
        }
    }

    fn list(&self, path: &CollectionPath) -> AppResult<Vec<Document>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, body_json FROM documents WHERE collection = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([path.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut documents = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            documents.push(Document {
                id,
                body: serde_json::from_str(&raw)?,
            });
        }
        Ok(documents)
    }

    fn update(&self, path: &CollectionPath, id: &str, patch: Value) -> AppResult<()> {
        let merged = {
            let conn = self.lock_conn()?;
            let raw: Option<String> = conn
                .query_row(
                    "SELECT body_json FROM documents WHERE collection = ?1 AND id = ?2",
                    params![path.as_str(), id],
                    |row| row.get(0),
                )
                .optional()?;
            let raw = raw.ok_or_else(|| {
                AppError::NotFound(format!("document {id} in {}", path.as_str()))
            })?;
            let mut body: Value = serde_json::from_str(&raw)?;
            merge_json(&mut body, patch);
            conn.execute(
                "UPDATE documents SET body_json = ?1, updated_at = ?2
                 WHERE collection = ?3 AND id = ?4",
                params![
                    serde_json::to_string(&body)?,
                    Utc::now().to_rfc3339(),
                    path.as_str(),
                    id
                ],
            )?;
            body
        };
        self.publish(path, id, DocChange::Updated(merged));
        Ok(())
    }

    fn delete(&self, path: &CollectionPath, id: &str) -> AppResult<()> {
        let deleted = {
            let conn = self.lock_conn()?;
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![path.as_str(), id],
            )?
        };
        if deleted > 0 {
            self.publish(path, id, DocChange::Deleted);
        }
        Ok(())
    }

    fn subscribe(&self, path: &CollectionPath) -> broadcast::Receiver<StoreEvent> {
        let mut channels = match self.channels.lock() {
            Ok(channels) => channels,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(path.as_str().to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn reminders() -> CollectionPath {
        CollectionPath::user_scoped("reminders", "u-1", "userReminders")
    }

    #[test]
    fn create_then_get_round_trips_the_body() {
        let store = store();
        let id = store
            .create(&reminders(), json!({"title": "a", "completed": false}))
            .unwrap();
        let doc = store.get(&reminders(), &id).unwrap().unwrap();
        assert_eq!(doc.body["title"], "a");
        assert_eq!(doc.body["completed"], false);
    }

    #[test]
    fn partial_update_preserves_untouched_keys() {
        let store = store();
        let id = store
            .create(&reminders(), json!({"title": "a", "notificationShown": false}))
            .unwrap();
        store
            .update(&reminders(), &id, json!({"notificationShown": true}))
            .unwrap();
        let doc = store.get(&reminders(), &id).unwrap().unwrap();
        assert_eq!(doc.body["title"], "a");
        assert_eq!(doc.body["notificationShown"], true);
    }

    #[test]
    fn update_of_missing_document_is_not_found() {
        let store = store();
        let err = store
            .update(&reminders(), "nope", json!({"completed": true}))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn delete_is_idempotent_and_removes_the_document() {
        let store = store();
        let id = store.create(&reminders(), json!({"title": "a"})).unwrap();
        store.delete(&reminders(), &id).unwrap();
        assert!(store.get(&reminders(), &id).unwrap().is_none());
        store.delete(&reminders(), &id).unwrap();
    }

    #[test]
    fn collections_are_isolated_per_user() {
        let store = store();
        let other = CollectionPath::user_scoped("reminders", "u-2", "userReminders");
        store.create(&reminders(), json!({"title": "mine"})).unwrap();
        assert_eq!(store.list(&reminders()).unwrap().len(), 1);
        assert!(store.list(&other).unwrap().is_empty());
    }

    #[test]
    fn subscribers_see_create_update_delete() {
        let store = store();
        let mut rx = store.subscribe(&reminders());
        let id = store.create(&reminders(), json!({"title": "a"})).unwrap();
        store.update(&reminders(), &id, json!({"title": "b"})).unwrap();
        store.delete(&reminders(), &id).unwrap();

        let created = rx.try_recv().unwrap();
        assert!(matches!(created.change, DocChange::Created(_)));
        assert_eq!(created.doc_id, id);
        let updated = rx.try_recv().unwrap();
        match updated.change {
            DocChange::Updated(body) => assert_eq!(body["title"], "b"),
            other => panic!("expected update, got {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap().change, DocChange::Deleted));
    }
}
