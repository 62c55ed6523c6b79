//! Offline replay (§4.9). Each queued item is applied in its own
//! transaction so one bad item can't roll back the rest of the batch; a
//! `tempId -> serverId` map lets later items in the same batch reference
//! entities created earlier in it. Outcomes are also persisted to
//! `sync_log`, keyed by `(user_id, client_id)`, so replaying an identical
//! batch a second time (a client that never saw the first response) returns
//! the original outcome instead of applying the operation twice.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::Db;
use crate::errors::AppError;
use crate::folders::FolderService;
use crate::models::{
    CreateFolderRequest, CreateNoteRequest, CreateTaskRequest, SyncEntityType, SyncOperation, SyncOutcome,
    SyncOutcomeStatus, SyncQueueItem, UpdateFolderRequest, UpdateNoteRequest, UpdateTaskRequest,
};
use crate::notes::NoteService;
use crate::tasks::TaskService;

pub struct SyncReplayService {
    db: Arc<Db>,
    notes: Arc<NoteService>,
    tasks: Arc<TaskService>,
    folders: Arc<FolderService>,
}

impl SyncReplayService {
    pub fn new(db: Arc<Db>) -> Self {
        SyncReplayService {
            db: db.clone(),
            notes: Arc::new(NoteService::new(db.clone())),
            tasks: Arc::new(TaskService::new(db.clone())),
            folders: Arc::new(FolderService::new(db)),
        }
    }

    pub fn replay(&self, user_id: &str, items: &[SyncQueueItem]) -> Vec<SyncOutcome> {
        let mut temp_id_map: HashMap<String, String> = HashMap::new();
        items.iter().map(|item| self.replay_one(user_id, item, &mut temp_id_map)).collect()
    }

    fn replay_one(&self, user_id: &str, item: &SyncQueueItem, temp_id_map: &mut HashMap<String, String>) -> SyncOutcome {
        if let Some(logged) = self.logged_outcome(user_id, &item.client_id) {
            if let Applied::Created(server_id) = &logged.1 {
                temp_id_map.insert(item.client_id.clone(), server_id.clone());
            }
            return logged.0;
        }

        let result = self.apply(user_id, item, temp_id_map);
        let outcome = match &result {
            Ok(Applied::Created(server_id)) => {
                temp_id_map.insert(item.client_id.clone(), server_id.clone());
                SyncOutcome { client_id: item.client_id.clone(), status: SyncOutcomeStatus::Ok, code: None, server_id: Some(server_id.clone()), no_op: false }
            }
            Ok(Applied::Updated) => {
                SyncOutcome { client_id: item.client_id.clone(), status: SyncOutcomeStatus::Ok, code: None, server_id: item.entity_id.clone(), no_op: false }
            }
            Ok(Applied::NoOp) => {
                SyncOutcome { client_id: item.client_id.clone(), status: SyncOutcomeStatus::Ok, code: None, server_id: item.entity_id.clone(), no_op: true }
            }
            Err(e) => SyncOutcome {
                client_id: item.client_id.clone(),
                status: if matches!(e, AppError::Conflict { .. }) { SyncOutcomeStatus::Conflict } else { SyncOutcomeStatus::Error },
                code: Some(e.code().to_string()),
                server_id: None,
                no_op: false,
            },
        };
        self.log_outcome(user_id, &outcome);
        outcome
    }

    /// Looks up a previously recorded outcome for this `(user_id, client_id)`
    /// pair. Only `Ok` outcomes are replayed from the log — a prior error is
    /// not cached, since a retried batch should get a fresh attempt at it.
    fn logged_outcome(&self, user_id: &str, client_id: &str) -> Option<(SyncOutcome, Applied)> {
        let conn = self.db.conn.lock().unwrap();
        let row: Option<(String, Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT status, code, server_id FROM sync_log WHERE user_id = ?1 AND client_id = ?2",
                params![user_id, client_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .ok()?;
        let (status, code, server_id) = row?;
        if status != "ok" {
            return None;
        }
        let applied = match &server_id {
            Some(id) => Applied::Created(id.clone()),
            None => Applied::Updated,
        };
        Some((
            SyncOutcome { client_id: client_id.to_string(), status: SyncOutcomeStatus::Ok, code, server_id, no_op: true },
            applied,
        ))
    }

    fn log_outcome(&self, user_id: &str, outcome: &SyncOutcome) {
        let status = match outcome.status {
            SyncOutcomeStatus::Ok => "ok",
            SyncOutcomeStatus::Conflict => "conflict",
            SyncOutcomeStatus::Error => "error",
        };
        let conn = self.db.conn.lock().unwrap();
        let _ = conn.execute(
            "INSERT INTO sync_log (user_id, client_id, status, code, server_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, client_id) DO UPDATE SET status = excluded.status, code = excluded.code, server_id = excluded.server_id",
            params![user_id, &outcome.client_id, status, &outcome.code, &outcome.server_id, Utc::now().to_rfc3339()],
        );
    }

    fn apply(&self, user_id: &str, item: &SyncQueueItem, temp_id_map: &HashMap<String, String>) -> Result<Applied, AppError> {
        let resolved_entity_id = item
            .entity_id
            .as_ref()
            .map(|id| temp_id_map.get(id).cloned().unwrap_or_else(|| id.clone()));

        match (&item.entity_type, &item.operation) {
            (SyncEntityType::Note, SyncOperation::Create) => {
                let req: CreateNoteRequest = serde_json::from_value(item.data.clone()).map_err(invalid_payload)?;
                let note = self.notes.create(user_id, &req)?;
                Ok(Applied::Created(note.id))
            }
            (SyncEntityType::Note, SyncOperation::Update) => {
                let id = resolved_entity_id.ok_or_else(missing_entity_id)?;
                let req: UpdateNoteRequest = serde_json::from_value(item.data.clone()).map_err(invalid_payload)?;
                self.notes.update(user_id, false, &id, &req)?;
                Ok(Applied::Updated)
            }
            (SyncEntityType::Note, SyncOperation::Delete) => {
                let id = resolved_entity_id.ok_or_else(missing_entity_id)?;
                match self.notes.delete(user_id, false, &id) {
                    Ok(()) => Ok(Applied::Updated),
                    Err(AppError::NotFound { .. }) => Ok(Applied::NoOp),
                    Err(e) => Err(e),
                }
            }

            (SyncEntityType::Task, SyncOperation::Create) => {
                let req: CreateTaskRequest = serde_json::from_value(item.data.clone()).map_err(invalid_payload)?;
                let task = self.tasks.create(user_id, &req)?;
                Ok(Applied::Created(task.id))
            }
            (SyncEntityType::Task, SyncOperation::Update) => {
                let id = resolved_entity_id.ok_or_else(missing_entity_id)?;
                let req: UpdateTaskRequest = serde_json::from_value(item.data.clone()).map_err(invalid_payload)?;
                self.tasks.update(user_id, false, &id, &req)?;
                Ok(Applied::Updated)
            }
            (SyncEntityType::Task, SyncOperation::Delete) => {
                let id = resolved_entity_id.ok_or_else(missing_entity_id)?;
                match self.tasks.delete(user_id, false, &id) {
                    Ok(()) => Ok(Applied::Updated),
                    Err(AppError::NotFound { .. }) => Ok(Applied::NoOp),
                    Err(e) => Err(e),
                }
            }

            (SyncEntityType::Folder, SyncOperation::Create) => {
                let req: CreateFolderRequest = serde_json::from_value(item.data.clone()).map_err(invalid_payload)?;
                let folder = self.folders.create(user_id, false, &req)?;
                Ok(Applied::Created(folder.id))
            }
            (SyncEntityType::Folder, SyncOperation::Update) => {
                let id = resolved_entity_id.ok_or_else(missing_entity_id)?;
                let req: UpdateFolderRequest = serde_json::from_value(item.data.clone()).map_err(invalid_payload)?;
                self.folders.update(user_id, false, &id, &req)?;
                Ok(Applied::Updated)
            }
            (SyncEntityType::Folder, SyncOperation::Delete) => {
                let id = resolved_entity_id.ok_or_else(missing_entity_id)?;
                match self.folders.delete(user_id, false, &id, false) {
                    Ok(()) => Ok(Applied::Updated),
                    Err(AppError::NotFound { .. }) => Ok(Applied::NoOp),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

enum Applied {
    Created(String),
    Updated,
    NoOp,
}

fn invalid_payload(e: serde_json::Error) -> AppError {
    AppError::validation("data", format!("malformed sync payload: {e}"))
}

fn missing_entity_id() -> AppError {
    AppError::validation("entity_id", "required for update/delete operations")
}
