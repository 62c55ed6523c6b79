//! Folder tree endpoints (§4.5).

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};

use crate::events::{DomainEvent, EventBus};
use crate::folders::FolderService;
use crate::models::{
    CreateFolderRequest, Folder, FolderPathEntry, MoveEntityRequest, MoveFolderRequest, Note, Task,
    UpdateFolderRequest, UpdateNoteRequest, UpdateTaskRequest,
};
use crate::notes::NoteService;
use crate::tasks::TaskService;

use super::{ApiResult, AuthUser};

#[post("/folders", data = "<body>")]
pub fn create_folder(body: Json<CreateFolderRequest>, auth: AuthUser, folders: &State<Arc<FolderService>>) -> ApiResult<Folder> {
    Ok(super::Envelope::ok(folders.create(&auth.0.id, auth.0.is_admin, &body)?))
}

#[get("/folders")]
pub fn list_folders(auth: AuthUser, folders: &State<Arc<FolderService>>) -> ApiResult<Vec<Folder>> {
    Ok(super::Envelope::ok(folders.list(&auth.0.id)?))
}

#[get("/folders/<id>")]
pub fn get_folder(id: &str, auth: AuthUser, folders: &State<Arc<FolderService>>) -> ApiResult<Folder> {
    Ok(super::Envelope::ok(folders.get(&auth.0.id, auth.0.is_admin, id)?))
}

#[get("/folders/<id>/path")]
pub fn get_folder_path(id: &str, auth: AuthUser, folders: &State<Arc<FolderService>>) -> ApiResult<Vec<FolderPathEntry>> {
    Ok(super::Envelope::ok(folders.path(&auth.0.id, id)?))
}

#[patch("/folders/<id>", data = "<body>")]
pub fn update_folder(id: &str, body: Json<UpdateFolderRequest>, auth: AuthUser, folders: &State<Arc<FolderService>>) -> ApiResult<Folder> {
    Ok(super::Envelope::ok(folders.update(&auth.0.id, auth.0.is_admin, id, &body)?))
}

#[post("/folders/<id>/move", data = "<body>")]
pub fn move_folder(id: &str, body: Json<MoveFolderRequest>, auth: AuthUser, folders: &State<Arc<FolderService>>) -> ApiResult<Folder> {
    Ok(super::Envelope::ok(folders.r#move(&auth.0.id, auth.0.is_admin, id, body.parent_id.as_deref())?))
}

#[delete("/folders/<id>?<recursive>")]
pub fn delete_folder(id: &str, recursive: Option<bool>, auth: AuthUser, folders: &State<Arc<FolderService>>) -> ApiResult<()> {
    folders.delete(&auth.0.id, auth.0.is_admin, id, recursive.unwrap_or(false))?;
    Ok(super::Envelope::ok(()))
}

/// Dedicated move endpoint alongside the general `PATCH /notes/:id` patch —
/// both reassign `folder_id` the same way, this one just names the
/// operation explicitly for clients that model "move to folder" as its own
/// action rather than a partial update.
#[post("/folders/notes/<note_id>/move", data = "<body>")]
pub fn move_note(
    note_id: &str,
    body: Json<MoveEntityRequest>,
    auth: AuthUser,
    notes: &State<Arc<NoteService>>,
    events: &State<Arc<EventBus>>,
) -> ApiResult<Note> {
    let patch = UpdateNoteRequest { folder_id: Some(body.folder_id.clone()), ..Default::default() };
    let note = notes.update(&auth.0.id, auth.0.is_admin, note_id, &patch)?;
    events.publish(DomainEvent::NoteUpdated { room_id: format!("note:{}", note.id), user_id: note.owner_id.clone(), note: note.clone() });
    Ok(super::Envelope::ok(note))
}

#[post("/folders/tasks/<task_id>/move", data = "<body>")]
pub fn move_task(
    task_id: &str,
    body: Json<MoveEntityRequest>,
    auth: AuthUser,
    tasks: &State<Arc<TaskService>>,
    events: &State<Arc<EventBus>>,
) -> ApiResult<Task> {
    let patch = UpdateTaskRequest { folder_id: Some(body.folder_id.clone()), ..Default::default() };
    let task = tasks.update(&auth.0.id, auth.0.is_admin, task_id, &patch)?;
    events.publish(DomainEvent::TaskUpdated { room_id: format!("task:{}", task.id), user_id: task.owner_id.clone(), task: task.clone() });
    Ok(super::Envelope::ok(task))
}
