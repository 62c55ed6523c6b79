//! Note CRUD and sharing endpoints (§4.6).

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};

use crate::events::{DomainEvent, EventBus};
use crate::models::{CreateNoteRequest, Note, NoteListQuery, ShareEntry, ShareRequest, UpdateNoteRequest};
use crate::notes::NoteService;

use super::{ApiResult, AuthUser, Envelope};

#[post("/notes", data = "<body>")]
pub fn create_note(body: Json<CreateNoteRequest>, auth: AuthUser, notes: &State<Arc<NoteService>>, events: &State<Arc<EventBus>>) -> ApiResult<Note> {
    let note = notes.create(&auth.0.id, &body)?;
    events.publish(DomainEvent::NoteCreated { room_id: format!("note:{}", note.id), user_id: auth.0.id.clone(), note: note.clone() });
    Ok(Envelope::ok(note))
}

#[get("/notes?<archived>&<favorite>&<pinned>&<folder_id>&<tag>&<q>")]
#[allow(clippy::too_many_arguments)]
pub fn list_notes(
    archived: Option<bool>,
    favorite: Option<bool>,
    pinned: Option<bool>,
    folder_id: Option<String>,
    tag: Option<String>,
    q: Option<String>,
    auth: AuthUser,
    notes: &State<Arc<NoteService>>,
) -> ApiResult<Vec<Note>> {
    let query = NoteListQuery { archived, favorite, pinned, folder_id, tag, q };
    Ok(Envelope::ok(notes.list(&auth.0.id, &query)?))
}

#[get("/notes/<id>")]
pub fn get_note(id: &str, auth: AuthUser, notes: &State<Arc<NoteService>>) -> ApiResult<Note> {
    Ok(Envelope::ok(notes.get(&auth.0.id, auth.0.is_admin, id)?))
}

#[patch("/notes/<id>", data = "<body>")]
pub fn update_note(id: &str, body: Json<UpdateNoteRequest>, auth: AuthUser, notes: &State<Arc<NoteService>>, events: &State<Arc<EventBus>>) -> ApiResult<Note> {
    let note = notes.update(&auth.0.id, auth.0.is_admin, id, &body)?;
    events.publish(DomainEvent::NoteUpdated { room_id: format!("note:{}", note.id), user_id: note.owner_id.clone(), note: note.clone() });
    Ok(Envelope::ok(note))
}

#[delete("/notes/<id>")]
pub fn delete_note(id: &str, auth: AuthUser, notes: &State<Arc<NoteService>>, events: &State<Arc<EventBus>>) -> ApiResult<()> {
    notes.delete(&auth.0.id, auth.0.is_admin, id)?;
    events.publish(DomainEvent::NoteDeleted { room_id: format!("note:{id}"), user_id: auth.0.id.clone(), note_id: id.to_string() });
    Ok(Envelope::ok(()))
}

#[post("/notes/<id>/share", data = "<body>")]
pub fn share_note(id: &str, body: Json<ShareRequest>, auth: AuthUser, notes: &State<Arc<NoteService>>, events: &State<Arc<EventBus>>) -> ApiResult<ShareEntry> {
    let share = notes.share(&auth.0.id, auth.0.is_admin, id, &body)?;
    let note = notes.get(&auth.0.id, auth.0.is_admin, id)?;
    events.publish(DomainEvent::NoteShared { shared_with_id: share.shared_with_id.clone(), note });
    Ok(Envelope::ok(share))
}

#[delete("/notes/<id>/share/<user_id>")]
pub fn unshare_note(id: &str, user_id: &str, auth: AuthUser, notes: &State<Arc<NoteService>>) -> ApiResult<()> {
    notes.unshare(&auth.0.id, auth.0.is_admin, id, user_id)?;
    Ok(Envelope::ok(()))
}
