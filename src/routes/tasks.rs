//! Task CRUD and sharing endpoints (§4.6).

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, State};

use crate::events::{DomainEvent, EventBus};
use crate::models::{CompletedPatch, CreateTaskRequest, ShareEntry, ShareRequest, Task, TaskListQuery, UpdateTaskRequest};
use crate::tasks::TaskService;

use super::{ApiResult, AuthUser, Envelope};

#[post("/tasks", data = "<body>")]
pub fn create_task(body: Json<CreateTaskRequest>, auth: AuthUser, tasks: &State<Arc<TaskService>>, events: &State<Arc<EventBus>>) -> ApiResult<Task> {
    let task = tasks.create(&auth.0.id, &body)?;
    events.publish(DomainEvent::TaskCreated { room_id: format!("task:{}", task.id), user_id: auth.0.id.clone(), task: task.clone() });
    Ok(Envelope::ok(task))
}

#[get("/tasks?<completed>&<folder_id>&<q>")]
pub fn list_tasks(completed: Option<bool>, folder_id: Option<String>, q: Option<String>, auth: AuthUser, tasks: &State<Arc<TaskService>>) -> ApiResult<Vec<Task>> {
    let query = TaskListQuery { completed, folder_id, q };
    Ok(Envelope::ok(tasks.list(&auth.0.id, &query)?))
}

#[get("/tasks/<id>")]
pub fn get_task(id: &str, auth: AuthUser, tasks: &State<Arc<TaskService>>) -> ApiResult<Task> {
    Ok(Envelope::ok(tasks.get(&auth.0.id, auth.0.is_admin, id)?))
}

#[patch("/tasks/<id>", data = "<body>")]
pub fn update_task(id: &str, body: Json<UpdateTaskRequest>, auth: AuthUser, tasks: &State<Arc<TaskService>>, events: &State<Arc<EventBus>>) -> ApiResult<Task> {
    let task = tasks.update(&auth.0.id, auth.0.is_admin, id, &body)?;
    events.publish(DomainEvent::TaskUpdated { room_id: format!("task:{}", task.id), user_id: task.owner_id.clone(), task: task.clone() });
    Ok(Envelope::ok(task))
}

#[patch("/tasks/<id>/completed", data = "<body>")]
pub fn set_task_completed(id: &str, body: Json<CompletedPatch>, auth: AuthUser, tasks: &State<Arc<TaskService>>, events: &State<Arc<EventBus>>) -> ApiResult<Task> {
    let task = tasks.set_completed(&auth.0.id, auth.0.is_admin, id, body.completed)?;
    events.publish(DomainEvent::TaskUpdated { room_id: format!("task:{}", task.id), user_id: task.owner_id.clone(), task: task.clone() });
    Ok(Envelope::ok(task))
}

#[delete("/tasks/<id>")]
pub fn delete_task(id: &str, auth: AuthUser, tasks: &State<Arc<TaskService>>, events: &State<Arc<EventBus>>) -> ApiResult<()> {
    tasks.delete(&auth.0.id, auth.0.is_admin, id)?;
    events.publish(DomainEvent::TaskDeleted { room_id: format!("task:{id}"), user_id: auth.0.id.clone(), task_id: id.to_string() });
    Ok(Envelope::ok(()))
}

#[post("/tasks/<id>/share", data = "<body>")]
pub fn share_task(id: &str, body: Json<ShareRequest>, auth: AuthUser, tasks: &State<Arc<TaskService>>, events: &State<Arc<EventBus>>) -> ApiResult<ShareEntry> {
    let share = tasks.share(&auth.0.id, auth.0.is_admin, id, &body)?;
    let task = tasks.get(&auth.0.id, auth.0.is_admin, id)?;
    events.publish(DomainEvent::TaskShared { shared_with_id: share.shared_with_id.clone(), task });
    Ok(Envelope::ok(share))
}

#[delete("/tasks/<id>/share/<user_id>")]
pub fn unshare_task(id: &str, user_id: &str, auth: AuthUser, tasks: &State<Arc<TaskService>>) -> ApiResult<()> {
    tasks.unshare(&auth.0.id, auth.0.is_admin, id, user_id)?;
    Ok(Envelope::ok(()))
}
