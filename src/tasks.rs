//! Task CRUD and sharing (§4.6). Mirrors `notes.rs` without tags; the
//! title/description substring filter is a plain in-memory scan rather than
//! an FTS5 index, since tasks have no dedicated search surface in this spec.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::authz::{can_share, can_share_with_self, resolve_owned_resource, Access};
use crate::db::Db;
use crate::errors::AppError;
use crate::models::{CreateTaskRequest, Priority, ShareEntry, ShareRequest, Task, TaskListQuery, UpdateTaskRequest};

pub struct TaskService {
    db: Arc<Db>,
}

impl TaskService {
    pub fn new(db: Arc<Db>) -> Self {
        TaskService { db }
    }

    pub fn create(&self, owner_id: &str, req: &CreateTaskRequest) -> Result<Task, AppError> {
        if req.title.trim().is_empty() {
            return Err(AppError::validation("title", "must not be empty"));
        }
        if let Some(folder_id) = &req.folder_id {
            self.require_folder_owned(owner_id, folder_id)?;
        }
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tasks (id, owner_id, folder_id, title, description, priority, due_at, completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)",
            params![&id, owner_id, &req.folder_id, req.title.trim(), &req.description, priority_str(&req.priority), &req.due_at, &now],
        )?;
        drop(conn);
        self.get(owner_id, false, &id)
    }

    pub fn get(&self, caller_id: &str, caller_is_admin: bool, task_id: &str) -> Result<Task, AppError> {
        let (task, access) = self.load_with_access(caller_id, caller_is_admin, task_id)?;
        if !access.can_read() {
            return Err(AppError::not_found("task not found"));
        }
        Ok(task)
    }

    pub fn list(&self, caller_id: &str, query: &TaskListQuery) -> Result<Vec<Task>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let mut sql = String::from(
            "SELECT DISTINCT t.id FROM tasks t
             LEFT JOIN task_shares s ON s.task_id = t.id AND s.shared_with_id = ?1
             WHERE (t.owner_id = ?1 OR s.shared_with_id = ?1)",
        );
        if let Some(completed) = query.completed {
            sql.push_str(if completed { " AND t.completed = 1" } else { " AND t.completed = 0" });
        }
        if query.folder_id.is_some() {
            sql.push_str(" AND t.folder_id = ?2");
        }
        sql.push_str(" ORDER BY t.completed ASC, t.due_at IS NULL, t.due_at ASC, t.created_at DESC");

        let ids: Vec<String> = if let Some(folder_id) = &query.folder_id {
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![caller_id, folder_id], |r| r.get(0))?.collect::<Result<_, _>>()?
        } else {
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![caller_id], |r| r.get(0))?.collect::<Result<_, _>>()?
        };
        drop(conn);

        let mut tasks: Vec<Task> = ids.iter().filter_map(|id| self.load_with_access(caller_id, false, id).ok()).map(|(t, _)| t).collect();
        if let Some(q) = &query.q {
            let needle = q.to_lowercase();
            tasks.retain(|t| t.title.to_lowercase().contains(&needle) || t.description.to_lowercase().contains(&needle));
        }
        Ok(tasks)
    }

    pub fn update(&self, caller_id: &str, caller_is_admin: bool, task_id: &str, req: &UpdateTaskRequest) -> Result<Task, AppError> {
        let (task, access) = self.load_with_access(caller_id, caller_is_admin, task_id)?;
        if !access.can_write() {
            return Err(AppError::forbidden("you do not have edit access to this task"));
        }
        if let Some(Some(folder_id)) = &req.folder_id {
            self.require_folder_owned(&task.owner_id, folder_id)?;
        }
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        if let Some(title) = &req.title {
            if title.trim().is_empty() {
                return Err(AppError::validation("title", "must not be empty"));
            }
            conn.execute("UPDATE tasks SET title = ?1, updated_at = ?2 WHERE id = ?3", params![title.trim(), &now, task_id])?;
        }
        if let Some(description) = &req.description {
            conn.execute("UPDATE tasks SET description = ?1, updated_at = ?2 WHERE id = ?3", params![description, &now, task_id])?;
        }
        if let Some(folder_id) = &req.folder_id {
            conn.execute("UPDATE tasks SET folder_id = ?1, updated_at = ?2 WHERE id = ?3", params![folder_id, &now, task_id])?;
        }
        if let Some(priority) = &req.priority {
            conn.execute("UPDATE tasks SET priority = ?1, updated_at = ?2 WHERE id = ?3", params![priority_str(priority), &now, task_id])?;
        }
        if let Some(due_at) = &req.due_at {
            conn.execute("UPDATE tasks SET due_at = ?1, updated_at = ?2 WHERE id = ?3", params![due_at, &now, task_id])?;
        }
        if let Some(completed) = req.completed {
            conn.execute("UPDATE tasks SET completed = ?1, updated_at = ?2 WHERE id = ?3", params![completed, &now, task_id])?;
        }
        drop(conn);
        self.get(caller_id, caller_is_admin, task_id)
    }

    pub fn set_completed(&self, caller_id: &str, caller_is_admin: bool, task_id: &str, completed: bool) -> Result<Task, AppError> {
        let (_, access) = self.load_with_access(caller_id, caller_is_admin, task_id)?;
        if !access.can_write() {
            return Err(AppError::forbidden("you do not have edit access to this task"));
        }
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        conn.execute("UPDATE tasks SET completed = ?1, updated_at = ?2 WHERE id = ?3", params![completed, &now, task_id])?;
        drop(conn);
        self.get(caller_id, caller_is_admin, task_id)
    }

    pub fn delete(&self, caller_id: &str, caller_is_admin: bool, task_id: &str) -> Result<(), AppError> {
        let (task, _) = self.load_with_access(caller_id, caller_is_admin, task_id)?;
        if task.owner_id != caller_id && !caller_is_admin {
            return Err(AppError::forbidden("only the owner can delete this task"));
        }
        let conn = self.db.conn.lock().unwrap();
        conn.execute("DELETE FROM tasks WHERE id = ?1", [task_id])?;
        Ok(())
    }

    pub fn share(&self, caller_id: &str, caller_is_admin: bool, task_id: &str, req: &ShareRequest) -> Result<ShareEntry, AppError> {
        let owner_id = self.owner_of(task_id)?;
        if !can_share(&owner_id, caller_id, caller_is_admin) {
            return Err(AppError::forbidden("only the owner can share this task"));
        }
        if can_share_with_self(&owner_id, &req.user_id).is_err() {
            return Err(AppError::SelfShare { message: "cannot share a task with yourself".to_string() });
        }
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO task_shares (id, task_id, shared_with_id, can_edit, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(task_id, shared_with_id) DO UPDATE SET can_edit = excluded.can_edit",
            params![&id, task_id, &req.user_id, req.can_edit, &now],
        )?;
        Ok(ShareEntry { id, entity_id: task_id.to_string(), shared_with_id: req.user_id.clone(), can_edit: req.can_edit, created_at: now })
    }

    pub fn unshare(&self, caller_id: &str, caller_is_admin: bool, task_id: &str, target_user_id: &str) -> Result<(), AppError> {
        let owner_id = self.owner_of(task_id)?;
        if !can_share(&owner_id, caller_id, caller_is_admin) {
            return Err(AppError::forbidden("only the owner can manage sharing"));
        }
        let conn = self.db.conn.lock().unwrap();
        conn.execute("DELETE FROM task_shares WHERE task_id = ?1 AND shared_with_id = ?2", params![task_id, target_user_id])?;
        Ok(())
    }

    fn owner_of(&self, task_id: &str) -> Result<String, AppError> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row("SELECT owner_id FROM tasks WHERE id = ?1", [task_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::not_found("task not found"))
    }

    fn require_folder_owned(&self, user_id: &str, folder_id: &str) -> Result<(), AppError> {
        let conn = self.db.conn.lock().unwrap();
        let owner: Option<String> = conn
            .query_row("SELECT user_id FROM folders WHERE id = ?1", [folder_id], |r| r.get(0))
            .optional()?;
        match owner {
            Some(owner_id) if owner_id == user_id => Ok(()),
            Some(_) => Err(AppError::forbidden("not your folder")),
            None => Err(AppError::not_found("folder not found")),
        }
    }

    fn load_with_access(&self, caller_id: &str, caller_is_admin: bool, task_id: &str) -> Result<(Task, Access), AppError> {
        let conn = self.db.conn.lock().unwrap();
        let (owner_id, task) = conn
            .query_row(
                "SELECT owner_id, folder_id, title, description, priority, due_at, completed, created_at, updated_at FROM tasks WHERE id = ?1",
                [task_id],
                |r| {
                    let owner_id: String = r.get(0)?;
                    Ok((
                        owner_id.clone(),
                        Task {
                            id: task_id.to_string(),
                            owner_id,
                            folder_id: r.get(1)?,
                            title: r.get(2)?,
                            description: r.get(3)?,
                            priority: priority_from_str(&r.get::<_, String>(4)?),
                            due_at: r.get(5)?,
                            completed: r.get(6)?,
                            created_at: r.get(7)?,
                            updated_at: r.get(8)?,
                            can_edit: None,
                        },
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("task not found"))?;

        let share_can_edit: Option<bool> = conn
            .query_row(
                "SELECT can_edit FROM task_shares WHERE task_id = ?1 AND shared_with_id = ?2",
                params![task_id, caller_id],
                |r| r.get(0),
            )
            .optional()?;
        let access = resolve_owned_resource(&owner_id, caller_id, caller_is_admin, share_can_edit);
        let mut task = task;
        task.can_edit = if owner_id == caller_id { None } else { Some(access.can_write()) };
        Ok((task, access))
    }
}

fn priority_str(p: &Priority) -> &'static str {
    match p {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
    }
}

fn priority_from_str(s: &str) -> Priority {
    match s {
        "low" => Priority::Low,
        "high" => Priority::High,
        _ => Priority::Medium,
    }
}
