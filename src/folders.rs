//! Folder tree operations (§4.5). Acyclicity is checked by loading the
//! caller's whole folder set with one flat `SELECT` and walking it in memory
//! rather than issuing a recursive query per move — the tree is always
//! small enough per-user that this is both simpler and cheaper.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::db::Db;
use crate::errors::AppError;
use crate::models::{CreateFolderRequest, Folder, FolderPathEntry, UpdateFolderRequest};

pub struct FolderService {
    db: Arc<Db>,
}

impl FolderService {
    pub fn new(db: Arc<Db>) -> Self {
        FolderService { db }
    }

    pub fn create(&self, user_id: &str, caller_is_admin: bool, req: &CreateFolderRequest) -> Result<Folder, AppError> {
        if req.name.trim().is_empty() {
            return Err(AppError::validation("name", "must not be empty"));
        }
        if let Some(parent_id) = &req.parent_id {
            self.require_owned(user_id, caller_is_admin, parent_id)?;
        }
        self.require_unique_name(user_id, req.name.trim(), req.parent_id.as_deref(), None)?;
        let id = Uuid::new_v4().to_string();
        let conn = self.db.conn.lock().unwrap();
        let position: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM folders WHERE user_id = ?1 AND parent_id IS ?2",
                params![user_id, &req.parent_id],
                |r| r.get(0),
            )
            .unwrap_or(0);
        conn.execute(
            "INSERT INTO folders (id, user_id, parent_id, name, description, icon, color, position, is_expanded)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)",
            params![&id, user_id, &req.parent_id, req.name.trim(), &req.description, &req.icon, &req.color, position],
        )?;
        drop(conn);
        self.get(user_id, caller_is_admin, &id)
    }

    pub fn get(&self, user_id: &str, caller_is_admin: bool, folder_id: &str) -> Result<Folder, AppError> {
        let conn = self.db.conn.lock().unwrap();
        if caller_is_admin {
            return row_with_counts_any_owner(&conn, folder_id)?.ok_or_else(|| AppError::not_found("folder not found"));
        }
        row_with_counts(&conn, user_id, folder_id)?.ok_or_else(|| AppError::not_found("folder not found"))
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<Folder>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id FROM folders WHERE user_id = ?1 ORDER BY parent_id IS NOT NULL, position ASC",
        )?;
        let ids: Vec<String> = stmt.query_map([user_id], |r| r.get(0))?.collect::<Result<_, _>>()?;
        drop(stmt);
        ids.iter()
            .filter_map(|id| row_with_counts(&conn, user_id, id).transpose())
            .collect()
    }

    pub fn update(&self, user_id: &str, caller_is_admin: bool, folder_id: &str, req: &UpdateFolderRequest) -> Result<Folder, AppError> {
        self.require_owned(user_id, caller_is_admin, folder_id)?;
        let owner_id = self.owner_of(folder_id)?;
        if let Some(name) = &req.name {
            if name.trim().is_empty() {
                return Err(AppError::validation("name", "must not be empty"));
            }
            let parent_id = self.parent_of(folder_id)?;
            self.require_unique_name(&owner_id, name.trim(), parent_id.as_deref(), Some(folder_id))?;
        }
        let conn = self.db.conn.lock().unwrap();
        if let Some(name) = &req.name {
            conn.execute("UPDATE folders SET name = ?1 WHERE id = ?2", params![name.trim(), folder_id])?;
        }
        if let Some(description) = &req.description {
            conn.execute("UPDATE folders SET description = ?1 WHERE id = ?2", params![description, folder_id])?;
        }
        if let Some(icon) = &req.icon {
            conn.execute("UPDATE folders SET icon = ?1 WHERE id = ?2", params![icon, folder_id])?;
        }
        if let Some(color) = &req.color {
            conn.execute("UPDATE folders SET color = ?1 WHERE id = ?2", params![color, folder_id])?;
        }
        if let Some(position) = req.position {
            conn.execute("UPDATE folders SET position = ?1 WHERE id = ?2", params![position, folder_id])?;
        }
        if let Some(is_expanded) = req.is_expanded {
            conn.execute("UPDATE folders SET is_expanded = ?1 WHERE id = ?2", params![is_expanded, folder_id])?;
        }
        drop(conn);
        self.get(user_id, caller_is_admin, folder_id)
    }

    /// Moves a folder under a new parent (or to the root when `None`),
    /// rejecting moves that would place a folder under itself or one of its
    /// own descendants.
    pub fn r#move(&self, user_id: &str, caller_is_admin: bool, folder_id: &str, new_parent_id: Option<&str>) -> Result<Folder, AppError> {
        self.require_owned(user_id, caller_is_admin, folder_id)?;
        if let Some(parent_id) = new_parent_id {
            self.require_owned(user_id, caller_is_admin, parent_id)?;
            if parent_id == folder_id {
                return Err(AppError::Cycle { message: "a folder cannot be its own parent".to_string() });
            }
            let descendants = self.descendant_ids(user_id, folder_id)?;
            if descendants.contains(parent_id) {
                return Err(AppError::Cycle { message: "cannot move a folder into its own descendant".to_string() });
            }
        }
        let owner_id = self.owner_of(folder_id)?;
        let name = self.name_of(folder_id)?;
        self.require_unique_name(&owner_id, &name, new_parent_id, Some(folder_id))?;
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE folders SET parent_id = ?1 WHERE id = ?2",
            params![new_parent_id, folder_id],
        )?;
        drop(conn);
        self.get(user_id, caller_is_admin, folder_id)
    }

    pub fn delete(&self, user_id: &str, caller_is_admin: bool, folder_id: &str, recursive: bool) -> Result<(), AppError> {
        self.require_owned(user_id, caller_is_admin, folder_id)?;
        let descendants = self.descendant_ids(user_id, folder_id)?;
        if !descendants.is_empty() && !recursive {
            return Err(AppError::NotEmpty { message: "folder has subfolders; pass recursive=true to delete them too".to_string() });
        }
        let conn = self.db.conn.lock().unwrap();
        conn.execute("UPDATE notes SET folder_id = NULL WHERE folder_id = ?1", [folder_id])?;
        conn.execute("UPDATE tasks SET folder_id = NULL WHERE folder_id = ?1", [folder_id])?;
        conn.execute("DELETE FROM folders WHERE id = ?1", [folder_id])?;
        Ok(())
    }

    pub fn path(&self, user_id: &str, folder_id: &str) -> Result<Vec<FolderPathEntry>, AppError> {
        let parents = self.load_all(user_id)?;
        let mut chain = Vec::new();
        let mut current = Some(folder_id.to_string());
        let mut guard = 0;
        while let Some(id) = current {
            let folder = parents.get(&id).ok_or_else(|| AppError::not_found("folder not found"))?;
            chain.push(FolderPathEntry { id: folder.0.clone(), name: folder.1.clone() });
            current = folder.2.clone();
            guard += 1;
            if guard > 256 {
                break;
            }
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn descendant_ids(&self, user_id: &str, folder_id: &str) -> Result<HashSet<String>, AppError> {
        let all = self.load_all(user_id)?;
        let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
        for (id, (_, _, parent)) in &all {
            if let Some(parent_id) = parent {
                children_of.entry(parent_id.clone()).or_default().push(id.clone());
            }
        }
        let mut result = HashSet::new();
        let mut stack = children_of.get(folder_id).cloned().unwrap_or_default();
        while let Some(id) = stack.pop() {
            if result.insert(id.clone()) {
                if let Some(children) = children_of.get(&id) {
                    stack.extend(children.iter().cloned());
                }
            }
        }
        Ok(result)
    }

    fn load_all(&self, user_id: &str) -> Result<HashMap<String, (String, String, Option<String>)>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name, parent_id FROM folders WHERE user_id = ?1")?;
        let rows = stmt.query_map([user_id], |r| {
            Ok((r.get::<_, String>(0)?, (r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, Option<String>>(2)?)))
        })?;
        rows.collect::<Result<HashMap<_, _>, _>>().map_err(AppError::from)
    }

    fn require_owned(&self, user_id: &str, caller_is_admin: bool, folder_id: &str) -> Result<(), AppError> {
        let conn = self.db.conn.lock().unwrap();
        let owner: Option<String> = conn
            .query_row("SELECT user_id FROM folders WHERE id = ?1", [folder_id], |r| r.get(0))
            .optional()?;
        match owner {
            Some(owner_id) if owner_id == user_id || caller_is_admin => Ok(()),
            Some(_) => Err(AppError::forbidden("not your folder")),
            None => Err(AppError::not_found("folder not found")),
        }
    }

    fn owner_of(&self, folder_id: &str) -> Result<String, AppError> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row("SELECT user_id FROM folders WHERE id = ?1", [folder_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::not_found("folder not found"))
    }

    fn parent_of(&self, folder_id: &str) -> Result<Option<String>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row("SELECT parent_id FROM folders WHERE id = ?1", [folder_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::not_found("folder not found"))
    }

    fn name_of(&self, folder_id: &str) -> Result<String, AppError> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row("SELECT name FROM folders WHERE id = ?1", [folder_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::not_found("folder not found"))
    }

    /// §4.5 folder invariant: no two siblings under the same parent (for the
    /// same owner) may share a name. `exclude_id` skips the folder being
    /// renamed/moved itself when checking for a collision.
    fn require_unique_name(&self, user_id: &str, name: &str, parent_id: Option<&str>, exclude_id: Option<&str>) -> Result<(), AppError> {
        let conn = self.db.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM folders WHERE user_id = ?1 AND name = ?2 AND parent_id IS ?3 AND id IS NOT ?4",
                params![user_id, name, parent_id, exclude_id],
                |r| r.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(AppError::Duplicate { message: "a folder with this name already exists here".to_string() });
        }
        Ok(())
    }
}

fn row_with_counts(conn: &rusqlite::Connection, user_id: &str, folder_id: &str) -> Result<Option<Folder>, AppError> {
    conn.query_row(
        "SELECT f.id, f.user_id, f.parent_id, f.name, f.description, f.icon, f.color, f.position, f.is_expanded,
                (SELECT COUNT(*) FROM notes n WHERE n.folder_id = f.id AND n.archived = 0) AS note_count,
                (SELECT COUNT(*) FROM tasks t WHERE t.folder_id = f.id) AS task_count
         FROM folders f WHERE f.id = ?1 AND f.user_id = ?2",
        params![folder_id, user_id],
        |row| {
            Ok(Folder {
                id: row.get(0)?,
                user_id: row.get(1)?,
                parent_id: row.get(2)?,
                name: row.get(3)?,
                description: row.get(4)?,
                icon: row.get(5)?,
                color: row.get(6)?,
                position: row.get(7)?,
                is_expanded: row.get(8)?,
                note_count: row.get(9)?,
                task_count: row.get(10)?,
            })
        },
    )
    .optional()
    .map_err(AppError::from)
}

fn row_with_counts_any_owner(conn: &rusqlite::Connection, folder_id: &str) -> Result<Option<Folder>, AppError> {
    conn.query_row(
        "SELECT f.id, f.user_id, f.parent_id, f.name, f.description, f.icon, f.color, f.position, f.is_expanded,
                (SELECT COUNT(*) FROM notes n WHERE n.folder_id = f.id AND n.archived = 0) AS note_count,
                (SELECT COUNT(*) FROM tasks t WHERE t.folder_id = f.id) AS task_count
         FROM folders f WHERE f.id = ?1",
        [folder_id],
        |row| {
            Ok(Folder {
                id: row.get(0)?,
                user_id: row.get(1)?,
                parent_id: row.get(2)?,
                name: row.get(3)?,
                description: row.get(4)?,
                icon: row.get(5)?,
                color: row.get(6)?,
                position: row.get(7)?,
                is_expanded: row.get(8)?,
                note_count: row.get(9)?,
                task_count: row.get(10)?,
            })
        },
    )
    .optional()
    .map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> FolderService {
        FolderService::new(Arc::new(Db::new(":memory:")))
    }

    #[test]
    fn create_and_list_folder() {
        let svc = service();
        let folder = svc
            .create("u1", false, &CreateFolderRequest { name: "Recipes".into(), parent_id: None, description: String::new(), icon: "folder".into(), color: "#000".into() })
            .unwrap();
        assert_eq!(folder.name, "Recipes");
        let listed = svc.list("u1").unwrap();
        assert!(listed.iter().any(|f| f.id == folder.id));
    }

    #[test]
    fn moving_folder_under_its_own_descendant_is_rejected() {
        let svc = service();
        let parent = svc
            .create("u1", false, &CreateFolderRequest { name: "Parent".into(), parent_id: None, description: String::new(), icon: "folder".into(), color: "#000".into() })
            .unwrap();
        let child = svc
            .create("u1", false, &CreateFolderRequest { name: "Child".into(), parent_id: Some(parent.id.clone()), description: String::new(), icon: "folder".into(), color: "#000".into() })
            .unwrap();
        let result = svc.r#move("u1", false, &parent.id, Some(&child.id));
        assert!(matches!(result, Err(AppError::Cycle { .. })));
    }

    #[test]
    fn folder_cannot_be_its_own_parent() {
        let svc = service();
        let folder = svc
            .create("u1", false, &CreateFolderRequest { name: "Solo".into(), parent_id: None, description: String::new(), icon: "folder".into(), color: "#000".into() })
            .unwrap();
        let result = svc.r#move("u1", false, &folder.id, Some(&folder.id));
        assert!(matches!(result, Err(AppError::Cycle { .. })));
    }

    #[test]
    fn duplicate_sibling_name_is_rejected() {
        let svc = service();
        svc.create("u1", false, &CreateFolderRequest { name: "Recipes".into(), parent_id: None, description: String::new(), icon: "folder".into(), color: "#000".into() })
            .unwrap();
        let result = svc.create("u1", false, &CreateFolderRequest { name: "Recipes".into(), parent_id: None, description: String::new(), icon: "folder".into(), color: "#000".into() });
        assert!(matches!(result, Err(AppError::Duplicate { .. })));
    }

    #[test]
    fn renaming_to_an_existing_sibling_name_is_rejected() {
        let svc = service();
        svc.create("u1", false, &CreateFolderRequest { name: "Work".into(), parent_id: None, description: String::new(), icon: "folder".into(), color: "#000".into() })
            .unwrap();
        let other = svc
            .create("u1", false, &CreateFolderRequest { name: "Personal".into(), parent_id: None, description: String::new(), icon: "folder".into(), color: "#000".into() })
            .unwrap();
        let result = svc.update("u1", false, &other.id, &UpdateFolderRequest { name: Some("Work".into()), ..Default::default() });
        assert!(matches!(result, Err(AppError::Duplicate { .. })));
    }
}
