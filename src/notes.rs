//! Note CRUD, tagging, and sharing (§4.6).

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::authz::{can_share, can_share_with_self, resolve_owned_resource};
use crate::db::{self, Db};
use crate::errors::AppError;
use crate::models::{CreateNoteRequest, Note, NoteListQuery, ShareEntry, ShareRequest, UpdateNoteRequest};

pub struct NoteService {
    db: Arc<Db>,
}

impl NoteService {
    pub fn new(db: Arc<Db>) -> Self {
        NoteService { db }
    }

    pub fn create(&self, owner_id: &str, req: &CreateNoteRequest) -> Result<Note, AppError> {
        if let Some(folder_id) = &req.folder_id {
            self.require_folder_owned(owner_id, folder_id)?;
        }
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        {
            let conn = self.db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO notes (id, owner_id, folder_id, title, body, favorite, pinned, archived, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, ?6, ?6)",
                params![&id, owner_id, &req.folder_id, &req.title, &req.body, &now],
            )?;
            self.replace_tags(&conn, &id, owner_id, &req.tags)?;
            db::upsert_note_fts(&conn, &id);
        }
        self.get(owner_id, false, &id)
    }

    pub fn get(&self, caller_id: &str, caller_is_admin: bool, note_id: &str) -> Result<Note, AppError> {
        let (note, access) = self.load_with_access(caller_id, caller_is_admin, note_id)?;
        if !access.can_read() {
            return Err(AppError::not_found("note not found"));
        }
        Ok(note)
    }

    pub fn list(&self, caller_id: &str, query: &NoteListQuery) -> Result<Vec<Note>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let mut sql = String::from(
            "SELECT DISTINCT n.id FROM notes n
             LEFT JOIN note_shares s ON s.note_id = n.id AND s.shared_with_id = ?1
             WHERE (n.owner_id = ?1 OR s.shared_with_id = ?1)",
        );
        if let Some(archived) = query.archived {
            sql.push_str(if archived { " AND n.archived = 1" } else { " AND n.archived = 0" });
        }
        if let Some(favorite) = query.favorite {
            sql.push_str(if favorite { " AND n.favorite = 1" } else { " AND n.favorite = 0" });
        }
        if let Some(pinned) = query.pinned {
            sql.push_str(if pinned { " AND n.pinned = 1" } else { " AND n.pinned = 0" });
        }
        if query.folder_id.is_some() {
            sql.push_str(" AND n.folder_id = ?2");
        }
        sql.push_str(" ORDER BY n.pinned DESC, n.updated_at DESC");

        let ids: Vec<String> = if let Some(folder_id) = &query.folder_id {
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![caller_id, folder_id], |r| r.get(0))?.collect::<Result<_, _>>()?
        } else {
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![caller_id], |r| r.get(0))?.collect::<Result<_, _>>()?
        };
        drop(conn);

        let mut notes: Vec<Note> = ids
            .iter()
            .filter_map(|id| self.load_with_access(caller_id, false, id).ok())
            .map(|(note, _)| note)
            .collect();

        if let Some(tag) = &query.tag {
            notes.retain(|n| n.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)));
        }
        if let Some(q) = &query.q {
            notes = self.search_filter(notes, q)?;
        }
        Ok(notes)
    }

    fn search_filter(&self, notes: Vec<Note>, q: &str) -> Result<Vec<Note>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT note_id FROM notes_fts WHERE notes_fts MATCH ?1",
        )?;
        let matched: std::collections::HashSet<String> = stmt
            .query_map([format!("{}*", q.replace('"', ""))], |r| r.get(0))?
            .filter_map(|r: Result<String, _>| r.ok())
            .collect();
        Ok(notes.into_iter().filter(|n| matched.contains(&n.id)).collect())
    }

    pub fn update(&self, caller_id: &str, caller_is_admin: bool, note_id: &str, req: &UpdateNoteRequest) -> Result<Note, AppError> {
        let (_, access) = self.load_with_access(caller_id, caller_is_admin, note_id)?;
        if !access.can_write() {
            return Err(AppError::forbidden("you do not have edit access to this note"));
        }
        if let Some(Some(folder_id)) = &req.folder_id {
            self.require_folder_owned(&self.owner_of(note_id)?, folder_id)?;
        }
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        if let Some(title) = &req.title {
            conn.execute("UPDATE notes SET title = ?1, updated_at = ?2 WHERE id = ?3", params![title, &now, note_id])?;
        }
        if let Some(body) = &req.body {
            conn.execute("UPDATE notes SET body = ?1, updated_at = ?2 WHERE id = ?3", params![body, &now, note_id])?;
        }
        if let Some(folder_id) = &req.folder_id {
            conn.execute("UPDATE notes SET folder_id = ?1, updated_at = ?2 WHERE id = ?3", params![folder_id, &now, note_id])?;
        }
        if let Some(favorite) = req.favorite {
            conn.execute("UPDATE notes SET favorite = ?1, updated_at = ?2 WHERE id = ?3", params![favorite, &now, note_id])?;
        }
        if let Some(pinned) = req.pinned {
            conn.execute("UPDATE notes SET pinned = ?1, updated_at = ?2 WHERE id = ?3", params![pinned, &now, note_id])?;
        }
        if let Some(archived) = req.archived {
            conn.execute("UPDATE notes SET archived = ?1, updated_at = ?2 WHERE id = ?3", params![archived, &now, note_id])?;
        }
        if let Some(tags) = &req.tags {
            self.replace_tags(&conn, note_id, &self.owner_of(note_id)?, tags)?;
        }
        db::upsert_note_fts(&conn, note_id);
        drop(conn);
        self.get(caller_id, caller_is_admin, note_id)
    }

    pub fn delete(&self, caller_id: &str, caller_is_admin: bool, note_id: &str) -> Result<(), AppError> {
        let (note, _) = self.load_with_access(caller_id, caller_is_admin, note_id)?;
        if note.owner_id != caller_id && !caller_is_admin {
            return Err(AppError::forbidden("only the owner can delete this note"));
        }
        let conn = self.db.conn.lock().unwrap();
        db::delete_note_fts(&conn, note_id);
        conn.execute("DELETE FROM notes WHERE id = ?1", [note_id])?;
        Ok(())
    }

    pub fn share(&self, caller_id: &str, caller_is_admin: bool, note_id: &str, req: &ShareRequest) -> Result<ShareEntry, AppError> {
        let owner_id = self.owner_of(note_id)?;
        if !can_share(&owner_id, caller_id, caller_is_admin) {
            return Err(AppError::forbidden("only the owner can share this note"));
        }
        if can_share_with_self(&owner_id, &req.user_id).is_err() {
            return Err(AppError::SelfShare { message: "cannot share a note with yourself".to_string() });
        }
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO note_shares (id, note_id, shared_with_id, can_edit, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(note_id, shared_with_id) DO UPDATE SET can_edit = excluded.can_edit",
            params![&id, note_id, &req.user_id, req.can_edit, &now],
        )?;
        Ok(ShareEntry { id, entity_id: note_id.to_string(), shared_with_id: req.user_id.clone(), can_edit: req.can_edit, created_at: now })
    }

    pub fn unshare(&self, caller_id: &str, caller_is_admin: bool, note_id: &str, target_user_id: &str) -> Result<(), AppError> {
        let owner_id = self.owner_of(note_id)?;
        if !can_share(&owner_id, caller_id, caller_is_admin) {
            return Err(AppError::forbidden("only the owner can manage sharing"));
        }
        let conn = self.db.conn.lock().unwrap();
        conn.execute("DELETE FROM note_shares WHERE note_id = ?1 AND shared_with_id = ?2", params![note_id, target_user_id])?;
        Ok(())
    }

    fn owner_of(&self, note_id: &str) -> Result<String, AppError> {
        let conn = self.db.conn.lock().unwrap();
        conn.query_row("SELECT owner_id FROM notes WHERE id = ?1", [note_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::not_found("note not found"))
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

    fn replace_tags(&self, conn: &rusqlite::Connection, note_id: &str, owner_id: &str, tags: &[String]) -> Result<(), AppError> {
        conn.execute("DELETE FROM note_tags WHERE note_id = ?1", [note_id])?;
        for raw in tags {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            let tag_id: String = conn
                .query_row("SELECT id FROM tags WHERE owner_id = ?1 AND name = ?2 COLLATE NOCASE", params![owner_id, name], |r| r.get(0))
                .optional()?
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            conn.execute(
                "INSERT INTO tags (id, owner_id, name) VALUES (?1, ?2, ?3) ON CONFLICT(owner_id, name) DO NOTHING",
                params![&tag_id, owner_id, name],
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?1, ?2)",
                params![note_id, &tag_id],
            )?;
        }
        Ok(())
    }

    fn load_with_access(&self, caller_id: &str, caller_is_admin: bool, note_id: &str) -> Result<(Note, crate::authz::Access), AppError> {
        let conn = self.db.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, owner_id, folder_id, title, body, favorite, pinned, archived, created_at, updated_at FROM notes WHERE id = ?1",
                [note_id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, bool>(5)?,
                        r.get::<_, bool>(6)?,
                        r.get::<_, bool>(7)?,
                        r.get::<_, String>(8)?,
                        r.get::<_, String>(9)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("note not found"))?;

        let share_can_edit: Option<bool> = conn
            .query_row(
                "SELECT can_edit FROM note_shares WHERE note_id = ?1 AND shared_with_id = ?2",
                params![note_id, caller_id],
                |r| r.get(0),
            )
            .optional()?;
        let access = resolve_owned_resource(&row.1, caller_id, caller_is_admin, share_can_edit);

        let mut tag_stmt = conn.prepare(
            "SELECT t.name FROM tags t JOIN note_tags nt ON nt.tag_id = t.id WHERE nt.note_id = ?1 ORDER BY t.name",
        )?;
        let tags: Vec<String> = tag_stmt.query_map([note_id], |r| r.get(0))?.collect::<Result<_, _>>()?;

        Ok((
            Note {
                id: row.0,
                owner_id: row.1.clone(),
                folder_id: row.2,
                title: row.3,
                body: row.4,
                tags,
                favorite: row.5,
                pinned: row.6,
                archived: row.7,
                created_at: row.8,
                updated_at: row.9,
                can_edit: if row.1 == caller_id { None } else { Some(access.can_write()) },
            },
            access,
        ))
    }
}
