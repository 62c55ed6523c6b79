//! Real-time chat: rooms, messages, reactions, pins, and read receipts
//! (§4.7). Delivery/read state only ever advances forward — see
//! `mark_delivered`/`mark_read`.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::authz::can_manage_chat_room;
use crate::db::Db;
use crate::errors::AppError;
use crate::models::{
    ChatMessage, ChatRoom, ChatTheme, MarkReadResponse, MessageCursor, MessagePage, MessagePageQuery,
    MessageStatus, ReactionSummary, UnreadRoomCount,
};

pub struct ChatService {
    db: Arc<Db>,
}

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

impl ChatService {
    pub fn new(db: Arc<Db>) -> Self {
        ChatService { db }
    }

    pub fn create_direct_room(&self, caller_id: &str, caller_is_admin: bool, other_user_id: &str) -> Result<ChatRoom, AppError> {
        if caller_id == other_user_id {
            return Err(AppError::SelfShare { message: "cannot start a direct chat with yourself".to_string() });
        }
        let conn = self.db.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT r.id FROM chat_rooms r
                 JOIN chat_participants a ON a.room_id = r.id AND a.user_id = ?1
                 JOIN chat_participants b ON b.room_id = r.id AND b.user_id = ?2
                 WHERE r.is_group = 0",
                params![caller_id, other_user_id],
                |r| r.get(0),
            )
            .optional()?;
        if let Some(room_id) = existing {
            drop(conn);
            return self.get_room(caller_id, caller_is_admin, &room_id);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chat_rooms (id, name, is_group, created_by_id, theme, created_at) VALUES (?1, NULL, 0, ?2, 'default', ?3)",
            params![&id, caller_id, &now],
        )?;
        for user_id in [caller_id, other_user_id] {
            conn.execute(
                "INSERT INTO chat_participants (room_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![&id, user_id, &now],
            )?;
        }
        drop(conn);
        self.get_room(caller_id, caller_is_admin, &id)
    }

    pub fn create_group_room(&self, caller_id: &str, caller_is_admin: bool, name: &str, participant_ids: &[String]) -> Result<ChatRoom, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::validation("name", "must not be empty"));
        }
        let distinct_others: std::collections::HashSet<&String> =
            participant_ids.iter().filter(|id| id.as_str() != caller_id).collect();
        if distinct_others.len() + 1 < 3 {
            return Err(AppError::validation("participant_ids", "a group room needs at least 3 participants including the creator"));
        }
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO chat_rooms (id, name, is_group, created_by_id, theme, created_at) VALUES (?1, ?2, 1, ?3, 'default', ?4)",
            params![&id, name.trim(), caller_id, &now],
        )?;
        conn.execute(
            "INSERT INTO chat_participants (room_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![&id, caller_id, &now],
        )?;
        for user_id in participant_ids {
            if user_id == caller_id {
                continue;
            }
            conn.execute(
                "INSERT OR IGNORE INTO chat_participants (room_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![&id, user_id, &now],
            )?;
        }
        drop(conn);
        self.get_room(caller_id, caller_is_admin, &id)
    }

    pub fn list_rooms(&self, caller_id: &str, caller_is_admin: bool) -> Result<Vec<ChatRoom>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT room_id FROM chat_participants WHERE user_id = ?1",
        )?;
        let ids: Vec<String> = stmt.query_map([caller_id], |r| r.get(0))?.collect::<Result<_, _>>()?;
        drop(conn);
        ids.iter().filter_map(|id| self.get_room(caller_id, caller_is_admin, id).ok()).collect::<Vec<_>>().into_iter().map(Ok).collect()
    }

    pub fn get_room(&self, caller_id: &str, caller_is_admin: bool, room_id: &str) -> Result<ChatRoom, AppError> {
        let conn = self.db.conn.lock().unwrap();
        self.require_participant(&conn, room_id, caller_id, caller_is_admin)?;
        let (name, is_group, created_by_id, theme, created_at) = conn
            .query_row(
                "SELECT name, is_group, created_by_id, theme, created_at FROM chat_rooms WHERE id = ?1",
                [room_id],
                |r| Ok((r.get::<_, Option<String>>(0)?, r.get::<_, bool>(1)?, r.get::<_, String>(2)?, r.get::<_, String>(3)?, r.get::<_, String>(4)?)),
            )
            .optional()?
            .ok_or_else(|| AppError::not_found("room not found"))?;

        let mut p_stmt = conn.prepare("SELECT user_id FROM chat_participants WHERE room_id = ?1")?;
        let participant_ids: Vec<String> = p_stmt.query_map([room_id], |r| r.get(0))?.collect::<Result<_, _>>()?;

        let last_read_at: Option<String> = conn
            .query_row("SELECT last_read_at FROM chat_reads WHERE room_id = ?1 AND user_id = ?2", params![room_id, caller_id], |r| r.get(0))
            .optional()?;
        let unread_count: i64 = match &last_read_at {
            Some(ts) => conn.query_row(
                "SELECT COUNT(*) FROM chat_messages WHERE room_id = ?1 AND created_at > ?2 AND sender_id != ?3",
                params![room_id, ts, caller_id],
                |r| r.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM chat_messages WHERE room_id = ?1 AND sender_id != ?2",
                params![room_id, caller_id],
                |r| r.get(0),
            )?,
        };

        Ok(ChatRoom {
            id: room_id.to_string(),
            name,
            is_group,
            created_by_id,
            theme: theme_from_str(&theme),
            created_at,
            participant_ids,
            unread_count,
        })
    }

    pub fn set_theme(&self, caller_id: &str, caller_is_admin: bool, room_id: &str, theme: &ChatTheme) -> Result<ChatRoom, AppError> {
        let conn = self.db.conn.lock().unwrap();
        self.require_participant(&conn, room_id, caller_id, caller_is_admin)?;
        conn.execute("UPDATE chat_rooms SET theme = ?1 WHERE id = ?2", params![theme_str(theme), room_id])?;
        drop(conn);
        self.get_room(caller_id, caller_is_admin, room_id)
    }

    pub fn send_message(&self, caller_id: &str, caller_is_admin: bool, room_id: &str, body: &str) -> Result<ChatMessage, AppError> {
        if body.trim().is_empty() {
            return Err(AppError::validation("body", "must not be empty"));
        }
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        self.require_participant(&conn, room_id, caller_id, caller_is_admin)?;
        conn.execute(
            "INSERT INTO chat_messages (id, room_id, sender_id, body, is_pinned, pinned_at, pinned_by_id, delivered_at, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, NULL, NULL, NULL, ?5)",
            params![&id, room_id, caller_id, body.trim(), &now],
        )?;
        drop(conn);
        self.get_message(&id)
    }

    pub fn get_message(&self, message_id: &str) -> Result<ChatMessage, AppError> {
        let conn = self.db.conn.lock().unwrap();
        row_to_message(&conn, message_id)?.ok_or_else(|| AppError::not_found("message not found"))
    }

    /// Marks a message delivered the first time any recipient socket
    /// receives it. In-memory/ephemeral by design (§ Open Questions): once
    /// persisted here it never regresses to undelivered.
    pub fn mark_delivered(&self, message_id: &str) -> Result<ChatMessage, AppError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "UPDATE chat_messages SET delivered_at = ?1 WHERE id = ?2 AND delivered_at IS NULL",
            params![&now, message_id],
        )?;
        drop(conn);
        self.get_message(message_id)
    }

    /// Marks every message in the room sent by someone else as read by the
    /// caller, and advances `chat_reads.last_read_at`. `chat_message_reads`
    /// rows use `INSERT OR IGNORE` so a repeated call never rewrites a
    /// `read_at` that was already recorded (§8 mark-read idempotence).
    pub fn mark_read(&self, caller_id: &str, caller_is_admin: bool, room_id: &str) -> Result<MarkReadResponse, AppError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn.lock().unwrap();
        self.require_participant(&conn, room_id, caller_id, caller_is_admin)?;
        conn.execute(
            "INSERT OR IGNORE INTO chat_message_reads (message_id, user_id, read_at)
             SELECT id, ?1, ?2 FROM chat_messages WHERE room_id = ?3 AND sender_id != ?1",
            params![caller_id, &now, room_id],
        )?;
        // `last_read_at` tracks max(current, latest message timestamp) per
        // §4.7, not wall-clock "now" — otherwise two calls in quick
        // succession would each bump it and the idempotence property in
        // §8 ("applying twice produces... the same last_read_at") would
        // not hold once no new messages arrived between the two calls.
        let latest_message_at: Option<String> =
            conn.query_row("SELECT MAX(created_at) FROM chat_messages WHERE room_id = ?1", [room_id], |r| r.get(0))?;
        let current_last_read_at: Option<String> = conn
            .query_row("SELECT last_read_at FROM chat_reads WHERE room_id = ?1 AND user_id = ?2", params![room_id, caller_id], |r| r.get(0))
            .optional()?;
        let last_read_at = [current_last_read_at, latest_message_at].into_iter().flatten().max().unwrap_or(now);
        conn.execute(
            "INSERT INTO chat_reads (room_id, user_id, last_read_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(room_id, user_id) DO UPDATE SET last_read_at = excluded.last_read_at",
            params![room_id, caller_id, &last_read_at],
        )?;
        Ok(MarkReadResponse { last_read_at })
    }

    /// Marks a single message read by the caller (the per-message REST
    /// surface); does not advance `chat_reads.last_read_at` past messages
    /// that remain unread, unlike the bulk `mark_read` above.
    pub fn mark_message_read(&self, caller_id: &str, caller_is_admin: bool, message_id: &str) -> Result<ChatMessage, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let room_id: String = conn
            .query_row("SELECT room_id FROM chat_messages WHERE id = ?1", [message_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::not_found("message not found"))?;
        self.require_participant(&conn, &room_id, caller_id, caller_is_admin)?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO chat_message_reads (message_id, user_id, read_at) VALUES (?1, ?2, ?3)",
            params![message_id, caller_id, &now],
        )?;
        drop(conn);
        self.get_message(message_id)
    }

    pub fn unread_counts(&self, caller_id: &str, caller_is_admin: bool) -> Result<Vec<UnreadRoomCount>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT room_id FROM chat_participants WHERE user_id = ?1")?;
        let room_ids: Vec<String> = stmt.query_map([caller_id], |r| r.get(0))?.collect::<Result<_, _>>()?;
        drop(conn);
        room_ids
            .into_iter()
            .map(|room_id| {
                let room = self.get_room(caller_id, caller_is_admin, &room_id)?;
                Ok(UnreadRoomCount { room_id: room.id, unread_count: room.unread_count })
            })
            .collect()
    }

    pub fn page_messages(&self, caller_id: &str, caller_is_admin: bool, room_id: &str, query: &MessagePageQuery) -> Result<MessagePage, AppError> {
        let conn = self.db.conn.lock().unwrap();
        self.require_participant(&conn, room_id, caller_id, caller_is_admin)?;
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let mut stmt = if let (Some(before_created), Some(before_id)) = (&query.before_created_at, &query.before_id) {
            conn.prepare(
                "SELECT id FROM chat_messages WHERE room_id = ?1 AND (created_at, id) < (?2, ?3)
                 ORDER BY created_at DESC, id DESC LIMIT ?4",
            )?
        } else {
            conn.prepare("SELECT id FROM chat_messages WHERE room_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?4")?
        };

        let ids: Vec<String> = if let (Some(before_created), Some(before_id)) = (&query.before_created_at, &query.before_id) {
            stmt.query_map(params![room_id, before_created, before_id, limit + 1], |r| r.get(0))?.collect::<Result<_, _>>()?
        } else {
            stmt.query_map(params![room_id, limit + 1], |r| r.get(0))?.collect::<Result<_, _>>()?
        };
        drop(stmt);

        let has_more = ids.len() as i64 > limit;
        let page_ids = &ids[..ids.len().min(limit as usize)];
        let mut messages: Vec<ChatMessage> = page_ids
            .iter()
            .filter_map(|id| row_to_message(&conn, id).ok().flatten())
            .collect();
        messages.reverse();

        let next_cursor = if has_more {
            page_ids.last().map(|_| {
                let oldest = messages.first().unwrap();
                MessageCursor { created_at: oldest.created_at.clone(), id: oldest.id.clone() }
            })
        } else {
            None
        };

        Ok(MessagePage { messages, next_cursor })
    }

    pub fn set_pinned(&self, caller_id: &str, caller_is_admin: bool, message_id: &str, pinned: bool) -> Result<ChatMessage, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let room_id: String = conn
            .query_row("SELECT room_id FROM chat_messages WHERE id = ?1", [message_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::not_found("message not found"))?;
        self.require_participant(&conn, &room_id, caller_id, caller_is_admin)?;
        let now = Utc::now().to_rfc3339();
        if pinned {
            conn.execute(
                "UPDATE chat_messages SET is_pinned = 1, pinned_at = ?1, pinned_by_id = ?2 WHERE id = ?3",
                params![&now, caller_id, message_id],
            )?;
        } else {
            conn.execute(
                "UPDATE chat_messages SET is_pinned = 0, pinned_at = NULL, pinned_by_id = NULL WHERE id = ?1",
                [message_id],
            )?;
        }
        drop(conn);
        self.get_message(message_id)
    }

    pub fn list_pinned(&self, caller_id: &str, caller_is_admin: bool, room_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        self.require_participant(&conn, room_id, caller_id, caller_is_admin)?;
        let mut stmt = conn.prepare("SELECT id FROM chat_messages WHERE room_id = ?1 AND is_pinned = 1 ORDER BY pinned_at DESC")?;
        let ids: Vec<String> = stmt.query_map([room_id], |r| r.get(0))?.collect::<Result<_, _>>()?;
        drop(stmt);
        ids.iter().filter_map(|id| row_to_message(&conn, id).ok().flatten()).map(Ok).collect()
    }

    pub fn react(&self, caller_id: &str, caller_is_admin: bool, message_id: &str, emoji: &str) -> Result<Vec<ReactionSummary>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let room_id: String = conn
            .query_row("SELECT room_id FROM chat_messages WHERE id = ?1", [message_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::not_found("message not found"))?;
        self.require_participant(&conn, &room_id, caller_id, caller_is_admin)?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM chat_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                params![message_id, caller_id, emoji],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            conn.execute(
                "DELETE FROM chat_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                params![message_id, caller_id, emoji],
            )?;
        } else {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO chat_reactions (id, message_id, user_id, emoji, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![Uuid::new_v4().to_string(), message_id, caller_id, emoji, &now],
            )?;
        }
        reactions_for(&conn, message_id)
    }

    pub fn unreact(&self, caller_id: &str, message_id: &str, emoji: &str) -> Result<Vec<ReactionSummary>, AppError> {
        let conn = self.db.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM chat_reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
            params![message_id, caller_id, emoji],
        )?;
        reactions_for(&conn, message_id)
    }

    pub fn require_participant(&self, conn: &rusqlite::Connection, room_id: &str, user_id: &str, caller_is_admin: bool) -> Result<(), AppError> {
        if caller_is_admin {
            return Ok(());
        }
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM chat_participants WHERE room_id = ?1 AND user_id = ?2",
                params![room_id, user_id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            Ok(())
        } else {
            Err(AppError::not_found("room not found"))
        }
    }

    pub fn is_room_manager(&self, caller_id: &str, room_id: &str, caller_is_admin: bool) -> Result<bool, AppError> {
        let conn = self.db.conn.lock().unwrap();
        let created_by_id: String = conn
            .query_row("SELECT created_by_id FROM chat_rooms WHERE id = ?1", [room_id], |r| r.get(0))
            .optional()?
            .ok_or_else(|| AppError::not_found("room not found"))?;
        Ok(can_manage_chat_room(&created_by_id, caller_id, caller_is_admin))
    }
}

fn reactions_for(conn: &rusqlite::Connection, message_id: &str) -> Result<Vec<ReactionSummary>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT emoji, user_id FROM chat_reactions WHERE message_id = ?1 ORDER BY emoji",
    )?;
    let rows: Vec<(String, String)> = stmt.query_map([message_id], |r| Ok((r.get(0)?, r.get(1)?)))?.collect::<Result<_, _>>()?;
    let mut grouped: Vec<ReactionSummary> = Vec::new();
    for (emoji, user_id) in rows {
        if let Some(entry) = grouped.iter_mut().find(|r| r.emoji == emoji) {
            entry.count += 1;
            entry.user_ids.push(user_id);
        } else {
            grouped.push(ReactionSummary { emoji, count: 1, user_ids: vec![user_id] });
        }
    }
    Ok(grouped)
}

fn row_to_message(conn: &rusqlite::Connection, message_id: &str) -> Result<Option<ChatMessage>, AppError> {
    let row = conn
        .query_row(
            "SELECT id, room_id, sender_id, body, is_pinned, pinned_at, pinned_by_id, delivered_at, created_at FROM chat_messages WHERE id = ?1",
            [message_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, bool>(4)?,
                    r.get::<_, Option<String>>(5)?,
                    r.get::<_, Option<String>>(6)?,
                    r.get::<_, Option<String>>(7)?,
                    r.get::<_, String>(8)?,
                ))
            },
        )
        .optional()?;
    let Some((id, room_id, sender_id, body, is_pinned, pinned_at, pinned_by_id, delivered_at, created_at)) = row else {
        return Ok(None);
    };
    let status = if delivered_at.is_none() {
        MessageStatus::Sent
    } else {
        let other_participants: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_participants WHERE room_id = ?1 AND user_id != ?2",
            params![&room_id, &sender_id],
            |r| r.get(0),
        )?;
        let read_by: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_message_reads WHERE message_id = ?1",
            [&id],
            |r| r.get(0),
        )?;
        if other_participants > 0 && read_by >= other_participants {
            MessageStatus::Read
        } else {
            MessageStatus::Delivered
        }
    };
    Ok(Some(ChatMessage {
        id,
        room_id,
        sender_id,
        body,
        is_pinned,
        pinned_at,
        pinned_by_id,
        sent_at: created_at.clone(),
        delivered_at,
        created_at,
        status,
    }))
}

fn theme_str(theme: &ChatTheme) -> &'static str {
    match theme {
        ChatTheme::Default => "default",
        ChatTheme::Ocean => "ocean",
        ChatTheme::Sunset => "sunset",
        ChatTheme::Forest => "forest",
        ChatTheme::Midnight => "midnight",
    }
}

fn theme_from_str(s: &str) -> ChatTheme {
    match s {
        "ocean" => ChatTheme::Ocean,
        "sunset" => ChatTheme::Sunset,
        "forest" => ChatTheme::Forest,
        "midnight" => ChatTheme::Midnight,
        _ => ChatTheme::Default,
    }
}
