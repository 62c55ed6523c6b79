//! SQLite-backed storage. Single connection behind a mutex, a single-writer
//! model — this crate is not meant to scale past one process, so there is
//! no connection pool.

use rusqlite::Connection;
use std::sync::Mutex;
use std::time::Duration;

const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(100);

pub struct Db {
    pub conn: Mutex<Connection>,
}

impl Db {
    pub fn new(path: &str) -> Self {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let mut conn = Connection::open(path).expect("failed to open database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("failed to set pragmas");
        // rusqlite's profile hook fires after every executed statement with its
        // wall-clock duration — the cheapest way to get slow-query visibility
        // (§5) without threading a stopwatch through every call site in
        // identity.rs/notes.rs/folders.rs/tasks.rs/chat.rs/sync.rs.
        conn.profile(Some(|sql, duration| {
            if duration >= SLOW_QUERY_THRESHOLD {
                log::warn!("slow query ({duration:?}): {sql}");
            }
        }));
        let db = Db { conn: Mutex::new(conn) };
        db.migrate();
        db
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE COLLATE NOCASE,
                email TEXT UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                totp_secret TEXT,
                is_2fa_enabled INTEGER NOT NULL DEFAULT 0,
                is_admin INTEGER NOT NULL DEFAULT 0,
                is_locked INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);

            CREATE TABLE IF NOT EXISTS oauth_links (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                provider TEXT NOT NULL,
                provider_user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(provider, provider_user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_oauth_links_user ON oauth_links(user_id);

            CREATE TABLE IF NOT EXISTS refresh_tokens (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token_hash TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                revoked_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);

            CREATE TABLE IF NOT EXISTS folders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                parent_id TEXT REFERENCES folders(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                icon TEXT NOT NULL DEFAULT 'folder',
                color TEXT NOT NULL DEFAULT '#6B7280',
                position INTEGER NOT NULL DEFAULT 0,
                is_expanded INTEGER NOT NULL DEFAULT 1,
                UNIQUE(user_id, name, parent_id)
            );
            CREATE INDEX IF NOT EXISTS idx_folders_user ON folders(user_id);
            CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);

            CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                folder_id TEXT REFERENCES folders(id) ON DELETE SET NULL,
                title TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                favorite INTEGER NOT NULL DEFAULT 0,
                pinned INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notes_owner ON notes(owner_id);
            CREATE INDEX IF NOT EXISTS idx_notes_folder ON notes(folder_id);

            CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
                note_id UNINDEXED,
                title,
                body,
                tokenize='porter unicode61'
            );

            CREATE TABLE IF NOT EXISTS tags (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                UNIQUE(owner_id, name COLLATE NOCASE)
            );

            CREATE TABLE IF NOT EXISTS note_tags (
                note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (note_id, tag_id)
            );
            CREATE INDEX IF NOT EXISTS idx_note_tags_tag ON note_tags(tag_id);

            CREATE TABLE IF NOT EXISTS note_shares (
                id TEXT PRIMARY KEY,
                note_id TEXT NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                shared_with_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                can_edit INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE(note_id, shared_with_id)
            );
            CREATE INDEX IF NOT EXISTS idx_note_shares_user ON note_shares(shared_with_id);

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                folder_id TEXT REFERENCES folders(id) ON DELETE SET NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                priority TEXT NOT NULL DEFAULT 'medium',
                due_at TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_folder ON tasks(folder_id);

            CREATE TABLE IF NOT EXISTS task_shares (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                shared_with_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                can_edit INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE(task_id, shared_with_id)
            );
            CREATE INDEX IF NOT EXISTS idx_task_shares_user ON task_shares(shared_with_id);

            CREATE TABLE IF NOT EXISTS chat_rooms (
                id TEXT PRIMARY KEY,
                name TEXT,
                is_group INTEGER NOT NULL DEFAULT 0,
                created_by_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                theme TEXT NOT NULL DEFAULT 'default',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_participants (
                room_id TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                joined_at TEXT NOT NULL,
                PRIMARY KEY (room_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_chat_participants_user ON chat_participants(user_id);

            CREATE TABLE IF NOT EXISTS chat_messages (
                id TEXT PRIMARY KEY,
                room_id TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
                sender_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                body TEXT NOT NULL,
                is_pinned INTEGER NOT NULL DEFAULT 0,
                pinned_at TEXT,
                pinned_by_id TEXT,
                delivered_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_messages_room_created ON chat_messages(room_id, created_at);

            CREATE TABLE IF NOT EXISTS chat_reactions (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL REFERENCES chat_messages(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                emoji TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(message_id, user_id, emoji)
            );
            CREATE INDEX IF NOT EXISTS idx_chat_reactions_message ON chat_reactions(message_id);

            CREATE TABLE IF NOT EXISTS chat_reads (
                room_id TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                last_read_at TEXT NOT NULL,
                PRIMARY KEY (room_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS chat_message_reads (
                message_id TEXT NOT NULL REFERENCES chat_messages(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                read_at TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS idx_chat_message_reads_message ON chat_message_reads(message_id);

            CREATE TABLE IF NOT EXISTS sync_log (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                client_id TEXT NOT NULL,
                status TEXT NOT NULL,
                code TEXT,
                server_id TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, client_id)
            );
            ",
        )
        .expect("failed to run migrations");

        // messages.delivered_at predates the rest of the chat redesign in
        // earlier snapshots of this schema; keep the guarded add for anyone
        // upgrading from that shape.
        conn.execute_batch("ALTER TABLE chat_messages ADD COLUMN delivered_at TEXT;").ok();

        rebuild_notes_fts(&conn);
    }
}

/// Rebuild the FTS5 index from all notes. Called on startup.
pub fn rebuild_notes_fts(conn: &Connection) {
    conn.execute("DELETE FROM notes_fts", []).ok();
    conn.execute_batch(
        "INSERT INTO notes_fts (note_id, title, body) SELECT id, title, body FROM notes;",
    )
    .ok();
}

pub fn upsert_note_fts(conn: &Connection, note_id: &str) {
    conn.execute("DELETE FROM notes_fts WHERE note_id = ?1", [note_id]).ok();
    conn.execute(
        "INSERT INTO notes_fts (note_id, title, body) SELECT id, title, body FROM notes WHERE id = ?1",
        [note_id],
    )
    .ok();
}

pub fn delete_note_fts(conn: &Connection, note_id: &str) {
    conn.execute("DELETE FROM notes_fts WHERE note_id = ?1", [note_id]).ok();
}
