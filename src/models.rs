//! Entity and wire-DTO types (§3). Entities carry the full row shape;
//! `Create*`/`Update*`/`Patch*` types are the narrower request bodies.

use serde::{Deserialize, Serialize};

// --- Users ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub totp_secret: Option<String>,
    pub is_2fa_enabled: bool,
    pub is_admin: bool,
    pub is_locked: bool,
    pub created_at: String,
}

pub const BOOTSTRAP_ADMIN_USERNAME: &str = "admin";

impl User {
    pub fn is_bootstrap_admin(&self) -> bool {
        self.username.eq_ignore_ascii_case(BOOTSTRAP_ADMIN_USERNAME)
    }
}

/// Public-facing projection of `User` (never carries secrets).
#[derive(Debug, Serialize, Clone)]
pub struct UserPublic {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub is_2fa_enabled: bool,
    pub is_admin: bool,
    pub is_locked: bool,
    pub created_at: String,
}

impl From<&User> for UserPublic {
    fn from(u: &User) -> Self {
        UserPublic {
            id: u.id.clone(),
            username: u.username.clone(),
            email: u.email.clone(),
            is_2fa_enabled: u.is_2fa_enabled,
            is_admin: u.is_admin,
            is_locked: u.is_locked,
            created_at: u.created_at.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub need_2fa: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserPublic>,
}

#[derive(Debug, Deserialize)]
pub struct Verify2FaRequest {
    pub username_or_email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct Confirm2FaRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct Enable2FaResponse {
    pub provisioning_uri: String,
}

// --- Folders ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Folder {
    pub id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub position: i64,
    pub is_expanded: bool,
    pub note_count: i64,
    pub task_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_folder_icon")]
    pub icon: String,
    #[serde(default = "default_folder_color")]
    pub color: String,
}

fn default_folder_icon() -> String {
    "folder".to_string()
}
fn default_folder_color() -> String {
    "#6B7280".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateFolderRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub is_expanded: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct MoveFolderRequest {
    pub parent_id: Option<String>,
}

/// Body for the dedicated `/folders/notes/:id/move` and
/// `/folders/tasks/:id/move` endpoints (§4.10) — a single-field patch that
/// reassigns (or clears, when absent) an owned note/task's folder.
#[derive(Debug, Deserialize)]
pub struct MoveEntityRequest {
    pub folder_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FolderPathEntry {
    pub id: String,
    pub name: String,
}

// --- Tags ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

// --- Notes ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Note {
    pub id: String,
    pub owner_id: String,
    pub folder_id: Option<String>,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub favorite: bool,
    pub pinned: bool,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
    /// Present when the caller is a share-grantee rather than the owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_edit: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateNoteRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub folder_id: Option<Option<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub favorite: Option<bool>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct NoteListQuery {
    pub archived: Option<bool>,
    pub favorite: Option<bool>,
    pub pinned: Option<bool>,
    pub folder_id: Option<String>,
    pub tag: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub user_id: String,
    #[serde(default)]
    pub can_edit: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct ShareEntry {
    pub id: String,
    pub entity_id: String,
    pub shared_with_id: String,
    pub can_edit: bool,
    pub created_at: String,
}

// --- Tasks ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub folder_id: Option<String>,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_at: Option<String>,
    pub completed: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_edit: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    #[serde(default)]
    pub due_at: Option<String>,
}

fn default_priority() -> Priority {
    Priority::Medium
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub folder_id: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub due_at: Option<Option<String>>,
    #[serde(default)]
    pub completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub completed: Option<bool>,
    pub folder_id: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletedPatch {
    pub completed: bool,
}

// --- Chat ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatTheme {
    Default,
    Ocean,
    Sunset,
    Forest,
    Midnight,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRoom {
    pub id: String,
    pub name: Option<String>,
    pub is_group: bool,
    pub created_by_id: String,
    pub theme: ChatTheme,
    pub created_at: String,
    pub participant_ids: Vec<String>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRoomRequest {
    pub name: String,
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDirectRoomRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateThemeRequest {
    pub theme: ChatTheme,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub body: String,
    pub is_pinned: bool,
    pub pinned_at: Option<String>,
    pub pinned_by_id: Option<String>,
    pub sent_at: String,
    pub delivered_at: Option<String>,
    pub created_at: String,
    pub status: MessageStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Deserialize)]
pub struct SendChatMessageRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagePageQuery {
    pub before_created_at: Option<String>,
    pub before_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    pub next_cursor: Option<MessageCursor>,
}

#[derive(Debug, Serialize)]
pub struct MessageCursor {
    pub created_at: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReactRequest {
    pub emoji: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: i64,
    pub user_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub last_read_at: String,
}

#[derive(Debug, Serialize)]
pub struct UnreadRoomCount {
    pub room_id: String,
    pub unread_count: i64,
}

// --- Presence / real-time ---

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum SocketFrame {
    Join { room: String },
    Leave { room: String },
    Typing { room: String },
    Focus { room: String, field: String },
    Cursor { room: String, position: i64, selection: Option<(i64, i64)> },
}

// --- Sync replay (§4.9) ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncEntityType {
    Note,
    Task,
    Folder,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncQueueItem {
    pub client_id: String,
    pub operation: SyncOperation,
    pub entity_type: SyncEntityType,
    pub entity_id: Option<String>,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SyncBatchRequest {
    pub items: Vec<SyncQueueItem>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcomeStatus {
    Ok,
    Conflict,
    Error,
}

#[derive(Debug, Serialize, Clone)]
pub struct SyncOutcome {
    pub client_id: String,
    pub status: SyncOutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    pub no_op: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncBatchResponse {
    pub outcomes: Vec<SyncOutcome>,
}

// --- Admin ---

#[derive(Debug, Serialize)]
pub struct AdminUserRow {
    #[serde(flatten)]
    pub user: UserPublic,
}

// --- Users search ---

#[derive(Debug, Serialize, Clone)]
pub struct UserSearchResult {
    pub id: String,
    pub username: String,
}
