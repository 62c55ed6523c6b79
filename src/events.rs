//! Real-time fan-out (§4.8). A single broadcast channel carries every domain
//! event; the socket gateway filters by recipient/room when forwarding frames.

use tokio::sync::broadcast;

use crate::models::{ChatMessage, ChatRoom, Folder, Note, ReactionSummary, Task};

#[derive(Debug, Clone)]
pub enum DomainEvent {
    NoteCreated { room_id: String, user_id: String, note: Note },
    NoteUpdated { room_id: String, user_id: String, note: Note },
    NoteDeleted { room_id: String, user_id: String, note_id: String },
    NoteShared { shared_with_id: String, note: Note },

    TaskCreated { room_id: String, user_id: String, task: Task },
    TaskUpdated { room_id: String, user_id: String, task: Task },
    TaskDeleted { room_id: String, user_id: String, task_id: String },
    TaskShared { shared_with_id: String, task: Task },

    FolderCreated { user_id: String, folder: Folder },
    FolderUpdated { user_id: String, folder: Folder },
    FolderDeleted { user_id: String, folder_id: String },

    ChatRoomCreated { room: ChatRoom },
    ChatMessageSent { room_id: String, message: ChatMessage },
    ChatMessageDelivered { room_id: String, message_id: String, delivered_at: String },
    ChatMessageRead { room_id: String, user_id: String, last_read_at: String },
    ChatReactionChanged { room_id: String, message_id: String, reactions: Vec<ReactionSummary> },
    ChatMessagePinned { room_id: String, message_id: String, is_pinned: bool },

    PresenceJoined { room_id: String, user_id: String },
    PresenceLeft { room_id: String, user_id: String },
    Typing { room_id: String, user_id: String },
    Focus { room_id: String, user_id: String, field: String },
    Cursor { room_id: String, user_id: String, position: i64 },
}

pub struct EventBus {
    pub sender: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        EventBus { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}
