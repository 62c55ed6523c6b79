//! WebSocket gateway (§4.10). A single `/ws` endpoint authenticates once via
//! bearer token in the query string (browsers can't set headers on the
//! upgrade request), then multiplexes join/leave/typing commands and
//! forwards the subset of broadcast events the caller is entitled to see.

use std::sync::Arc;
use std::time::Duration;

use rocket::{get, State};
use rocket_ws::frame::{CloseCode, CloseFrame};
use rocket_ws::{Channel, Message, WebSocket};

/// §5: a socket write that never returns gets the connection stuck forever;
/// drop it instead.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// §5: caps the rooms one socket can fan into, so a misbehaving client can't
/// force every broadcast event through an unbounded `joined_rooms` scan.
const MAX_JOINED_ROOMS: usize = 100;

use crate::chat::ChatService;
use crate::events::{DomainEvent, EventBus};
use crate::models::SocketFrame;
use crate::notes::NoteService;
use crate::presence::PresenceBroker;
use crate::tasks::TaskService;
use crate::token::TokenService;

#[get("/ws?<token>")]
#[allow(clippy::too_many_arguments)]
pub fn socket(
    ws: WebSocket,
    token: String,
    tokens: &State<Arc<TokenService>>,
    events: &State<Arc<EventBus>>,
    presence: &State<Arc<PresenceBroker>>,
    notes: &State<Arc<NoteService>>,
    tasks: &State<Arc<TaskService>>,
    chat: &State<Arc<ChatService>>,
) -> Channel<'static> {
    let tokens = tokens.inner().clone();
    let events = events.inner().clone();
    let presence = presence.inner().clone();
    let notes = notes.inner().clone();
    let tasks = tasks.inner().clone();
    let chat = chat.inner().clone();

    ws.channel(move |mut stream| {
        Box::pin(async move {
            let claims = match tokens.verify_access(&token) {
                Ok(c) => c,
                Err(_) => {
                    use rocket::futures::SinkExt;
                    // Close codes below 4000 are reserved by the protocol, so an
                    // unauthorized connection gets a 4401 application close code
                    // plus a text reason instead.
                    let _ = stream
                        .send(Message::Close(Some(CloseFrame { code: CloseCode::Library(4401), reason: "unauthorized".into() })))
                        .await;
                    return Ok(());
                }
            };
            let user_id = claims.sub;
            let is_admin = claims.is_admin;
            let mut joined_rooms: Vec<String> = Vec::new();
            let mut receiver = events.subscribe();

            use rocket::futures::{SinkExt, StreamExt};
            loop {
                tokio::select! {
                    incoming = stream.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let Ok(frame) = serde_json::from_str::<SocketFrame>(&text) else {
                                    // Unrecognized shape, not just an unrecognized `type` —
                                    // the frame isn't valid JSON we know how to interpret at all.
                                    let _ = tokio::time::timeout(
                                        SEND_TIMEOUT,
                                        stream.send(Message::Close(Some(CloseFrame { code: CloseCode::Invalid, reason: "bad frame".into() }))),
                                    )
                                    .await;
                                    break;
                                };
                                if let SocketFrame::Join { room } = &frame {
                                    // §4.8 join policy: AuthzEngine (here, the owning
                                    // service's own read-access check) is the sole
                                    // arbiter. A denial is never broadcast — it's a
                                    // frame back to this socket only, and the join is
                                    // silently dropped rather than erroring the socket.
                                    if !authorize_view(room, &user_id, is_admin, &notes, &tasks, &chat) {
                                        let payload = serde_json::json!({ "type": "unauthorized", "room": room }).to_string();
                                        match tokio::time::timeout(SEND_TIMEOUT, stream.send(Message::Text(payload))).await {
                                            Ok(Ok(())) => {}
                                            _ => break,
                                        }
                                    } else if joined_rooms.len() >= MAX_JOINED_ROOMS && !joined_rooms.contains(room) {
                                        let payload = serde_json::json!({ "type": "join-limit-exceeded", "room": room }).to_string();
                                        match tokio::time::timeout(SEND_TIMEOUT, stream.send(Message::Text(payload))).await {
                                            Ok(Ok(())) => {}
                                            _ => break,
                                        }
                                    } else {
                                        handle_frame(&frame, &events, &presence, &user_id, &mut joined_rooms);
                                    }
                                } else {
                                    handle_frame(&frame, &events, &presence, &user_id, &mut joined_rooms);
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Err(_)) => break,
                            _ => {}
                        }
                    }
                    event = receiver.recv() => {
                        match event {
                            Ok(domain_event) => {
                                if let Some(payload) = render_for(&domain_event, &joined_rooms, &user_id) {
                                    match tokio::time::timeout(SEND_TIMEOUT, stream.send(Message::Text(payload))).await {
                                        Ok(Ok(())) => {}
                                        _ => break,
                                    }
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }

            presence.disconnect_all(&events, &user_id);
            Ok(())
        })
    })
}

/// Whether `user_id` may join `room` (`note:<id>`, `task:<id>`, or
/// `chat:<id>`), per §4.8. Each owning service's own `get` already encodes
/// the view-access rule (owner, admin, or an active share/participant row)
/// via `AuthzEngine`-equivalent checks in `authz.rs`, so this just asks the
/// right service rather than duplicating the rule here.
fn authorize_view(room: &str, user_id: &str, is_admin: bool, notes: &NoteService, tasks: &TaskService, chat: &ChatService) -> bool {
    let Some((kind, id)) = room.split_once(':') else {
        return false;
    };
    match kind {
        "note" => notes.get(user_id, is_admin, id).is_ok(),
        "task" => tasks.get(user_id, is_admin, id).is_ok(),
        "chat" => chat.get_room(user_id, is_admin, id).is_ok(),
        _ => false,
    }
}

fn handle_frame(
    frame: &SocketFrame,
    events: &EventBus,
    presence: &PresenceBroker,
    user_id: &str,
    joined_rooms: &mut Vec<String>,
) {
    match frame {
        SocketFrame::Join { room } => {
            presence.join(events, room, user_id);
            if !joined_rooms.contains(room) {
                joined_rooms.push(room.clone());
            }
        }
        SocketFrame::Leave { room } => {
            presence.leave(events, room, user_id);
            joined_rooms.retain(|r| r != room);
        }
        SocketFrame::Typing { room } => presence.notify_typing(events, room, user_id),
        SocketFrame::Focus { room, field } => presence.notify_focus(events, room, user_id, field),
        SocketFrame::Cursor { room, position, .. } => presence.notify_cursor(events, room, user_id, *position),
    }
}

/// Renders a domain event into a wire frame only if this socket's user is
/// entitled to see it — either because it's their own user-scoped event, or
/// because they've joined the room it happened in.
fn render_for(event: &DomainEvent, joined_rooms: &[String], user_id: &str) -> Option<String> {
    let visible = match event {
        // §4.8: note/task rooms fan to every socket joined to `note:<id>`/
        // `task:<id>` — that's the owner plus any share-grantee who joined,
        // not just the owner (join itself is already gated by
        // `authorize_view`, so room membership alone is the right check).
        DomainEvent::NoteCreated { room_id, .. }
        | DomainEvent::NoteUpdated { room_id, .. }
        | DomainEvent::NoteDeleted { room_id, .. }
        | DomainEvent::TaskCreated { room_id, .. }
        | DomainEvent::TaskUpdated { room_id, .. }
        | DomainEvent::TaskDeleted { room_id, .. } => joined_rooms.iter().any(|r| r == room_id),
        DomainEvent::FolderCreated { user_id: owner, .. }
        | DomainEvent::FolderUpdated { user_id: owner, .. }
        | DomainEvent::FolderDeleted { user_id: owner, .. } => owner == user_id,
        DomainEvent::NoteShared { shared_with_id, .. } | DomainEvent::TaskShared { shared_with_id, .. } => shared_with_id == user_id,
        DomainEvent::ChatRoomCreated { .. } => true,
        DomainEvent::ChatMessageSent { room_id, .. }
        | DomainEvent::ChatMessageDelivered { room_id, .. }
        | DomainEvent::ChatMessageRead { room_id, .. }
        | DomainEvent::ChatReactionChanged { room_id, .. }
        | DomainEvent::ChatMessagePinned { room_id, .. } => joined_rooms.iter().any(|r| r == room_id),
        // §4.8/§6: presence/typing/focus/cursor are never echoed back to the
        // socket that produced them, even though it's joined to the room.
        DomainEvent::PresenceJoined { room_id, user_id: actor }
        | DomainEvent::PresenceLeft { room_id, user_id: actor }
        | DomainEvent::Typing { room_id, user_id: actor }
        | DomainEvent::Focus { room_id, user_id: actor, .. }
        | DomainEvent::Cursor { room_id, user_id: actor, .. } => {
            actor != user_id && joined_rooms.iter().any(|r| r == room_id)
        }
    };
    if !visible {
        return None;
    }
    serde_json::to_string(&SerializableEvent::from(event)).ok()
}

/// `DomainEvent` carries full entity payloads for internal use; the wire
/// shape only needs a tag plus whatever the frontend actually renders.
#[derive(serde::Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum SerializableEvent<'a> {
    NoteCreated { note: &'a crate::models::Note },
    NoteUpdated { note: &'a crate::models::Note },
    NoteDeleted { note_id: &'a str },
    NoteShared { note: &'a crate::models::Note },
    TaskCreated { task: &'a crate::models::Task },
    TaskUpdated { task: &'a crate::models::Task },
    TaskDeleted { task_id: &'a str },
    TaskShared { task: &'a crate::models::Task },
    FolderCreated { folder: &'a crate::models::Folder },
    FolderUpdated { folder: &'a crate::models::Folder },
    FolderDeleted { folder_id: &'a str },
    ChatRoomCreated { room: &'a crate::models::ChatRoom },
    ChatMessageSent { room_id: &'a str, message: &'a crate::models::ChatMessage },
    ChatMessageDelivered { room_id: &'a str, message_id: &'a str, delivered_at: &'a str },
    ChatMessageRead { room_id: &'a str, user_id: &'a str, last_read_at: &'a str },
    ChatReactionChanged { room_id: &'a str, message_id: &'a str, reactions: &'a [crate::models::ReactionSummary] },
    ChatMessagePinned { room_id: &'a str, message_id: &'a str, is_pinned: bool },
    PresenceJoined { room_id: &'a str, user_id: &'a str },
    PresenceLeft { room_id: &'a str, user_id: &'a str },
    Typing { room_id: &'a str, user_id: &'a str },
    Focus { room_id: &'a str, user_id: &'a str, field: &'a str },
    Cursor { room_id: &'a str, user_id: &'a str, position: i64 },
}

impl<'a> From<&'a DomainEvent> for SerializableEvent<'a> {
    fn from(e: &'a DomainEvent) -> Self {
        match e {
            DomainEvent::NoteCreated { note, .. } => SerializableEvent::NoteCreated { note },
            DomainEvent::NoteUpdated { note, .. } => SerializableEvent::NoteUpdated { note },
            DomainEvent::NoteDeleted { note_id, .. } => SerializableEvent::NoteDeleted { note_id },
            DomainEvent::NoteShared { note, .. } => SerializableEvent::NoteShared { note },
            DomainEvent::TaskCreated { task, .. } => SerializableEvent::TaskCreated { task },
            DomainEvent::TaskUpdated { task, .. } => SerializableEvent::TaskUpdated { task },
            DomainEvent::TaskDeleted { task_id, .. } => SerializableEvent::TaskDeleted { task_id },
            DomainEvent::TaskShared { task, .. } => SerializableEvent::TaskShared { task },
            DomainEvent::FolderCreated { folder, .. } => SerializableEvent::FolderCreated { folder },
            DomainEvent::FolderUpdated { folder, .. } => SerializableEvent::FolderUpdated { folder },
            DomainEvent::FolderDeleted { folder_id, .. } => SerializableEvent::FolderDeleted { folder_id },
            DomainEvent::ChatRoomCreated { room } => SerializableEvent::ChatRoomCreated { room },
            DomainEvent::ChatMessageSent { room_id, message } => SerializableEvent::ChatMessageSent { room_id, message },
            DomainEvent::ChatMessageDelivered { room_id, message_id, delivered_at } => {
                SerializableEvent::ChatMessageDelivered { room_id, message_id, delivered_at }
            }
            DomainEvent::ChatMessageRead { room_id, user_id, last_read_at } => {
                SerializableEvent::ChatMessageRead { room_id, user_id, last_read_at }
            }
            DomainEvent::ChatReactionChanged { room_id, message_id, reactions } => {
                SerializableEvent::ChatReactionChanged { room_id, message_id, reactions }
            }
            DomainEvent::ChatMessagePinned { room_id, message_id, is_pinned } => {
                SerializableEvent::ChatMessagePinned { room_id, message_id, is_pinned: *is_pinned }
            }
            DomainEvent::PresenceJoined { room_id, user_id } => SerializableEvent::PresenceJoined { room_id, user_id },
            DomainEvent::PresenceLeft { room_id, user_id } => SerializableEvent::PresenceLeft { room_id, user_id },
            DomainEvent::Typing { room_id, user_id } => SerializableEvent::Typing { room_id, user_id },
            DomainEvent::Focus { room_id, user_id, field } => SerializableEvent::Focus { room_id, user_id, field },
            DomainEvent::Cursor { room_id, user_id, position } => SerializableEvent::Cursor { room_id, user_id, position: *position },
        }
    }
}
