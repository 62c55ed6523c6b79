//! Chat rooms, messages, reactions, pins and read receipts (§4.7).

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{delete, get, post, put, State};

use crate::chat::ChatService;
use crate::events::{DomainEvent, EventBus};
use crate::identity::IdentityService;
use crate::models::{
    ChatMessage, ChatRoom, CreateDirectRoomRequest, CreateGroupRoomRequest, MarkReadResponse, MessagePage,
    MessagePageQuery, ReactRequest, ReactionSummary, UnreadRoomCount, UpdateThemeRequest, UserSearchResult,
};

use super::{ApiResult, AuthUser, Envelope};

#[get("/chat/users")]
pub fn list_chat_users(auth: AuthUser, identity: &State<Arc<IdentityService>>) -> ApiResult<Vec<UserSearchResult>> {
    let users = identity
        .list_other_users(&auth.0.id)?
        .into_iter()
        .map(|u| UserSearchResult { id: u.id, username: u.username })
        .collect();
    Ok(Envelope::ok(users))
}

#[post("/chat/rooms/direct", data = "<body>")]
pub fn create_direct_room(body: Json<CreateDirectRoomRequest>, auth: AuthUser, chat: &State<Arc<ChatService>>, events: &State<Arc<EventBus>>) -> ApiResult<ChatRoom> {
    let room = chat.create_direct_room(&auth.0.id, auth.0.is_admin, &body.user_id)?;
    events.publish(DomainEvent::ChatRoomCreated { room: room.clone() });
    Ok(Envelope::ok(room))
}

#[post("/chat/rooms/group", data = "<body>")]
pub fn create_group_room(body: Json<CreateGroupRoomRequest>, auth: AuthUser, chat: &State<Arc<ChatService>>, events: &State<Arc<EventBus>>) -> ApiResult<ChatRoom> {
    let room = chat.create_group_room(&auth.0.id, auth.0.is_admin, &body.name, &body.participant_ids)?;
    events.publish(DomainEvent::ChatRoomCreated { room: room.clone() });
    Ok(Envelope::ok(room))
}

#[get("/chat/rooms")]
pub fn list_rooms(auth: AuthUser, chat: &State<Arc<ChatService>>) -> ApiResult<Vec<ChatRoom>> {
    Ok(Envelope::ok(chat.list_rooms(&auth.0.id, auth.0.is_admin)?))
}

#[put("/chat/rooms/<room_id>/theme", data = "<body>")]
pub fn set_theme(room_id: &str, body: Json<UpdateThemeRequest>, auth: AuthUser, chat: &State<Arc<ChatService>>) -> ApiResult<ChatRoom> {
    Ok(Envelope::ok(chat.set_theme(&auth.0.id, auth.0.is_admin, room_id, &body.theme)?))
}

#[post("/chat/rooms/<room_id>/messages", data = "<body>")]
pub fn send_message(
    room_id: &str,
    body: Json<crate::models::SendChatMessageRequest>,
    auth: AuthUser,
    chat: &State<Arc<ChatService>>,
    events: &State<Arc<EventBus>>,
) -> ApiResult<ChatMessage> {
    let message = chat.send_message(&auth.0.id, auth.0.is_admin, room_id, &body.body)?;
    events.publish(DomainEvent::ChatMessageSent { room_id: room_id.to_string(), message: message.clone() });
    Ok(Envelope::ok(message))
}

#[get("/chat/rooms/<room_id>/messages?<before_created_at>&<before_id>&<limit>")]
pub fn page_messages(
    room_id: &str,
    before_created_at: Option<String>,
    before_id: Option<String>,
    limit: Option<i64>,
    auth: AuthUser,
    chat: &State<Arc<ChatService>>,
) -> ApiResult<MessagePage> {
    let query = MessagePageQuery { before_created_at, before_id, limit };
    Ok(Envelope::ok(chat.page_messages(&auth.0.id, auth.0.is_admin, room_id, &query)?))
}

#[post("/chat/rooms/<room_id>/read")]
pub fn mark_read(room_id: &str, auth: AuthUser, chat: &State<Arc<ChatService>>, events: &State<Arc<EventBus>>) -> ApiResult<MarkReadResponse> {
    let result = chat.mark_read(&auth.0.id, auth.0.is_admin, room_id)?;
    events.publish(DomainEvent::ChatMessageRead { room_id: room_id.to_string(), user_id: auth.0.id.clone(), last_read_at: result.last_read_at.clone() });
    Ok(Envelope::ok(result))
}

#[post("/chat/messages/<message_id>/read")]
pub fn mark_message_read(message_id: &str, auth: AuthUser, chat: &State<Arc<ChatService>>, events: &State<Arc<EventBus>>) -> ApiResult<ChatMessage> {
    let message = chat.mark_message_read(&auth.0.id, auth.0.is_admin, message_id)?;
    events.publish(DomainEvent::ChatMessageRead { room_id: message.room_id.clone(), user_id: auth.0.id.clone(), last_read_at: chrono::Utc::now().to_rfc3339() });
    Ok(Envelope::ok(message))
}

#[get("/chat/unread-counts")]
pub fn unread_counts(auth: AuthUser, chat: &State<Arc<ChatService>>) -> ApiResult<Vec<UnreadRoomCount>> {
    Ok(Envelope::ok(chat.unread_counts(&auth.0.id, auth.0.is_admin)?))
}

#[put("/chat/messages/<message_id>/pinned", data = "<body>")]
pub fn set_pinned(message_id: &str, body: Json<PinnedPatch>, auth: AuthUser, chat: &State<Arc<ChatService>>, events: &State<Arc<EventBus>>) -> ApiResult<ChatMessage> {
    let message = chat.set_pinned(&auth.0.id, auth.0.is_admin, message_id, body.pinned)?;
    events.publish(DomainEvent::ChatMessagePinned { room_id: message.room_id.clone(), message_id: message.id.clone(), is_pinned: message.is_pinned });
    Ok(Envelope::ok(message))
}

#[get("/chat/rooms/<room_id>/pinned")]
pub fn list_pinned(room_id: &str, auth: AuthUser, chat: &State<Arc<ChatService>>) -> ApiResult<Vec<ChatMessage>> {
    Ok(Envelope::ok(chat.list_pinned(&auth.0.id, auth.0.is_admin, room_id)?))
}

#[post("/chat/messages/<message_id>/reactions", data = "<body>")]
pub fn react(message_id: &str, body: Json<ReactRequest>, auth: AuthUser, chat: &State<Arc<ChatService>>, events: &State<Arc<EventBus>>) -> ApiResult<Vec<ReactionSummary>> {
    let reactions = chat.react(&auth.0.id, auth.0.is_admin, message_id, &body.emoji)?;
    publish_reaction_change(chat, events, message_id, &reactions);
    Ok(Envelope::ok(reactions))
}

#[delete("/chat/messages/<message_id>/reactions/<emoji>")]
pub fn unreact(message_id: &str, emoji: &str, auth: AuthUser, chat: &State<Arc<ChatService>>, events: &State<Arc<EventBus>>) -> ApiResult<Vec<ReactionSummary>> {
    let reactions = chat.unreact(&auth.0.id, message_id, emoji)?;
    publish_reaction_change(chat, events, message_id, &reactions);
    Ok(Envelope::ok(reactions))
}

fn publish_reaction_change(chat: &ChatService, events: &EventBus, message_id: &str, reactions: &[ReactionSummary]) {
    if let Ok(message) = chat.get_message(message_id) {
        events.publish(DomainEvent::ChatReactionChanged { room_id: message.room_id, message_id: message_id.to_string(), reactions: reactions.to_vec() });
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct PinnedPatch {
    pub pinned: bool,
}
