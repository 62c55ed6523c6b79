//! In-memory presence tracking (§4.8). Entirely ephemeral — nothing here is
//! persisted, so a restart simply means everyone reconnects and rejoins.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::events::{DomainEvent, EventBus};

#[derive(Default)]
pub struct PresenceBroker {
    /// room_id -> connected user_ids
    rooms: Mutex<HashMap<String, HashSet<String>>>,
}

impl PresenceBroker {
    pub fn new() -> Self {
        PresenceBroker::default()
    }

    pub fn join(&self, events: &EventBus, room_id: &str, user_id: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        let members = rooms.entry(room_id.to_string()).or_default();
        if members.insert(user_id.to_string()) {
            drop(rooms);
            events.publish(DomainEvent::PresenceJoined { room_id: room_id.to_string(), user_id: user_id.to_string() });
        }
    }

    pub fn leave(&self, events: &EventBus, room_id: &str, user_id: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        let removed = rooms.get_mut(room_id).map(|members| members.remove(user_id)).unwrap_or(false);
        if rooms.get(room_id).is_some_and(|m| m.is_empty()) {
            rooms.remove(room_id);
        }
        drop(rooms);
        if removed {
            events.publish(DomainEvent::PresenceLeft { room_id: room_id.to_string(), user_id: user_id.to_string() });
        }
    }

    /// Removes a disconnected socket from every room it had joined.
    pub fn disconnect_all(&self, events: &EventBus, user_id: &str) {
        let room_ids: Vec<String> = {
            let rooms = self.rooms.lock().unwrap();
            rooms.iter().filter(|(_, members)| members.contains(user_id)).map(|(id, _)| id.clone()).collect()
        };
        for room_id in room_ids {
            self.leave(events, &room_id, user_id);
        }
    }

    pub fn room_members(&self, room_id: &str) -> Vec<String> {
        self.rooms.lock().unwrap().get(room_id).map(|m| m.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn notify_typing(&self, events: &EventBus, room_id: &str, user_id: &str) {
        events.publish(DomainEvent::Typing { room_id: room_id.to_string(), user_id: user_id.to_string() });
    }

    pub fn notify_focus(&self, events: &EventBus, room_id: &str, user_id: &str, field: &str) {
        events.publish(DomainEvent::Focus { room_id: room_id.to_string(), user_id: user_id.to_string(), field: field.to_string() });
    }

    pub fn notify_cursor(&self, events: &EventBus, room_id: &str, user_id: &str, position: i64) {
        events.publish(DomainEvent::Cursor { room_id: room_id.to_string(), user_id: user_id.to_string(), position });
    }
}
