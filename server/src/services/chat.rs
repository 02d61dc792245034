//! Chat rooms: per-room history with a broadcast channel for live
//! subscribers. Messages within a room are journaled, appended and published
//! under that room's lock, so every subscriber sees them in the same order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use uuid::Uuid;

use crate::error::{MarketError, MarketResult};
use crate::market::Changeset;
use crate::models::{ChatMessage, Conversation};
use crate::store::Journal;

/// Largest accepted message body, media payloads included.
pub const MAX_CONTENT_BYTES: usize = 2 * 1024 * 1024;

const ROOM_CHANNEL_CAPACITY: usize = 64;

/// Canonical chat room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    Order(Uuid),
    /// Direct room between two users, stored lowest id first
    Direct(Uuid, Uuid),
}

impl RoomId {
    pub fn direct(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self::Direct(a, b)
        } else {
            Self::Direct(b, a)
        }
    }

    /// Parse a room id as sent by a client. A bare user id names the direct
    /// room between `caller` and that user.
    pub fn parse(raw: &str, caller: Uuid) -> MarketResult<Self> {
        let invalid = || MarketError::Validation(format!("invalid room id {raw:?}"));
        let raw = raw.trim();
        if let Some(id) = raw.strip_prefix("order:") {
            return Uuid::parse_str(id).map(Self::Order).map_err(|_| invalid());
        }
        if let Some(pair) = raw.strip_prefix("dm:") {
            let (a, b) = pair.split_once(':').ok_or_else(invalid)?;
            let a = Uuid::parse_str(a).map_err(|_| invalid())?;
            let b = Uuid::parse_str(b).map_err(|_| invalid())?;
            return Ok(Self::direct(a, b));
        }
        let other = Uuid::parse_str(raw).map_err(|_| invalid())?;
        if other == caller {
            return Err(MarketError::Validation("cannot open a chat with yourself".to_string()));
        }
        Ok(Self::direct(caller, other))
    }

    pub fn key(&self) -> String {
        match self {
            Self::Order(id) => format!("order:{id}"),
            Self::Direct(a, b) => format!("dm:{a}:{b}"),
        }
    }

    /// The other member of a direct room.
    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        match *self {
            Self::Direct(a, b) if a == user_id => Some(b),
            Self::Direct(a, b) if b == user_id => Some(a),
            _ => None,
        }
    }
}

struct Room {
    history: Vec<ChatMessage>,
    live: broadcast::Sender<ChatMessage>,
}

impl Room {
    fn new() -> Self {
        let (live, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        Self {
            history: Vec::new(),
            live,
        }
    }
}

type SharedRoom = Arc<Mutex<Room>>;

/// Rooms are locked one at a time; a slow journal write in one room never
/// holds up another.
pub struct ChatHub {
    rooms: RwLock<HashMap<String, SharedRoom>>,
    journal: Arc<dyn Journal>,
}

impl ChatHub {
    pub fn new(journal: Arc<dyn Journal>) -> Self {
        Self::with_history(Vec::new(), journal)
    }

    /// Hub seeded with stored messages, oldest first.
    pub fn with_history(messages: Vec<ChatMessage>, journal: Arc<dyn Journal>) -> Self {
        let mut rooms: HashMap<String, Room> = HashMap::new();
        for message in messages {
            rooms
                .entry(message.room_id.clone())
                .or_insert_with(Room::new)
                .history
                .push(message);
        }
        Self {
            rooms: RwLock::new(
                rooms
                    .into_iter()
                    .map(|(key, room)| (key, Arc::new(Mutex::new(room))))
                    .collect(),
            ),
            journal,
        }
    }

    async fn existing_room(&self, key: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(key).cloned()
    }

    async fn room(&self, key: &str) -> SharedRoom {
        if let Some(room) = self.existing_room(key).await {
            return room;
        }
        self.rooms
            .write()
            .await
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Room::new())))
            .clone()
    }

    pub async fn post(&self, room: RoomId, sender_id: Uuid, content: String) -> MarketResult<ChatMessage> {
        if content.trim().is_empty() {
            return Err(MarketError::Validation("message is empty".to_string()));
        }
        if content.len() > MAX_CONTENT_BYTES {
            return Err(MarketError::Validation("message exceeds 2 MiB".to_string()));
        }

        let key = room.key();
        let shared = self.room(&key).await;
        let mut room = shared.lock().await;
        let message = ChatMessage {
            id: Uuid::new_v4(),
            room_id: key,
            sender_id,
            content,
            read: false,
            created_at: Utc::now(),
        };
        self.journal
            .commit(&Changeset {
                messages: vec![message.clone()],
                ..Default::default()
            })
            .await?;
        room.history.push(message.clone());
        // no live subscribers is fine; history has the message
        let _ = room.live.send(message.clone());
        tracing::debug!(room = %message.room_id, kind = ?message.kind(), "chat message posted");
        Ok(message)
    }

    pub async fn history(&self, room: RoomId) -> Vec<ChatMessage> {
        match self.existing_room(&room.key()).await {
            Some(shared) => shared.lock().await.history.clone(),
            None => Vec::new(),
        }
    }

    pub async fn subscribe(&self, room: RoomId) -> broadcast::Receiver<ChatMessage> {
        self.room(&room.key()).await.lock().await.live.subscribe()
    }

    /// Mark messages from other senders as read; returns how many changed.
    pub async fn mark_read(&self, room: RoomId, reader: Uuid) -> MarketResult<usize> {
        let Some(shared) = self.existing_room(&room.key()).await else {
            return Ok(0);
        };
        let mut room = shared.lock().await;
        let updated: Vec<ChatMessage> = room
            .history
            .iter()
            .filter(|m| m.sender_id != reader && !m.read)
            .map(|m| ChatMessage {
                read: true,
                ..m.clone()
            })
            .collect();
        if updated.is_empty() {
            return Ok(0);
        }
        let count = updated.len();
        self.journal
            .commit(&Changeset {
                messages: updated,
                ..Default::default()
            })
            .await?;
        for message in room.history.iter_mut() {
            if message.sender_id != reader {
                message.read = true;
            }
        }
        Ok(count)
    }

    /// Rooms `user_id` takes part in, most recent first. Order rooms are
    /// included for the given `order_ids`.
    pub async fn conversations(&self, user_id: Uuid, order_ids: &[Uuid]) -> Vec<Conversation> {
        let candidates: Vec<(String, RoomId, SharedRoom)> = self
            .rooms
            .read()
            .await
            .iter()
            .filter_map(|(key, shared)| {
                let id = RoomId::parse(key, user_id).ok()?;
                let member = match id {
                    RoomId::Order(order_id) => order_ids.contains(&order_id),
                    RoomId::Direct(..) => id.counterpart(user_id).is_some(),
                };
                member.then(|| (key.clone(), id, shared.clone()))
            })
            .collect();

        let mut list = Vec::with_capacity(candidates.len());
        for (key, id, shared) in candidates {
            let room = shared.lock().await;
            let Some(last) = room.history.last() else {
                continue;
            };
            list.push(Conversation {
                room_id: key,
                counterpart_id: id.counterpart(user_id),
                last_message: Some(last.preview()),
                last_message_at: Some(last.created_at),
                unread_count: room
                    .history
                    .iter()
                    .filter(|m| m.sender_id != user_id && !m.read)
                    .count(),
            });
        }
        list.sort_by_key(|c| std::cmp::Reverse(c.last_message_at));
        list
    }
}
