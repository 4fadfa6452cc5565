use chrono::{DateTime, Utc};
use shared::domain::{Identity, RoomKey};

/// A chat message as received by this client. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    content: String,
    sender: Identity,
    room: RoomKey,
    received_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        content: impl Into<String>,
        sender: Identity,
        room: RoomKey,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            content: content.into(),
            sender,
            room,
            received_at,
        }
    }

    /// Stamps the message with the local arrival time.
    pub fn received_now(content: impl Into<String>, sender: Identity, room: RoomKey) -> Self {
        Self::new(content, sender, room, Utc::now())
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sender(&self) -> &Identity {
        &self.sender
    }

    pub fn room(&self) -> &RoomKey {
        &self.room
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// Append-only history of every room, in arrival order.
///
/// Room keys are canonical by construction (see `RoomKey::from_str`), so a
/// message captured as `bob-alice` lands in the same partition as one
/// captured as `alice-bob`.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn view<'a>(&'a self, room: &'a RoomKey) -> impl Iterator<Item = &'a Message> + Clone {
        self.messages
            .iter()
            .filter(move |message| message.room() == room)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
