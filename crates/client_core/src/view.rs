//! Render-ready snapshot of a session.

use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone};
use shared::domain::{Identity, RoomKey};

use crate::{connection::ConnectionStatus, message_log::Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    System,
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub message: Message,
    pub origin: MessageOrigin,
    /// Sender labels are shown for other users' messages in the public room.
    pub show_sender: bool,
}

impl MessageView {
    pub(crate) fn build(message: &Message, local: Option<&Identity>) -> Self {
        let origin = if message.sender().is_system() {
            MessageOrigin::System
        } else if Some(message.sender()) == local {
            MessageOrigin::Local
        } else {
            MessageOrigin::Remote
        };
        Self {
            message: message.clone(),
            origin,
            show_sender: origin == MessageOrigin::Remote && !message.room().is_private(),
        }
    }

    pub fn display_time(&self) -> String {
        format_timestamp(&self.message.received_at().with_timezone(&Local))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub identity: Identity,
    /// The private room with this user is the current room.
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub logged_in: bool,
    pub identity: Option<Identity>,
    pub current_room: RoomKey,
    pub connection: ConnectionStatus,
    pub visible_messages: Vec<MessageView>,
    pub roster: Vec<RosterEntry>,
}

impl SessionView {
    pub fn is_global_selected(&self) -> bool {
        self.current_room == RoomKey::Global
    }
}

/// 12-hour clock, e.g. `9:05 PM`.
pub fn format_timestamp<Tz>(timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    timestamp.format("%-I:%M %p").to_string()
}
