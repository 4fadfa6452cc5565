//! Line-oriented rendering of session snapshots.

use client_core::{ConnectionStatus, MessageOrigin, MessageView, SessionView};
use shared::domain::RoomKey;

/// Prints what changed between consecutive views: a room switch replays that
/// room's history, otherwise only new messages are printed.
#[derive(Default)]
pub struct Renderer {
    room: Option<RoomKey>,
    shown: usize,
    connection: Option<ConnectionStatus>,
}

impl Renderer {
    pub fn render(&mut self, view: &SessionView) -> Vec<String> {
        let mut lines = Vec::new();

        if self.connection != Some(view.connection) {
            lines.push(format!("-- {}", status_label(view.connection)));
            self.connection = Some(view.connection);
        }

        if self.room.as_ref() != Some(&view.current_room) {
            lines.push(format!("== {}", room_title(view)));
            self.room = Some(view.current_room.clone());
            self.shown = 0;
        }

        for entry in view.visible_messages.iter().skip(self.shown) {
            lines.push(message_line(entry));
        }
        self.shown = view.visible_messages.len();
        lines
    }
}

pub fn roster_lines(view: &SessionView) -> Vec<String> {
    if view.roster.is_empty() {
        return vec!["(nobody else is online)".to_string()];
    }
    view.roster
        .iter()
        .map(|entry| {
            let marker = if entry.selected { '*' } else { ' ' };
            format!("{marker} {}", entry.identity)
        })
        .collect()
}

fn room_title(view: &SessionView) -> String {
    match (&view.current_room, &view.identity) {
        (RoomKey::Global, _) => "All".to_string(),
        (RoomKey::Private(pair), Some(local)) => match pair.peer_of(local) {
            Some(peer) => format!("private with {peer}"),
            None => view.current_room.to_string(),
        },
        (RoomKey::Private(_), None) => view.current_room.to_string(),
    }
}

fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "disconnected",
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Connected => "connected",
    }
}

fn message_line(entry: &MessageView) -> String {
    let time = entry.display_time();
    let content = entry.message.content();
    match entry.origin {
        MessageOrigin::System => format!("[{time}] * {content}"),
        MessageOrigin::Local => format!("[{time}] > {content}"),
        MessageOrigin::Remote if entry.show_sender => {
            format!("[{time}] {}: {content}", entry.message.sender())
        }
        MessageOrigin::Remote => format!("[{time}] {content}"),
    }
}
