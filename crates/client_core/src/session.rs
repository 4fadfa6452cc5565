use std::sync::Arc;

use shared::{
    domain::{Identity, RoomKey},
    protocol::{ClientRequest, MessagePayload},
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    connection::{ConnectionError, ConnectionManager, ConnectionStatus, SessionEvent, Teardown},
    message_log::{Message, MessageLog},
    roster::PresenceRoster,
    transport::Transport,
    view::{MessageView, RosterEntry, SessionView},
};

const SESSION_CHANGE_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomTarget {
    Global,
    User(String),
}

/// Why an action left the session untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
    EmptyName,
    InvalidName,
    ReservedName,
    AlreadyJoined,
    NotJoined,
    EmptyMessage,
    InvalidTarget,
    SelfTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    Ignored(IgnoredReason),
}

/// Notification sent to the presentation layer after each state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    LoggedIn(Identity),
    RoomSelected(RoomKey),
    MessageAppended { room: RoomKey },
    RosterReplaced,
    ConnectionChanged(ConnectionStatus),
    /// Handlers were removed; no further events are applied until `attach`.
    Detached,
}

#[derive(Debug, Default)]
struct SessionState {
    identity: Option<Identity>,
    current_room: RoomKey,
    roster: PresenceRoster,
    log: MessageLog,
}

/// Owns the session state and the connection; the only place either changes.
///
/// User actions and inbound events both take `&mut self`, so they are
/// applied one at a time.
pub struct SessionController {
    connection: ConnectionManager,
    state: SessionState,
    changes: broadcast::Sender<SessionChange>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (changes, _) = broadcast::channel(SESSION_CHANGE_BUFFER);
        Self {
            connection: ConnectionManager::new(transport),
            state: SessionState::default(),
            changes,
        }
    }

    /// Registers transport handlers, then opens the transport unless it is
    /// already connected.
    pub async fn attach(&mut self) -> Result<(), ConnectionError> {
        self.connection.register_handlers()?;
        self.connection.start().await?;
        self.notify(SessionChange::ConnectionChanged(self.connection.status()));
        Ok(())
    }

    /// Stops listening. The transport session is left open.
    pub async fn detach(&mut self) -> Result<(), ConnectionError> {
        self.connection.teardown(Teardown::Detach).await?;
        self.notify(SessionChange::Detached);
        Ok(())
    }

    /// Stops listening and closes the transport.
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.connection.teardown(Teardown::Disconnect).await?;
        self.notify(SessionChange::ConnectionChanged(self.connection.status()));
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.connection.disconnect().await
    }

    pub async fn reconnect(&mut self) -> Result<(), ConnectionError> {
        self.connection.start().await?;
        self.notify(SessionChange::ConnectionChanged(self.connection.status()));
        Ok(())
    }

    pub async fn join(&mut self, raw_name: &str) -> Result<ActionOutcome, ConnectionError> {
        let name = raw_name.trim();
        if name.is_empty() {
            return Ok(ignored(IgnoredReason::EmptyName));
        }
        if let Some(current) = &self.state.identity {
            warn!(current = %current, requested = name, "session: join ignored, already joined");
            return Ok(ignored(IgnoredReason::AlreadyJoined));
        }
        let identity = match Identity::parse(name) {
            Ok(identity) => identity,
            Err(err) => {
                debug!(error = %err, "session: join ignored");
                return Ok(ignored(IgnoredReason::InvalidName));
            }
        };
        if identity.is_system() {
            return Ok(ignored(IgnoredReason::ReservedName));
        }

        self.connection
            .emit(ClientRequest::Join {
                name: identity.to_string(),
            })
            .await?;

        info!(identity = %identity, "session: joined");
        self.state.identity = Some(identity.clone());
        self.notify(SessionChange::LoggedIn(identity));
        Ok(ActionOutcome::Applied)
    }

    pub fn select_room(&mut self, target: RoomTarget) -> ActionOutcome {
        let room = match target {
            RoomTarget::Global => RoomKey::Global,
            RoomTarget::User(raw) => {
                let Some(local) = &self.state.identity else {
                    return ignored(IgnoredReason::NotJoined);
                };
                let Ok(peer) = Identity::parse(&raw) else {
                    return ignored(IgnoredReason::InvalidTarget);
                };
                match RoomKey::canonical_pair(local, &peer) {
                    Ok(room) => room,
                    Err(_) => return ignored(IgnoredReason::SelfTarget),
                }
            }
        };

        debug!(room = %room, "session: room selected");
        self.state.current_room = room.clone();
        self.notify(SessionChange::RoomSelected(room));
        ActionOutcome::Applied
    }

    /// Sends to the current room. The message is not added locally; the
    /// server's echo arrives through the inbound path like any other message.
    pub async fn send_message(
        &mut self,
        raw_content: &str,
    ) -> Result<ActionOutcome, ConnectionError> {
        let content = raw_content.trim();
        if content.is_empty() {
            return Ok(ignored(IgnoredReason::EmptyMessage));
        }
        let Some(sender) = &self.state.identity else {
            return Ok(ignored(IgnoredReason::NotJoined));
        };

        let payload = MessagePayload {
            content: content.to_string(),
            sender: sender.to_string(),
            room: self.state.current_room.to_string(),
        };
        debug!(room = %payload.room, "session: sending message");
        self.connection.emit(ClientRequest::Message(payload)).await?;
        Ok(ActionOutcome::Applied)
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected | SessionEvent::ConnectionLost { .. } => {
                self.notify(SessionChange::ConnectionChanged(self.connection.status()));
            }
            SessionEvent::MessageReceived(inbound) => {
                let room = inbound.room.clone();
                self.state.log.append(Message::received_now(
                    inbound.content,
                    inbound.sender,
                    inbound.room,
                ));
                self.notify(SessionChange::MessageAppended { room });
            }
            SessionEvent::RosterUpdated(users) => {
                self.state.roster.replace(users);
                self.notify(SessionChange::RosterReplaced);
            }
        }
    }

    /// Waits for one inbound event and applies it. Returns `false` once the
    /// session no longer receives events.
    pub async fn process_next(&mut self) -> bool {
        match self.connection.next_event().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Applies every event already queued, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.connection.try_next_event() {
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    pub fn current_view(&self) -> SessionView {
        let local = self.state.identity.as_ref();
        let current_room = &self.state.current_room;

        let visible_messages = self
            .state
            .log
            .view(current_room)
            .map(|message| MessageView::build(message, local))
            .collect();

        let others: Vec<&Identity> = match local {
            Some(local) => self.state.roster.all_except(local).collect(),
            None => self.state.roster.iter().collect(),
        };
        let selected_peer = local.and_then(|local| current_room.pair()?.peer_of(local));
        let roster = others
            .into_iter()
            .map(|identity| RosterEntry {
                identity: identity.clone(),
                selected: Some(identity) == selected_peer,
            })
            .collect();

        SessionView {
            logged_in: local.is_some(),
            identity: local.cloned(),
            current_room: current_room.clone(),
            connection: self.connection.status(),
            visible_messages,
            roster,
        }
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.state.identity.as_ref()
    }

    pub fn current_room(&self) -> &RoomKey {
        &self.state.current_room
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn roster(&self) -> &PresenceRoster {
        &self.state.roster
    }

    pub fn log(&self) -> &MessageLog {
        &self.state.log
    }

    fn notify(&self, change: SessionChange) {
        let _ = self.changes.send(change);
    }
}

fn ignored(reason: IgnoredReason) -> ActionOutcome {
    debug!(?reason, "session: action ignored");
    ActionOutcome::Ignored(reason)
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
