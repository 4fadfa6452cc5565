use std::sync::Arc;

use shared::{
    domain::{Identity, RoomKey},
    protocol::{ClientRequest, MessagePayload, ServerEvent},
};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::transport::{Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// A chat message that passed boundary validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub content: String,
    pub sender: Identity,
    pub room: RoomKey,
}

/// Typed events handed to the session, one per accepted transport event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    ConnectionLost { reason: String },
    MessageReceived(InboundMessage),
    RosterUpdated(Vec<Identity>),
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("event handlers are already registered for this session")]
    HandlersAlreadyRegistered,
    #[error("failed to open transport: {0}")]
    Open(String),
    #[error("failed to close transport: {0}")]
    Close(String),
    #[error("transport rejected {request}: {reason}")]
    Emit {
        request: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Stop listening; the transport session stays open.
    Detach,
    /// Stop listening and close the transport session.
    Disconnect,
}

/// Owns the transport and the single event subscription of a session.
///
/// Status moves `Disconnected -> Connecting` on [`ConnectionManager::start`];
/// every other transition comes from a transport lifecycle event. Nothing
/// reconnects automatically.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    status: ConnectionStatus,
    subscription: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            status: ConnectionStatus::Disconnected,
            subscription: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn has_handlers(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribes to transport events. A second call before
    /// [`ConnectionManager::teardown`] is rejected so no event is delivered twice.
    ///
    /// Lifecycle events that fired while no handlers were registered are
    /// lost, so the status is re-read from the transport here.
    pub fn register_handlers(&mut self) -> Result<(), ConnectionError> {
        if self.subscription.is_some() {
            return Err(ConnectionError::HandlersAlreadyRegistered);
        }
        self.subscription = Some(self.transport.subscribe_events());
        debug!("connection: handlers registered");

        let status = if self.transport.is_connected() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
        if status != self.status {
            info!(from = ?self.status, to = ?status, "connection: status resynced from transport");
            self.status = status;
        }
        Ok(())
    }

    pub async fn start(&mut self) -> Result<(), ConnectionError> {
        if self.status != ConnectionStatus::Disconnected {
            debug!(status = ?self.status, "connection: start ignored, session already active");
            return Ok(());
        }

        self.status = ConnectionStatus::Connecting;
        info!("connection: opening transport");
        if let Err(err) = self.transport.open().await {
            self.status = ConnectionStatus::Disconnected;
            warn!(error = %err, "connection: transport open failed");
            return Err(ConnectionError::Open(err.to_string()));
        }
        Ok(())
    }

    /// Closes the transport but keeps listening, so the resulting
    /// connection-lost event still reaches the session.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        info!("connection: closing transport");
        self.transport
            .close()
            .await
            .map_err(|err| ConnectionError::Close(err.to_string()))
    }

    pub async fn teardown(&mut self, mode: Teardown) -> Result<(), ConnectionError> {
        if self.subscription.take().is_some() {
            debug!("connection: handlers removed");
        }
        if mode == Teardown::Disconnect {
            self.transport
                .close()
                .await
                .map_err(|err| ConnectionError::Close(err.to_string()))?;
            self.status = ConnectionStatus::Disconnected;
        }
        Ok(())
    }

    pub async fn emit(&self, request: ClientRequest) -> Result<(), ConnectionError> {
        let name = request.name();
        self.transport
            .emit(request)
            .await
            .map_err(|err| ConnectionError::Emit {
                request: name,
                reason: err.to_string(),
            })
    }

    /// Waits for the next valid event. Returns `None` once handlers are
    /// removed or the transport goes away.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let receiver = self.subscription.as_mut()?;
            let Some(event) = receiver.recv().await else {
                self.subscription = None;
                return None;
            };
            if let Some(event) = self.normalize(event) {
                return Some(event);
            }
        }
    }

    /// Non-blocking variant of [`ConnectionManager::next_event`].
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let receiver = self.subscription.as_mut()?;
            let event = match receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    self.subscription = None;
                    return None;
                }
            };
            if let Some(event) = self.normalize(event) {
                return Some(event);
            }
        }
    }

    fn normalize(&mut self, event: TransportEvent) -> Option<SessionEvent> {
        match event {
            TransportEvent::Connected => {
                self.status = ConnectionStatus::Connected;
                info!("connection: established");
                Some(SessionEvent::Connected)
            }
            TransportEvent::Disconnected { reason } => {
                self.status = ConnectionStatus::Disconnected;
                warn!(%reason, "connection: lost");
                Some(SessionEvent::ConnectionLost { reason })
            }
            TransportEvent::Frame(frame) => decode_frame(&frame),
        }
    }
}

pub(crate) fn decode_frame(frame: &str) -> Option<SessionEvent> {
    let event = match serde_json::from_str::<ServerEvent>(frame) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "connection: dropping malformed server frame");
            return None;
        }
    };

    match event {
        ServerEvent::Message(payload) => decode_message(payload).map(SessionEvent::MessageReceived),
        ServerEvent::UpdateUsers(users) => Some(SessionEvent::RosterUpdated(decode_roster(users))),
    }
}

fn decode_message(payload: MessagePayload) -> Option<InboundMessage> {
    if payload.content.trim().is_empty() {
        warn!(sender = %payload.sender, "connection: dropping message with empty content");
        return None;
    }
    let sender = match Identity::parse(&payload.sender) {
        Ok(sender) => sender,
        Err(err) => {
            warn!(error = %err, "connection: dropping message with invalid sender");
            return None;
        }
    };
    let room = match payload.room.parse::<RoomKey>() {
        Ok(room) => room,
        Err(err) => {
            warn!(error = %err, sender = %sender, "connection: dropping message with invalid room");
            return None;
        }
    };
    Some(InboundMessage {
        content: payload.content,
        sender,
        room,
    })
}

fn decode_roster(users: Vec<String>) -> Vec<Identity> {
    users
        .into_iter()
        .filter_map(|raw| match Identity::parse(&raw) {
            Ok(identity) => Some(identity),
            Err(err) => {
                warn!(error = %err, "connection: skipping invalid roster entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/connection_tests.rs"]
mod tests;
