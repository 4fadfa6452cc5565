//! Transport seam: the bidirectional event channel the session runs over.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::{ClientRequest, ServerEvent};
use tokio::sync::mpsc;

/// Raw events surfaced by a transport. Frames are undecoded JSON text; the
/// connection manager turns them into typed session events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    Frame(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Begins opening the session. Completion is reported through
    /// [`TransportEvent::Connected`], not through the return value.
    async fn open(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
    async fn emit(&self, request: ClientRequest) -> Result<()>;
    /// Every event published after this call, in order and without loss.
    fn subscribe_events(&self) -> mpsc::UnboundedReceiver<TransportEvent>;
    /// Whether the session is currently established. Lets a listener that
    /// missed lifecycle events catch up when it subscribes.
    fn is_connected(&self) -> bool;
}

/// Fans transport events out to every live subscriber. Each subscriber owns
/// an unbounded queue, so a slow consumer delays events but never drops them.
#[derive(Default)]
pub struct EventHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<TransportEvent>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers().push(tx);
        rx
    }

    /// Delivers `event` to every subscriber; dropped receivers are pruned.
    pub fn publish(&self, event: TransportEvent) {
        self.subscribers()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|subscriber| !subscriber.is_closed());
        subscribers.len()
    }
}

/// In-process transport. Records everything emitted and lets the caller
/// inject inbound events. In relay mode it also plays the server: join
/// announcements grow the roster and messages are echoed back to the sender.
pub struct MemoryTransport {
    events: EventHub,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    open: bool,
    relay: bool,
    connect_on_open: bool,
    roster: Vec<String>,
    emitted: Vec<ClientRequest>,
    open_calls: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_state(MemoryState {
            connect_on_open: true,
            ..MemoryState::default()
        })
    }

    /// A transport whose server side echoes messages and maintains the roster.
    pub fn relay() -> Self {
        Self::with_state(MemoryState {
            connect_on_open: true,
            relay: true,
            ..MemoryState::default()
        })
    }

    /// Stays in the opening phase until [`MemoryTransport::inject`] delivers
    /// a `Connected` event.
    pub fn manual() -> Self {
        Self::with_state(MemoryState::default())
    }

    fn with_state(state: MemoryState) -> Self {
        Self {
            events: EventHub::new(),
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn inject(&self, event: TransportEvent) {
        if matches!(event, TransportEvent::Connected) {
            self.state().open = true;
        } else if matches!(event, TransportEvent::Disconnected { .. }) {
            self.state().open = false;
        }
        self.events.publish(event);
    }

    pub fn inject_server_event(&self, event: &ServerEvent) -> Result<()> {
        let frame = serde_json::to_string(event)?;
        self.inject(TransportEvent::Frame(frame));
        Ok(())
    }

    pub fn emitted(&self) -> Vec<ClientRequest> {
        self.state().emitted.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn open_calls(&self) -> usize {
        self.state().open_calls
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self) -> Result<()> {
        let connect = {
            let mut state = self.state();
            state.open_calls += 1;
            state.connect_on_open
        };
        if connect {
            self.inject(TransportEvent::Connected);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.inject(TransportEvent::Disconnected {
            reason: "client disconnect".to_string(),
        });
        Ok(())
    }

    async fn emit(&self, request: ClientRequest) -> Result<()> {
        let echo = {
            let mut state = self.state();
            if !state.open {
                return Err(anyhow!("transport is not open; dropped {}", request.name()));
            }
            state.emitted.push(request.clone());
            if !state.relay {
                None
            } else {
                match request {
                    ClientRequest::Join { name } => {
                        if !state.roster.contains(&name) {
                            state.roster.push(name);
                        }
                        Some(ServerEvent::UpdateUsers(state.roster.clone()))
                    }
                    ClientRequest::Message(payload) => Some(ServerEvent::Message(payload)),
                }
            }
        };

        if let Some(event) = echo {
            self.inject_server_event(&event)?;
        }
        Ok(())
    }

    fn subscribe_events(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.events.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.state().open
    }
}
