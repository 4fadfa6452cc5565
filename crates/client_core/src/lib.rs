//! Client-side chat session: identity, presence roster, per-room history and
//! the connection lifecycle, exposed as a render-ready [`SessionView`].

pub mod connection;
pub mod message_log;
pub mod roster;
pub mod session;
pub mod transport;
pub mod view;
pub mod ws_transport;

pub use connection::{
    ConnectionError, ConnectionManager, ConnectionStatus, InboundMessage, SessionEvent, Teardown,
};
pub use message_log::{Message, MessageLog};
pub use roster::PresenceRoster;
pub use session::{ActionOutcome, IgnoredReason, RoomTarget, SessionChange, SessionController};
pub use transport::{EventHub, MemoryTransport, Transport, TransportEvent};
pub use view::{format_timestamp, MessageOrigin, MessageView, RosterEntry, SessionView};
pub use ws_transport::{websocket_url, WsTransport};
