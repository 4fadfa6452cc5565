use super::*;
use crate::transport::{EventHub, MemoryTransport};
use anyhow::{anyhow, Result};
use async_trait::async_trait;

struct FailingTransport {
    events: EventHub,
}

impl FailingTransport {
    fn new() -> Self {
        Self {
            events: EventHub::new(),
        }
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn open(&self) -> Result<()> {
        Err(anyhow!("connection refused"))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn emit(&self, _request: ClientRequest) -> Result<()> {
        Err(anyhow!("transport is not open"))
    }

    fn subscribe_events(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.events.subscribe()
    }

    fn is_connected(&self) -> bool {
        false
    }
}

fn manager_with(transport: &Arc<MemoryTransport>) -> ConnectionManager {
    ConnectionManager::new(Arc::clone(transport) as Arc<dyn Transport>)
}

#[tokio::test]
async fn status_follows_transport_lifecycle_events() {
    let transport = Arc::new(MemoryTransport::manual());
    let mut manager = manager_with(&transport);
    manager.register_handlers().expect("register");
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);

    manager.start().await.expect("start");
    assert_eq!(manager.status(), ConnectionStatus::Connecting);
    assert_eq!(manager.try_next_event(), None);

    transport.inject(TransportEvent::Connected);
    assert_eq!(manager.try_next_event(), Some(SessionEvent::Connected));
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    transport.inject(TransportEvent::Disconnected {
        reason: "transport close".into(),
    });
    assert_eq!(
        manager.try_next_event(),
        Some(SessionEvent::ConnectionLost {
            reason: "transport close".into()
        })
    );
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn start_is_idempotent_while_active() {
    let transport = Arc::new(MemoryTransport::manual());
    let mut manager = manager_with(&transport);
    manager.register_handlers().expect("register");

    manager.start().await.expect("first start");
    manager.start().await.expect("second start while connecting");
    transport.inject(TransportEvent::Connected);
    manager.try_next_event();
    manager.start().await.expect("third start while connected");

    assert_eq!(transport.open_calls(), 1);
}

#[tokio::test]
async fn no_automatic_reconnect_after_drop() {
    let transport = Arc::new(MemoryTransport::new());
    let mut manager = manager_with(&transport);
    manager.register_handlers().expect("register");
    manager.start().await.expect("start");
    manager.try_next_event();

    transport.inject(TransportEvent::Disconnected {
        reason: "ping timeout".into(),
    });
    manager.try_next_event();
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(transport.open_calls(), 1);

    manager.start().await.expect("explicit restart");
    assert_eq!(transport.open_calls(), 2);
    assert_eq!(manager.try_next_event(), Some(SessionEvent::Connected));
}

#[tokio::test]
async fn failed_open_returns_to_disconnected() {
    let mut manager = ConnectionManager::new(Arc::new(FailingTransport::new()));
    let err = manager.start().await.expect_err("open must fail");
    assert!(matches!(err, ConnectionError::Open(_)));
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
}

#[test]
fn double_registration_is_rejected() {
    let transport = Arc::new(MemoryTransport::new());
    let mut manager = manager_with(&transport);
    manager.register_handlers().expect("register");
    let err = manager.register_handlers().expect_err("second register");
    assert!(matches!(err, ConnectionError::HandlersAlreadyRegistered));
    assert_eq!(transport.subscriber_count(), 1);
}

#[tokio::test]
async fn detach_unsubscribes_without_closing_transport() {
    let transport = Arc::new(MemoryTransport::new());
    let mut manager = manager_with(&transport);
    manager.register_handlers().expect("register");
    manager.start().await.expect("start");
    manager.try_next_event();

    manager.teardown(Teardown::Detach).await.expect("detach");
    assert!(!manager.has_handlers());
    assert_eq!(transport.subscriber_count(), 0);
    assert!(transport.is_open());
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    manager.register_handlers().expect("register again after teardown");
    assert_eq!(transport.subscriber_count(), 1);
}

#[tokio::test]
async fn registering_after_missed_drop_resyncs_status() {
    let transport = Arc::new(MemoryTransport::new());
    let mut manager = manager_with(&transport);
    manager.register_handlers().expect("register");
    manager.start().await.expect("start");
    manager.try_next_event();
    manager.teardown(Teardown::Detach).await.expect("detach");

    transport.inject(TransportEvent::Disconnected {
        reason: "server restart".into(),
    });
    assert_eq!(manager.status(), ConnectionStatus::Connected);

    manager.register_handlers().expect("register again");
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    manager.start().await.expect("restart");
    assert_eq!(transport.open_calls(), 2);
    assert_eq!(manager.try_next_event(), Some(SessionEvent::Connected));
    assert_eq!(manager.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn registering_after_missed_connect_resyncs_status() {
    let transport = Arc::new(MemoryTransport::manual());
    let mut manager = manager_with(&transport);
    manager.register_handlers().expect("register");
    manager.start().await.expect("start");
    manager.teardown(Teardown::Detach).await.expect("detach");
    assert_eq!(manager.status(), ConnectionStatus::Connecting);

    transport.inject(TransportEvent::Connected);
    manager.register_handlers().expect("register again");
    assert_eq!(manager.status(), ConnectionStatus::Connected);
    assert_eq!(manager.try_next_event(), None);
}

#[tokio::test]
async fn burst_of_frames_is_delivered_in_full() {
    let transport = Arc::new(MemoryTransport::new());
    let mut manager = manager_with(&transport);
    manager.register_handlers().expect("register");

    for n in 0..2_000 {
        transport.inject(TransportEvent::Frame(format!(
            r#"{{"type":"message","payload":{{"content":"m{n}","sender":"bob","room":"Global"}}}}"#
        )));
    }

    let mut received = Vec::new();
    while let Some(SessionEvent::MessageReceived(message)) = manager.try_next_event() {
        received.push(message.content);
    }
    assert_eq!(received.len(), 2_000);
    assert_eq!(received.first().map(String::as_str), Some("m0"));
    assert_eq!(received.last().map(String::as_str), Some("m1999"));
}

#[tokio::test]
async fn disconnect_teardown_closes_transport() {
    let transport = Arc::new(MemoryTransport::new());
    let mut manager = manager_with(&transport);
    manager.register_handlers().expect("register");
    manager.start().await.expect("start");
    manager.try_next_event();

    manager
        .teardown(Teardown::Disconnect)
        .await
        .expect("teardown");
    assert!(!transport.is_open());
    assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    assert_eq!(manager.try_next_event(), None);
}

#[tokio::test]
async fn next_event_skips_malformed_frames() {
    let transport = Arc::new(MemoryTransport::new());
    let mut manager = manager_with(&transport);
    manager.register_handlers().expect("register");

    transport.inject(TransportEvent::Frame("not json".into()));
    transport.inject(TransportEvent::Frame(r#"{"type":"typing","payload":{}}"#.into()));
    transport.inject(TransportEvent::Frame(
        r#"{"type":"message","payload":{"content":"hi","sender":"bob","room":"bob-alice"}}"#.into(),
    ));

    let event = manager.next_event().await.expect("event");
    assert_eq!(
        event,
        SessionEvent::MessageReceived(InboundMessage {
            content: "hi".into(),
            sender: Identity::parse("bob").expect("identity"),
            room: RoomKey::canonical_pair_raw("alice", "bob").expect("room"),
        })
    );
}

#[test]
fn decode_frame_drops_invalid_messages() {
    let frames = [
        r#"{"type":"message","payload":{"content":"hi","room":"Global"}}"#,
        r#"{"type":"message","payload":{"content":"  ","sender":"bob","room":"Global"}}"#,
        r#"{"type":"message","payload":{"content":"hi","sender":" ","room":"Global"}}"#,
        r#"{"type":"message","payload":{"content":"hi","sender":"bob","room":"a-b-c"}}"#,
        r#"{"type":"message","payload":{"content":"hi","sender":"bob","room":"bob-bob"}}"#,
    ];
    for frame in frames {
        assert_eq!(decode_frame(frame), None, "{frame}");
    }
}

#[test]
fn decode_frame_skips_invalid_roster_entries() {
    let event = decode_frame(r#"{"type":"update_users","payload":["alice","","mary-jane","bob"]}"#);
    let expected = ["alice", "bob"]
        .iter()
        .map(|name| Identity::parse(name).expect("identity"))
        .collect();
    assert_eq!(event, Some(SessionEvent::RosterUpdated(expected)));
}

#[tokio::test]
async fn emit_failure_is_reported_with_request_name() {
    let manager = ConnectionManager::new(Arc::new(FailingTransport::new()));
    let err = manager
        .emit(ClientRequest::Join {
            name: "alice".into(),
        })
        .await
        .expect_err("emit must fail");
    match err {
        ConnectionError::Emit { request, reason } => {
            assert_eq!(request, "join");
            assert!(reason.contains("not open"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
