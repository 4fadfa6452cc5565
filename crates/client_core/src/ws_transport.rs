use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::protocol::ClientRequest;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};
use url::Url;

use crate::transport::{EventHub, Transport, TransportEvent};

/// Builds the websocket endpoint for an `http(s)://` or `ws(s)://` server URL.
pub fn websocket_url(server_url: &str) -> Result<Url> {
    let mut url = Url::parse(server_url.trim())
        .with_context(|| format!("invalid server url: {server_url}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("unsupported server url scheme: {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot use scheme {scheme} for {server_url}"))?;

    let path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with("/ws") {
        url.set_path(&format!("{path}/ws"));
    }
    Ok(url)
}

/// JSON-over-websocket transport. Each request is one text frame.
///
/// `open` returns immediately; the connection is made by a background task
/// that reports `Connected` and, when the socket ends for any reason,
/// `Disconnected`. Requests emitted while connecting are queued.
pub struct WsTransport {
    url: Url,
    events: Arc<EventHub>,
    inner: Mutex<WsState>,
}

#[derive(Default)]
struct WsState {
    outbound: Option<mpsc::UnboundedSender<String>>,
    task: Option<JoinHandle<()>>,
    /// Set by the current socket task while its handshake is complete.
    connected: Arc<AtomicBool>,
}

impl WsTransport {
    pub fn new(server_url: &str) -> Result<Self> {
        let url = websocket_url(server_url)?;
        Ok(Self {
            url,
            events: Arc::new(EventHub::new()),
            inner: Mutex::new(WsState::default()),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn state(&self) -> MutexGuard<'_, WsState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self) -> Result<()> {
        let mut state = self.state();
        let running = state.task.as_ref().is_some_and(|task| !task.is_finished());
        if running && state.outbound.is_some() {
            debug!(url = %self.url, "ws: already open");
            return Ok(());
        }
        // A task still running without a sender is winding down after `close`.
        if let Some(stale) = state.task.take() {
            stale.abort();
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        state.outbound = Some(outbound_tx);
        state.connected = Arc::clone(&connected);
        state.task = Some(tokio::spawn(run_socket(
            self.url.clone(),
            outbound_rx,
            Arc::clone(&self.events),
            connected,
        )));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Dropping the sender makes the socket task send a close frame and exit.
        if self.state().outbound.take().is_some() {
            debug!(url = %self.url, "ws: close requested");
        }
        Ok(())
    }

    async fn emit(&self, request: ClientRequest) -> Result<()> {
        let frame = serde_json::to_string(&request)?;
        let state = self.state();
        let outbound = state
            .outbound
            .as_ref()
            .ok_or_else(|| anyhow!("websocket is not open"))?;
        outbound
            .send(frame)
            .map_err(|_| anyhow!("websocket task has stopped"))
    }

    fn subscribe_events(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        self.events.subscribe()
    }

    fn is_connected(&self) -> bool {
        let state = self.state();
        state.outbound.is_some() && state.connected.load(Ordering::Acquire)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(task) = self.state().task.take() {
            task.abort();
        }
    }
}

async fn run_socket(
    url: Url,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: Arc<EventHub>,
    connected: Arc<AtomicBool>,
) {
    let reason = match connect_async(url.as_str()).await {
        Ok((stream, _)) => {
            info!(%url, "ws: connected");
            connected.store(true, Ordering::Release);
            events.publish(TransportEvent::Connected);
            let (mut writer, mut reader) = stream.split();
            loop {
                tokio::select! {
                    frame = outbound.recv() => match frame {
                        Some(frame) => {
                            if let Err(err) = writer.send(Message::Text(frame)).await {
                                break format!("websocket send failed: {err}");
                            }
                        }
                        None => {
                            let _ = writer.send(Message::Close(None)).await;
                            break "client disconnect".to_string();
                        }
                    },
                    inbound = reader.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            events.publish(TransportEvent::Frame(text));
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break frame
                                .map(|frame| frame.reason.to_string())
                                .filter(|reason| !reason.is_empty())
                                .unwrap_or_else(|| "server closed connection".to_string());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => break format!("websocket receive failed: {err}"),
                        None => break "websocket stream ended".to_string(),
                    },
                }
            }
        }
        Err(err) => format!("failed to connect websocket {url}: {err}"),
    };

    connected.store(false, Ordering::Release);
    events.publish(TransportEvent::Disconnected { reason });
}
