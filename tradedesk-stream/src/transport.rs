//! Transport socket: one physical duplex connection to one endpoint
//!
//! A transport opens sockets; each socket reports what happens to it as
//! [`SocketEvent`]s on a channel owned by the connection manager. Events are
//! tagged with the connection id they belong to so late events from a
//! replaced socket can be told apart.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Identifies one physical connection attempt
pub type ConnectionId = u64;

/// What happened on a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEventKind {
    /// Connection established
    Open,
    /// Text frame received
    Message(String),
    /// Transport-level error; a `Close` follows
    Error(String),
    /// Connection gone
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEvent {
    pub conn_id: ConnectionId,
    pub kind: SocketEventKind,
}

impl SocketEvent {
    pub fn new(conn_id: ConnectionId, kind: SocketEventKind) -> Self {
        Self { conn_id, kind }
    }
}

/// Write half of an open (or opening) socket
pub trait Socket: Send {
    /// Queue a text frame for writing
    fn send(&mut self, frame: String);

    /// Tear the socket down; no further events are expected from it
    fn close(&mut self);
}

/// Opens sockets to an endpoint
pub trait Transport: Send + 'static {
    /// Start opening a socket. Completion, traffic and failure are reported
    /// through `events`, never by blocking the caller.
    fn open(
        &mut self,
        url: &str,
        conn_id: ConnectionId,
        events: mpsc::Sender<SocketEvent>,
    ) -> Box<dyn Socket>;
}

// ============================================================================
// WebSocket Transport
// ============================================================================

/// Commands for a running websocket task
#[derive(Debug)]
enum Outbound {
    Frame(String),
    Close,
}

/// `tokio-tungstenite` backed transport
#[derive(Debug, Clone, Default)]
pub struct WsTransport {
    ping_interval: Option<Duration>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send a client keepalive ping on a fixed interval
    pub fn with_ping_interval(mut self, ping_interval: Option<Duration>) -> Self {
        self.ping_interval = ping_interval.filter(|d| !d.is_zero());
        self
    }
}

impl Transport for WsTransport {
    fn open(
        &mut self,
        url: &str,
        conn_id: ConnectionId,
        events: mpsc::Sender<SocketEvent>,
    ) -> Box<dyn Socket> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let url = url.to_string();
        let ping_interval = self.ping_interval;

        tokio::spawn(async move {
            run_socket(url, conn_id, events, outbound_rx, ping_interval).await;
        });

        Box::new(WsSocket { outbound_tx })
    }
}

struct WsSocket {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

impl Socket for WsSocket {
    fn send(&mut self, frame: String) {
        if self.outbound_tx.send(Outbound::Frame(frame)).is_err() {
            debug!("[Stream WS] Socket task already finished, frame discarded");
        }
    }

    fn close(&mut self) {
        let _ = self.outbound_tx.send(Outbound::Close);
    }
}

/// Drive one websocket from connect to close
async fn run_socket(
    url: String,
    conn_id: ConnectionId,
    events: mpsc::Sender<SocketEvent>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    ping_interval: Option<Duration>,
) {
    let emit = |kind| SocketEvent::new(conn_id, kind);

    info!("[Stream WS] Connecting to {} (conn {})", url, conn_id);

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            error!("[Stream WS] Connection failed: {}", e);
            let _ = events.send(emit(SocketEventKind::Error(e.to_string()))).await;
            let _ = events.send(emit(SocketEventKind::Close)).await;
            return;
        }
    };

    if events.send(emit(SocketEventKind::Open)).await.is_err() {
        return;
    }

    let (mut write, mut read) = ws_stream.split();
    let mut ping_timer = ping_interval.map(|period| interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            // Handle incoming messages
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(emit(SocketEventKind::Message(text.as_str().to_string()))).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => {
                            if events.send(emit(SocketEventKind::Message(text))).await.is_err() {
                                return;
                            }
                        }
                        Err(_) => debug!("[Stream WS] Dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!("[Stream WS] Failed to send pong: {}", e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("[Stream WS] Connection closed by server");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("[Stream WS] Error: {}", e);
                        let _ = events.send(emit(SocketEventKind::Error(e.to_string()))).await;
                        break;
                    }
                    None => {
                        info!("[Stream WS] Stream ended");
                        break;
                    }
                    _ => {}
                }
            }

            // Handle outgoing frames
            cmd = outbound_rx.recv() => {
                match cmd {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = write.send(Message::Text(frame.into())).await {
                            warn!("[Stream WS] Failed to send frame: {}", e);
                            let _ = events.send(emit(SocketEventKind::Error(e.to_string()))).await;
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        debug!("[Stream WS] Closing conn {} on request", conn_id);
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                }
            }

            // Client keepalive
            _ = tick(&mut ping_timer) => {
                if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                    warn!("[Stream WS] Failed to send ping: {}", e);
                    break;
                }
            }
        }
    }

    let _ = events.send(emit(SocketEventKind::Close)).await;
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ============================================================================
// Recording Transport (tests)
// ============================================================================

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorded {
        opens: Vec<(String, ConnectionId, mpsc::Sender<SocketEvent>)>,
        sent: Vec<(ConnectionId, String)>,
        closed: Vec<ConnectionId>,
    }

    /// Transport that records opens and writes; events are injected by the test
    #[derive(Clone, Default)]
    pub(crate) struct RecordingTransport {
        inner: Arc<Mutex<Recorded>>,
    }

    impl RecordingTransport {
        pub(crate) fn open_count(&self) -> usize {
            self.inner.lock().opens.len()
        }

        pub(crate) fn last_conn(&self) -> ConnectionId {
            self.inner.lock().opens.last().map(|(_, id, _)| *id).unwrap_or(0)
        }

        pub(crate) fn last_url(&self) -> Option<String> {
            self.inner.lock().opens.last().map(|(url, _, _)| url.clone())
        }

        pub(crate) fn sent(&self) -> Vec<String> {
            self.inner.lock().sent.iter().map(|(_, f)| f.clone()).collect()
        }

        pub(crate) fn sent_on(&self, conn_id: ConnectionId) -> Vec<String> {
            self.inner
                .lock()
                .sent
                .iter()
                .filter(|(id, _)| *id == conn_id)
                .map(|(_, f)| f.clone())
                .collect()
        }

        pub(crate) fn closed(&self) -> Vec<ConnectionId> {
            self.inner.lock().closed.clone()
        }

        /// Push an event for the most recently opened socket
        pub(crate) async fn emit(&self, kind: SocketEventKind) {
            let target = self
                .inner
                .lock()
                .opens
                .last()
                .map(|(_, id, tx)| (*id, tx.clone()));
            if let Some((conn_id, tx)) = target {
                tx.send(SocketEvent::new(conn_id, kind)).await.unwrap();
            }
        }
    }

    impl Transport for RecordingTransport {
        fn open(
            &mut self,
            url: &str,
            conn_id: ConnectionId,
            events: mpsc::Sender<SocketEvent>,
        ) -> Box<dyn Socket> {
            self.inner.lock().opens.push((url.to_string(), conn_id, events));
            Box::new(RecordingSocket {
                conn_id,
                inner: Arc::clone(&self.inner),
            })
        }
    }

    struct RecordingSocket {
        conn_id: ConnectionId,
        inner: Arc<Mutex<Recorded>>,
    }

    impl Socket for RecordingSocket {
        fn send(&mut self, frame: String) {
            self.inner.lock().sent.push((self.conn_id, frame));
        }

        fn close(&mut self) {
            self.inner.lock().closed.push(self.conn_id);
        }
    }
}
