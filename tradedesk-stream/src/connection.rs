//! Connection manager: lifecycle state machine and reconnect policy
//!
//! The manager owns the single socket and the [`ConnectionState`]. It is
//! driven by caller commands (`connect`, `disconnect`, `send`), by socket
//! events, and by its reconnect deadline, which the owning task sleeps on.
//! Nothing here blocks or propagates errors out of an event handler.

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use tradedesk_core::{ClientFrame, ConnectionState, InboundMessage, ReconnectPolicy, StreamEvent};

use crate::registry::FrameSink;
use crate::transport::{ConnectionId, Socket, SocketEvent, SocketEventKind, Transport};

/// What a socket event produced for the rest of the client
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerOutput {
    /// The connection just became live; subscriptions should be replayed
    Live,
    /// A well-formed inbound frame for the dispatcher
    Inbound(InboundMessage),
}

pub struct ConnectionManager {
    url: String,
    policy: ReconnectPolicy,
    transport: Box<dyn Transport>,
    /// Handed to every socket the transport opens
    socket_events: mpsc::Sender<SocketEvent>,
    socket: Option<Box<dyn Socket>>,
    /// Id of the socket whose events are current
    conn_id: ConnectionId,
    next_conn_id: ConnectionId,
    state: ConnectionState,
    attempts: u32,
    reconnect_at: Option<Instant>,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<StreamEvent>,
}

impl ConnectionManager {
    pub fn new(
        url: impl Into<String>,
        policy: ReconnectPolicy,
        transport: Box<dyn Transport>,
        socket_events: mpsc::Sender<SocketEvent>,
        state_tx: watch::Sender<ConnectionState>,
        event_tx: broadcast::Sender<StreamEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            policy,
            transport,
            socket_events,
            socket: None,
            conn_id: 0,
            next_conn_id: 1,
            state: ConnectionState::Disconnected,
            attempts: 0,
            reconnect_at: None,
            state_tx,
            event_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive automatic reconnects since the connection was last live
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the pending automatic reconnect is due, if any
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Caller-initiated connect
    ///
    /// From `Disconnected` or `Closed` this starts a fresh attempt budget;
    /// from `Reconnecting` it skips the remaining delay. Already connecting
    /// or live is a no-op.
    pub fn connect(&mut self) {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Closed => {
                self.attempts = 0;
                self.reconnect_at = None;
                self.open_socket();
            }
            ConnectionState::Reconnecting => {
                self.reconnect_at = None;
                self.open_socket();
            }
            ConnectionState::Connecting | ConnectionState::Live => {
                debug!("[Stream] connect() ignored while {}", self.state);
            }
        }
    }

    /// Run the scheduled reconnect, if one is pending
    pub fn fire_reconnect(&mut self) {
        if self.state != ConnectionState::Reconnecting || self.reconnect_at.take().is_none() {
            return;
        }
        info!(
            "[Stream] Reconnecting (attempt {}/{})",
            self.attempts,
            self.policy.max_attempts()
        );
        self.open_socket();
    }

    /// Caller-initiated teardown; cancels any scheduled reconnect
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
        self.reconnect_at = None;
        self.transition(ConnectionState::Closed);
    }

    /// Best-effort send: written only while live, silently skipped otherwise
    pub fn send(&mut self, frame: &ClientFrame) -> bool {
        if self.state != ConnectionState::Live {
            debug!("[Stream] Not live ({}), skipping {:?}", self.state, frame);
            return false;
        }
        let Some(socket) = self.socket.as_mut() else {
            return false;
        };

        match frame.to_json() {
            Ok(json) => {
                socket.send(json);
                true
            }
            Err(e) => {
                error!("[Stream] Failed to encode frame: {}", e);
                false
            }
        }
    }

    /// Apply one socket event to the state machine
    pub fn handle_event(&mut self, event: SocketEvent) -> Option<ManagerOutput> {
        if event.conn_id != self.conn_id || self.socket.is_none() {
            debug!(
                "[Stream] Ignoring {:?} from stale conn {}",
                event.kind, event.conn_id
            );
            return None;
        }

        match event.kind {
            SocketEventKind::Open => {
                if self.state != ConnectionState::Connecting {
                    return None;
                }
                info!("[Stream] Connected to {}", self.url);
                self.attempts = 0;
                self.transition(ConnectionState::Live);
                Some(ManagerOutput::Live)
            }
            SocketEventKind::Message(text) => {
                if self.state != ConnectionState::Live {
                    return None;
                }
                match InboundMessage::parse(&text) {
                    Ok(message) => Some(ManagerOutput::Inbound(message)),
                    Err(e) => {
                        debug!("[Stream] Dropping frame: {} ({})", e, text);
                        None
                    }
                }
            }
            SocketEventKind::Error(message) => {
                warn!("[Stream] Transport error: {}", message);
                let _ = self.event_tx.send(StreamEvent::TransportError { message });
                None
            }
            SocketEventKind::Close => {
                if matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Live
                ) {
                    self.socket = None;
                    self.on_socket_closed();
                }
                None
            }
        }
    }

    fn on_socket_closed(&mut self) {
        if self.policy.allows(self.attempts) {
            self.attempts += 1;
            let delay = self.policy.interval();
            self.reconnect_at = Some(Instant::now() + delay);
            info!(
                "[Stream] Connection lost, reconnecting in {:?} (attempt {})",
                delay, self.attempts
            );
            self.transition(ConnectionState::Reconnecting);
            let _ = self.event_tx.send(StreamEvent::ReconnectScheduled {
                attempt: self.attempts,
                delay,
            });
        } else {
            error!(
                "[Stream] Max reconnect attempts reached ({}), staying disconnected",
                self.attempts
            );
            self.transition(ConnectionState::Disconnected);
            let _ = self.event_tx.send(StreamEvent::ReconnectExhausted {
                attempts: self.attempts,
            });
        }
    }

    fn open_socket(&mut self) {
        if let Some(mut stale) = self.socket.take() {
            stale.close();
        }
        self.conn_id = self.next_conn_id;
        self.next_conn_id += 1;
        self.socket = Some(
            self.transport
                .open(&self.url, self.conn_id, self.socket_events.clone()),
        );
        self.transition(ConnectionState::Connecting);
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!("[Stream] {} -> {}", from, to);
        self.state_tx.send_replace(to);
        let _ = self.event_tx.send(StreamEvent::StateChanged { from, to });
    }
}

impl FrameSink for ConnectionManager {
    fn is_live(&self) -> bool {
        self.state.is_live()
    }

    fn send_frame(&mut self, frame: &ClientFrame) -> bool {
        self.send(frame)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("conn_id", &self.conn_id)
            .finish()
    }
}
