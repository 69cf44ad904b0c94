//! Stream client: explicit handle around the single-task actor
//!
//! All mutable state (connection manager, registry, dispatcher and the write
//! side of the read models) lives on one spawned task. The handle talks to
//! it through a command channel; socket events arrive on a second channel and
//! the reconnect deadline is the only timer.

use std::future::pending;

use parking_lot::Mutex;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use tradedesk_core::{
    Channel, ConnectionState, InboundMessage, StreamError, StreamEvent, StreamResult, Subscription,
};

use crate::config::StreamConfig;
use crate::connection::{ConnectionManager, ManagerOutput};
use crate::dispatcher::{MessageDispatcher, MessageHandler};
use crate::reducers::{PositionBook, PositionReducer, PriceBook, PriceReducer};
use crate::registry::SubscriptionRegistry;
use crate::transport::{SocketEvent, Transport, WsTransport};

/// Capacity of the socket event channel
const SOCKET_EVENT_BUFFER: usize = 256;

/// Commands sent to the client task
enum StreamCommand {
    Connect,
    Disconnect,
    Subscribe(Subscription),
    Unsubscribe(Channel),
    Register {
        kind: String,
        handler: Box<dyn MessageHandler>,
    },
    Shutdown,
}

/// Pieces that move onto the task when the client starts
struct Pending {
    transport: Box<dyn Transport>,
    command_rx: mpsc::Receiver<StreamCommand>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Real-time streaming client
///
/// Commands issued before [`start`](Self::start) are queued and applied, in
/// order, once the task runs. Nothing drains the queue until then, so a
/// pre-start command that finds `command_buffer` entries already queued fails
/// with [`StreamError::CommandQueueFull`] instead of waiting.
pub struct StreamClient {
    config: StreamConfig,
    command_tx: mpsc::Sender<StreamCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    event_tx: broadcast::Sender<StreamEvent>,
    prices: PriceBook,
    positions: PositionBook,
    /// Taken by `start`; the lock keeps the handle `Sync`
    pending: Mutex<Option<Pending>>,
    task: Option<JoinHandle<()>>,
}

impl StreamClient {
    /// Create a client over any transport
    pub fn new(config: StreamConfig, transport: impl Transport) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));

        Self {
            config,
            command_tx,
            state_rx,
            event_tx,
            prices: PriceBook::new(),
            positions: PositionBook::new(),
            pending: Mutex::new(Some(Pending {
                transport: Box::new(transport),
                command_rx,
                state_tx,
            })),
            task: None,
        }
    }

    /// Create a client over the websocket transport
    pub fn websocket(config: StreamConfig) -> Self {
        let transport = WsTransport::new().with_ping_interval(config.ping_interval);
        Self::new(config, transport)
    }

    /// Spawn the client task and open the connection
    ///
    /// Initial subscriptions from the config are recorded first so the first
    /// time the connection goes live they are replayed.
    pub fn start(&mut self) -> StreamResult<()> {
        let Pending {
            transport,
            command_rx,
            state_tx,
        } = self
            .pending
            .get_mut()
            .take()
            .ok_or_else(|| StreamError::config("stream client already started"))?;

        let (socket_tx, socket_rx) = mpsc::channel(SOCKET_EVENT_BUFFER);
        let manager = ConnectionManager::new(
            self.config.endpoint.clone(),
            self.config.policy,
            transport,
            socket_tx,
            state_tx,
            self.event_tx.clone(),
        );

        let mut dispatcher = MessageDispatcher::new();
        dispatcher.register(
            InboundMessage::PRICE,
            PriceReducer::new(self.prices.clone())
                .with_monotonic_timestamps(self.config.monotonic_prices),
        );
        dispatcher.register(
            InboundMessage::POSITION,
            PositionReducer::new(self.positions.clone()),
        );

        let mut actor = StreamActor {
            manager,
            registry: SubscriptionRegistry::new(),
            dispatcher,
        };
        for subscription in &self.config.initial_subscriptions {
            actor
                .registry
                .subscribe(subscription.clone(), &mut actor.manager);
        }

        info!(
            "[Stream] Starting client for {} ({} initial subscriptions)",
            self.config.endpoint,
            actor.registry.len()
        );

        self.task = Some(tokio::spawn(actor.run(command_rx, socket_rx)));
        Ok(())
    }

    /// Tear down the connection and end the client task
    pub async fn stop(&mut self) -> StreamResult<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let _ = self.command_tx.send(StreamCommand::Shutdown).await;
        if let Err(e) = task.await {
            warn!("[Stream] Client task ended abnormally: {}", e);
        }
        info!("[Stream] Client stopped");
        Ok(())
    }

    /// Connect again after a disconnect or exhausted reconnects
    pub async fn connect(&self) -> StreamResult<()> {
        self.send_command(StreamCommand::Connect).await
    }

    /// Close the connection without forgetting subscriptions
    pub async fn disconnect(&self) -> StreamResult<()> {
        self.send_command(StreamCommand::Disconnect).await
    }

    pub async fn subscribe(&self, subscription: Subscription) -> StreamResult<()> {
        self.send_command(StreamCommand::Subscribe(subscription)).await
    }

    pub async fn unsubscribe(&self, channel: impl Into<Channel>) -> StreamResult<()> {
        self.send_command(StreamCommand::Unsubscribe(channel.into()))
            .await
    }

    /// Add a handler for a message type, after any already registered
    pub async fn register_handler<H>(&self, kind: impl Into<String>, handler: H) -> StreamResult<()>
    where
        H: MessageHandler + 'static,
    {
        self.send_command(StreamCommand::Register {
            kind: kind.into(),
            handler: Box::new(handler),
        })
        .await
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Liveness signal for awaiting state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// State transitions and transport errors
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    pub fn prices(&self) -> PriceBook {
        self.prices.clone()
    }

    pub fn positions(&self) -> PositionBook {
        self.positions.clone()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    async fn send_command(&self, command: StreamCommand) -> StreamResult<()> {
        if self.pending.lock().is_some() {
            return self.command_tx.try_send(command).map_err(|e| match e {
                TrySendError::Full(_) => StreamError::CommandQueueFull {
                    capacity: self.command_tx.max_capacity(),
                },
                TrySendError::Closed(_) => StreamError::ClientStopped,
            });
        }
        self.command_tx
            .send(command)
            .await
            .map_err(|_| StreamError::ClientStopped)
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.state())
            .field("started", &self.task.is_some())
            .finish()
    }
}

/// The single task that owns all client state
struct StreamActor {
    manager: ConnectionManager,
    registry: SubscriptionRegistry,
    dispatcher: MessageDispatcher,
}

impl StreamActor {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<StreamCommand>,
        mut socket_rx: mpsc::Receiver<SocketEvent>,
    ) {
        self.manager.connect();

        loop {
            let deadline = self.manager.reconnect_deadline();

            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(StreamCommand::Shutdown) | None => {
                        self.manager.disconnect();
                        break;
                    }
                    Some(command) => self.handle_command(command),
                },

                Some(event) = socket_rx.recv() => self.handle_socket_event(event),

                _ = reconnect_timer(deadline) => self.manager.fire_reconnect(),
            }
        }

        debug!("[Stream] Client task exiting");
    }

    fn handle_command(&mut self, command: StreamCommand) {
        match command {
            StreamCommand::Connect => self.manager.connect(),
            StreamCommand::Disconnect => self.manager.disconnect(),
            StreamCommand::Subscribe(subscription) => {
                self.registry.subscribe(subscription, &mut self.manager);
            }
            StreamCommand::Unsubscribe(channel) => {
                self.registry.unsubscribe(&channel, &mut self.manager);
            }
            StreamCommand::Register { kind, handler } => {
                self.dispatcher.register_boxed(kind, handler);
            }
            StreamCommand::Shutdown => {}
        }
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match self.manager.handle_event(event) {
            Some(ManagerOutput::Live) => {
                self.registry.replay_all(&mut self.manager);
            }
            Some(ManagerOutput::Inbound(message)) => {
                self.dispatcher.dispatch(&message);
            }
            None => {}
        }
    }
}

async fn reconnect_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
