//! Real-time streaming client for the Tradedesk dashboard
//!
//! One duplex websocket carries price and position frames from the backend.
//! The client keeps the connection alive with a bounded reconnect policy,
//! replays the caller's subscriptions every time the connection becomes
//! live, routes inbound frames by `type` and reduces them into shared read
//! models ([`PriceBook`], [`PositionBook`]).

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod reducers;
pub mod registry;
pub mod transport;

pub use client::StreamClient;
pub use config::{parse_channels, resolve_endpoint, StreamConfig};
pub use connection::{ConnectionManager, ManagerOutput};
pub use dispatcher::{MessageDispatcher, MessageHandler};
pub use reducers::{PositionBook, PositionReducer, PriceBook, PriceReducer};
pub use registry::{FrameSink, SubscriptionRegistry};
pub use transport::{ConnectionId, Socket, SocketEvent, SocketEventKind, Transport, WsTransport};
