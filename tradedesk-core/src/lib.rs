//! Core types for the Tradedesk streaming client
//!
//! This crate defines the shared data structures used by the streaming
//! client: connection lifecycle state, reconnect policy, channel
//! subscriptions, wire frames and the payloads reduced into read models.

pub mod connection;
pub mod error;
pub mod position;
pub mod quote;
pub mod subscription;
pub mod websocket;

pub use connection::{ConnectionState, ReconnectPolicy};
pub use error::{StreamError, StreamResult};
pub use position::PositionUpdate;
pub use quote::PriceQuote;
pub use subscription::{Channel, Subscription};
pub use websocket::{ClientFrame, InboundMessage, StreamEvent};
