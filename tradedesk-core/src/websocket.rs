//! WebSocket frame types for the streaming protocol
//!
//! Frames are UTF-8 JSON objects. Outbound frames carry an `action`
//! discriminator, inbound frames a `type` discriminator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::ConnectionState;
use crate::error::{StreamError, StreamResult};
use crate::subscription::{Channel, Subscription};

// ============================================================================
// Client -> Server Frames
// ============================================================================

/// Frames sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start (or replace) a channel subscription
    Subscribe {
        channel: Channel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        symbols: Option<Vec<String>>,
    },
    /// Stop a channel subscription
    Unsubscribe { channel: Channel },
}

impl ClientFrame {
    pub fn subscribe(subscription: &Subscription) -> Self {
        ClientFrame::Subscribe {
            channel: subscription.channel.clone(),
            symbols: subscription.symbols.clone(),
        }
    }

    pub fn unsubscribe(channel: &Channel) -> Self {
        ClientFrame::Unsubscribe {
            channel: channel.clone(),
        }
    }

    pub fn channel(&self) -> &Channel {
        match self {
            ClientFrame::Subscribe { channel, .. } => channel,
            ClientFrame::Unsubscribe { channel } => channel,
        }
    }

    pub fn to_json(&self) -> StreamResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Server -> Client Frames
// ============================================================================

/// An inbound frame classified by its `type` tag
///
/// The payload is kept as the full JSON object; handlers decode the shape
/// they expect for their type.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub kind: String,
    pub body: Value,
}

impl InboundMessage {
    pub const PRICE: &'static str = "price";
    pub const POSITION: &'static str = "position";

    /// Parse a text frame into a typed envelope
    ///
    /// Fails for non-JSON text, non-object JSON, or a missing/non-string `type`.
    pub fn parse(text: &str) -> StreamResult<Self> {
        let body: Value = serde_json::from_str(text)
            .map_err(|e| StreamError::malformed(format!("invalid JSON: {}", e)))?;

        let kind = body
            .as_object()
            .ok_or_else(|| StreamError::malformed("frame is not a JSON object"))?
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| StreamError::malformed("frame has no string `type` field"))?
            .to_string();

        Ok(Self { kind, body })
    }

    /// Decode the whole body into a payload type
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> StreamResult<T> {
        T::deserialize(&self.body).map_err(|e| StreamError::payload(&self.kind, e.to_string()))
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Events surfaced to callers for display and diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Connection state transition
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// Raw transport error reported by the socket
    TransportError { message: String },
    /// An automatic reconnect has been scheduled
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// Reconnect attempts are used up; caller must connect again
    ReconnectExhausted { attempts: u32 },
}
