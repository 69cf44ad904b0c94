//! Connection lifecycle state and reconnect policy

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};

/// Default number of automatic reconnect attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between reconnect attempts
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(3000);

/// Lifecycle state of the single stream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket, no automatic action pending
    #[default]
    Disconnected,
    /// Socket opening, waiting for the open event
    Connecting,
    /// Socket open; frames can be sent and received
    Live,
    /// Socket lost, a reconnect is scheduled
    Reconnecting,
    /// Torn down by the caller
    Closed,
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Live)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Live => "live",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded-retry configuration for automatic reconnection
///
/// Immutable once built. `interval` is always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl ReconnectPolicy {
    /// Create a policy, rejecting a zero interval
    pub fn new(max_attempts: u32, interval: Duration) -> StreamResult<Self> {
        if interval.is_zero() {
            return Err(StreamError::config("reconnect interval must be positive"));
        }
        Ok(Self {
            max_attempts,
            interval,
        })
    }

    /// Create a policy from a millisecond interval
    pub fn from_millis(max_attempts: u32, interval_ms: u64) -> StreamResult<Self> {
        Self::new(max_attempts, Duration::from_millis(interval_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether another automatic attempt is allowed after `attempts` so far
    ///
    /// `max_attempts` counts reconnects, not opens: with a limit of 3 the
    /// socket is opened at most 4 times (the initial connect plus 3
    /// reconnects) before the manager settles in `Disconnected`.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}
