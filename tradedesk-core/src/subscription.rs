//! Channel subscriptions

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a logical stream multiplexed over the connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    pub const PRICES: &'static str = "prices";
    pub const POSITIONS: &'static str = "positions";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Channel {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A channel plus an optional symbol filter
///
/// `symbols: None` means every symbol on the channel. Symbols keep the order
/// they were given in, with duplicates removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<String>>,
}

impl Subscription {
    pub fn new<I, S>(channel: impl Into<Channel>, symbols: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols = symbols.map(|symbols| {
            let mut seen = HashSet::new();
            symbols
                .into_iter()
                .map(Into::into)
                .filter(|symbol: &String| seen.insert(symbol.clone()))
                .collect()
        });

        Self {
            channel: channel.into(),
            symbols,
        }
    }

    /// Subscribe to every symbol on a channel
    pub fn all(channel: impl Into<Channel>) -> Self {
        Self {
            channel: channel.into(),
            symbols: None,
        }
    }

    /// Parse `name` or `name:SYM1,SYM2`
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        let (name, symbols) = match spec.split_once(':') {
            Some((name, list)) => {
                let symbols: Vec<&str> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                (name.trim(), Some(symbols))
            }
            None => (spec, None),
        };

        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, symbols))
    }
}
