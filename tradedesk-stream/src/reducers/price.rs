//! Price reducer: latest quote per symbol

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use tradedesk_core::{InboundMessage, PriceQuote, StreamResult};

use crate::dispatcher::MessageHandler;

/// Read model: symbol -> most recent quote
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    quotes: Arc<RwLock<HashMap<String, PriceQuote>>>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<PriceQuote> {
        self.quotes.read().get(symbol).cloned()
    }

    /// Point-in-time copy of every quote
    pub fn snapshot(&self) -> HashMap<String, PriceQuote> {
        self.quotes.read().clone()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.quotes.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }
}

/// Merges `price` frames into a [`PriceBook`]
///
/// By default the last frame to arrive wins. With monotonic timestamps
/// enabled, a frame whose timestamp is older than the stored quote's is
/// ignored; frames with unparseable timestamps are always accepted.
#[derive(Debug, Clone)]
pub struct PriceReducer {
    book: PriceBook,
    monotonic: bool,
}

impl PriceReducer {
    pub fn new(book: PriceBook) -> Self {
        Self {
            book,
            monotonic: false,
        }
    }

    pub fn with_monotonic_timestamps(mut self, monotonic: bool) -> Self {
        self.monotonic = monotonic;
        self
    }

    /// Merge one quote, returning whether it was stored
    pub fn apply(&self, quote: PriceQuote) -> bool {
        let mut quotes = self.book.quotes.write();

        if self.monotonic {
            if let Some(current) = quotes.get(&quote.symbol) {
                if let (Some(new_ts), Some(old_ts)) =
                    (quote.parsed_timestamp(), current.parsed_timestamp())
                {
                    if new_ts < old_ts {
                        debug!(
                            "[Prices] Ignoring stale quote for {} ({} < {})",
                            quote.symbol, quote.timestamp, current.timestamp
                        );
                        return false;
                    }
                }
            }
        }

        quotes.insert(quote.symbol.clone(), quote);
        true
    }
}

impl MessageHandler for PriceReducer {
    fn handle(&mut self, message: &InboundMessage) -> StreamResult<()> {
        let quote: PriceQuote = message.decode()?;
        self.apply(quote);
        Ok(())
    }
}
