//! Position reducer: latest state per open position, in first-seen order

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use tradedesk_core::{InboundMessage, PositionUpdate, StreamResult};

use crate::dispatcher::MessageHandler;

/// `{"type": "position", "data": {...}}`
#[derive(Debug, Deserialize)]
struct PositionFrame {
    data: PositionUpdate,
}

/// Read model: one entry per symbol, ordered by first appearance
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    positions: Arc<RwLock<Vec<PositionUpdate>>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<PositionUpdate> {
        self.positions
            .read()
            .iter()
            .find(|p| p.symbol == symbol)
            .cloned()
    }

    /// Point-in-time copy of every position
    pub fn snapshot(&self) -> Vec<PositionUpdate> {
        self.positions.read().clone()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.positions.read().iter().map(|p| p.symbol.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.positions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.read().is_empty()
    }
}

/// Merges `position` frames into a [`PositionBook`]
///
/// A known symbol is replaced where it sits; a new symbol is appended.
/// Linear in the number of open positions, which stays small.
#[derive(Debug, Clone)]
pub struct PositionReducer {
    book: PositionBook,
}

impl PositionReducer {
    pub fn new(book: PositionBook) -> Self {
        Self { book }
    }

    /// Merge one update, returning its index in the book
    pub fn apply(&self, update: PositionUpdate) -> usize {
        let mut positions = self.book.positions.write();
        match positions.iter().position(|p| p.symbol == update.symbol) {
            Some(index) => {
                positions[index] = update;
                index
            }
            None => {
                positions.push(update);
                positions.len() - 1
            }
        }
    }
}

impl MessageHandler for PositionReducer {
    fn handle(&mut self, message: &InboundMessage) -> StreamResult<()> {
        let frame: PositionFrame = message.decode()?;
        self.apply(frame.data);
        Ok(())
    }
}
