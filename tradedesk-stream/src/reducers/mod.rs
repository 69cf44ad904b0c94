//! Stream reducers and the read models they maintain
//!
//! Reducers are registered with the dispatcher and run on the client task.
//! The read models are shared handles: the reducer writes, callers take
//! point-in-time snapshots.

mod position;
mod price;

pub use position::{PositionBook, PositionReducer};
pub use price::{PriceBook, PriceReducer};
