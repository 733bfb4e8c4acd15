//! Per-instrument market state and the pure signal math evaluated over it.

pub mod entity_state;
pub mod error;
pub mod feed;
pub mod rolling_window;
pub mod signal;
pub mod types;

pub use entity_state::SharedEntityState;
pub use error::{MarketError, SpreadError};
pub use types::{EntityId, MarketSnapshot, Pair, Statistics, TradeDecision};
