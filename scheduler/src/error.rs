use thiserror::Error;

use market::{EntityId, MarketError};

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("pair {pair} references unknown entity {entity}")]
    UnknownEntity { pair: String, entity: EntityId },

    #[error("pair {0} is not monitored")]
    UnknownPair(String),

    #[error("correlation for {pair} must be finite and within [-1, 1], got {value}")]
    InvalidCorrelation { pair: String, value: f64 },

    #[error("monitors cannot be started: scheduler is {0}")]
    InvalidState(&'static str),

    #[error("{} monitor loop(s) still running after {timeout_ms}ms: {pairs:?}", pairs.len())]
    ShutdownTimeout { pairs: Vec<String>, timeout_ms: u64 },

    #[error(transparent)]
    Market(#[from] MarketError),
}
