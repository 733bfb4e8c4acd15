use thiserror::Error;

use crate::types::EntityId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("entity id must not be empty")]
    InvalidEntityId,

    #[error("pair must reference two distinct entities, got {0} twice")]
    DegeneratePair(EntityId),

    #[error("lock on {entity} still contended after {waited_ms}ms ({attempts} attempts)")]
    Contended {
        entity: EntityId,
        waited_ms: u64,
        attempts: u32,
    },
}

/// Reasons a z-score cannot be formed. Always recovered by the caller as "out of range".
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SpreadError {
    #[error("spread variance is not positive ({variance})")]
    DegenerateVariance { variance: f64 },

    #[error("z-score is not finite")]
    NonFinite,
}
