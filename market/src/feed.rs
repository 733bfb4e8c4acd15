//! Seam for the market-data feed collaborator.
//!
//! Ingestion and normalization are owned by the implementation; the core only
//! consumes normalized ticks.

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use crate::types::{EntityId, MarketSnapshot};

/// One normalized observation for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedTick {
    pub entity: EntityId,
    pub ts_ms: u64,
    pub snapshot: MarketSnapshot,
}

/// High-level abstraction for a streaming market-data source.
#[async_trait]
pub trait MarketFeed: Send + Sync + 'static {
    /// Streams ticks for `symbols` into `sender` until the source ends or the
    /// receiver is dropped.
    async fn stream(&self, symbols: Vec<EntityId>, sender: Sender<FeedTick>) -> anyhow::Result<()>;
}
