//! Market data ingestion.
//!
//! Data flow:
//! MarketFeed → channel → FeedPump → (WindowStore, SharedEntityState)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use common::time::now_ms;
use market::feed::{FeedTick, MarketFeed};
use market::{EntityId, MarketSnapshot};
use scheduler::EntityRegistry;

use crate::window_store::WindowStore;

/// Deterministic price generator for running the service without a venue.
///
/// Every symbol follows a shared slow cycle plus its own faster wobble, so
/// pairs drift in and out of range in a repeatable way.
#[derive(Debug, Clone)]
pub struct SyntheticFeed {
    every: Duration,

    /// Stop after this many rounds; `None` streams forever.
    rounds: Option<u64>,
}

impl SyntheticFeed {
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            rounds: None,
        }
    }

    pub fn with_rounds(mut self, rounds: u64) -> Self {
        self.rounds = Some(rounds);
        self
    }

    /// Snapshot of the `k`-th symbol at step `step`.
    pub fn snapshot_at(k: usize, step: u64) -> MarketSnapshot {
        let t = step as f64;
        let k = k as f64;
        let base = 50.0 + 25.0 * k;

        let common = (t * 0.05).sin();
        let own = (t * (0.11 + 0.03 * k) + k).sin();

        MarketSnapshot {
            price: base * (1.0 + 0.02 * common + 0.01 * own),
            volume: 1_000.0 + 100.0 * k + 50.0 * (t * 0.2).cos(),
            volatility: base * 0.01,
        }
    }
}

#[async_trait]
impl MarketFeed for SyntheticFeed {
    async fn stream(&self, symbols: Vec<EntityId>, sender: Sender<FeedTick>) -> anyhow::Result<()> {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            symbols = symbols.len(),
            every_ms = self.every.as_millis() as u64,
            "synthetic feed started"
        );

        let mut step: u64 = 0;
        loop {
            if self.rounds.is_some_and(|n| step >= n) {
                debug!(rounds = step, "synthetic feed exhausted");
                return Ok(());
            }

            ticker.tick().await;
            let ts_ms = now_ms();

            for (k, entity) in symbols.iter().enumerate() {
                let tick = FeedTick {
                    entity: entity.clone(),
                    ts_ms,
                    snapshot: Self::snapshot_at(k, step),
                };
                if sender.send(tick).await.is_err() {
                    debug!("feed receiver dropped");
                    return Ok(());
                }
            }

            step += 1;
        }
    }
}

/// Applies normalized ticks to the shared entity state and the rolling windows.
#[derive(Clone)]
pub struct FeedPump {
    registry: Arc<EntityRegistry>,
    windows: WindowStore,
}

impl FeedPump {
    pub fn new(registry: Arc<EntityRegistry>, windows: WindowStore) -> Self {
        Self { registry, windows }
    }

    /// Drains `rx` until every sender is gone. Returns the number of ticks applied.
    pub async fn run(self, mut rx: Receiver<FeedTick>) -> u64 {
        let mut applied = 0;
        while let Some(tick) = rx.recv().await {
            if self.apply(tick).await {
                applied += 1;
            }
        }
        info!(applied, "feed pump stopped");
        applied
    }

    /// Applies one tick; ticks for symbols outside the registry are dropped.
    pub async fn apply(&self, tick: FeedTick) -> bool {
        let Some(state) = self.registry.get(&tick.entity) else {
            warn!(entity = %tick.entity, "tick for unmonitored symbol dropped");
            return false;
        };

        self.windows.push(&tick).await;
        state.update_snapshot(tick.snapshot).await;
        true
    }
}
