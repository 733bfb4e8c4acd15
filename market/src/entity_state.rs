//! SharedEntityState
//!
//! Thread-safe container for one instrument's live state:
//!   • latest market snapshot (written by the feed)
//!   • derived statistics (written by the statistics collaborator)
//!   • in-range flag and trade decision (written by pair monitors)
//!
//! All four fields sit behind a single mutex. Every operation holds it for
//! exactly one field read or one field write, so readers always see a
//! complete value for the field they asked for. There is no cross-field
//! atomicity: a reader may see a fresh in-range flag next to the previous
//! decision.
//!
//! Writers of the snapshot, statistics and decision never park on the
//! mutex. They poll with `try_lock` and sleep a fixed backoff between
//! attempts, so a contended writer yields its task instead of queueing
//! behind a slow holder. `set_in_range` is the exception and uses a plain
//! blocking acquire.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::MarketError;
use crate::types::{EntityId, MarketSnapshot, Statistics, TradeDecision};

/// Delay between two lock attempts of a contended writer.
pub const DEFAULT_LOCK_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct EntityFields {
    snapshot: MarketSnapshot,
    statistics: Statistics,
    in_range: bool,
    decision: TradeDecision,
}

pub struct SharedEntityState {
    id: EntityId,
    backoff: Duration,
    fields: Mutex<EntityFields>,
}

impl SharedEntityState {
    pub fn new(id: EntityId) -> Self {
        Self::with_backoff(id, DEFAULT_LOCK_BACKOFF)
    }

    pub fn with_backoff(id: EntityId, backoff: Duration) -> Self {
        Self {
            id,
            backoff,
            fields: Mutex::new(EntityFields::default()),
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Replaces the market snapshot, retrying until the lock is free.
    pub async fn update_snapshot(&self, snapshot: MarketSnapshot) {
        // Unbounded retries cannot time out.
        let _ = self
            .write_with_backoff("snapshot", None, move |f| f.snapshot = snapshot)
            .await;
    }

    /// Replaces the statistics, retrying until the lock is free.
    pub async fn update_statistics(&self, statistics: Statistics) {
        let _ = self
            .write_with_backoff("statistics", None, move |f| f.statistics = statistics)
            .await;
    }

    /// Replaces the trade decision, retrying until the lock is free.
    pub async fn update_decision(&self, decision: TradeDecision) {
        let _ = self
            .write_with_backoff("decision", None, move |f| f.decision = decision)
            .await;
    }

    /// Replaces the trade decision unless the lock stays contended for longer
    /// than `max_wait`. Returns the number of lock attempts on success.
    pub async fn update_decision_within(
        &self,
        decision: TradeDecision,
        max_wait: Duration,
    ) -> Result<u32, MarketError> {
        self.write_with_backoff("decision", Some(max_wait), move |f| f.decision = decision)
            .await
    }

    /// Blocking acquire; the critical section is a single bool store.
    pub fn set_in_range(&self, in_range: bool) {
        self.fields.lock().in_range = in_range;
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        self.fields.lock().snapshot
    }

    pub fn statistics(&self) -> Statistics {
        self.fields.lock().statistics
    }

    pub fn decision(&self) -> TradeDecision {
        self.fields.lock().decision.clone()
    }

    pub fn in_range(&self) -> bool {
        self.fields.lock().in_range
    }

    async fn write_with_backoff<F>(
        &self,
        field: &'static str,
        max_wait: Option<Duration>,
        write: F,
    ) -> Result<u32, MarketError>
    where
        F: FnOnce(&mut EntityFields),
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);

            if let Some(mut guard) = self.fields.try_lock() {
                write(&mut guard);
                drop(guard);

                if attempts > 1 {
                    debug!(
                        entity = %self.id,
                        field,
                        attempts,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "contended write applied"
                    );
                }
                return Ok(attempts);
            }

            let waited = started.elapsed();
            if let Some(limit) = max_wait {
                if waited + self.backoff > limit {
                    return Err(MarketError::Contended {
                        entity: self.id.clone(),
                        waited_ms: waited.as_millis() as u64,
                        attempts,
                    });
                }
            }

            trace!(entity = %self.id, field, attempts, "lock contended; backing off");
            tokio::time::sleep(self.backoff).await;
        }
    }
}

impl std::fmt::Debug for SharedEntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEntityState")
            .field("id", &self.id)
            .field("backoff", &self.backoff)
            .finish()
    }
}
