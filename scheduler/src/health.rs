use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use market::{EntityId, MarketError, Pair, SpreadError};

/// Minimal counters for operational visibility.
#[derive(Clone, Default, Debug)]
pub struct Counters {
    pub cycles: Arc<AtomicU64>,
    pub in_range_cycles: Arc<AtomicU64>,
    pub flat_cycles: Arc<AtomicU64>,

    // faults
    pub computation_faults: Arc<AtomicU64>,
    pub contention_timeouts: Arc<AtomicU64>,
    pub stale_decisions: Arc<AtomicU64>,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Observability collaborator notified of per-pair faults.
///
/// Calls happen inline on the monitor's cycle; implementations must not block.
pub trait HealthReporter: Send + Sync + 'static {
    /// A decision write-back gave up because the entity lock stayed contended.
    fn contention_timeout(&self, pair: &Pair, entity: &EntityId, error: &MarketError);

    /// `entity` has missed `stale_cycles` consecutive decision write-backs.
    fn stale_decision(&self, pair: &Pair, entity: &EntityId, stale_cycles: u32);

    /// The z-score could not be formed; the pair was forced flat.
    fn computation_fault(&self, pair: &Pair, error: &SpreadError);
}

/// Default reporter: structured warnings plus shared counters.
#[derive(Clone, Default)]
pub struct TracingHealthReporter {
    counters: Counters,
}

impl TracingHealthReporter {
    pub fn new(counters: Counters) -> Self {
        Self { counters }
    }
}

impl HealthReporter for TracingHealthReporter {
    fn contention_timeout(&self, pair: &Pair, entity: &EntityId, error: &MarketError) {
        Counters::bump(&self.counters.contention_timeouts);
        warn!(
            target: "health",
            pair = %pair,
            entity = %entity,
            error = %error,
            "decision write-back contended; retrying next cycle"
        );
    }

    fn stale_decision(&self, pair: &Pair, entity: &EntityId, stale_cycles: u32) {
        Counters::bump(&self.counters.stale_decisions);
        warn!(
            target: "health",
            pair = %pair,
            entity = %entity,
            stale_cycles,
            "trade decision is stale"
        );
    }

    fn computation_fault(&self, pair: &Pair, error: &SpreadError) {
        Counters::bump(&self.counters.computation_faults);
        warn!(
            target: "health",
            pair = %pair,
            error = %error,
            "z-score unavailable; pair forced flat"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn pair() -> Pair {
        Pair::new(EntityId::new("KO").unwrap(), EntityId::new("PEP").unwrap()).unwrap()
    }

    #[test]
    #[traced_test]
    fn tracing_reporter_counts_and_logs() {
        let counters = Counters::default();
        let reporter = TracingHealthReporter::new(counters.clone());
        let p = pair();

        reporter.computation_fault(&p, &SpreadError::NonFinite);
        reporter.stale_decision(&p, p.second(), 3);
        reporter.contention_timeout(
            &p,
            p.first(),
            &MarketError::Contended {
                entity: p.first().clone(),
                waited_ms: 300,
                attempts: 4,
            },
        );

        assert_eq!(Counters::get(&counters.computation_faults), 1);
        assert_eq!(Counters::get(&counters.stale_decisions), 1);
        assert_eq!(Counters::get(&counters.contention_timeouts), 1);

        assert!(logs_contain("pair forced flat"));
        assert!(logs_contain("trade decision is stale"));
        assert!(logs_contain("stale_cycles=3"));
    }
}
