//! Shared types used by the scheduler subsystem.

use serde::Serialize;

use market::{EntityId, Pair, TradeDecision};

/// One pair to monitor, as supplied by the pair-selection collaborator.
#[derive(Debug, Clone)]
pub struct PairSpec {
    pub pair: Pair,

    /// Initial price correlation; refreshed later via
    /// `MonitorScheduler::update_correlation`.
    pub correlation: f64,
}

impl PairSpec {
    pub fn new(pair: Pair, correlation: f64) -> Self {
        Self { pair, correlation }
    }
}

/// Emitted when a monitor writes a decision that differs from the last one
/// it wrote for the same entity.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEvent {
    pub pair: Pair,
    pub entity: EntityId,
    pub in_range: bool,
    pub z_score: Option<f64>,
    pub decision: TradeDecision,
    pub ts_ms: u64,
}

/// Outcome of a successful `shutdown`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShutdownReport {
    /// Pairs whose loops exited during this call.
    pub stopped: Vec<Pair>,

    /// True when nothing was left running before this call.
    pub already_stopped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_event_serializes_for_subscribers() {
        let a = EntityId::new("KO").unwrap();
        let b = EntityId::new("PEP").unwrap();
        let event = DecisionEvent {
            pair: Pair::new(a.clone(), b.clone()).unwrap(),
            entity: a,
            in_range: true,
            z_score: Some(1.5),
            decision: TradeDecision {
                paired_with: Some(b),
                position: -66,
                counterparty_position: 66,
                implementation_shortfall: 0.0,
            },
            ts_ms: 42,
        };

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["pair"]["first"], "KO");
        assert_eq!(json["pair"]["second"], "PEP");
        assert_eq!(json["entity"], "KO");
        assert_eq!(json["in_range"], true);
        assert_eq!(json["decision"]["paired_with"], "PEP");
        assert_eq!(json["decision"]["counterparty_position"], 66);
        assert_eq!(json["ts_ms"], 42);
    }
}
