//! PairMonitor
//!
//! Drives the periodic evaluation cycle of exactly one pair:
//!   1. Read both snapshots (two independent locked reads).
//!   2. Compute spread and z-score against the pair's correlation.
//!   3. Size the trade when in range, otherwise go flat.
//!   4. Write the in-range flag and decision back to each leg, one entity at
//!      a time, never holding two entity locks at once.
//!   5. Sleep, then check for cancellation before the next read.
//!
//! The two reads are not taken at a single instant; a feed update landing
//! between them is visible. Decisions are eventually consistent with the
//! latest prices, not linearizable.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use common::logger::warn_if_slow;
use common::time::now_ms;
use market::signal;
use market::{MarketError, MarketSnapshot, Pair, SharedEntityState, SpreadError, TradeDecision};

use crate::config::MonitorConfig;
use crate::health::{Counters, HealthReporter};
use crate::registry::PairCorrelation;
use crate::types::DecisionEvent;

/// Result of evaluating one pair against one pair of snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub spread: f64,
    pub z_score: Option<f64>,
    pub in_range: bool,
    pub first: TradeDecision,
    pub second: TradeDecision,
}

impl Evaluation {
    fn flat(spread: f64, z_score: Option<f64>) -> Self {
        Self {
            spread,
            z_score,
            in_range: false,
            first: TradeDecision::flat(),
            second: TradeDecision::flat(),
        }
    }
}

/// Computes the decision for `pair` from two snapshots.
///
/// An unavailable z-score is returned as an error so the caller can report it;
/// callers must treat it as out of range.
pub fn evaluate_pair(
    cfg: &MonitorConfig,
    pair: &Pair,
    a: &MarketSnapshot,
    b: &MarketSnapshot,
    correlation: f64,
) -> Result<Evaluation, SpreadError> {
    let spread = signal::spread(a.price, b.price);
    let z = signal::z_score(spread, a.volatility, b.volatility, correlation)?;

    if !signal::is_in_range(z, cfg.in_range_threshold) {
        return Ok(Evaluation::flat(spread, Some(z)));
    }

    let units = signal::position_size(z, cfg.max_shortfall, cfg.max_position_units);
    let (pos_a, pos_b) = signal::pair_positions(units);
    let shortfall = signal::shortfall(spread, pos_a, a.price, pos_b, b.price);

    Ok(Evaluation {
        spread,
        z_score: Some(z),
        in_range: true,
        first: TradeDecision {
            paired_with: Some(pair.second().clone()),
            position: pos_a,
            counterparty_position: pos_b,
            implementation_shortfall: shortfall,
        },
        second: TradeDecision {
            paired_with: Some(pair.first().clone()),
            position: pos_b,
            counterparty_position: pos_a,
            implementation_shortfall: shortfall,
        },
    })
}

/// What one `run_cycle` observed and wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub evaluation: Evaluation,

    /// False when at least one decision write-back gave up under contention.
    pub write_back_complete: bool,
}

/// Per-leg write-back bookkeeping.
#[derive(Debug, Default)]
struct LegState {
    /// Consecutive cycles whose decision write-back failed.
    stale_cycles: u32,
    last_written: Option<TradeDecision>,
}

pub struct PairMonitor {
    pair: Pair,
    legs: [Arc<SharedEntityState>; 2],
    leg_state: [LegState; 2],
    correlation: Arc<PairCorrelation>,
    cfg: MonitorConfig,
    health: Arc<dyn HealthReporter>,
    counters: Counters,
    events: broadcast::Sender<DecisionEvent>,
}

impl PairMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pair: Pair,
        first: Arc<SharedEntityState>,
        second: Arc<SharedEntityState>,
        correlation: Arc<PairCorrelation>,
        cfg: MonitorConfig,
        health: Arc<dyn HealthReporter>,
        counters: Counters,
        events: broadcast::Sender<DecisionEvent>,
    ) -> Self {
        Self {
            pair,
            legs: [first, second],
            leg_state: Default::default(),
            correlation,
            cfg,
            health,
            counters,
            events,
        }
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    /// Runs cycles until `shutdown` flips to true or its sender is dropped.
    ///
    /// Cancellation is only observed between cycles: an in-flight cycle always
    /// finishes its write-back first.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.cfg.eval_interval.as_millis() as u64,
            "pair monitor started"
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.cfg.eval_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("shutdown sender dropped");
                        break;
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }
        }

        info!("pair monitor stopped");
    }

    /// One full read, compute, write-back cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let a = self.legs[0].snapshot();
        let b = self.legs[1].snapshot();
        let rho = self.correlation.get();

        let evaluation = match evaluate_pair(&self.cfg, &self.pair, &a, &b, rho) {
            Ok(e) => e,
            Err(e) => {
                self.health.computation_fault(&self.pair, &e);
                Evaluation::flat(signal::spread(a.price, b.price), None)
            }
        };

        Counters::bump(&self.counters.cycles);
        if evaluation.in_range {
            Counters::bump(&self.counters.in_range_cycles);
        } else {
            Counters::bump(&self.counters.flat_cycles);
        }

        debug!(
            spread = evaluation.spread,
            z = ?evaluation.z_score,
            in_range = evaluation.in_range,
            position = evaluation.first.position,
            "pair evaluated"
        );

        // Two legs, each bounded by write_back_timeout.
        let budget = self.cfg.write_back_timeout * 2 + Duration::from_millis(50);
        let write_back_complete =
            warn_if_slow("write_back", budget, self.write_back(&evaluation)).await;

        CycleOutcome {
            evaluation,
            write_back_complete,
        }
    }

    async fn write_back(&mut self, evaluation: &Evaluation) -> bool {
        let mut complete = true;

        for leg in 0..2 {
            let state = Arc::clone(&self.legs[leg]);
            let decision = if leg == 0 {
                evaluation.first.clone()
            } else {
                evaluation.second.clone()
            };

            state.set_in_range(evaluation.in_range);

            let res = state
                .update_decision_within(decision.clone(), self.cfg.write_back_timeout)
                .await;

            if !self.on_decision_write(leg, &state, decision, evaluation, res) {
                complete = false;
            }
        }

        complete
    }

    /// Updates leg bookkeeping after a decision write attempt; returns whether it landed.
    fn on_decision_write(
        &mut self,
        leg: usize,
        state: &SharedEntityState,
        decision: TradeDecision,
        evaluation: &Evaluation,
        res: Result<u32, MarketError>,
    ) -> bool {
        match res {
            Ok(_) => {
                self.leg_state[leg].stale_cycles = 0;

                if self.leg_state[leg].last_written.as_ref() != Some(&decision) {
                    // No subscribers is fine; the decision is still pollable.
                    let _ = self.events.send(DecisionEvent {
                        pair: self.pair.clone(),
                        entity: state.id().clone(),
                        in_range: evaluation.in_range,
                        z_score: evaluation.z_score,
                        decision: decision.clone(),
                        ts_ms: now_ms(),
                    });
                    self.leg_state[leg].last_written = Some(decision);
                }
                true
            }
            Err(e) => {
                let ls = &mut self.leg_state[leg];
                ls.stale_cycles = ls.stale_cycles.saturating_add(1);
                let stale = ls.stale_cycles;

                self.health.contention_timeout(&self.pair, state.id(), &e);
                if stale >= self.cfg.stale_decision_cycles {
                    self.health.stale_decision(&self.pair, state.id(), stale);
                }
                false
            }
        }
    }
}
