//! Rolling statistics and correlation refresh.
//!
//! Runs on its own cadence, independent of the evaluation loops. Each pass
//! writes `Statistics` to every entity with enough history and pushes a fresh
//! return correlation into each pair's correlation cell.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, debug, warn};

use common::logger::child_span;
use market::signal;
use scheduler::MonitorScheduler;

use crate::window_store::WindowStore;

/// What one refresh pass managed to update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub statistics: usize,
    pub correlations: usize,
}

pub struct StatisticsWorker {
    scheduler: Arc<MonitorScheduler>,
    windows: WindowStore,
    every: Duration,
}

impl StatisticsWorker {
    pub fn new(scheduler: Arc<MonitorScheduler>, windows: WindowStore, every: Duration) -> Self {
        Self {
            scheduler,
            windows,
            every,
        }
    }

    /// Refreshes every `every` until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let summary = self
                .refresh_once()
                .instrument(child_span("statistics_refresh"))
                .await;
            debug!(
                statistics = summary.statistics,
                correlations = summary.correlations,
                "statistics refreshed"
            );
        }

        debug!("statistics worker stopped");
    }

    pub async fn refresh_once(&self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();

        let ids: Vec<_> = self.scheduler.registry().ids().cloned().collect();
        for id in ids {
            let (Some(state), Some(stats)) =
                (self.scheduler.entity(&id), self.windows.statistics(&id).await)
            else {
                continue;
            };
            state.update_statistics(stats).await;
            summary.statistics += 1;
        }

        for pair in self.scheduler.pairs() {
            let ra = self.windows.returns(pair.first()).await;
            let rb = self.windows.returns(pair.second()).await;

            let Some(rho) = signal::correlation(&ra, &rb) else {
                continue;
            };

            // rounding can push a perfect correlation just past the bound
            match self.scheduler.update_correlation(pair, rho.clamp(-1.0, 1.0)) {
                Ok(()) => summary.correlations += 1,
                Err(e) => warn!(pair = %pair, error = %e, "correlation refresh rejected"),
            }
        }

        summary
    }
}
