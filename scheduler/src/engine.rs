//! MonitorScheduler
//!
//! Owns the entity registry and the set of running pair monitors.
//! Responsibilities:
//!   • Validate configuration and pair selection (no partial start)
//!   • Build the registry once; it is read-only afterwards
//!   • Spawn one evaluation task per pair
//!   • Cooperative shutdown with a grace period; loops that overrun it are
//!     reported, never aborted
//!
//! Monitors share nothing but entity state and the broadcast sender. One
//! monitor's fault never reaches another pair.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, instrument, warn};

use common::logger::pair_span;
use market::{EntityId, Pair, SharedEntityState};

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::health::{Counters, HealthReporter, TracingHealthReporter};
use crate::monitor::PairMonitor;
use crate::registry::{EntityRegistry, PairCorrelation, validate_correlation};
use crate::types::{DecisionEvent, PairSpec, ShutdownReport};

struct MonitorHandle {
    pair: Pair,
    handle: JoinHandle<()>,
}

enum Lifecycle {
    Idle,
    Running(Vec<MonitorHandle>),
    /// A shutdown owns the join handles and is waiting on them; these stay
    /// behind so `running()` still sees the live loops.
    Stopping(Vec<AbortHandle>),
    /// Loops that overran a previous shutdown grace period stay here until
    /// a later shutdown observes them exit.
    Stopped(Vec<MonitorHandle>),
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Running(_) => "running",
            Lifecycle::Stopping(_) => "stopping",
            Lifecycle::Stopped(_) => "stopped",
        }
    }
}

pub struct MonitorScheduler {
    cfg: MonitorConfig,
    registry: Arc<EntityRegistry>,

    /// Pairs in selection order.
    pairs: Vec<Pair>,
    correlations: HashMap<Pair, Arc<PairCorrelation>>,

    health: Arc<dyn HealthReporter>,
    counters: Counters,
    events: broadcast::Sender<DecisionEvent>,
    shutdown_tx: watch::Sender<bool>,
    lifecycle: Mutex<Lifecycle>,

    /// Held for the whole of `shutdown`; concurrent callers queue behind it.
    shutdown_gate: tokio::sync::Mutex<()>,
}

impl MonitorScheduler {
    /// Validates `cfg` and `pairs`, then builds one entity per distinct symbol.
    pub fn initialize(
        cfg: MonitorConfig,
        pairs: impl IntoIterator<Item = PairSpec>,
    ) -> Result<Self, MonitorError> {
        Self::build(cfg, None, pairs)
    }

    /// Like `initialize`, but also rejects pairs naming a symbol outside `universe`.
    pub fn initialize_with_universe(
        cfg: MonitorConfig,
        universe: &[EntityId],
        pairs: impl IntoIterator<Item = PairSpec>,
    ) -> Result<Self, MonitorError> {
        let universe: HashSet<EntityId> = universe.iter().cloned().collect();
        Self::build(cfg, Some(universe), pairs)
    }

    #[instrument(skip_all, target = "scheduler")]
    fn build(
        cfg: MonitorConfig,
        universe: Option<HashSet<EntityId>>,
        pairs: impl IntoIterator<Item = PairSpec>,
    ) -> Result<Self, MonitorError> {
        cfg.validate()?;

        let mut ordered: Vec<Pair> = Vec::new();
        let mut correlations: HashMap<Pair, Arc<PairCorrelation>> = HashMap::new();

        for spec in pairs {
            let PairSpec { pair, correlation } = spec;

            if let Some(universe) = &universe {
                for id in [pair.first(), pair.second()] {
                    if !universe.contains(id) {
                        return Err(MonitorError::UnknownEntity {
                            pair: pair.id(),
                            entity: id.clone(),
                        });
                    }
                }
            }

            let rho = validate_correlation(&pair, correlation)?;

            if let Some(existing) = correlations.get(&pair) {
                if existing.get() != rho {
                    return Err(MonitorError::Configuration(format!(
                        "pair {} listed twice with different correlations",
                        pair
                    )));
                }
                debug!(pair = %pair, "duplicate pair ignored");
                continue;
            }

            correlations.insert(pair.clone(), Arc::new(PairCorrelation::new(rho)));
            ordered.push(pair);
        }

        if ordered.is_empty() {
            return Err(MonitorError::Configuration("no pairs to monitor".into()));
        }

        let registry = EntityRegistry::build(
            ordered.iter().flat_map(|p| [p.first(), p.second()]),
            cfg.lock_backoff,
        );

        info!(
            pairs = ordered.len(),
            entities = registry.len(),
            "monitor registry initialized"
        );

        let counters = Counters::default();
        let (events, _) = broadcast::channel(cfg.event_capacity);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            health: Arc::new(TracingHealthReporter::new(counters.clone())),
            cfg,
            registry: Arc::new(registry),
            pairs: ordered,
            correlations,
            counters,
            events,
            shutdown_tx,
            lifecycle: Mutex::new(Lifecycle::Idle),
            shutdown_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Replaces the default tracing reporter. Only affects monitors started afterwards.
    pub fn with_health_reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.health = reporter;
        self
    }

    /// Spawns one evaluation loop per pair. Must run inside a tokio runtime.
    #[instrument(skip(self), target = "scheduler")]
    pub fn start(&self) -> Result<usize, MonitorError> {
        let mut lifecycle = self.lifecycle.lock();
        if !matches!(*lifecycle, Lifecycle::Idle) {
            return Err(MonitorError::InvalidState(lifecycle.name()));
        }

        // Resolve every leg before spawning anything.
        let mut monitors = Vec::with_capacity(self.pairs.len());
        for pair in &self.pairs {
            let (first, second) = self.registry.legs(pair)?;
            let correlation = self
                .correlations
                .get(pair)
                .cloned()
                .ok_or_else(|| MonitorError::UnknownPair(pair.id()))?;

            monitors.push(PairMonitor::new(
                pair.clone(),
                first,
                second,
                correlation,
                self.cfg.clone(),
                Arc::clone(&self.health),
                self.counters.clone(),
                self.events.clone(),
            ));
        }

        let handles: Vec<MonitorHandle> = monitors
            .into_iter()
            .map(|monitor| {
                let pair = monitor.pair().clone();
                let span = pair_span(&pair.id());
                let handle = tokio::spawn(monitor.run(self.shutdown_tx.subscribe()).instrument(span));
                MonitorHandle { pair, handle }
            })
            .collect();

        let started = handles.len();
        *lifecycle = Lifecycle::Running(handles);

        info!(monitors = started, "pair monitors started");
        Ok(started)
    }

    /// Signals every loop to stop at its next cycle boundary and waits up to
    /// `timeout` for them to exit.
    ///
    /// Loops still running at the deadline are reported in
    /// `MonitorError::ShutdownTimeout` and left alone; calling `shutdown`
    /// again waits for them once more. Once everything has stopped, further
    /// calls return `Ok` with `already_stopped` set.
    ///
    /// Concurrent calls are serialized: a second caller returns only after
    /// the first has finished waiting.
    #[instrument(skip(self), target = "scheduler", fields(timeout_ms = timeout.as_millis() as u64))]
    pub async fn shutdown(&self, timeout: Duration) -> Result<ShutdownReport, MonitorError> {
        let _gate = self.shutdown_gate.lock().await;
        self.shutdown_tx.send_replace(true);

        let pending = {
            let mut lifecycle = self.lifecycle.lock();
            let handles = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped(Vec::new())) {
                // Stopping only exists while another caller holds the gate.
                Lifecycle::Idle | Lifecycle::Stopping(_) => Vec::new(),
                Lifecycle::Running(handles) | Lifecycle::Stopped(handles) => handles,
            };
            if !handles.is_empty() {
                *lifecycle =
                    Lifecycle::Stopping(handles.iter().map(|m| m.handle.abort_handle()).collect());
            }
            handles
        };

        if pending.is_empty() {
            debug!("nothing running");
            return Ok(ShutdownReport {
                stopped: Vec::new(),
                already_stopped: true,
            });
        }

        let deadline = Instant::now() + timeout;
        let results = join_all(pending.into_iter().map(|mut m| async move {
            let res = tokio::time::timeout_at(deadline, &mut m.handle).await;
            (m, res)
        }))
        .await;

        let mut stopped = Vec::new();
        let mut lingering = Vec::new();

        for (m, res) in results {
            match res {
                Ok(Ok(())) => stopped.push(m.pair),
                Ok(Err(join_err)) => {
                    error!(pair = %m.pair, error = %join_err, "pair monitor ended abnormally");
                    stopped.push(m.pair);
                }
                Err(_) => lingering.push(m),
            }
        }

        if lingering.is_empty() {
            *self.lifecycle.lock() = Lifecycle::Stopped(Vec::new());
            info!(stopped = stopped.len(), "pair monitors stopped");
            return Ok(ShutdownReport {
                stopped,
                already_stopped: false,
            });
        }

        let pairs: Vec<String> = lingering.iter().map(|m| m.pair.id()).collect();
        warn!(
            ?pairs,
            stopped = stopped.len(),
            "pair monitors did not stop within grace period"
        );

        *self.lifecycle.lock() = Lifecycle::Stopped(lingering);

        Err(MonitorError::ShutdownTimeout {
            pairs,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    /// Refreshes the correlation used by `pair`'s monitor from its next cycle on.
    pub fn update_correlation(&self, pair: &Pair, rho: f64) -> Result<(), MonitorError> {
        let cell = self
            .correlations
            .get(pair)
            .ok_or_else(|| MonitorError::UnknownPair(pair.id()))?;
        let rho = validate_correlation(pair, rho)?;
        cell.set(rho);
        Ok(())
    }

    pub fn correlation(&self, pair: &Pair) -> Option<f64> {
        self.correlations.get(pair).map(|c| c.get())
    }

    /// Receives a `DecisionEvent` whenever a monitor writes a changed decision.
    pub fn subscribe_decisions(&self) -> broadcast::Receiver<DecisionEvent> {
        self.events.subscribe()
    }

    /// Number of evaluation loops that have not exited yet.
    pub fn running(&self) -> usize {
        match &*self.lifecycle.lock() {
            Lifecycle::Idle => 0,
            Lifecycle::Running(h) | Lifecycle::Stopped(h) => {
                h.iter().filter(|m| !m.handle.is_finished()).count()
            }
            Lifecycle::Stopping(h) => h.iter().filter(|a| !a.is_finished()).count(),
        }
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    pub fn entity(&self, id: &EntityId) -> Option<Arc<SharedEntityState>> {
        self.registry.get(id).cloned()
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.cfg
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}
