//! Pair monitoring core: one evaluation loop per co-integrated pair, reading
//! and writing back shared per-instrument state.

pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod monitor;
pub mod registry;
pub mod types;

pub use config::MonitorConfig;
pub use engine::MonitorScheduler;
pub use error::MonitorError;
pub use health::{Counters, HealthReporter, TracingHealthReporter};
pub use monitor::{CycleOutcome, PairMonitor};
pub use registry::{EntityRegistry, PairCorrelation};
pub use types::{DecisionEvent, PairSpec, ShutdownReport};
