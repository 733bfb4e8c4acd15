use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use market::{EntityId, Pair};
use scheduler::{MonitorConfig, PairSpec};

use crate::error::AppError;

const DEFAULT_PAIRS: &str = "KO:PEP:0.6,XOM:CVX:0.7";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Knobs handed to every pair monitor.
    pub monitor: MonitorConfig,

    /// Pair selection, in the order given.
    pub pairs: Vec<PairSpec>,

    // =========================
    // Lifecycle
    // =========================
    /// How long shutdown waits for evaluation loops before giving up on them.
    pub shutdown_grace: Duration,

    // =========================
    // Collaborators
    // =========================
    /// Cadence of the statistics and correlation refresh.
    pub stats_interval: Duration,

    /// Age bound of each instrument's rolling price window.
    pub stats_window_ms: u64,

    /// Cadence of the synthetic feed.
    pub feed_interval: Duration,
}

impl AppConfig {
    /// Reads every `PAIRWATCH_*` variable, falling back to defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = MonitorConfig::default();

        let monitor = MonitorConfig {
            eval_interval: millis(&lookup, "PAIRWATCH_EVAL_INTERVAL_MS", defaults.eval_interval)?,
            in_range_threshold: parse_or(
                &lookup,
                "PAIRWATCH_IN_RANGE_THRESHOLD",
                defaults.in_range_threshold,
            )?,
            max_shortfall: parse_or(&lookup, "PAIRWATCH_MAX_SHORTFALL", defaults.max_shortfall)?,
            lock_backoff: millis(&lookup, "PAIRWATCH_LOCK_BACKOFF_MS", defaults.lock_backoff)?,
            write_back_timeout: millis(
                &lookup,
                "PAIRWATCH_WRITE_BACK_TIMEOUT_MS",
                defaults.write_back_timeout,
            )?,
            stale_decision_cycles: parse_or(
                &lookup,
                "PAIRWATCH_STALE_CYCLES",
                defaults.stale_decision_cycles,
            )?,
            max_position_units: parse_or(
                &lookup,
                "PAIRWATCH_MAX_UNITS",
                defaults.max_position_units,
            )?,
            ..defaults
        };

        let pairs = match lookup("PAIRWATCH_PAIRS") {
            Some(raw) => parse_pairs(&raw)?,
            None => parse_pairs(DEFAULT_PAIRS)?,
        };

        Ok(Self {
            monitor,
            pairs,
            shutdown_grace: millis(&lookup, "PAIRWATCH_SHUTDOWN_GRACE_MS", Duration::from_secs(5))?,
            stats_interval: millis(&lookup, "PAIRWATCH_STATS_INTERVAL_MS", Duration::from_secs(5))?,
            stats_window_ms: parse_or(
                &lookup,
                "PAIRWATCH_STATS_WINDOW_MS",
                market::rolling_window::DEFAULT_MAX_AGE_MS,
            )?,
            feed_interval: millis(&lookup, "PAIRWATCH_FEED_INTERVAL_MS", Duration::from_millis(250))?,
        })
    }

    /// Every distinct symbol named by the pair selection.
    pub fn symbols(&self) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = Vec::new();
        for spec in &self.pairs {
            for id in [spec.pair.first(), spec.pair.second()] {
                if !out.contains(id) {
                    out.push(id.clone());
                }
            }
        }
        out
    }
}

/// JSON logs in production, pretty logs everywhere else.
pub fn json_logs_from_env() -> bool {
    std::env::var("APP_ENV").is_ok_and(|v| v.eq_ignore_ascii_case("production"))
}

/// Parses `A:B[:rho],C:D[:rho],...`. A missing correlation defaults to 0.
pub fn parse_pairs(raw: &str) -> Result<Vec<PairSpec>, AppError> {
    let mut out = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();

        let (a, b, rho) = match parts.as_slice() {
            [a, b] => (*a, *b, 0.0),
            [a, b, rho] => {
                let rho: f64 = rho
                    .parse()
                    .map_err(|_| AppError::InvalidPairs(format!("bad correlation in {entry:?}")))?;
                (*a, *b, rho)
            }
            _ => {
                return Err(AppError::InvalidPairs(format!(
                    "expected SYMBOL:SYMBOL[:correlation], got {entry:?}"
                )));
            }
        };

        let first = EntityId::new(a).map_err(|e| AppError::InvalidPairs(format!("{entry:?}: {e}")))?;
        let second =
            EntityId::new(b).map_err(|e| AppError::InvalidPairs(format!("{entry:?}: {e}")))?;
        let pair =
            Pair::new(first, second).map_err(|e| AppError::InvalidPairs(format!("{entry:?}: {e}")))?;

        out.push(PairSpec::new(pair, rho));
    }

    if out.is_empty() {
        return Err(AppError::InvalidPairs("no pairs given".into()));
    }
    Ok(out)
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| AppError::InvalidEnv {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, AppError> {
    parse_or(lookup, var, default.as_millis() as u64).map(Duration::from_millis)
}
