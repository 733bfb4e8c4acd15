use std::time::Duration;

use market::entity_state::DEFAULT_LOCK_BACKOFF;

use crate::error::MonitorError;

/// Configuration knobs for the pair monitors.
///
/// Every field has a documented default; see `Default`.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pause between the end of one evaluation cycle and the next read.
    pub eval_interval: Duration,

    /// A pair is in range (tradeable) while `|z| <= in_range_threshold`.
    pub in_range_threshold: f64,

    /// Maximum acceptable implementation shortfall per unit of z-score.
    /// Drives sizing: `units = max(1, floor(1 / (|z| * max_shortfall)))`.
    pub max_shortfall: f64,

    /// Sleep between two lock attempts of a contended snapshot, statistics
    /// or decision writer.
    pub lock_backoff: Duration,

    /// How long one decision write-back may keep retrying before the cycle
    /// gives up on it and reports contention.
    ///
    /// Keep it well below `eval_interval`.
    pub write_back_timeout: Duration,

    /// Number of consecutive failed decision write-backs on one entity after
    /// which the decision is reported stale.
    pub stale_decision_cycles: u32,

    /// Upper bound on units per leg. Sizing diverges as `|z| -> 0`; the
    /// default of `i32::MAX` only keeps the size representable.
    pub max_position_units: i32,

    /// Buffer of the decision event broadcast. Slow subscribers lag and
    /// skip events; they never block monitors.
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            eval_interval: Duration::from_secs(1),
            in_range_threshold: 2.0,
            max_shortfall: 0.01,
            lock_backoff: DEFAULT_LOCK_BACKOFF,
            write_back_timeout: Duration::from_millis(300),
            stale_decision_cycles: 3,
            max_position_units: i32::MAX,
            event_capacity: 1_024,
        }
    }
}

impl MonitorConfig {
    /// Rejects values that would make a monitor misbehave. Fatal at startup.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if !(self.in_range_threshold.is_finite() && self.in_range_threshold > 0.0) {
            return Err(MonitorError::Configuration(format!(
                "in_range_threshold must be finite and positive, got {}",
                self.in_range_threshold
            )));
        }
        if !(self.max_shortfall.is_finite() && self.max_shortfall > 0.0) {
            return Err(MonitorError::Configuration(format!(
                "max_shortfall must be finite and positive, got {}",
                self.max_shortfall
            )));
        }
        if self.eval_interval.is_zero() {
            return Err(MonitorError::Configuration(
                "eval_interval must be non-zero".into(),
            ));
        }
        if self.lock_backoff.is_zero() {
            return Err(MonitorError::Configuration(
                "lock_backoff must be non-zero".into(),
            ));
        }
        if self.write_back_timeout.is_zero() {
            return Err(MonitorError::Configuration(
                "write_back_timeout must be non-zero".into(),
            ));
        }
        if self.stale_decision_cycles == 0 {
            return Err(MonitorError::Configuration(
                "stale_decision_cycles must be at least 1".into(),
            ));
        }
        if self.max_position_units < 1 {
            return Err(MonitorError::Configuration(format!(
                "max_position_units must be at least 1, got {}",
                self.max_position_units
            )));
        }
        if self.event_capacity == 0 {
            return Err(MonitorError::Configuration(
                "event_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = MonitorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.eval_interval, Duration::from_secs(1));
        assert_eq!(cfg.in_range_threshold, 2.0);
        assert_eq!(cfg.lock_backoff, Duration::from_millis(100));
    }

    #[test]
    fn rejects_bad_thresholds() {
        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = MonitorConfig {
                in_range_threshold: threshold,
                ..Default::default()
            };
            assert!(matches!(
                cfg.validate(),
                Err(MonitorError::Configuration(_))
            ));
        }

        let cfg = MonitorConfig {
            max_shortfall: 0.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_durations_and_counts() {
        let cases = [
            MonitorConfig {
                eval_interval: Duration::ZERO,
                ..Default::default()
            },
            MonitorConfig {
                lock_backoff: Duration::ZERO,
                ..Default::default()
            },
            MonitorConfig {
                write_back_timeout: Duration::ZERO,
                ..Default::default()
            },
            MonitorConfig {
                stale_decision_cycles: 0,
                ..Default::default()
            },
            MonitorConfig {
                max_position_units: 0,
                ..Default::default()
            },
            MonitorConfig {
                event_capacity: 0,
                ..Default::default()
            },
        ];

        for cfg in cases {
            assert!(cfg.validate().is_err(), "accepted {cfg:?}");
        }
    }
}
