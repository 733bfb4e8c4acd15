//! Pure pair-trading math: standardization, spread, z-score, sizing, shortfall.
//!
//! Nothing here touches shared state.

use crate::error::SpreadError;

/// Arithmetic mean; 0.0 for an empty series.
pub fn mean(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f64>() / series.len() as f64
}

/// Population standard deviation; 0.0 for fewer than two points.
pub fn stddev(series: &[f64]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    let m = mean(series);
    let var = series.iter().map(|x| (x - m).powi(2)).sum::<f64>() / series.len() as f64;
    var.sqrt()
}

/// Returns `(standardized, mean, stddev)`.
///
/// A constant series has no dispersion; its standardized form is all zeros.
pub fn standardize(series: &[f64]) -> (Vec<f64>, f64, f64) {
    let m = mean(series);
    let sd = stddev(series);

    let out = if sd > 0.0 && sd.is_finite() {
        series.iter().map(|x| (x - m) / sd).collect()
    } else {
        vec![0.0; series.len()]
    };

    (out, m, sd)
}

pub fn spread(price_a: f64, price_b: f64) -> f64 {
    price_a - price_b
}

/// Variance of the spread of two legs with the given volatilities and correlation.
pub fn spread_variance(vol_a: f64, vol_b: f64, correlation: f64) -> f64 {
    vol_a * vol_a + vol_b * vol_b - 2.0 * vol_a * vol_b * correlation
}

/// `spread / sqrt(vol_a² + vol_b² - 2·vol_a·vol_b·ρ)`.
///
/// Fails when the variance is zero, negative or NaN, or when the result is not finite.
pub fn z_score(spread: f64, vol_a: f64, vol_b: f64, correlation: f64) -> Result<f64, SpreadError> {
    let variance = spread_variance(vol_a, vol_b, correlation);
    if variance.is_nan() || variance <= 0.0 {
        return Err(SpreadError::DegenerateVariance { variance });
    }

    let z = spread / variance.sqrt();
    if !z.is_finite() {
        return Err(SpreadError::NonFinite);
    }
    Ok(z)
}

pub fn is_in_range(z: f64, threshold: f64) -> bool {
    z.is_finite() && z.abs() <= threshold
}

/// `max(1, floor(1 / (|z| · max_shortfall)))`, capped at `max_units`.
///
/// A zero z-score sizes to the cap rather than overflowing. Pass `i32::MAX`
/// to leave the formula unbounded within the `i32` range.
pub fn position_size(z: f64, max_shortfall: f64, max_units: i32) -> i32 {
    let cap = max_units.max(1);
    let raw = 1.0 / (z.abs() * max_shortfall);

    if raw.is_nan() {
        return 1;
    }
    if raw >= cap as f64 {
        return cap;
    }
    (raw.floor() as i32).max(1)
}

/// Leg positions for `units`: short the first leg, long the second.
pub fn pair_positions(units: i32) -> (i32, i32) {
    (-units, units)
}

/// `|spread - (pos_a·price_a + pos_b·price_b)|`.
pub fn shortfall(spread: f64, position_a: i32, price_a: f64, position_b: i32, price_b: f64) -> f64 {
    (spread - (position_a as f64 * price_a + position_b as f64 * price_b)).abs()
}

/// Log returns of consecutive prices; non-positive prices are skipped.
pub fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

/// Pearson correlation of the overlapping tail of two series.
///
/// `None` when fewer than two aligned points exist or either side is constant.
pub fn correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let xs = &xs[xs.len() - n..];
    let ys = &ys[ys.len() - n..];

    let mx = mean(xs);
    let my = mean(ys);

    let (mut cov, mut vx, mut vy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }

    if vx <= 0.0 || vy <= 0.0 {
        return None;
    }

    let rho = cov / (vx.sqrt() * vy.sqrt());
    rho.is_finite().then(|| rho.clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn standardize_centres_and_scales() {
        let (z, m, sd) = standardize(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert!((m - 3.0).abs() < EPS);
        assert!((sd - 2.0_f64.sqrt()).abs() < EPS);
        assert!(mean(&z).abs() < EPS);
        assert!((stddev(&z) - 1.0).abs() < EPS);
    }

    #[test]
    fn standardize_constant_and_empty_series() {
        let (z, m, sd) = standardize(&[4.0, 4.0, 4.0]);
        assert_eq!(z, vec![0.0, 0.0, 0.0]);
        assert_eq!(m, 4.0);
        assert_eq!(sd, 0.0);

        let (z, m, sd) = standardize(&[]);
        assert!(z.is_empty());
        assert_eq!((m, sd), (0.0, 0.0));
    }

    #[test]
    fn uncorrelated_unit_vol_pair_is_in_range() {
        // A=102, B=100, vol 1/1, rho 0
        let s = spread(102.0, 100.0);
        let z = z_score(s, 1.0, 1.0, 0.0).unwrap();

        assert_eq!(s, 2.0);
        assert!((z - 2.0 / 2.0_f64.sqrt()).abs() < EPS);
        assert!(is_in_range(z, 2.0));

        let units = position_size(z, 0.01, 10_000);
        assert_eq!(units, 70);
        assert_eq!(pair_positions(units), (-70, 70));
    }

    #[test]
    fn highly_correlated_pair_is_out_of_range() {
        let z = z_score(2.0, 1.0, 1.0, 0.99).unwrap();

        assert!((z - 2.0 / 0.02_f64.sqrt()).abs() < 1e-6);
        assert!(!is_in_range(z, 2.0));
    }

    #[test]
    fn degenerate_variance_is_an_error() {
        // identical vols, perfect correlation => zero variance
        assert!(matches!(
            z_score(2.0, 1.0, 1.0, 1.0),
            Err(SpreadError::DegenerateVariance { .. })
        ));
        assert!(matches!(
            z_score(2.0, 0.0, 0.0, 0.0),
            Err(SpreadError::DegenerateVariance { .. })
        ));
        // rho > 1 from a bad upstream yields negative variance
        assert!(matches!(
            z_score(2.0, 1.0, 1.0, 1.5),
            Err(SpreadError::DegenerateVariance { .. })
        ));
        assert!(matches!(
            z_score(2.0, f64::NAN, 1.0, 0.0),
            Err(SpreadError::DegenerateVariance { .. })
        ));
        assert!(matches!(
            z_score(f64::INFINITY, 1.0, 1.0, 0.0),
            Err(SpreadError::NonFinite)
        ));
    }

    #[test]
    fn zero_z_sizes_to_cap() {
        assert_eq!(position_size(0.0, 0.01, 500), 500);
        assert_eq!(position_size(1.9, 10.0, 500), 1);
        assert_eq!(position_size(0.0, 0.01, i32::MAX), i32::MAX);
        assert_eq!(position_size(1e-300, 0.01, i32::MAX), i32::MAX);
    }

    #[test]
    fn small_z_follows_formula_without_cap() {
        // spread 0.01 over unit vols: z ~ 0.00707, 1 / (z * 0.01) ~ 14142.1
        let z = z_score(spread(100.01, 100.0), 1.0, 1.0, 0.0).unwrap();

        assert!((z - 0.007_071_067_811_8).abs() < 1e-9);
        assert_eq!(position_size(z, 0.01, i32::MAX), 14_142);
    }

    #[test]
    fn range_boundary_is_inclusive() {
        assert!(is_in_range(2.0, 2.0));
        assert!(is_in_range(-2.0, 2.0));
        assert!(!is_in_range(2.000_000_1, 2.0));
        assert!(!is_in_range(-2.000_000_1, 2.0));
        assert!(!is_in_range(f64::NAN, 2.0));

        // z = 2 exactly: spread 2 over a unit-variance spread
        let z = z_score(spread(102.0, 100.0), 1.0, 0.0, 0.0).unwrap();
        assert_eq!(z, 2.0);
        assert!(is_in_range(z, 2.0));
        assert_eq!(position_size(z, 0.01, i32::MAX), 50);
        assert_eq!(position_size(-z, 0.01, i32::MAX), 50);
    }

    #[test]
    fn shortfall_matches_definition() {
        // spread 2, positions (-70, 70) on 102/100 => |2 - (-7140 + 7000)| = 142
        let sf = shortfall(2.0, -70, 102.0, 70, 100.0);
        assert!((sf - 142.0).abs() < EPS);
    }

    #[test]
    fn correlation_of_linear_series() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [2.0, 4.0, 6.0, 8.0];
        let inv = [8.0, 6.0, 4.0, 2.0];

        assert!((correlation(&xs, &ys).unwrap() - 1.0).abs() < EPS);
        assert!((correlation(&xs, &inv).unwrap() + 1.0).abs() < EPS);
        assert_eq!(correlation(&xs, &[1.0, 1.0, 1.0]), None);
        assert_eq!(correlation(&[1.0], &[1.0]), None);
    }

    #[test]
    fn log_returns_skip_non_positive_prices() {
        let r = log_returns(&[100.0, 110.0, 0.0, 121.0]);
        assert_eq!(r.len(), 1);
        assert!((r[0] - (1.1_f64).ln()).abs() < EPS);
    }
}
