//! One-sided truncated exponential distribution on `[0, 1]`.
//!
//! With rate `λ` the distribution has
//!
//! ```text
//!   F(x)   = (1 - e^{-λx}) / (1 - e^{-λ})
//!   E[X]   = 1/λ - 1/(e^λ - 1)
//! ```
//!
//! The maximum-likelihood estimate of `λ` for an empirical distribution is the
//! root of `f(λ) = E_λ[X] - mean(ECDF)`, found with Newton–Raphson.

use rand::Rng;

use crate::error::{Result, StochasticError};
use crate::statistics::KahanSum;

/// Residual bound of the Newton iteration.
pub const EPSILON: f64 = 1e-9;

/// Iteration budget of the Newton iteration.
pub const MAX_ITERATIONS: usize = 10_000;

/// Below this magnitude the closed forms cancel badly and series expansions are used.
const SERIES_THRESHOLD: f64 = 1e-3;

/// Cumulative distribution function.
pub fn cdf(lambda: f64, x: f64) -> f64 {
    if lambda.abs() < f64::EPSILON {
        return x;
    }
    (-(-lambda * x).exp_m1()) / (-(-lambda).exp_m1())
}

/// Inverse cumulative distribution function.
pub fn inv_cdf(lambda: f64, p: f64) -> f64 {
    if lambda.abs() < f64::EPSILON {
        return p;
    }
    // ln(1 - p(1 - e^{-λ})) / -λ
    (p * (-lambda).exp_m1()).ln_1p() / -lambda
}

/// Draws an index in `[0, n)` from the discretised distribution.
pub fn discrete_sample<R: Rng + ?Sized>(rng: &mut R, lambda: f64, n: u64) -> u64 {
    let p: f64 = rng.gen();
    let x = inv_cdf(lambda, p);
    ((n as f64 * x) as u64).min(n.saturating_sub(1))
}

/// `1/(e^λ - 1)`, with its limit 0 once `e^λ` overflows.
fn inv_exp_m1(lambda: f64) -> f64 {
    let d = lambda.exp_m1();
    if d.is_infinite() {
        0.0
    } else {
        1.0 / d
    }
}

/// Expected value `1/λ - 1/(e^λ - 1)`.
pub fn expected_value(lambda: f64) -> f64 {
    if lambda.abs() < SERIES_THRESHOLD {
        return 0.5 - lambda / 12.0 + lambda.powi(3) / 720.0;
    }
    1.0 / lambda - inv_exp_m1(lambda)
}

/// Derivative of [`expected_value`]: `e^λ/(e^λ - 1)² - 1/λ²`.
fn expected_value_derivative(lambda: f64) -> f64 {
    if lambda.abs() < SERIES_THRESHOLD {
        return -1.0 / 12.0 + lambda * lambda / 240.0;
    }
    // e^λ/(e^λ-1)² = q + q² with q = 1/(e^λ-1)
    let q = inv_exp_m1(lambda);
    q + q * q - 1.0 / (lambda * lambda)
}

/// Mean of a piecewise-linear cumulative distribution on `[0, 1]`.
///
/// Each segment contributes its probability mass times its midpoint, which is
/// the trapezoid integral of the curve.
pub fn mean(points: &[[f64; 2]]) -> f64 {
    let mut sum = KahanSum::new();
    for segment in points.windows(2) {
        let [x1, y1] = segment[0];
        let [x2, y2] = segment[1];
        sum.add((y2 - y1) * (x1 + x2) / 2.0);
    }
    sum.sum()
}

/// Estimates `λ` for an empirical cumulative distribution.
///
/// Fails if the ECDF has fewer than two points or if the Newton iteration
/// does not bring `|f(λ)|` below [`EPSILON`] within [`MAX_ITERATIONS`].
pub fn approximate_lambda(points: &[[f64; 2]]) -> Result<f64> {
    if points.len() < 2 {
        return Err(StochasticError::EmptyDistribution(points.len()));
    }
    let target = mean(points);

    let mut lambda = 1.0;
    let mut residual = f64::NAN;
    for _ in 0..MAX_ITERATIONS {
        residual = expected_value(lambda) - target;
        let derivative = expected_value_derivative(lambda);
        if !residual.is_finite() || !derivative.is_finite() || derivative == 0.0 {
            break;
        }
        let step = residual / derivative;
        if residual.abs() < EPSILON {
            // one more step polishes the root (quadratic convergence)
            return Ok(lambda - step);
        }
        lambda -= step;
    }
    Err(StochasticError::NoConvergence {
        iterations: MAX_ITERATIONS,
        residual,
    })
}

/// Samples the cumulative distribution function at `n + 1` equidistant points.
pub fn piecewise_linear_cdf(lambda: f64, n: usize) -> Vec<[f64; 2]> {
    let n = n.max(1);
    (0..=n)
        .map(|i| {
            let x = i as f64 / n as f64;
            [x, cdf(lambda, x)]
        })
        .collect()
}
