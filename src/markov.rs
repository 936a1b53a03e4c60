//! Row-stochastic matrices: sampling successor states and the stationary distribution.

use rand::Rng;

use crate::error::{Result, StochasticError};
use crate::statistics::KahanSum;

/// Largest tolerated violation of `π·A = π` for a stationary vector.
const STATIONARY_TOLERANCE: f64 = 1e-8;

/// Samples the successor of `state` by inverse-CDF sampling over its row.
///
/// Returns `None` if the row has no probability mass or contains a NaN. When
/// rounding keeps the accumulated mass below the drawn value, the last
/// non-zero entry of the row is chosen.
pub fn next_state<R: Rng + ?Sized>(rng: &mut R, matrix: &[Vec<f64>], state: usize) -> Option<usize> {
    let row = matrix.get(state)?;
    if row.iter().any(|p| p.is_nan()) {
        return None;
    }
    let last = row.iter().rposition(|&p| p > 0.0)?;

    let u: f64 = rng.gen();
    let mut sum = KahanSum::new();
    for (j, &p) in row.iter().enumerate() {
        if sum.add(p) > u {
            return Some(j);
        }
    }
    Some(last)
}

/// Returns a copy of `counts` with every row scaled to sum to one.
///
/// Rows without observations stay all-zero.
pub fn normalize_rows(counts: &[Vec<f64>]) -> Vec<Vec<f64>> {
    counts
        .iter()
        .map(|row| {
            let total: f64 = row.iter().sum();
            if total > 0.0 {
                row.iter().map(|&c| c / total).collect()
            } else {
                vec![0.0; row.len()]
            }
        })
        .collect()
}

/// Computes the stationary distribution `π` with `π·A = π` and `Σπ = 1`.
///
/// Solves the transposed system `(Aᵀ - I)·π = 0` with the last equation
/// replaced by the normalisation constraint, using Gaussian elimination with
/// partial pivoting.
pub fn stationary_distribution(matrix: &[Vec<f64>]) -> Result<Vec<f64>> {
    let n = matrix.len();
    if n == 0 || matrix.iter().any(|row| row.len() != n) {
        return Err(StochasticError::NoUnitEigenvalue);
    }

    // augmented system [M | b]
    let mut system: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut row: Vec<f64> = (0..n)
                .map(|j| matrix[j][i] - if i == j { 1.0 } else { 0.0 })
                .collect();
            row.push(0.0);
            row
        })
        .collect();
    system[n - 1] = vec![1.0; n + 1];

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| system[a][col].abs().total_cmp(&system[b][col].abs()))
            .unwrap_or(col);
        if system[pivot][col].abs() < f64::EPSILON {
            return Err(StochasticError::NoUnitEigenvalue);
        }
        system.swap(col, pivot);

        for row in col + 1..n {
            let factor = system[row][col] / system[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..=n {
                system[row][k] -= factor * system[col][k];
            }
        }
    }

    let mut pi = vec![0.0; n];
    for i in (0..n).rev() {
        let tail: f64 = (i + 1..n).map(|j| system[i][j] * pi[j]).sum();
        pi[i] = (system[i][n] - tail) / system[i][i];
    }

    let residual = (0..n)
        .map(|j| {
            let projected: f64 = (0..n).map(|i| pi[i] * matrix[i][j]).sum();
            (projected - pi[j]).abs()
        })
        .fold(0.0, f64::max);
    if !residual.is_finite() || residual > STATIONARY_TOLERANCE {
        return Err(StochasticError::NoUnitEigenvalue);
    }
    if pi.iter().any(|&p| p < -STATIONARY_TOLERANCE) {
        return Err(StochasticError::InvalidStationaryVector);
    }

    // clip rounding noise
    Ok(pi.into_iter().map(|p| p.max(0.0)).collect())
}
