use crate::CalibrationError;
use serde::{Deserialize, Serialize};

/// Polynomial transform from raw DAQ units to engineering units.
///
/// Coefficients are stored lowest power first, so `[intercept, slope, ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    coefficients: Vec<f64>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::identity()
    }
}

impl Calibration {
    pub fn identity() -> Self {
        Self {
            coefficients: vec![0.0, 1.0],
        }
    }

    /// Least-squares polynomial fit of `degree` over `(raw, reference)` points.
    pub fn fit(points: &[(f64, f64)], degree: usize) -> Result<Self, CalibrationError> {
        if degree == 0 {
            return Err(CalibrationError::ZeroDegree);
        }
        let needed = degree + 1;
        if points.len() < needed {
            return Err(CalibrationError::InsufficientPoints {
                degree,
                needed,
                got: points.len(),
            });
        }

        // Normal equations: (AᵀA) c = Aᵀy with A the Vandermonde matrix.
        let mut power_sums = vec![0.0_f64; 2 * degree + 1];
        let mut rhs = vec![0.0_f64; needed];
        for &(x, y) in points {
            let mut xp = 1.0;
            for (k, sum) in power_sums.iter_mut().enumerate() {
                *sum += xp;
                if k < needed {
                    rhs[k] += xp * y;
                }
                xp *= x;
            }
        }
        let mut system: Vec<Vec<f64>> = (0..needed)
            .map(|row| {
                let mut r: Vec<f64> = power_sums[row..row + needed].to_vec();
                r.push(rhs[row]);
                r
            })
            .collect();

        let coefficients = solve_augmented(&mut system).ok_or(CalibrationError::Singular)?;
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(CalibrationError::NonFinite);
        }
        Ok(Self { coefficients })
    }

    pub fn slope(&self) -> f64 {
        self.coefficients.get(1).copied().unwrap_or(0.0)
    }

    pub fn intercept(&self) -> f64 {
        self.coefficients.first().copied().unwrap_or(0.0)
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn is_identity(&self) -> bool {
        self.coefficients == [0.0, 1.0]
    }

    /// Evaluate the transform at `raw` (Horner's rule).
    pub fn apply(&self, raw: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * raw + c)
    }
}

/// Fit and return `(slope, intercept)`.
pub fn fit(points: &[(f64, f64)], degree: usize) -> Result<(f64, f64), CalibrationError> {
    let cal = Calibration::fit(points, degree)?;
    Ok((cal.slope(), cal.intercept()))
}

/// Gaussian elimination with partial pivoting on an `n x (n+1)` augmented matrix.
fn solve_augmented(m: &mut [Vec<f64>]) -> Option<Vec<f64>> {
    let n = m.len();
    let scale = m
        .iter()
        .flat_map(|r| r.iter().take(n))
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let eps = f64::EPSILON * scale.max(1.0) * n as f64;

    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() <= eps {
            return None;
        }
        m.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = m[row][col] / m[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..=n {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut out = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| m[row][k] * out[k]).sum();
        out[row] = (m[row][n] - tail) / m[row][row];
    }
    Some(out)
}
