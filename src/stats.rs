//! Small numeric toolkit backing the ARIMA estimator: distribution tails,
//! least squares and residual moments.

/// Abramowitz-Stegun 7.1.26 approximation, |error| < 1.5e-7.
pub fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// P(|Z| > |z|) for a standard normal Z.
pub fn two_sided_normal_p(z: f64) -> f64 {
    if !z.is_finite() {
        return if z.is_nan() { f64::NAN } else { 0.0 };
    }
    (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0)
}

/// Quantile of the standard normal for a two-sided interval of `level` coverage.
///
/// Acklam's rational approximation; plenty for drawing forecast bands.
pub fn normal_two_sided_quantile(level: f64) -> f64 {
    let p = 1.0 - (1.0 - level.clamp(1e-9, 1.0 - 1e-9)) / 2.0;
    inverse_normal_cdf(p)
}

fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -inverse_normal_cdf(1.0 - p)
    }
}

/// Survival function of a chi-square variable with one degree of freedom.
pub fn chi2_sf_1(x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    two_sided_normal_p(x.sqrt())
}

/// Survival function of a chi-square variable with two degrees of freedom.
pub fn chi2_sf_2(x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    (-x / 2.0).exp()
}

#[derive(Clone, Debug)]
pub struct OlsFit {
    pub beta: Vec<f64>,
    /// (X'X)^-1
    pub xtx_inv: Vec<Vec<f64>>,
    pub residuals: Vec<f64>,
    pub rss: f64,
}

impl OlsFit {
    /// Classical standard errors using `rss / (n - k)` as the error variance.
    pub fn std_errors(&self) -> Vec<f64> {
        let n = self.residuals.len();
        let k = self.beta.len();
        let dof = n.saturating_sub(k).max(1) as f64;
        let s2 = self.rss / dof;
        (0..k).map(|i| (s2 * self.xtx_inv[i][i]).max(0.0).sqrt()).collect()
    }
}

/// Ordinary least squares through the normal equations.
///
/// Returns `None` when there are fewer rows than regressors or when `X'X` is
/// numerically singular.
pub fn ols(rows: &[Vec<f64>], y: &[f64]) -> Option<OlsFit> {
    let n = rows.len();
    if n == 0 || n != y.len() {
        return None;
    }
    let k = rows[0].len();
    if k == 0 || n < k {
        return None;
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in rows.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * target;
            for j in i..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..k {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
    }

    let xtx_inv = invert(&xtx)?;
    let beta: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| xtx_inv[i][j] * xty[j]).sum())
        .collect();

    let residuals: Vec<f64> = rows
        .iter()
        .zip(y)
        .map(|(row, &target)| target - row.iter().zip(&beta).map(|(x, b)| x * b).sum::<f64>())
        .collect();
    let rss = residuals.iter().map(|e| e * e).sum();

    Some(OlsFit { beta, xtx_inv, residuals, rss })
}

/// Gauss-Jordan inversion with partial pivoting.
pub fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let k = matrix.len();
    let scale = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].abs())
        .fold(0.0_f64, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }
    let tol = scale * 1e-12;

    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..k)
        .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..k {
        let pivot_row = (col..k).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot_row][col].abs() <= tol {
            return None;
        }
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = a[col][col];
        for j in 0..k {
            a[col][j] /= pivot;
            inv[col][j] /= pivot;
        }

        for r in 0..k {
            if r == col {
                continue;
            }
            let factor = a[r][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..k {
                a[r][j] -= factor * a[col][j];
                inv[r][j] -= factor * inv[col][j];
            }
        }
    }

    Some(inv)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample autocorrelation at `lag` (biased estimator, denominator n).
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if lag >= n {
        return 0.0;
    }
    let m = mean(values);
    let denom: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denom <= 0.0 {
        return 0.0;
    }
    let num: f64 = (lag..n).map(|i| (values[i] - m) * (values[i - lag] - m)).sum();
    num / denom
}

/// Returns (skew, kurtosis) using population moments; kurtosis is not excess.
pub fn skew_kurtosis(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if n < 2.0 {
        return (0.0, 3.0);
    }
    let m = mean(values);
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
    if m2 <= 0.0 {
        return (0.0, 3.0);
    }
    let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
    let m4 = values.iter().map(|v| (v - m).powi(4)).sum::<f64>() / n;
    (m3 / m2.powf(1.5), m4 / (m2 * m2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn erf_known_values() {
        assert_abs_diff_eq!(erf(0.0), 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(erf(1.0), 0.8427007929, epsilon = 1e-6);
        assert_abs_diff_eq!(erf(-1.0), -0.8427007929, epsilon = 1e-6);
    }

    #[test]
    fn normal_tails() {
        assert_abs_diff_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-7);
        assert_abs_diff_eq!(two_sided_normal_p(1.959964), 0.05, epsilon = 1e-5);
        assert_abs_diff_eq!(normal_two_sided_quantile(0.95), 1.959964, epsilon = 1e-5);
        assert_abs_diff_eq!(normal_two_sided_quantile(0.99), 2.575829, epsilon = 1e-5);
    }

    #[test]
    fn chi_square_tails() {
        // chi2(1) 95th percentile is 3.841459
        assert_abs_diff_eq!(chi2_sf_1(3.841459), 0.05, epsilon = 1e-5);
        // chi2(2) 95th percentile is 5.991465
        assert_abs_diff_eq!(chi2_sf_2(5.991465), 0.05, epsilon = 1e-6);
        assert_eq!(chi2_sf_1(0.0), 1.0);
    }

    #[test]
    fn ols_recovers_exact_line() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![1.0, i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| 2.0 + 3.0 * i as f64).collect();
        let fit = ols(&rows, &y).unwrap();
        assert_abs_diff_eq!(fit.beta[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.beta[1], 3.0, epsilon = 1e-9);
        assert!(fit.rss < 1e-12);
    }

    #[test]
    fn ols_rejects_singular_design() {
        let rows: Vec<Vec<f64>> = (0..10).map(|_| vec![0.0, 0.0]).collect();
        let y = vec![0.0; 10];
        assert!(ols(&rows, &y).is_none());

        let collinear: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert!(ols(&collinear, &y).is_none());
    }

    #[test]
    fn invert_two_by_two() {
        let m = vec![vec![4.0, 7.0], vec![2.0, 6.0]];
        let inv = invert(&m).unwrap();
        assert_abs_diff_eq!(inv[0][0], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[0][1], -0.7, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[1][0], -0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[1][1], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn moments_of_symmetric_sample() {
        let values = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let (skew, kurt) = skew_kurtosis(&values);
        assert_abs_diff_eq!(skew, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kurt, 1.7, epsilon = 1e-12);
        assert_abs_diff_eq!(autocorrelation(&values, 0), 1.0, epsilon = 1e-12);
    }
}
