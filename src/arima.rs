//! ARIMA(p, d, q) estimation and forecasting.
//!
//! The series is differenced `d` times and the stationary remainder is fitted
//! by conditional least squares:
//!
//! - pure AR models (`q == 0`) are an ordinary regression on `p` lags;
//! - models with an MA part use the Hannan-Rissanen two-stage regression,
//!   where residuals of a long autoregression stand in for the unobserved
//!   innovations.
//!
//! A constant is only estimated for undifferenced models (`d == 0`).
//! Forecasts are produced recursively on the differenced scale and then
//! integrated back to levels; interval widths come from the psi-weights of
//! the integrated process.

use crate::stats;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArimaError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("estimation failed: {0}")]
    Estimation(String),
}

pub type Result<T> = std::result::Result<T, ArimaError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Result<Self> {
        if p > 10 {
            return Err(ArimaError::InvalidParameter {
                name: "p",
                reason: "AR order must be <= 10".to_string(),
            });
        }
        if d > 2 {
            return Err(ArimaError::InvalidParameter {
                name: "d",
                reason: "Differencing order must be <= 2".to_string(),
            });
        }
        if q > 10 {
            return Err(ArimaError::InvalidParameter {
                name: "q",
                reason: "MA order must be <= 10".to_string(),
            });
        }
        Ok(Self { p, d, q })
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({}, {}, {})", self.p, self.d, self.q)
    }
}

/// Unfitted model specification.
#[derive(Clone, Copy, Debug)]
pub struct Arima {
    order: ArimaOrder,
}

impl Arima {
    pub fn new(order: ArimaOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn min_observations(&self) -> usize {
        self.order.p + self.order.d + self.order.q + 10
    }

    pub fn fit(&self, data: &[f64]) -> Result<FittedArima> {
        let ArimaOrder { p, d, q } = self.order;

        let required = self.min_observations();
        if data.len() < required {
            return Err(ArimaError::InsufficientData {
                required,
                actual: data.len(),
            });
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(ArimaError::InvalidData(
                "series contains NaN or infinite values".to_string(),
            ));
        }

        let level_tails: Vec<f64> = (0..d)
            .map(|k| difference(data, k).last().copied().unwrap_or(0.0))
            .collect();
        let w = difference(data, d);
        let m = w.len();
        let include_mean = d == 0;

        let estimate = if q == 0 {
            estimate_ar(&w, p, include_mean)?
        } else {
            estimate_hannan_rissanen(&w, p, q, include_mean)?
        };

        let start = p;
        let residuals = recursive_residuals(&w, &estimate, start);
        let conditional = &residuals[start..];
        if conditional.iter().any(|e| !e.is_finite()) {
            return Err(ArimaError::Estimation(
                "residual recursion diverged (non-invertible MA part)".to_string(),
            ));
        }

        let nobs_effective = m - start;
        let sigma2 = conditional.iter().map(|e| e * e).sum::<f64>() / nobs_effective as f64;
        if sigma2 <= f64::EPSILON * 1e-3 {
            return Err(ArimaError::Estimation(
                "residual variance is zero; the series is degenerate".to_string(),
            ));
        }

        let n_eff = nobs_effective as f64;
        let log_likelihood = -0.5 * n_eff * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);

        Ok(FittedArima {
            order: self.order,
            include_mean,
            constant: estimate.constant,
            constant_se: estimate.constant_se,
            ar: estimate.ar,
            ar_se: estimate.ar_se,
            ma: estimate.ma,
            ma_se: estimate.ma_se,
            sigma2,
            nobs: data.len(),
            nobs_effective,
            log_likelihood,
            differenced: w,
            residuals,
            residual_start: start,
            level_tails,
        })
    }
}

/// Applies `order` rounds of first differencing.
pub fn difference(data: &[f64], order: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..order {
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

struct Estimate {
    constant: f64,
    constant_se: f64,
    ar: Vec<f64>,
    ar_se: Vec<f64>,
    ma: Vec<f64>,
    ma_se: Vec<f64>,
}

fn estimate_ar(w: &[f64], p: usize, include_mean: bool) -> Result<Estimate> {
    if p == 0 && !include_mean {
        return Ok(Estimate {
            constant: 0.0,
            constant_se: 0.0,
            ar: Vec::new(),
            ar_se: Vec::new(),
            ma: Vec::new(),
            ma_se: Vec::new(),
        });
    }

    let mut rows = Vec::with_capacity(w.len().saturating_sub(p));
    let mut targets = Vec::with_capacity(w.len().saturating_sub(p));
    for t in p..w.len() {
        let mut row = Vec::with_capacity(p + 1);
        if include_mean {
            row.push(1.0);
        }
        row.extend((1..=p).map(|i| w[t - i]));
        rows.push(row);
        targets.push(w[t]);
    }

    let fit = stats::ols(&rows, &targets).ok_or_else(|| {
        ArimaError::Estimation(
            "singular design matrix; the series may be constant or too short".to_string(),
        )
    })?;
    Ok(split_estimate(&fit, p, 0, include_mean))
}

fn estimate_hannan_rissanen(w: &[f64], p: usize, q: usize, include_mean: bool) -> Result<Estimate> {
    let m = w.len();
    let long_order = (p + q + 1).max((((m as f64).ln().powi(2)) as usize).min(m / 4));

    // Stage 1: long autoregression to approximate the innovations.
    let mut rows = Vec::new();
    let mut targets = Vec::new();
    for t in long_order..m {
        let mut row = Vec::with_capacity(long_order + 1);
        row.push(1.0);
        row.extend((1..=long_order).map(|i| w[t - i]));
        rows.push(row);
        targets.push(w[t]);
    }
    let long_fit = stats::ols(&rows, &targets).ok_or_else(|| {
        ArimaError::Estimation(format!(
            "long autoregression of order {} could not be fitted",
            long_order
        ))
    })?;
    let mut innovations = vec![0.0; m];
    for (offset, e) in long_fit.residuals.iter().enumerate() {
        innovations[long_order + offset] = *e;
    }

    // Stage 2: regress on own lags and lagged innovations.
    let first = (long_order + q).max(p);
    let mut rows = Vec::new();
    let mut targets = Vec::new();
    for t in first..m {
        let mut row = Vec::with_capacity(p + q + 1);
        if include_mean {
            row.push(1.0);
        }
        row.extend((1..=p).map(|i| w[t - i]));
        row.extend((1..=q).map(|j| innovations[t - j]));
        rows.push(row);
        targets.push(w[t]);
    }
    let fit = stats::ols(&rows, &targets).ok_or_else(|| {
        ArimaError::Estimation(
            "singular design matrix in the second-stage regression".to_string(),
        )
    })?;
    Ok(split_estimate(&fit, p, q, include_mean))
}

fn split_estimate(fit: &stats::OlsFit, p: usize, q: usize, include_mean: bool) -> Estimate {
    let se = fit.std_errors();
    let offset = usize::from(include_mean);
    let (constant, constant_se) = if include_mean { (fit.beta[0], se[0]) } else { (0.0, 0.0) };
    Estimate {
        constant,
        constant_se,
        ar: fit.beta[offset..offset + p].to_vec(),
        ar_se: se[offset..offset + p].to_vec(),
        ma: fit.beta[offset + p..offset + p + q].to_vec(),
        ma_se: se[offset + p..offset + p + q].to_vec(),
    }
}

fn recursive_residuals(w: &[f64], est: &Estimate, start: usize) -> Vec<f64> {
    let mut residuals = vec![0.0; w.len()];
    for t in start..w.len() {
        let mut prediction = est.constant;
        for (i, phi) in est.ar.iter().enumerate() {
            prediction += phi * w[t - i - 1];
        }
        for (j, theta) in est.ma.iter().enumerate() {
            if let Some(idx) = t.checked_sub(j + 1) {
                prediction += theta * residuals[idx];
            }
        }
        residuals[t] = w[t] - prediction;
    }
    residuals
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: f64,
    pub std_error: f64,
}

impl Param {
    pub fn z(&self) -> f64 {
        if self.std_error > 0.0 {
            self.value / self.std_error
        } else {
            f64::NAN
        }
    }

    pub fn p_value(&self) -> f64 {
        stats::two_sided_normal_p(self.z())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointForecast {
    pub mean: f64,
    pub std_error: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Result of [`Arima::fit`]. Owns everything needed to forecast.
#[derive(Clone, Debug)]
pub struct FittedArima {
    order: ArimaOrder,
    include_mean: bool,
    constant: f64,
    constant_se: f64,
    ar: Vec<f64>,
    ar_se: Vec<f64>,
    ma: Vec<f64>,
    ma_se: Vec<f64>,
    sigma2: f64,
    nobs: usize,
    nobs_effective: usize,
    log_likelihood: f64,
    differenced: Vec<f64>,
    residuals: Vec<f64>,
    residual_start: usize,
    /// Last value of each differencing level 0..d, for integrating forecasts.
    level_tails: Vec<f64>,
}

impl FittedArima {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma
    }

    pub fn constant(&self) -> Option<f64> {
        self.include_mean.then_some(self.constant)
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn nobs(&self) -> usize {
        self.nobs
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Estimated parameters including the innovation variance.
    pub fn k_params(&self) -> usize {
        self.order.p + self.order.q + usize::from(self.include_mean) + 1
    }

    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood + 2.0 * self.k_params() as f64
    }

    pub fn bic(&self) -> f64 {
        -2.0 * self.log_likelihood + self.k_params() as f64 * (self.nobs_effective as f64).ln()
    }

    pub fn hqic(&self) -> f64 {
        -2.0 * self.log_likelihood
            + 2.0 * self.k_params() as f64 * (self.nobs_effective as f64).ln().ln()
    }

    /// In-sample residuals conditional on the first `p` differenced values.
    pub fn residuals(&self) -> &[f64] {
        &self.residuals[self.residual_start..]
    }

    pub fn params(&self) -> Vec<Param> {
        let mut out = Vec::with_capacity(self.k_params());
        if self.include_mean {
            out.push(Param {
                name: "const".to_string(),
                value: self.constant,
                std_error: self.constant_se,
            });
        }
        for (i, (value, se)) in self.ar.iter().zip(&self.ar_se).enumerate() {
            out.push(Param {
                name: format!("ar.L{}", i + 1),
                value: *value,
                std_error: *se,
            });
        }
        for (j, (value, se)) in self.ma.iter().zip(&self.ma_se).enumerate() {
            out.push(Param {
                name: format!("ma.L{}", j + 1),
                value: *value,
                std_error: *se,
            });
        }
        out.push(Param {
            name: "sigma2".to_string(),
            value: self.sigma2,
            std_error: (2.0 * self.sigma2 * self.sigma2 / self.nobs_effective as f64).sqrt(),
        });
        out
    }

    /// Ljung-Box statistic at lag 1 and its p-value.
    pub fn ljung_box_lag1(&self) -> (f64, f64) {
        let resid = self.residuals();
        let n = resid.len() as f64;
        if n < 3.0 {
            return (0.0, 1.0);
        }
        let r1 = stats::autocorrelation(resid, 1);
        let q = n * (n + 2.0) * r1 * r1 / (n - 1.0);
        (q, stats::chi2_sf_1(q))
    }

    /// Jarque-Bera normality statistic and its p-value.
    pub fn jarque_bera(&self) -> (f64, f64) {
        let resid = self.residuals();
        let n = resid.len() as f64;
        let (skew, kurt) = stats::skew_kurtosis(resid);
        let jb = n / 6.0 * (skew * skew + (kurt - 3.0).powi(2) / 4.0);
        (jb, stats::chi2_sf_2(jb))
    }

    /// Point forecasts for the next `steps` periods on the original scale.
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        if steps == 0 {
            return Vec::new();
        }

        let mut extended = self.differenced.clone();
        let mut innovations = self.residuals.clone();
        let mut tails = self.level_tails.clone();
        let mut out = Vec::with_capacity(steps);

        for _ in 0..steps {
            let len = extended.len();
            let mut next = self.constant;
            for (i, phi) in self.ar.iter().enumerate() {
                if let Some(idx) = len.checked_sub(i + 1) {
                    next += phi * extended[idx];
                }
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if let Some(idx) = len.checked_sub(j + 1) {
                    next += theta * innovations[idx];
                }
            }
            extended.push(next);
            innovations.push(0.0);

            let mut level = next;
            for k in (0..tails.len()).rev() {
                level += tails[k];
                tails[k] = level;
            }
            out.push(level);
        }

        out
    }

    /// Point forecasts with standard errors and a symmetric normal interval of
    /// the given coverage (e.g. `0.95`).
    pub fn forecast_with_interval(&self, steps: usize, level: f64) -> Vec<PointForecast> {
        let means = self.forecast(steps);
        let psi = self.psi_weights(steps);
        let z = stats::normal_two_sided_quantile(level);

        let mut cumulative = 0.0;
        means
            .into_iter()
            .zip(psi)
            .map(|(mean, weight)| {
                cumulative += weight * weight;
                let std_error = (self.sigma2 * cumulative).sqrt();
                PointForecast {
                    mean,
                    std_error,
                    lower: mean - z * std_error,
                    upper: mean + z * std_error,
                }
            })
            .collect()
    }

    /// MA(infinity) weights of the integrated process, psi_0 = 1.
    fn psi_weights(&self, count: usize) -> Vec<f64> {
        // phi(B) * (1 - B)^d
        let mut poly: Vec<f64> = std::iter::once(1.0).chain(self.ar.iter().map(|c| -c)).collect();
        for _ in 0..self.order.d {
            let mut next = vec![0.0; poly.len() + 1];
            for (i, c) in poly.iter().enumerate() {
                next[i] += c;
                next[i + 1] -= c;
            }
            poly = next;
        }
        let ar_full: Vec<f64> = poly.iter().skip(1).map(|c| -c).collect();

        let mut psi = Vec::with_capacity(count);
        for j in 0..count {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let mut value = self.ma.get(j - 1).copied().unwrap_or(0.0);
            for (i, a) in ar_full.iter().enumerate().take(j) {
                value += a * psi[j - i - 1];
            }
            psi.push(value);
        }
        psi
    }

    pub fn summary(&self, dep_variable: &str, sample: Option<(String, String)>) -> ModelSummary {
        let (lb_q, lb_p) = self.ljung_box_lag1();
        let (jb, jb_p) = self.jarque_bera();
        let (skew, kurtosis) = stats::skew_kurtosis(self.residuals());
        ModelSummary {
            dep_variable: dep_variable.to_string(),
            order: self.order,
            nobs: self.nobs,
            sample,
            log_likelihood: self.log_likelihood,
            aic: self.aic(),
            bic: self.bic(),
            hqic: self.hqic(),
            params: self.params(),
            ljung_box: (lb_q, lb_p),
            jarque_bera: (jb, jb_p),
            residual_mean: stats::mean(self.residuals()),
            skew,
            kurtosis,
        }
    }
}

/// Text report of a fitted model, rendered through `Display`.
#[derive(Clone, Debug)]
pub struct ModelSummary {
    pub dep_variable: String,
    pub order: ArimaOrder,
    pub nobs: usize,
    pub sample: Option<(String, String)>,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub hqic: f64,
    pub params: Vec<Param>,
    pub ljung_box: (f64, f64),
    pub jarque_bera: (f64, f64),
    pub residual_mean: f64,
    pub skew: f64,
    pub kurtosis: f64,
}

const SUMMARY_WIDTH: usize = 78;

fn pair_line(left: &str, left_value: &str, right: &str, right_value: &str) -> String {
    format!("{:<20}{:>19}   {:<23}{:>13}", left, left_value, right, right_value)
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heavy = "=".repeat(SUMMARY_WIDTH);
        let light = "-".repeat(SUMMARY_WIDTH);

        writeln!(f, "{:^width$}", "ARIMA Model Results", width = SUMMARY_WIDTH)?;
        writeln!(f, "{}", heavy)?;
        writeln!(
            f,
            "{}",
            pair_line("Dep. Variable:", &self.dep_variable, "No. Observations:", &self.nobs.to_string())
        )?;
        writeln!(
            f,
            "{}",
            pair_line("Model:", &self.order.to_string(), "Log Likelihood", &format!("{:.3}", self.log_likelihood))
        )?;
        writeln!(f, "{}", pair_line("Method:", "css", "AIC", &format!("{:.3}", self.aic)))?;
        let (first, last) = self
            .sample
            .clone()
            .unwrap_or_else(|| ("0".to_string(), self.nobs.to_string()));
        writeln!(f, "{}", pair_line("Sample:", &first, "BIC", &format!("{:.3}", self.bic)))?;
        writeln!(
            f,
            "{}",
            pair_line("", &format!("- {}", last), "HQIC", &format!("{:.3}", self.hqic))
        )?;
        writeln!(f, "{}", heavy)?;
        writeln!(
            f,
            "{:<10}{:>11}{:>11}{:>11}{:>11}{:>12}{:>12}",
            "", "coef", "std err", "z", "P>|z|", "[0.025", "0.975]"
        )?;
        writeln!(f, "{}", light)?;
        for param in &self.params {
            let ci = 1.959964 * param.std_error;
            writeln!(
                f,
                "{:<10}{:>11.4}{:>11.3}{:>11.3}{:>11.3}{:>12.3}{:>12.3}",
                param.name,
                param.value,
                param.std_error,
                param.z(),
                param.p_value(),
                param.value - ci,
                param.value + ci
            )?;
        }
        writeln!(f, "{}", heavy)?;
        writeln!(
            f,
            "{}",
            pair_line(
                "Ljung-Box (L1) (Q):",
                &format!("{:.2}", self.ljung_box.0),
                "Jarque-Bera (JB):",
                &format!("{:.2}", self.jarque_bera.0)
            )
        )?;
        writeln!(
            f,
            "{}",
            pair_line(
                "Prob(Q):",
                &format!("{:.2}", self.ljung_box.1),
                "Prob(JB):",
                &format!("{:.2}", self.jarque_bera.1)
            )
        )?;
        writeln!(
            f,
            "{}",
            pair_line(
                "Residual mean:",
                &format!("{:.4}", self.residual_mean),
                "Skew:",
                &format!("{:.2}", self.skew)
            )
        )?;
        writeln!(f, "{}", pair_line("", "", "Kurtosis:", &format!("{:.2}", self.kurtosis)))?;
        write!(f, "{}", heavy)
    }
}
