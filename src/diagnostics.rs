// src/diagnostics.rs

//! Per-observation outlier statistics for a fitted PCA model.
//!
//! Hotelling's T² and the Mahalanobis distance are computed from the same
//! weighted sum. Scores of a centered fit have covariance `diag(λ)`, so the
//! squared Mahalanobis distance of an observation in the retained subspace is
//! `Σ t²/λ`, which is T². The crate reports `D = √T²` and compares it against
//! `√(T² limit)`; the two outlier masks therefore agree for centered data, but
//! they are computed independently and never merged.

use crate::config::MetricsConfig;
use crate::error::{PcaError, Result};
use crate::linalg_backends::sorted_eigh_descending;
use crate::model::{Loadings, PcaResult};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal};
use std::collections::BTreeMap;
use std::time::Instant;

/// Discarded eigenvalues below this fraction of the total variance carry no
/// residual information.
const NEGLIGIBLE_VARIANCE_FRACTION: f64 = 1e-12;

/// Groups with fewer observations get no ellipse.
const MIN_GROUP_SIZE: usize = 3;

/// Confidence ellipse over the first two score columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceEllipse {
    pub center_x: f64,
    pub center_y: f64,
    /// Full length of the major axis (twice the semi-axis).
    pub major_axis: f64,
    /// Full length of the minor axis.
    pub minor_axis: f64,
    /// Rotation of the major axis from the PC1 axis, in radians.
    pub angle: f64,
    pub confidence_level: f64,
}

/// Control limits at the conventional 95% and 99% levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticLimits {
    pub t2_limit_95: f64,
    pub t2_limit_99: f64,
    /// `None` for kernel PCA.
    pub q_limit_95: Option<f64>,
    pub q_limit_99: Option<f64>,
}

/// Output of [`calculate_metrics`]. Per-observation fields have length n.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaMetrics {
    pub num_components: usize,
    pub significance_level: f64,
    pub mahalanobis_distances: Array1<f64>,
    pub hotelling_t2: Array1<f64>,
    /// Squared reconstruction error per observation. `None` for kernel PCA.
    pub q_residuals: Option<Array1<f64>>,
    pub outliers_mahalanobis: Vec<bool>,
    pub outliers_t2: Vec<bool>,
    pub outliers_q_residuals: Option<Vec<bool>>,
    pub t2_threshold: f64,
    pub mahalanobis_threshold: f64,
    pub q_threshold: Option<f64>,
    /// Shape (n, n_features); rows sum to the observation's T².
    pub contributions: Option<Array2<f64>>,
    pub confidence_ellipse: Option<ConfidenceEllipse>,
}

/// Computes diagnostics for `result` against the preprocessed data it was fitted on.
///
/// # Errors
/// - `Configuration` when `num_components` exceeds the fitted component count,
///   when `n <= num_components`, when contributions are requested for a kernel
///   model, or when an ellipse is requested for a model with fewer than two
///   components. These are checked before anything is computed.
/// - `DimensionMismatch` when `data` does not match the result's shape.
/// - `Numerical` when a retained component has zero variance.
pub fn calculate_metrics(
    result: &PcaResult,
    data: ArrayView2<f64>,
    config: &MetricsConfig,
) -> Result<PcaMetrics> {
    let start = Instant::now();
    config.validate()?;

    let fitted = result.n_components();
    let a = config.num_components.unwrap_or(fitted);
    if a > fitted {
        return Err(PcaError::Configuration(format!(
            "num_components ({}) exceeds the {} fitted components",
            a, fitted
        )));
    }
    let n = result.scores.nrows();
    if n <= a {
        return Err(PcaError::Configuration(format!(
            "need more samples ({}) than components ({}) for control limits",
            n, a
        )));
    }
    if data.nrows() != n {
        return Err(PcaError::DimensionMismatch {
            expected: n,
            found: data.nrows(),
        });
    }
    if let Loadings::Explicit(loadings) = &result.loadings {
        if data.ncols() != loadings.nrows() {
            return Err(PcaError::DimensionMismatch {
                expected: loadings.nrows(),
                found: data.ncols(),
            });
        }
    }
    if config.calculate_contributions && !result.loadings.is_available() {
        return Err(PcaError::Configuration(
            "contributions need input-space loadings, which kernel PCA does not have".to_string(),
        ));
    }
    if config.calculate_confidence_ellipse && fitted < 2 {
        return Err(PcaError::Configuration(
            "a confidence ellipse needs at least 2 fitted components".to_string(),
        ));
    }

    info!(
        "Calculating PCA diagnostics: {} samples, {} of {} components, alpha = {}",
        n, a, fitted, config.significance_level
    );

    let alpha = config.significance_level;
    let scores = result.scores.slice(s![.., ..a]);
    let eigenvalues = result.eigenvalues.slice(s![..a]);

    let hotelling_t2 = hotelling_t2(scores, eigenvalues)?;
    let mahalanobis_distances = hotelling_t2.mapv(f64::sqrt);
    let t2_threshold = hotelling_t2_limit(a, n, alpha)?;
    let mahalanobis_threshold = t2_threshold.sqrt();
    let outliers_t2 = exceeds(&hotelling_t2, t2_threshold);
    let outliers_mahalanobis = exceeds(&mahalanobis_distances, mahalanobis_threshold);

    let (q_residuals, q_threshold, outliers_q_residuals, contributions) = match &result.loadings {
        Loadings::Explicit(loadings) => {
            let loadings = loadings.slice(s![.., ..a]);
            let q = q_residuals(data, scores, loadings)?;
            let discarded = significant_discarded(result, a);
            let limit = q_residual_limit(&discarded, alpha)?;
            let mask = exceeds(&q, limit);
            let contributions = if config.calculate_contributions {
                Some(contributions(data, scores, loadings, eigenvalues)?)
            } else {
                None
            };
            (Some(q), Some(limit), Some(mask), contributions)
        }
        Loadings::NotAvailable => {
            debug!("Kernel PCA: Q-residuals are not defined, skipping");
            (None, None, None, None)
        }
    };

    let confidence_ellipse = if config.calculate_confidence_ellipse {
        Some(confidence_ellipse(
            result.scores.slice(s![.., ..2]),
            1.0 - alpha,
        )?)
    } else {
        None
    };

    info!(
        "PCA diagnostics done in {:?}: {} T2 outliers, {} Q outliers",
        start.elapsed(),
        outliers_t2.iter().filter(|&&o| o).count(),
        outliers_q_residuals
            .as_ref()
            .map_or(0, |m| m.iter().filter(|&&o| o).count())
    );

    Ok(PcaMetrics {
        num_components: a,
        significance_level: alpha,
        mahalanobis_distances,
        hotelling_t2,
        q_residuals,
        outliers_mahalanobis,
        outliers_t2,
        outliers_q_residuals,
        t2_threshold,
        mahalanobis_threshold,
        q_threshold,
        contributions,
        confidence_ellipse,
    })
}

/// Strict exceedance mask. A zero threshold flags nothing.
fn exceeds(values: &Array1<f64>, threshold: f64) -> Vec<bool> {
    values
        .iter()
        .map(|&v| threshold > 0.0 && v > threshold)
        .collect()
}

/// Discarded eigenvalues that are not numerical noise.
fn significant_discarded(result: &PcaResult, retained: usize) -> Vec<f64> {
    let total: f64 = result.all_eigenvalues.sum();
    let floor = total * NEGLIGIBLE_VARIANCE_FRACTION;
    result
        .all_eigenvalues
        .iter()
        .skip(retained)
        .copied()
        .filter(|&v| v > floor)
        .collect()
}

fn check_component_width(scores: ArrayView2<f64>, eigenvalues: ArrayView1<f64>) -> Result<()> {
    if scores.ncols() != eigenvalues.len() {
        return Err(PcaError::DimensionMismatch {
            expected: eigenvalues.len(),
            found: scores.ncols(),
        });
    }
    let largest = eigenvalues.iter().copied().fold(0.0_f64, f64::max);
    if let Some(j) = eigenvalues
        .iter()
        .position(|&l| !(l > largest * NEGLIGIBLE_VARIANCE_FRACTION))
    {
        return Err(PcaError::Numerical(format!(
            "component {} has zero variance; reduce num_components",
            j + 1
        )));
    }
    Ok(())
}

/// Hotelling's T² per observation: `Σⱼ tᵢⱼ² / λⱼ`.
pub fn hotelling_t2(scores: ArrayView2<f64>, eigenvalues: ArrayView1<f64>) -> Result<Array1<f64>> {
    check_component_width(scores, eigenvalues)?;
    let weighted = &scores.mapv(|t| t * t) / &eigenvalues;
    Ok(weighted.sum_axis(Axis(1)))
}

/// Mahalanobis distance of each observation from the score origin within the
/// retained subspace: `√T²`.
pub fn mahalanobis_distances(
    scores: ArrayView2<f64>,
    eigenvalues: ArrayView1<f64>,
) -> Result<Array1<f64>> {
    Ok(hotelling_t2(scores, eigenvalues)?.mapv(f64::sqrt))
}

/// Q-residual (squared prediction error) per observation:
/// the squared norm of `x − t·Pᵀ`.
pub fn q_residuals(
    data: ArrayView2<f64>,
    scores: ArrayView2<f64>,
    loadings: ArrayView2<f64>,
) -> Result<Array1<f64>> {
    if scores.ncols() != loadings.ncols() {
        return Err(PcaError::DimensionMismatch {
            expected: loadings.ncols(),
            found: scores.ncols(),
        });
    }
    if data.dim() != (scores.nrows(), loadings.nrows()) {
        return Err(PcaError::DimensionMismatch {
            expected: loadings.nrows(),
            found: data.ncols(),
        });
    }
    let residual = &data - &scores.dot(&loadings.t());
    Ok(residual.mapv(|r| r * r).sum_axis(Axis(1)))
}

/// Per-variable T² contributions, `cᵢⱼ = Σₐ (tᵢₐ / λₐ)·pⱼₐ·xᵢⱼ`.
/// Each row sums to the observation's T² when the scores are `X·P`.
pub fn contributions(
    data: ArrayView2<f64>,
    scores: ArrayView2<f64>,
    loadings: ArrayView2<f64>,
    eigenvalues: ArrayView1<f64>,
) -> Result<Array2<f64>> {
    check_component_width(scores, eigenvalues)?;
    if data.dim() != (scores.nrows(), loadings.nrows()) || loadings.ncols() != scores.ncols() {
        return Err(PcaError::DimensionMismatch {
            expected: loadings.nrows(),
            found: data.ncols(),
        });
    }
    let weighted_scores = &scores / &eigenvalues;
    Ok(weighted_scores.dot(&loadings.t()) * &data)
}

/// Confidence ellipse of the first two columns of `scores` at `confidence_level`.
///
/// The center is the sample mean of the two columns. The axes come from the
/// eigendecomposition of their 2×2 sample covariance, scaled by the
/// chi-square (2 df) quantile.
pub fn confidence_ellipse(scores: ArrayView2<f64>, confidence_level: f64) -> Result<ConfidenceEllipse> {
    if scores.ncols() < 2 {
        return Err(PcaError::Configuration(
            "a confidence ellipse needs two score columns".to_string(),
        ));
    }
    check_confidence_level(confidence_level)?;
    let n = scores.nrows();
    if n < 2 {
        return Err(PcaError::InvalidInput(
            "a confidence ellipse needs at least 2 observations".to_string(),
        ));
    }
    let pair = scores.slice(s![.., ..2]);
    let center = pair
        .mean_axis(Axis(0))
        .ok_or_else(|| PcaError::InvalidInput("no observations".to_string()))?;
    let centered = &pair - &center;
    let covariance = centered.t().dot(&centered) / (n - 1) as f64;

    let (values, vectors) = sorted_eigh_descending(covariance.view())?;
    // Chi-square with 2 degrees of freedom: F(x) = 1 - exp(-x/2).
    let chi2 = -2.0 * (1.0 - confidence_level).ln();

    // Eigenvector sign is arbitrary; keep the angle in (-π/2, π/2].
    let mut angle = vectors[[1, 0]].atan2(vectors[[0, 0]]);
    if angle > std::f64::consts::FRAC_PI_2 {
        angle -= std::f64::consts::PI;
    } else if angle <= -std::f64::consts::FRAC_PI_2 {
        angle += std::f64::consts::PI;
    }

    let major = values[0].max(0.0);
    let minor = values[1].max(0.0);
    Ok(ConfidenceEllipse {
        center_x: center[0],
        center_y: center[1],
        major_axis: 2.0 * (chi2 * major).sqrt(),
        minor_axis: 2.0 * (chi2 * minor).sqrt(),
        angle,
        confidence_level,
    })
}

/// Confidence ellipses of score columns `pc_x` and `pc_y` (0-based), one per group.
///
/// `groups[i]` labels row `i` of `scores`. Each ellipse is computed as in
/// [`confidence_ellipse`] over that group's rows only. Groups with fewer than
/// three rows are left out of the map.
///
/// # Errors
/// - `DimensionMismatch` when `groups` and `scores` disagree on the row count.
/// - `Configuration` for a component index outside `scores`, equal indices, or
///   a confidence level outside (0, 1).
pub fn group_confidence_ellipses(
    scores: ArrayView2<f64>,
    groups: &[String],
    pc_x: usize,
    pc_y: usize,
    confidence_level: f64,
) -> Result<BTreeMap<String, ConfidenceEllipse>> {
    if groups.len() != scores.nrows() {
        return Err(PcaError::DimensionMismatch {
            expected: scores.nrows(),
            found: groups.len(),
        });
    }
    let width = scores.ncols();
    if pc_x >= width || pc_y >= width {
        return Err(PcaError::Configuration(format!(
            "component indices ({}, {}) out of bounds for {} score columns",
            pc_x, pc_y, width
        )));
    }
    if pc_x == pc_y {
        return Err(PcaError::Configuration(
            "a confidence ellipse needs two different components".to_string(),
        ));
    }
    check_confidence_level(confidence_level)?;

    let mut members: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (row, group) in groups.iter().enumerate() {
        members.entry(group.as_str()).or_default().push(row);
    }

    let pair = scores.select(Axis(1), &[pc_x, pc_y]);
    let mut ellipses = BTreeMap::new();
    for (group, rows) in members {
        if rows.len() < MIN_GROUP_SIZE {
            debug!(
                "Skipping ellipse for group {:?}: {} observations",
                group,
                rows.len()
            );
            continue;
        }
        let subset = pair.select(Axis(0), &rows);
        ellipses.insert(
            group.to_string(),
            confidence_ellipse(subset.view(), confidence_level)?,
        );
    }
    Ok(ellipses)
}

fn check_confidence_level(confidence_level: f64) -> Result<()> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(PcaError::Configuration(format!(
            "confidence level must lie in (0, 1), got {}",
            confidence_level
        )));
    }
    Ok(())
}

/// Upper control limit of Hotelling's T² for `k` components and `n` samples:
/// `k(n−1)/(n−k) · F₁₋α(k, n−k)`.
pub fn hotelling_t2_limit(k: usize, n: usize, alpha: f64) -> Result<f64> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(PcaError::Configuration(format!(
            "significance level must lie in (0, 1), got {}",
            alpha
        )));
    }
    if k == 0 || n <= k {
        return Err(PcaError::Configuration(format!(
            "T2 limit needs 0 < components < samples, got {} components and {} samples",
            k, n
        )));
    }
    let (k_f, n_f) = (k as f64, n as f64);
    let f = FisherSnedecor::new(k_f, n_f - k_f)
        .map_err(|e| PcaError::Numerical(e.to_string()))?
        .inverse_cdf(1.0 - alpha);
    Ok(k_f * (n_f - 1.0) / (n_f - k_f) * f)
}

/// Upper control limit of the Q-residual from the discarded eigenvalues
/// (Jackson & Mudholkar, 1979).
///
/// With `θᵢ = Σ λⁱ` over the discarded eigenvalues and `h₀ = 1 − 2θ₁θ₃ / 3θ₂²`:
///
/// `Q = θ₁ [ z·√(2θ₂h₀²)/θ₁ + 1 + θ₂h₀(h₀−1)/θ₁² ]^(1/h₀)`
///
/// where `z` is the standard normal quantile at `1 − α`. When `h₀ ≤ 0` or the
/// bracket is not positive, Box's approximation `g·χ²₁₋α(h)` with `g = θ₂/θ₁`,
/// `h = θ₁²/θ₂` is used instead. An empty or all-zero spectrum gives 0.
pub fn q_residual_limit(discarded: &[f64], alpha: f64) -> Result<f64> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(PcaError::Configuration(format!(
            "significance level must lie in (0, 1), got {}",
            alpha
        )));
    }
    let theta1: f64 = discarded.iter().map(|&l| l.max(0.0)).sum();
    let theta2: f64 = discarded.iter().map(|&l| l.max(0.0).powi(2)).sum();
    let theta3: f64 = discarded.iter().map(|&l| l.max(0.0).powi(3)).sum();
    if !(theta1 > 0.0 && theta2 > 0.0) {
        return Ok(0.0);
    }

    let h0 = 1.0 - 2.0 * theta1 * theta3 / (3.0 * theta2 * theta2);
    let z = Normal::new(0.0, 1.0)
        .map_err(|e| PcaError::Numerical(e.to_string()))?
        .inverse_cdf(1.0 - alpha);

    if h0 > 0.0 {
        let bracket = z * (2.0 * theta2 * h0 * h0).sqrt() / theta1
            + 1.0
            + theta2 * h0 * (h0 - 1.0) / (theta1 * theta1);
        if bracket > 0.0 {
            let q = theta1 * bracket.powf(1.0 / h0);
            if q.is_finite() {
                return Ok(q);
            }
        }
    }

    warn!(
        "Jackson-Mudholkar Q limit undefined (h0 = {:.4}); using Box's chi-square approximation",
        h0
    );
    let g = theta2 / theta1;
    let h = theta1 * theta1 / theta2;
    let chi2 = ChiSquared::new(h)
        .map_err(|e| PcaError::Numerical(e.to_string()))?
        .inverse_cdf(1.0 - alpha);
    Ok(g * chi2)
}

/// T² and Q limits at 95% and 99% for the first `num_components` components of `result`.
pub fn diagnostic_limits(result: &PcaResult, num_components: usize) -> Result<DiagnosticLimits> {
    if num_components == 0 || num_components > result.n_components() {
        return Err(PcaError::Configuration(format!(
            "num_components must be in 1..={}, got {}",
            result.n_components(),
            num_components
        )));
    }
    let n = result.n_samples;
    let (q_limit_95, q_limit_99) = if result.loadings.is_available() {
        let discarded = significant_discarded(result, num_components);
        (
            Some(q_residual_limit(&discarded, 0.05)?),
            Some(q_residual_limit(&discarded, 0.01)?),
        )
    } else {
        (None, None)
    };
    Ok(DiagnosticLimits {
        t2_limit_95: hotelling_t2_limit(num_components, n, 0.05)?,
        t2_limit_99: hotelling_t2_limit(num_components, n, 0.01)?,
        q_limit_95,
        q_limit_99,
    })
}
