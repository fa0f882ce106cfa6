// src/preprocessing.rs

use crate::config::PcaConfig;
use crate::error::{PcaError, Result};
use log::{debug, trace};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Rows whose standard deviation (SNV) or L2 norm (vector normalization) falls
/// below this are centered only, or left untouched.
const ROW_SPREAD_EPS: f64 = 1e-8;

/// Column spreads at or below this (relative to the column magnitude) are treated as zero.
const ZERO_SPREAD_EPS: f64 = 1e-12;

/// Row-wise step applied before any column statistics are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowNormalization {
    None,
    /// Standard normal variate: each row centered and divided by its sample std.
    Snv,
    /// Each row divided by its L2 norm.
    VectorNorm,
}

/// The preprocessing switches of a [`PcaConfig`], on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessingOptions {
    pub mean_center: bool,
    pub standard_scale: bool,
    pub robust_scale: bool,
    pub scale_only: bool,
    pub snv: bool,
    pub vector_norm: bool,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        PreprocessingOptions {
            mean_center: true,
            standard_scale: false,
            robust_scale: false,
            scale_only: false,
            snv: false,
            vector_norm: false,
        }
    }
}

impl From<&PcaConfig> for PreprocessingOptions {
    fn from(config: &PcaConfig) -> Self {
        PreprocessingOptions {
            mean_center: config.mean_center,
            standard_scale: config.standard_scale,
            robust_scale: config.robust_scale,
            scale_only: config.scale_only,
            snv: config.snv,
            vector_norm: config.vector_norm,
        }
    }
}

impl PreprocessingOptions {
    pub fn validate(&self) -> Result<()> {
        let column_scalers = [self.standard_scale, self.robust_scale, self.scale_only]
            .iter()
            .filter(|&&flag| flag)
            .count();
        if column_scalers > 1 {
            return Err(PcaError::Configuration(
                "standard_scale, robust_scale and scale_only are mutually exclusive".to_string(),
            ));
        }
        if self.snv && self.vector_norm {
            return Err(PcaError::Configuration(
                "snv and vector_norm are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    fn row_normalization(&self) -> RowNormalization {
        if self.snv {
            RowNormalization::Snv
        } else if self.vector_norm {
            RowNormalization::VectorNorm
        } else {
            RowNormalization::None
        }
    }
}

/// Parameters retained from a fit, enough to preprocess unseen rows identically.
///
/// Column steps are `x -> (x - center) / scale`; either part may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingParams {
    pub row_normalization: RowNormalization,
    /// Column mean (standard / mean-centering) or median (robust scaling).
    pub center: Option<Array1<f64>>,
    /// Column sample standard deviation, or interquartile range for robust scaling.
    pub scale: Option<Array1<f64>>,
    pub n_features: usize,
}

/// Centers and scales a data matrix, and remembers how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    options: PreprocessingOptions,
    params: Option<PreprocessingParams>,
}

impl Preprocessor {
    /// Creates an unfitted preprocessor. Conflicting options are a configuration error.
    pub fn new(options: PreprocessingOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            params: None,
        })
    }

    /// Rebuilds a fitted preprocessor from retained parameters.
    pub fn from_params(options: PreprocessingOptions, params: PreprocessingParams) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            params: Some(params),
        })
    }

    pub fn options(&self) -> &PreprocessingOptions {
        &self.options
    }

    /// The fitted parameters, or `None` before `fit`.
    pub fn params(&self) -> Option<&PreprocessingParams> {
        self.params.as_ref()
    }

    /// Learns the column parameters.
    ///
    /// With SNV or vector normalization enabled, the statistics are taken from
    /// the row-normalized data, so that `transform` on the training data yields
    /// exactly-centered columns.
    ///
    /// # Errors
    /// `Numerical` when a column that must be scaled has zero spread.
    pub fn fit(&mut self, data: ArrayView2<f64>) -> Result<()> {
        let (n_samples, n_features) = data.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(PcaError::InvalidInput(
                "cannot fit preprocessing on an empty matrix".to_string(),
            ));
        }
        let row_normalization = self.options.row_normalization();
        let mut normalized = data.to_owned();
        normalize_rows(&mut normalized, row_normalization);

        let opts = self.options;
        let (center, scale) = if opts.robust_scale {
            let (medians, iqrs) = robust_location_scale(normalized.view())?;
            (Some(medians), Some(iqrs))
        } else if opts.standard_scale {
            let (means, stds) = mean_and_std(normalized.view())?;
            (opts.mean_center.then_some(means), Some(stds))
        } else if opts.scale_only {
            let (_, stds) = mean_and_std(normalized.view())?;
            (None, Some(stds))
        } else if opts.mean_center {
            (Some(column_means(normalized.view())), None)
        } else {
            (None, None)
        };

        debug!(
            "Fitted preprocessing on {}x{} data: rows={:?}, center={}, scale={}",
            n_samples,
            n_features,
            row_normalization,
            center.is_some(),
            scale.is_some()
        );

        self.params = Some(PreprocessingParams {
            row_normalization,
            center,
            scale,
            n_features,
        });
        Ok(())
    }

    pub fn fit_transform(&mut self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.fit(data)?;
        self.transform(data)
    }

    /// Applies the fitted parameters to `data`.
    pub fn transform(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        let params = self.fitted_params()?;
        check_width(params, data.ncols())?;

        let mut result = data.to_owned();
        normalize_rows(&mut result, params.row_normalization);
        if let Some(center) = &params.center {
            result -= center;
        }
        if let Some(scale) = &params.scale {
            result /= scale;
        }
        Ok(result)
    }

    /// Reverses the column steps. Row normalization is not invertible without
    /// the per-row statistics and is left in place.
    pub fn inverse_transform(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        let params = self.fitted_params()?;
        check_width(params, data.ncols())?;

        let mut result = data.to_owned();
        if let Some(scale) = &params.scale {
            result *= scale;
        }
        if let Some(center) = &params.center {
            result += center;
        }
        Ok(result)
    }

    fn fitted_params(&self) -> Result<&PreprocessingParams> {
        self.params.as_ref().ok_or_else(|| {
            PcaError::Configuration("preprocessor has not been fitted".to_string())
        })
    }
}

fn check_width(params: &PreprocessingParams, found: usize) -> Result<()> {
    if found != params.n_features {
        return Err(PcaError::DimensionMismatch {
            expected: params.n_features,
            found,
        });
    }
    Ok(())
}

fn normalize_rows(data: &mut Array2<f64>, mode: RowNormalization) {
    match mode {
        RowNormalization::None => {}
        RowNormalization::Snv => {
            for mut row in data.rows_mut() {
                let mean = row.mean().unwrap_or(0.0);
                let std = if row.len() > 1 { row.std(1.0) } else { 0.0 };
                if std < ROW_SPREAD_EPS {
                    trace!("SNV row with std {:e}: centering only", std);
                    row.mapv_inplace(|x| x - mean);
                } else {
                    row.mapv_inplace(|x| (x - mean) / std);
                }
            }
        }
        RowNormalization::VectorNorm => {
            for mut row in data.rows_mut() {
                let norm = row.dot(&row).sqrt();
                if norm > ROW_SPREAD_EPS {
                    row.mapv_inplace(|x| x / norm);
                }
            }
        }
    }
}

fn column_means(data: ArrayView2<f64>) -> Array1<f64> {
    data.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(data.ncols()))
}

fn ensure_spread(kind: &str, column: usize, spread: f64, magnitude: f64) -> Result<()> {
    if !(spread.is_finite() && spread > ZERO_SPREAD_EPS * magnitude.abs().max(1.0)) {
        return Err(PcaError::Numerical(format!(
            "column {} has zero {} and cannot be scaled",
            column + 1,
            kind
        )));
    }
    Ok(())
}

/// Column means and sample standard deviations (ddof = 1).
fn mean_and_std(data: ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
    if data.nrows() < 2 {
        return Err(PcaError::Numerical(
            "standard deviation needs at least 2 samples".to_string(),
        ));
    }
    let means = column_means(data);
    let stds = data.std_axis(Axis(0), 1.0);
    for (j, (&std, &mean)) in stds.iter().zip(means.iter()).enumerate() {
        ensure_spread("variance", j, std, mean)?;
    }
    Ok((means, stds))
}

/// Column medians and interquartile ranges.
fn robust_location_scale(data: ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
    let n_features = data.ncols();
    let mut medians = Array1::zeros(n_features);
    let mut iqrs = Array1::zeros(n_features);
    for (j, column) in data.axis_iter(Axis(1)).enumerate() {
        let sorted = sorted_values(column);
        let median = quantile_sorted(&sorted, 0.5);
        let iqr = quantile_sorted(&sorted, 0.75) - quantile_sorted(&sorted, 0.25);
        ensure_spread("interquartile range", j, iqr, median)?;
        medians[j] = median;
        iqrs[j] = iqr;
    }
    Ok((medians, iqrs))
}

fn sorted_values(column: ArrayView1<f64>) -> Vec<f64> {
    let mut values = column.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Linear-interpolation quantile of already sorted values.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(n: usize, p: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((n, p), |(_, j)| rng.random_range(-5.0..5.0) * (j + 1) as f64 + 10.0)
    }

    fn options() -> PreprocessingOptions {
        PreprocessingOptions::default()
    }

    #[test]
    fn mean_centering_zeroes_column_means() {
        let data = random_matrix(40, 6, 7);
        let mut pre = Preprocessor::new(options()).unwrap();
        let centered = pre.fit_transform(data.view()).unwrap();
        for mean in centered.mean_axis(Axis(0)).unwrap().iter() {
            assert_abs_diff_eq!(*mean, 0.0, epsilon = 1e-9);
        }
        assert!(pre.params().unwrap().scale.is_none());
    }

    #[test]
    fn standard_scaling_gives_unit_variance() {
        let data = random_matrix(50, 4, 11);
        let mut pre = Preprocessor::new(PreprocessingOptions {
            standard_scale: true,
            ..options()
        })
        .unwrap();
        let scaled = pre.fit_transform(data.view()).unwrap();
        for var in scaled.var_axis(Axis(0), 1.0).iter() {
            assert_abs_diff_eq!(*var, 1.0, epsilon = 1e-9);
        }
        for mean in scaled.mean_axis(Axis(0)).unwrap().iter() {
            assert_abs_diff_eq!(*mean, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn standard_scaling_without_centering_only_divides() {
        let data = array![[1.0, 10.0], [2.0, 30.0], [4.0, 20.0], [7.0, 50.0]];
        let mut pre = Preprocessor::new(PreprocessingOptions {
            mean_center: false,
            standard_scale: true,
            ..options()
        })
        .unwrap();
        let scaled = pre.fit_transform(data.view()).unwrap();
        let params = pre.params().unwrap();
        assert!(params.center.is_none());
        let stds = data.std_axis(Axis(0), 1.0);
        for ((i, j), v) in scaled.indexed_iter() {
            assert_abs_diff_eq!(*v, data[[i, j]] / stds[j], epsilon = 1e-12);
        }
        // Same result as scale_only.
        let mut scale_only = Preprocessor::new(PreprocessingOptions {
            mean_center: false,
            scale_only: true,
            ..options()
        })
        .unwrap();
        assert_eq!(scale_only.fit_transform(data.view()).unwrap(), scaled);
    }

    #[test]
    fn zero_variance_column_is_a_numerical_error() {
        let data = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        let mut pre = Preprocessor::new(PreprocessingOptions {
            standard_scale: true,
            ..options()
        })
        .unwrap();
        assert!(matches!(pre.fit(data.view()), Err(PcaError::Numerical(_))));

        let mut scale_only = Preprocessor::new(PreprocessingOptions {
            scale_only: true,
            ..options()
        })
        .unwrap();
        assert!(matches!(scale_only.fit(data.view()), Err(PcaError::Numerical(_))));
    }

    #[test]
    fn robust_scaling_uses_median_and_iqr() {
        let data = array![[1.0], [2.0], [3.0], [4.0], [100.0]];
        let mut pre = Preprocessor::new(PreprocessingOptions {
            robust_scale: true,
            ..options()
        })
        .unwrap();
        let scaled = pre.fit_transform(data.view()).unwrap();
        let params = pre.params().unwrap();
        assert_abs_diff_eq!(params.center.as_ref().unwrap()[0], 3.0);
        assert_abs_diff_eq!(params.scale.as_ref().unwrap()[0], 2.0);
        assert_abs_diff_eq!(scaled[[0, 0]], -1.0);
        assert_abs_diff_eq!(scaled[[2, 0]], 0.0);
        assert_abs_diff_eq!(scaled[[4, 0]], 48.5);
    }

    #[test]
    fn robust_scaling_rejects_zero_iqr() {
        let data = array![[1.0], [1.0], [1.0], [1.0], [9.0]];
        let mut pre = Preprocessor::new(PreprocessingOptions {
            robust_scale: true,
            ..options()
        })
        .unwrap();
        assert!(matches!(pre.fit(data.view()), Err(PcaError::Numerical(_))));
    }

    #[test]
    fn scale_only_does_not_center() {
        let data = array![[2.0, 10.0], [4.0, 20.0], [6.0, 30.0]];
        let mut pre = Preprocessor::new(PreprocessingOptions {
            scale_only: true,
            ..options()
        })
        .unwrap();
        let scaled = pre.fit_transform(data.view()).unwrap();
        // std of [2,4,6] is 2, of [10,20,30] is 10
        assert_abs_diff_eq!(scaled[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scaled[[2, 1]], 3.0, epsilon = 1e-12);
        assert!(pre.params().unwrap().center.is_none());
    }

    #[test]
    fn snv_rows_have_zero_mean_and_unit_std() {
        let data = random_matrix(10, 8, 3);
        let mut pre = Preprocessor::new(PreprocessingOptions {
            mean_center: false,
            snv: true,
            ..options()
        })
        .unwrap();
        let out = pre.fit_transform(data.view()).unwrap();
        for row in out.rows() {
            assert_abs_diff_eq!(row.mean().unwrap(), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(row.std(1.0), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn vector_norm_rows_have_unit_length_and_columns_are_centered_afterwards() {
        let data = array![[3.0, 4.0], [6.0, 8.0], [1.0, 0.0], [0.0, 0.0]];
        let mut raw = Preprocessor::new(PreprocessingOptions {
            mean_center: false,
            vector_norm: true,
            ..options()
        })
        .unwrap();
        let normed = raw.fit_transform(data.view()).unwrap();
        assert_abs_diff_eq!(normed[[0, 0]], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(normed[[1, 1]], 0.8, epsilon = 1e-12);
        // zero row untouched
        assert_eq!(normed.row(3).to_vec(), vec![0.0, 0.0]);

        let mut centered = Preprocessor::new(PreprocessingOptions {
            vector_norm: true,
            ..options()
        })
        .unwrap();
        let out = centered.fit_transform(data.view()).unwrap();
        for mean in out.mean_axis(Axis(0)).unwrap().iter() {
            assert_abs_diff_eq!(*mean, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn transform_checks_width_and_fit_state() {
        let pre = Preprocessor::new(options()).unwrap();
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(matches!(pre.transform(data.view()), Err(PcaError::Configuration(_))));

        let mut pre = Preprocessor::new(options()).unwrap();
        pre.fit(data.view()).unwrap();
        let wide = array![[1.0, 2.0, 3.0]];
        assert_eq!(
            pre.transform(wide.view()),
            Err(PcaError::DimensionMismatch { expected: 2, found: 3 })
        );
    }

    #[test]
    fn inverse_transform_recovers_the_input() {
        let data = random_matrix(12, 3, 21);
        let mut pre = Preprocessor::new(PreprocessingOptions {
            standard_scale: true,
            ..options()
        })
        .unwrap();
        let scaled = pre.fit_transform(data.view()).unwrap();
        let restored = pre.inverse_transform(scaled.view()).unwrap();
        for (a, b) in restored.iter().zip(data.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn conflicting_options_are_rejected() {
        let result = Preprocessor::new(PreprocessingOptions {
            standard_scale: true,
            robust_scale: true,
            ..options()
        });
        assert!(matches!(result, Err(PcaError::Configuration(_))));
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(quantile_sorted(&sorted, 0.5), 2.5);
        assert_abs_diff_eq!(quantile_sorted(&sorted, 0.25), 1.75);
        assert_abs_diff_eq!(quantile_sorted(&sorted, 1.0), 4.0);
    }
}
