// src/decomposition/kernel.rs

use super::{orient_columns, Decomposed, Decomposition, Projection};
use crate::config::{KernelConfig, KernelType};
use crate::error::{PcaError, Result};
use crate::linalg_backends::sorted_eigh_descending;
use log::{debug, warn};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Eigenvalues of the centered kernel at or below this fraction of the largest
/// one are numerical noise.
const EIGENVALUE_RELATIVE_FLOOR: f64 = 1e-12;

/// A kernel function with every parameter fixed for a given training set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedKernel {
    pub kernel_type: KernelType,
    pub gamma: f64,
    pub degree: u32,
    pub coef0: f64,
}

impl ResolvedKernel {
    pub fn from_config(config: &KernelConfig, n_features: usize) -> Self {
        ResolvedKernel {
            kernel_type: config.kernel_type,
            gamma: config.resolved_gamma(n_features),
            degree: config.degree,
            coef0: config.coef0,
        }
    }

    pub fn evaluate(&self, x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
        match self.kernel_type {
            KernelType::Linear => x.dot(&y),
            KernelType::Poly => {
                let base = self.gamma * x.dot(&y) + self.coef0;
                base.powi(self.degree as i32)
            }
            KernelType::Rbf => {
                let sq_dist: f64 = x.iter().zip(y.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                (-self.gamma * sq_dist).exp()
            }
        }
    }

    /// Kernel matrix between the rows of `a` and the rows of `b`, one rayon task per row of `a`.
    pub fn matrix(&self, a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((a.nrows(), b.nrows()));
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, mut row)| {
                let xi = a.row(i);
                for (j, yj) in b.outer_iter().enumerate() {
                    row[j] = self.evaluate(xi, yj);
                }
            });
        out
    }
}

/// Everything needed to project new rows onto a fitted kernel PCA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelProjection {
    pub kernel: ResolvedKernel,
    /// Preprocessed training rows.
    pub training: Array2<f64>,
    /// Column means of the uncentered training kernel matrix.
    pub kernel_column_means: Array1<f64>,
    pub kernel_grand_mean: f64,
    /// Eigenvectors divided by the square root of their kernel eigenvalue, shape (n_train, k).
    pub coefficients: Array2<f64>,
}

impl KernelProjection {
    pub fn n_components(&self) -> usize {
        self.coefficients.ncols()
    }

    /// Centers the kernel between `data` and the training rows with the
    /// training statistics, then projects onto the retained eigenvectors.
    pub fn project(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.training.ncols() {
            return Err(PcaError::DimensionMismatch {
                expected: self.training.ncols(),
                found: data.ncols(),
            });
        }
        let mut k_new = self.kernel.matrix(data, self.training.view());
        let row_means = k_new
            .mean_axis(Axis(1))
            .unwrap_or_else(|| Array1::zeros(data.nrows()));
        k_new -= &self.kernel_column_means;
        k_new -= &row_means.insert_axis(Axis(1));
        k_new += self.kernel_grand_mean;
        Ok(k_new.dot(&self.coefficients))
    }
}

/// Double-centers a square kernel matrix in place:
/// K_c = K - 1ₙK - K1ₙ + 1ₙK1ₙ.
/// Returns the column means and grand mean of the uncentered matrix.
pub(crate) fn double_center(kernel: &mut Array2<f64>) -> (Array1<f64>, f64) {
    let n = kernel.nrows();
    let column_means = kernel
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(n));
    let grand_mean = column_means.mean().unwrap_or(0.0);
    // Symmetric, so row means equal column means.
    let row_means = column_means.view().insert_axis(Axis(1));
    *kernel -= &column_means;
    *kernel -= &row_means;
    *kernel += grand_mean;
    (column_means, grand_mean)
}

/// Kernel PCA: eigendecomposition of the double-centered kernel matrix.
///
/// Scores are `v·√λ` for the eigenpairs of the centered kernel. The reported
/// eigenvalues are `λ / (n - 1)`, the sample variance of each score column, so
/// that Hotelling's T² means the same thing as for the linear methods.
/// No input-space loadings exist for this method.
#[derive(Debug, Clone)]
pub struct KernelDecomposition {
    config: KernelConfig,
}

impl KernelDecomposition {
    pub fn new(config: KernelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

impl Decomposition for KernelDecomposition {
    fn name(&self) -> &'static str {
        "kernel"
    }

    fn decompose(&self, data: ArrayView2<f64>, components: usize) -> Result<Decomposed> {
        self.config.validate()?;
        let (n_samples, n_features) = data.dim();
        let kernel = ResolvedKernel::from_config(&self.config, n_features);
        debug!(
            "Kernel PCA: {:?} kernel, gamma {}, on {} samples",
            kernel.kernel_type, kernel.gamma, n_samples
        );

        let mut k = kernel.matrix(data, data);
        if k.iter().any(|v| !v.is_finite()) {
            return Err(PcaError::Numerical(
                "kernel matrix contains non-finite values".to_string(),
            ));
        }
        let (kernel_column_means, kernel_grand_mean) = double_center(&mut k);

        let (values, vectors) = sorted_eigh_descending(k.view())?;
        let largest = values.first().copied().unwrap_or(0.0);
        if !(largest > 0.0) {
            return Err(PcaError::Numerical(
                "centered kernel matrix has no positive eigenvalues".to_string(),
            ));
        }
        let floor = largest * EIGENVALUE_RELATIVE_FLOOR;
        let usable = values.iter().take_while(|&&v| v > floor).count();
        if usable < values.len() {
            debug!(
                "Kernel PCA: discarding {} non-positive or negligible eigenvalues",
                values.len() - usable
            );
        }
        if usable < components {
            warn!(
                "Kernel PCA: {} components requested but only {} usable eigenvalues",
                components, usable
            );
            return Err(PcaError::RankDeficiency {
                requested: components,
                available: usable,
            });
        }

        let mut vectors = vectors.slice(s![.., ..components]).to_owned();
        orient_columns(&mut vectors);

        let retained = Array1::from(values[..components].to_vec());
        let sqrt_values = retained.mapv(f64::sqrt);
        let scores = &vectors * &sqrt_values;
        let coefficients = &vectors / &sqrt_values;

        let denom = (n_samples - 1) as f64;
        let all_eigenvalues = Array1::from_iter(values[..usable].iter().map(|v| v / denom));
        let eigenvalues = retained / denom;

        Ok(Decomposed {
            scores,
            eigenvalues,
            all_eigenvalues,
            projection: Projection::Kernel(KernelProjection {
                kernel,
                training: data.to_owned(),
                kernel_column_means,
                kernel_grand_mean,
                coefficients,
            }),
        })
    }
}
