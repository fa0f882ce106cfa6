// src/decomposition/mod.rs

//! Decomposition strategies. One is chosen per fit from the configured
//! [`PcaMethod`]; all of them return a [`Decomposed`] with components sorted by
//! decreasing eigenvalue and a deterministic sign.

mod kernel;
mod nipals;
mod svd;

pub use kernel::{KernelDecomposition, KernelProjection, ResolvedKernel};
pub use nipals::Nipals;
pub use svd::SvdDecomposition;

use crate::config::{ConvergenceConfig, PcaMethod};
use crate::error::{PcaError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// How scores of unseen (already preprocessed) rows are obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Input-space loadings, shape (n_features, k).
    Linear(Array2<f64>),
    /// Kernel evaluations against the retained training rows.
    Kernel(KernelProjection),
}

impl Projection {
    /// Projects preprocessed rows into component space.
    pub fn project(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        match self {
            Projection::Linear(loadings) => {
                if data.ncols() != loadings.nrows() {
                    return Err(PcaError::DimensionMismatch {
                        expected: loadings.nrows(),
                        found: data.ncols(),
                    });
                }
                Ok(data.dot(loadings))
            }
            Projection::Kernel(kernel) => kernel.project(data),
        }
    }

    pub fn n_components(&self) -> usize {
        match self {
            Projection::Linear(loadings) => loadings.ncols(),
            Projection::Kernel(kernel) => kernel.n_components(),
        }
    }
}

/// Raw output of a decomposition strategy.
#[derive(Debug, Clone)]
pub struct Decomposed {
    /// Shape (n_samples, k).
    pub scores: Array2<f64>,
    /// Variance of each retained component, descending.
    pub eigenvalues: Array1<f64>,
    /// Full non-negative spectrum in the same units, descending; starts with `eigenvalues`.
    pub all_eigenvalues: Array1<f64>,
    pub projection: Projection,
}

/// A PCA decomposition strategy.
pub trait Decomposition {
    fn name(&self) -> &'static str;

    /// Extracts `components` components from preprocessed `data` (n_samples x n_features).
    fn decompose(&self, data: ArrayView2<f64>, components: usize) -> Result<Decomposed>;
}

/// Picks the strategy for `method`. Convergence settings only matter to NIPALS.
pub fn strategy_for(
    method: &PcaMethod,
    convergence: ConvergenceConfig,
) -> Box<dyn Decomposition + Send + Sync> {
    match method {
        PcaMethod::Nipals => Box::new(Nipals::new(convergence)),
        PcaMethod::Svd => Box::new(SvdDecomposition),
        PcaMethod::Kernel(kernel) => Box::new(KernelDecomposition::new(kernel.clone())),
    }
}

/// Linear methods can extract at most min(n - 1, p) components.
pub(crate) fn check_linear_rank(n_samples: usize, n_features: usize, components: usize) -> Result<()> {
    let available = n_samples.saturating_sub(1).min(n_features);
    if components > available {
        return Err(PcaError::RankDeficiency {
            requested: components,
            available,
        });
    }
    Ok(())
}

/// Index of the entry with the largest magnitude (first one on ties).
fn argmax_abs<'a>(values: impl Iterator<Item = &'a f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.enumerate() {
        match best {
            Some((_, b)) if v.abs() <= b => {}
            _ => best = Some((i, v.abs())),
        }
    }
    best.map(|(i, _)| i)
}

/// Flips each component so that its largest-magnitude loading is positive.
/// Scores are flipped along with their loadings.
pub(crate) fn orient_by_loadings(loadings: &mut Array2<f64>, scores: &mut Array2<f64>) {
    for j in 0..loadings.ncols() {
        let column = loadings.column(j);
        if let Some(i) = argmax_abs(column.iter()) {
            if column[i] < 0.0 {
                loadings.column_mut(j).mapv_inplace(|x| -x);
                scores.column_mut(j).mapv_inplace(|x| -x);
            }
        }
    }
}

/// Flips each column so that its largest-magnitude entry is positive.
pub(crate) fn orient_columns(matrix: &mut Array2<f64>) {
    for mut column in matrix.axis_iter_mut(Axis(1)) {
        if let Some(i) = argmax_abs(column.iter()) {
            if column[i] < 0.0 {
                column.mapv_inplace(|x| -x);
            }
        }
    }
}
