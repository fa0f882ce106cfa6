// src/decomposition/nipals.rs

use super::{check_linear_rank, orient_by_loadings, Decomposed, Decomposition, Projection};
use crate::config::ConvergenceConfig;
use crate::error::{PcaError, Result};
use crate::linalg_backends::sorted_eigh_descending;
use log::{debug, trace};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};

/// Residual sums of squares below this fraction of the input's are treated as
/// exhausted: the data has no variance left to extract.
const EXHAUSTED_RELATIVE_SS: f64 = 1e-20;

/// Nonlinear iterative partial least squares.
///
/// Components are extracted one at a time and removed from the working matrix
/// by deflation, so each component depends on the previous ones and the loop
/// is strictly sequential.
#[derive(Debug, Clone, Copy)]
pub struct Nipals {
    convergence: ConvergenceConfig,
}

impl Default for Nipals {
    fn default() -> Self {
        Self::new(ConvergenceConfig::default())
    }
}

impl Nipals {
    pub fn new(convergence: ConvergenceConfig) -> Self {
        Self { convergence }
    }

    pub fn convergence(&self) -> &ConvergenceConfig {
        &self.convergence
    }

    /// Power iteration for one component on the current residual.
    /// Returns the score vector, the unit loading and the iteration count.
    fn extract_component(
        &self,
        residual: &Array2<f64>,
        component: usize,
    ) -> Result<(Array1<f64>, Array1<f64>, usize)> {
        let start_column = max_variance_column(residual);
        let mut t = residual.column(start_column).to_owned();

        for iteration in 1..=self.convergence.max_iterations {
            let tt = t.dot(&t);
            if !(tt > 0.0) {
                return Err(PcaError::Numerical(format!(
                    "score vector collapsed to zero at component {}",
                    component
                )));
            }
            let mut loading = residual.t().dot(&t) / tt;
            let norm = loading.dot(&loading).sqrt();
            if !(norm > 0.0) {
                return Err(PcaError::Numerical(format!(
                    "loading vector collapsed to zero at component {}",
                    component
                )));
            }
            loading /= norm;

            let t_new = residual.dot(&loading);
            let delta = (&t_new - &t).mapv(|d| d * d).sum().sqrt();
            trace!(
                "NIPALS component {} iteration {}: |dt| = {:e}",
                component,
                iteration,
                delta
            );
            t = t_new;
            if delta < self.convergence.tolerance {
                return Ok((t, loading, iteration));
            }
        }

        Err(PcaError::Convergence {
            component,
            iterations: self.convergence.max_iterations,
        })
    }
}

impl Decomposition for Nipals {
    fn name(&self) -> &'static str {
        "nipals"
    }

    fn decompose(&self, data: ArrayView2<f64>, components: usize) -> Result<Decomposed> {
        let (n_samples, n_features) = data.dim();
        check_linear_rank(n_samples, n_features, components)?;

        let denom = (n_samples - 1) as f64;
        let initial_ss: f64 = data.iter().map(|x| x * x).sum();
        let mut residual = data.to_owned();
        let mut scores = Array2::<f64>::zeros((n_samples, components));
        let mut loadings = Array2::<f64>::zeros((n_features, components));
        let mut eigenvalues = Array1::<f64>::zeros(components);

        for a in 0..components {
            let component = a + 1;
            let residual_ss: f64 = residual.iter().map(|x| x * x).sum();

            let (t, loading) = if residual_ss <= EXHAUSTED_RELATIVE_SS * initial_ss {
                // Nothing left to extract: complete the basis with a direction
                // orthogonal to the loadings found so far. Its variance is zero.
                let loading = orthogonal_complement_direction(loadings.slice(s![.., ..a]))
                    .ok_or_else(|| PcaError::RankDeficiency {
                        requested: components,
                        available: a,
                    })?;
                debug!(
                    "NIPALS component {}: residual exhausted, completing orthonormal basis",
                    component
                );
                (residual.dot(&loading), loading)
            } else {
                let (t, loading, iterations) = self.extract_component(&residual, component)?;
                debug!(
                    "NIPALS component {} converged after {} iterations, eigenvalue {:.6e}",
                    component,
                    iterations,
                    t.dot(&t) / denom
                );
                (t, loading)
            };

            eigenvalues[a] = t.dot(&t) / denom;

            // X <- X - t pᵀ
            let t_col = t.view().insert_axis(Axis(1));
            let p_row = loading.view().insert_axis(Axis(0));
            residual -= &t_col.dot(&p_row);

            scores.column_mut(a).assign(&t);
            loadings.column_mut(a).assign(&loading);
        }

        orient_by_loadings(&mut loadings, &mut scores);

        let discarded = residual_spectrum(residual.view(), denom)?;
        let keep = n_samples.min(n_features).saturating_sub(components);
        let mut all = eigenvalues.to_vec();
        all.extend(discarded.into_iter().take(keep));

        Ok(Decomposed {
            scores,
            eigenvalues,
            all_eigenvalues: Array1::from(all),
            projection: Projection::Linear(loadings),
        })
    }
}

/// Column of `matrix` with the largest sum of squared deviations from its mean.
fn max_variance_column(matrix: &Array2<f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (j, column) in matrix.axis_iter(Axis(1)).enumerate() {
        let mean = column.mean().unwrap_or(0.0);
        let ss: f64 = column.iter().map(|x| (x - mean) * (x - mean)).sum();
        // Uncentered data can have all its energy in the mean.
        let energy = if ss > 0.0 { ss } else { column.dot(&column) * f64::EPSILON };
        if energy > best.1 {
            best = (j, energy);
        }
    }
    best.0
}

/// A unit vector orthogonal to every column of `basis`, built from the
/// standard basis vector with the largest orthogonal remainder.
fn orthogonal_complement_direction(basis: ArrayView2<f64>) -> Option<Array1<f64>> {
    let dim = basis.nrows();
    let mut best: Option<(Array1<f64>, f64)> = None;
    for i in 0..dim {
        let mut v = Array1::<f64>::zeros(dim);
        v[i] = 1.0;
        for column in basis.axis_iter(Axis(1)) {
            let proj = column.dot(&v);
            v.scaled_add(-proj, &column);
        }
        let norm = v.dot(&v).sqrt();
        if best.as_ref().map_or(true, |(_, b)| norm > *b) {
            best = Some((v, norm));
        }
    }
    match best {
        Some((v, norm)) if norm > 1e-8 => Some(v / norm),
        _ => None,
    }
}

/// Eigenvalues of the residual's covariance, descending and clamped at zero.
/// Uses whichever of XᵀX and XXᵀ is smaller.
fn residual_spectrum(residual: ArrayView2<f64>, denom: f64) -> Result<Vec<f64>> {
    let mut gram = if residual.ncols() <= residual.nrows() {
        residual.t().dot(&residual)
    } else {
        residual.dot(&residual.t())
    };
    gram /= denom;
    let (values, _) = sorted_eigh_descending(gram.view())?;
    Ok(values.into_iter().map(|v| v.max(0.0)).collect())
}
