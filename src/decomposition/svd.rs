// src/decomposition/svd.rs

use super::{check_linear_rank, orient_by_loadings, Decomposed, Decomposition, Projection};
use crate::error::{PcaError, Result};
use crate::linalg_backends::{BackendSVD, LinAlgBackendProvider};
use log::debug;
use ndarray::{s, Array1, ArrayView2};

/// Direct decomposition through a thin SVD, X = U Σ Vᵀ.
///
/// Loadings are the first k right singular vectors and eigenvalues are
/// `σ² / (n - 1)`. Scores are computed as `X · loadings`, which equals `U Σ`
/// restricted to the first k columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct SvdDecomposition;

impl Decomposition for SvdDecomposition {
    fn name(&self) -> &'static str {
        "svd"
    }

    fn decompose(&self, data: ArrayView2<f64>, components: usize) -> Result<Decomposed> {
        let (n_samples, n_features) = data.dim();
        check_linear_rank(n_samples, n_features, components)?;

        let backend = LinAlgBackendProvider::<f64>::new();
        let svd = backend.svd(data, false, true)?;
        let vt = svd
            .vt
            .ok_or_else(|| PcaError::Numerical("SVD did not return V^T".to_string()))?;
        if svd.s.len() < components {
            return Err(PcaError::RankDeficiency {
                requested: components,
                available: svd.s.len(),
            });
        }

        let denom = (n_samples - 1) as f64;
        let all_eigenvalues: Array1<f64> = svd.s.mapv(|sigma| sigma * sigma / denom);

        let mut loadings = vt.slice(s![..components, ..]).t().to_owned();
        let mut scores = data.dot(&loadings);
        orient_by_loadings(&mut loadings, &mut scores);

        let eigenvalues = all_eigenvalues.slice(s![..components]).to_owned();
        debug!(
            "SVD: {} singular values, retained eigenvalues {:?}",
            svd.s.len(),
            eigenvalues.as_slice()
        );

        Ok(Decomposed {
            scores,
            eigenvalues,
            all_eigenvalues,
            projection: Projection::Linear(loadings),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2, Axis};

    fn centered(data: Array2<f64>) -> Array2<f64> {
        let means = data.mean_axis(Axis(0)).unwrap();
        data - &means
    }

    #[test]
    fn eigenvalues_match_covariance_spectrum() {
        // Covariance of this data is diag(2, 0.5).
        let data = centered(array![[2.0, 0.0], [-2.0, 0.0], [0.0, 1.0], [0.0, -1.0], [0.0, 0.0]]);
        let out = SvdDecomposition.decompose(data.view(), 2).unwrap();
        assert_abs_diff_eq!(out.eigenvalues[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.eigenvalues[1], 0.5, epsilon = 1e-12);
        match &out.projection {
            Projection::Linear(loadings) => {
                assert_abs_diff_eq!(loadings[[0, 0]], 1.0, epsilon = 1e-12);
                assert_abs_diff_eq!(loadings[[1, 1]], 1.0, epsilon = 1e-12);
            }
            other => panic!("expected linear projection, got {:?}", other),
        }
    }

    #[test]
    fn scores_have_eigenvalue_variance() {
        let data = centered(array![
            [2.5, 2.4, 0.5],
            [0.5, 0.7, 1.1],
            [2.2, 2.9, 0.3],
            [1.9, 2.2, 0.8],
            [3.1, 3.0, 0.1],
            [2.3, 2.7, 0.9],
            [2.0, 1.6, 1.6],
            [1.0, 1.1, 0.4]
        ]);
        let out = SvdDecomposition.decompose(data.view(), 2).unwrap();
        let n = data.nrows() as f64;
        for j in 0..2 {
            let col = out.scores.column(j);
            assert_abs_diff_eq!(col.dot(&col) / (n - 1.0), out.eigenvalues[j], epsilon = 1e-10);
        }
        assert!(out.eigenvalues[0] >= out.eigenvalues[1]);
        let total: f64 = out.all_eigenvalues.sum();
        let frob: f64 = data.iter().map(|x| x * x).sum::<f64>() / (n - 1.0);
        assert_abs_diff_eq!(total, frob, epsilon = 1e-10);
    }

    #[test]
    fn too_many_components_is_rank_deficient() {
        let data = centered(array![[1.0, 2.0, 3.0], [2.0, 1.0, 0.0], [0.0, 1.0, 5.0]]);
        assert_eq!(
            SvdDecomposition.decompose(data.view(), 3).unwrap_err(),
            PcaError::RankDeficiency { requested: 3, available: 2 }
        );
    }
}
