// src/model.rs

use crate::config::PcaMethod;
use crate::decomposition::{Decomposed, Projection};
use crate::error::{PcaError, Result};
use crate::preprocessing::Preprocessor;
use crate::validation::ensure_finite;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Input-space loadings, or their absence for kernel PCA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Loadings {
    /// Shape (n_features, k) with orthonormal columns.
    Explicit(Array2<f64>),
    /// The method has no loadings in input space.
    NotAvailable,
}

impl Loadings {
    pub fn as_explicit(&self) -> Option<&Array2<f64>> {
        match self {
            Loadings::Explicit(loadings) => Some(loadings),
            Loadings::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Loadings::Explicit(_))
    }
}

/// Result of a PCA fit.
///
/// Every per-component field has length k and every per-observation field has
/// length n, so serializers can rely on a fixed layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaResult {
    /// Shape (n_samples, k).
    pub scores: Array2<f64>,
    pub loadings: Loadings,
    /// Variance of each retained component, strictly ordered from largest.
    pub eigenvalues: Array1<f64>,
    /// Full spectrum; the first k entries are `eigenvalues`, the rest were discarded.
    pub all_eigenvalues: Array1<f64>,
    /// Fraction of total variance per component.
    pub explained_variance: Array1<f64>,
    /// Running sum of `explained_variance`.
    pub cumulative_variance: Array1<f64>,
    pub component_labels: Vec<String>,
    pub method: PcaMethod,
    pub n_samples: usize,
    pub n_features: usize,
}

impl PcaResult {
    pub(crate) fn from_decomposed(
        decomposed: &Decomposed,
        method: PcaMethod,
        labels: Option<&[String]>,
        n_features: usize,
    ) -> Result<Self> {
        let k = decomposed.eigenvalues.len();
        let total: f64 = decomposed.all_eigenvalues.sum();
        if !(total > 0.0 && total.is_finite()) {
            return Err(PcaError::Numerical(
                "data has zero total variance".to_string(),
            ));
        }
        let explained_variance = decomposed.eigenvalues.mapv(|v| (v / total).max(0.0));
        let mut running = 0.0;
        let cumulative_variance = explained_variance.mapv(|v| {
            running += v;
            running
        });

        let component_labels = match labels {
            Some(labels) => labels.to_vec(),
            None => default_component_labels(k),
        };

        let loadings = match &decomposed.projection {
            Projection::Linear(loadings) => Loadings::Explicit(loadings.clone()),
            Projection::Kernel(_) => Loadings::NotAvailable,
        };

        Ok(PcaResult {
            scores: decomposed.scores.clone(),
            loadings,
            eigenvalues: decomposed.eigenvalues.clone(),
            all_eigenvalues: decomposed.all_eigenvalues.clone(),
            explained_variance,
            cumulative_variance,
            component_labels,
            method,
            n_samples: decomposed.scores.nrows(),
            n_features,
        })
    }

    /// Number of fitted components (k).
    pub fn n_components(&self) -> usize {
        self.eigenvalues.len()
    }

    /// `explained_variance` in percent.
    pub fn explained_variance_percent(&self) -> Array1<f64> {
        &self.explained_variance * 100.0
    }

    /// `cumulative_variance` in percent.
    pub fn cumulative_variance_percent(&self) -> Array1<f64> {
        &self.cumulative_variance * 100.0
    }
}

/// "PC1".."PCk".
pub fn default_component_labels(k: usize) -> Vec<String> {
    (1..=k).map(|i| format!("PC{}", i)).collect()
}

/// The fitted artifact needed to project unseen rows the way the training rows were.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaModel {
    preprocessor: Preprocessor,
    projection: Projection,
    eigenvalues: Array1<f64>,
}

impl PcaModel {
    pub(crate) fn new(preprocessor: Preprocessor, projection: Projection, eigenvalues: Array1<f64>) -> Self {
        Self {
            preprocessor,
            projection,
            eigenvalues,
        }
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    pub fn n_components(&self) -> usize {
        self.projection.n_components()
    }

    /// Loadings of a linear model; `None` for kernel PCA.
    pub fn loadings(&self) -> Option<&Array2<f64>> {
        match &self.projection {
            Projection::Linear(loadings) => Some(loadings),
            Projection::Kernel(_) => None,
        }
    }

    /// Applies the retained preprocessing to raw rows.
    pub fn preprocess(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        ensure_finite(data)?;
        self.preprocessor.transform(data)
    }

    /// Scores of raw rows, shape (rows, k). Applied to the training data this
    /// reproduces the fitted scores.
    ///
    /// # Errors
    /// `DimensionMismatch` when `data` has a different column count than the
    /// training data; `InvalidInput` for non-finite cells.
    pub fn transform(&self, data: ArrayView2<f64>) -> Result<Array2<f64>> {
        let preprocessed = self.preprocess(data)?;
        self.projection.project(preprocessed.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn decomposed() -> Decomposed {
        Decomposed {
            scores: array![[1.0, 0.5], [-1.0, -0.5]],
            eigenvalues: array![3.0, 1.0],
            all_eigenvalues: array![3.0, 1.0, 1.0],
            projection: Projection::Linear(array![[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]),
        }
    }

    #[test]
    fn explained_and_cumulative_variance() {
        let result = PcaResult::from_decomposed(&decomposed(), PcaMethod::Svd, None, 3).unwrap();
        assert_abs_diff_eq!(result.explained_variance[0], 0.6);
        assert_abs_diff_eq!(result.explained_variance[1], 0.2);
        assert_abs_diff_eq!(result.cumulative_variance[1], 0.8);
        assert_abs_diff_eq!(result.explained_variance_percent()[0], 60.0);
        assert_eq!(result.component_labels, vec!["PC1", "PC2"]);
        assert!(result.loadings.is_available());
    }

    #[test]
    fn custom_labels_are_kept() {
        let labels = vec!["Size".to_string(), "Shape".to_string()];
        let result =
            PcaResult::from_decomposed(&decomposed(), PcaMethod::Nipals, Some(&labels), 3).unwrap();
        assert_eq!(result.component_labels, labels);
    }

    #[test]
    fn zero_total_variance_is_numerical() {
        let mut d = decomposed();
        d.all_eigenvalues = array![0.0, 0.0];
        assert!(matches!(
            PcaResult::from_decomposed(&d, PcaMethod::Svd, None, 3),
            Err(PcaError::Numerical(_))
        ));
    }
}
