// Principal component analysis (PCA)

#![doc = include_str!("../README.md")]

pub mod config;
pub mod correlation;
pub mod decomposition;
pub mod diagnostics;
pub mod error;
pub mod linalg_backends;
pub mod model;
pub mod preprocessing;
pub mod validation;

pub use config::{ConvergenceConfig, KernelConfig, KernelType, MetricsConfig, PcaConfig, PcaMethod};
pub use correlation::{eigencorrelations, CorrelationMethod, CorrelationRequest, CorrelationResult};
pub use decomposition::{strategy_for, Decomposition};
pub use diagnostics::{
    calculate_metrics, confidence_ellipse, contributions, diagnostic_limits,
    group_confidence_ellipses, hotelling_t2, hotelling_t2_limit, mahalanobis_distances, q_residual_limit, q_residuals, ConfidenceEllipse,
    DiagnosticLimits, PcaMetrics,
};
pub use error::{PcaError, Result};
pub use model::{Loadings, PcaModel, PcaResult};
pub use preprocessing::{PreprocessingOptions, PreprocessingParams, Preprocessor, RowNormalization};
pub use validation::{matrix_from_rows, matrix_to_rows};

use log::{debug, info};
use ndarray::{Array2, ArrayView2};
use std::time::Instant;

/// Principal component analysis (PCA) structure
///
/// Holds a validated configuration. Each call to [`Pca::fit`] works on its own
/// copy of the data and returns a fresh, immutable [`PcaFit`].
#[derive(Debug, Clone)]
pub struct Pca {
    config: PcaConfig,
}

/// Everything produced by one fit.
#[derive(Debug, Clone)]
pub struct PcaFit {
    /// Retained preprocessing and projection, for transforming unseen rows.
    pub model: PcaModel,
    pub result: PcaResult,
    /// The preprocessed training matrix, which diagnostics are computed against.
    pub preprocessed: Array2<f64>,
}

impl Pca {
    /// Creates a PCA instance after validating `config`.
    ///
    /// # Errors
    /// `Configuration` for conflicting or out-of-range options.
    pub fn new(config: PcaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PcaConfig {
        &self.config
    }

    /// Fits the model to `data` (n_samples x n_features).
    ///
    /// Preprocesses the data, runs the configured decomposition strategy and
    /// assembles the result. Either every output is returned or an error is.
    ///
    /// # Errors
    /// - `InvalidInput` for fewer than 2 rows, no columns, or non-finite cells.
    /// - `Numerical` for zero-spread columns under scaling or degenerate spectra.
    /// - `RankDeficiency` when `components` exceeds what the data supports.
    /// - `Convergence` when a NIPALS component exceeds the iteration cap.
    pub fn fit(&self, data: ArrayView2<f64>) -> Result<PcaFit> {
        let start = Instant::now();
        validation::validate_fit_input(data)?;
        let (n_samples, n_features) = data.dim();
        let k = self.config.components;
        info!(
            "Fitting PCA ({}): {} samples x {} features, {} components",
            self.config.method.name(),
            n_samples,
            n_features,
            k
        );

        let mut preprocessor = Preprocessor::new(PreprocessingOptions::from(&self.config))?;
        let preprocessed = preprocessor.fit_transform(data)?;
        debug!("Preprocessing done in {:?}", start.elapsed());

        let strategy = strategy_for(&self.config.method, self.config.convergence);
        let decompose_start = Instant::now();
        let decomposed = strategy.decompose(preprocessed.view(), k)?;
        debug!(
            "{} decomposition done in {:?}",
            strategy.name(),
            decompose_start.elapsed()
        );

        let result = PcaResult::from_decomposed(
            &decomposed,
            self.config.method.clone(),
            self.config.component_labels.as_deref(),
            n_features,
        )?;
        let model = PcaModel::new(
            preprocessor,
            decomposed.projection,
            decomposed.eigenvalues,
        );

        info!(
            "PCA fit done in {:?}; cumulative explained variance {:.4}",
            start.elapsed(),
            result.cumulative_variance.iter().last().copied().unwrap_or(0.0)
        );

        Ok(PcaFit {
            model,
            result,
            preprocessed,
        })
    }
}

#[cfg(test)]
mod pca_tests;
