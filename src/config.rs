// src/config.rs

use crate::error::{PcaError, Result};
use serde::{Deserialize, Serialize};

/// Kernel function used by kernel PCA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelType {
    /// `k(x, y) = x·y`, equivalent to standard PCA on centered data.
    Linear,
    /// `k(x, y) = (gamma·x·y + coef0)^degree`
    Poly,
    /// `k(x, y) = exp(-gamma·‖x − y‖²)`
    Rbf,
}

/// Parameters of the kernel PCA method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    pub kernel_type: KernelType,
    /// Kernel width / scale. `None` means `1 / n_features` at fit time.
    pub gamma: Option<f64>,
    /// Polynomial degree (poly only).
    pub degree: u32,
    /// Independent term of the polynomial kernel.
    pub coef0: f64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            kernel_type: KernelType::Rbf,
            gamma: None,
            degree: 3,
            coef0: 1.0,
        }
    }
}

impl KernelConfig {
    pub fn new(kernel_type: KernelType) -> Self {
        Self {
            kernel_type,
            ..Self::default()
        }
    }

    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = Some(gamma);
        self
    }

    pub fn degree(mut self, degree: u32) -> Self {
        self.degree = degree;
        self
    }

    pub fn coef0(mut self, coef0: f64) -> Self {
        self.coef0 = coef0;
        self
    }

    /// Resolves the effective gamma for data with `n_features` columns.
    pub fn resolved_gamma(&self, n_features: usize) -> f64 {
        self.gamma
            .unwrap_or_else(|| 1.0 / (n_features.max(1) as f64))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(gamma) = self.gamma {
            if !(gamma.is_finite() && gamma > 0.0) {
                return Err(PcaError::Configuration(format!(
                    "kernel gamma must be a positive finite number, got {}",
                    gamma
                )));
            }
        }
        if self.kernel_type == KernelType::Poly && self.degree < 1 {
            return Err(PcaError::Configuration(
                "polynomial kernel degree must be at least 1".to_string(),
            ));
        }
        if i32::try_from(self.degree).is_err() {
            return Err(PcaError::Configuration(format!(
                "polynomial kernel degree must not exceed {}, got {}",
                i32::MAX,
                self.degree
            )));
        }
        if !self.coef0.is_finite() {
            return Err(PcaError::Configuration(
                "kernel coef0 must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decomposition strategy selected once at fit time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcaMethod {
    Nipals,
    #[default]
    Svd,
    Kernel(KernelConfig),
}

impl PcaMethod {
    /// Short lowercase name ("nipals", "svd", "kernel").
    pub fn name(&self) -> &'static str {
        match self {
            PcaMethod::Nipals => "nipals",
            PcaMethod::Svd => "svd",
            PcaMethod::Kernel(_) => "kernel",
        }
    }

    pub fn is_kernel(&self) -> bool {
        matches!(self, PcaMethod::Kernel(_))
    }
}

/// Stopping rule for the NIPALS power iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Iteration stops once `‖t_new − t_old‖ < tolerance`.
    pub tolerance: f64,
    /// Iteration cap per component; exceeding it is a convergence error.
    pub max_iterations: usize,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        ConvergenceConfig {
            tolerance: 1e-10,
            max_iterations: 500,
        }
    }
}

/// Configuration of a PCA fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaConfig {
    /// Number of principal components (k) to extract.
    pub components: usize,
    /// Subtract per-column means.
    pub mean_center: bool,
    /// Divide each column by its standard deviation, after centering when
    /// `mean_center` is set. Excludes `robust_scale` and `scale_only`.
    pub standard_scale: bool,
    /// Center on the median and scale by the interquartile range.
    pub robust_scale: bool,
    /// Divide by the column standard deviation without centering.
    pub scale_only: bool,
    /// Standard normal variate, applied row-wise before the column steps.
    pub snv: bool,
    /// Row-wise L2 normalization, applied before the column steps.
    pub vector_norm: bool,
    pub method: PcaMethod,
    pub convergence: ConvergenceConfig,
    /// Custom component labels; defaults to "PC1".."PCk".
    pub component_labels: Option<Vec<String>>,
}

impl Default for PcaConfig {
    fn default() -> Self {
        PcaConfig {
            components: 2,
            mean_center: true,
            standard_scale: false,
            robust_scale: false,
            scale_only: false,
            snv: false,
            vector_norm: false,
            method: PcaMethod::Svd,
            convergence: ConvergenceConfig::default(),
            component_labels: None,
        }
    }
}

impl PcaConfig {
    /// A config extracting `components` components with mean-centering and SVD.
    pub fn new(components: usize) -> Self {
        Self {
            components,
            ..Self::default()
        }
    }

    pub fn method(mut self, method: PcaMethod) -> Self {
        self.method = method;
        self
    }

    pub fn mean_center(mut self, mean_center: bool) -> Self {
        self.mean_center = mean_center;
        self
    }

    pub fn standard_scale(mut self, standard_scale: bool) -> Self {
        self.standard_scale = standard_scale;
        self
    }

    pub fn robust_scale(mut self, robust_scale: bool) -> Self {
        self.robust_scale = robust_scale;
        self
    }

    pub fn scale_only(mut self, scale_only: bool) -> Self {
        self.scale_only = scale_only;
        self
    }

    pub fn snv(mut self, snv: bool) -> Self {
        self.snv = snv;
        self
    }

    pub fn vector_norm(mut self, vector_norm: bool) -> Self {
        self.vector_norm = vector_norm;
        self
    }

    pub fn convergence(mut self, convergence: ConvergenceConfig) -> Self {
        self.convergence = convergence;
        self
    }

    pub fn component_labels(mut self, labels: Vec<String>) -> Self {
        self.component_labels = Some(labels);
        self
    }

    /// Checks the options for range errors and conflicts. Data-dependent
    /// limits (rank bounds) are checked at fit time.
    pub fn validate(&self) -> Result<()> {
        if self.components == 0 {
            return Err(PcaError::Configuration(
                "number of components must be at least 1".to_string(),
            ));
        }
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
        if !(self.convergence.tolerance.is_finite() && self.convergence.tolerance > 0.0) {
            return Err(PcaError::Configuration(format!(
                "convergence tolerance must be positive, got {}",
                self.convergence.tolerance
            )));
        }
        if self.convergence.max_iterations == 0 {
            return Err(PcaError::Configuration(
                "convergence max_iterations must be at least 1".to_string(),
            ));
        }
        if let Some(labels) = &self.component_labels {
            if labels.len() != self.components {
                return Err(PcaError::Configuration(format!(
                    "expected {} component labels, got {}",
                    self.components,
                    labels.len()
                )));
            }
        }
        if let PcaMethod::Kernel(kernel) = &self.method {
            kernel.validate()?;
        }
        Ok(())
    }
}

/// Configuration of a diagnostics computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Components used for the statistics; `None` means all fitted components.
    pub num_components: Option<usize>,
    /// Significance level alpha in (0, 1) for control limits.
    pub significance_level: f64,
    pub calculate_contributions: bool,
    pub calculate_confidence_ellipse: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            num_components: None,
            significance_level: 0.01,
            calculate_contributions: false,
            calculate_confidence_ellipse: false,
        }
    }
}

impl MetricsConfig {
    pub fn num_components(mut self, num_components: usize) -> Self {
        self.num_components = Some(num_components);
        self
    }

    pub fn significance_level(mut self, significance_level: f64) -> Self {
        self.significance_level = significance_level;
        self
    }

    pub fn contributions(mut self, calculate: bool) -> Self {
        self.calculate_contributions = calculate;
        self
    }

    pub fn confidence_ellipse(mut self, calculate: bool) -> Self {
        self.calculate_confidence_ellipse = calculate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let alpha = self.significance_level;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(PcaError::Configuration(format!(
                "significance level must lie in (0, 1), got {}",
                alpha
            )));
        }
        if self.num_components == Some(0) {
            return Err(PcaError::Configuration(
                "num_components must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
