// src/correlation.rs

//! Correlations between principal component scores and external metadata
//! ("eigencorrelations"), used to interpret what each component tracks.

use crate::error::{PcaError, Result};
use crate::model::default_component_labels;
use log::debug;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    /// Pearson correlation of average ranks.
    Spearman,
}

/// Metadata to correlate against the scores. Every variable must have one value per observation.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRequest {
    pub numeric: BTreeMap<String, Vec<f64>>,
    /// One-hot encoded into `name=level` indicator variables. Empty levels are skipped.
    pub categorical: BTreeMap<String, Vec<String>>,
    /// 0-based component indices; `None` means all.
    pub components: Option<Vec<usize>>,
    pub method: CorrelationMethod,
}

impl CorrelationRequest {
    pub fn new(method: CorrelationMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn numeric(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.numeric.insert(name.into(), values);
        self
    }

    pub fn categorical(mut self, name: impl Into<String>, levels: Vec<String>) -> Self {
        self.categorical.insert(name.into(), levels);
        self
    }

    pub fn components(mut self, components: Vec<usize>) -> Self {
        self.components = Some(components);
        self
    }
}

/// Correlation and two-sided p-value of every variable with every selected component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// Variable names in sorted order.
    pub variables: Vec<String>,
    /// Labels of the selected components, e.g. "PC1".
    pub components: Vec<String>,
    pub correlations: BTreeMap<String, Vec<f64>>,
    pub p_values: BTreeMap<String, Vec<f64>>,
}

/// Correlates each selected score column with each metadata variable.
///
/// P-values test r = 0 with `t = r·√((n−2)/(1−r²))` on n−2 degrees of freedom.
/// A constant variable gets r = 0, p = 1; fewer than 3 finite pairs give NaN.
pub fn eigencorrelations(
    scores: ArrayView2<f64>,
    request: &CorrelationRequest,
) -> Result<CorrelationResult> {
    let (n_samples, n_components) = scores.dim();
    if n_samples == 0 || n_components == 0 {
        return Err(PcaError::InvalidInput(format!(
            "scores matrix has invalid dimensions {}x{}",
            n_samples, n_components
        )));
    }
    let selected: Vec<usize> = match &request.components {
        Some(components) if !components.is_empty() => components.clone(),
        _ => (0..n_components).collect(),
    };
    if let Some(&bad) = selected.iter().find(|&&c| c >= n_components) {
        return Err(PcaError::Configuration(format!(
            "component index {} out of bounds for {} components",
            bad, n_components
        )));
    }
    let all_labels = default_component_labels(n_components);
    let components = selected.iter().map(|&c| all_labels[c].clone()).collect();

    let mut variables: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (name, values) in &request.numeric {
        check_length(values.len(), n_samples)?;
        variables.insert(name.clone(), values.clone());
    }
    for (name, levels) in &request.categorical {
        check_length(levels.len(), n_samples)?;
        for (level, indicator) in one_hot(levels) {
            variables.insert(format!("{}={}", name, level), indicator);
        }
    }

    let mut correlations = BTreeMap::new();
    let mut p_values = BTreeMap::new();
    for (name, values) in &variables {
        let (r, p): (Vec<f64>, Vec<f64>) = selected
            .iter()
            .map(|&c| correlate(scores.column(c), values, request.method))
            .unzip();
        correlations.insert(name.clone(), r);
        p_values.insert(name.clone(), p);
    }
    debug!(
        "Eigencorrelations: {} variables x {} components ({:?})",
        variables.len(),
        selected.len(),
        request.method
    );

    Ok(CorrelationResult {
        variables: variables.into_keys().collect(),
        components,
        correlations,
        p_values,
    })
}

fn check_length(found: usize, expected: usize) -> Result<()> {
    if found != expected {
        return Err(PcaError::DimensionMismatch { expected, found });
    }
    Ok(())
}

fn one_hot(levels: &[String]) -> Vec<(String, Vec<f64>)> {
    let distinct: BTreeSet<&String> = levels.iter().filter(|l| !l.is_empty()).collect();
    distinct
        .into_iter()
        .map(|level| {
            let indicator = levels
                .iter()
                .map(|l| if l == level { 1.0 } else { 0.0 })
                .collect();
            (level.clone(), indicator)
        })
        .collect()
}

/// Correlation with pairwise deletion of non-finite values.
fn correlate(scores: ArrayView1<f64>, values: &[f64], method: CorrelationMethod) -> (f64, f64) {
    let (x, y): (Vec<f64>, Vec<f64>) = scores
        .iter()
        .zip(values.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .unzip();
    if x.len() < 3 {
        return (f64::NAN, f64::NAN);
    }
    let (x, y) = match method {
        CorrelationMethod::Pearson => (x, y),
        CorrelationMethod::Spearman => (average_ranks(&x), average_ranks(&y)),
    };
    let r = pearson(&x, &y);
    (r, p_value(r, x.len()))
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx) * (a - mx);
        syy += (b - my) * (b - my);
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return 0.0;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

fn p_value(r: f64, n: usize) -> f64 {
    if r.abs() >= 1.0 {
        return 0.0;
    }
    if r == 0.0 {
        return 1.0;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// 1-based ranks with ties sharing their average rank.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j + 1) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = rank;
        }
        i = j;
    }
    ranks
}
