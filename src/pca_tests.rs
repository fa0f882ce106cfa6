use crate::{
    KernelConfig, KernelType, Loadings, MetricsConfig, Pca, PcaConfig, PcaError, PcaMethod,
};
use approx::assert_abs_diff_eq;
use ndarray::{array, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn generate_random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n_samples, n_features), |_| rng.random_range(-1.0..1.0))
}

// Column j is scaled by 0.6^j, so the leading eigenvalues are well separated
// and NIPALS converges quickly.
fn generate_structured_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut data = generate_random_data(n_samples, n_features, seed);
    for (j, mut column) in data.axis_iter_mut(Axis(1)).enumerate() {
        column *= 0.6f64.powi(j as i32);
    }
    data
}

fn generate_random_data_012(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n_samples, n_features), |_| rng.random_range(0..=2) as f64)
}

fn all_methods() -> Vec<PcaMethod> {
    vec![
        PcaMethod::Svd,
        PcaMethod::Nipals,
        PcaMethod::Kernel(KernelConfig::new(KernelType::Rbf)),
    ]
}

fn assert_orthonormal(loadings: &Array2<f64>, tolerance: f64) {
    let gram = loadings.t().dot(loadings);
    for ((i, j), value) in gram.indexed_iter() {
        let expected = if i == j { 1.0 } else { 0.0 };
        assert_abs_diff_eq!(*value, expected, epsilon = tolerance);
    }
}

// Fits and transforms a random matrix with every method and checks that no NaN comes out.
fn test_pca_random(n_samples: usize, n_features: usize, components: usize, seed: u64) {
    let input = generate_structured_data(n_samples, n_features, seed);
    for method in all_methods() {
        let pca = Pca::new(PcaConfig::new(components).method(method.clone())).unwrap();
        let fit = pca.fit(input.view()).unwrap();
        let output = fit.model.transform(input.view()).unwrap();
        assert_eq!(output.dim(), (n_samples, components));
        assert!(
            output.iter().all(|x| x.is_finite()),
            "non-finite transform output for {:?}",
            method
        );
    }
}

#[test]
fn test_pca_random_2() {
    test_pca_random(10, 2, 1, 1337);
}

#[test]
fn test_pca_random_64() {
    test_pca_random(64, 64, 5, 1337);
}

#[test]
fn test_pca_random_wide() {
    test_pca_random(20, 80, 4, 7);
}

#[test]
fn test_pca_random_012_64() {
    let input = generate_random_data_012(64, 16, 1337);
    let pca = Pca::new(PcaConfig::new(4).standard_scale(true)).unwrap();
    let fit = pca.fit(input.view()).unwrap();
    let output = fit.model.transform(input.view()).unwrap();
    assert!(output.iter().all(|x| !x.is_nan()));
}

#[test]
fn test_transform_reproduces_training_scores() {
    let input = generate_structured_data(40, 6, 42);
    for method in all_methods() {
        let pca = Pca::new(PcaConfig::new(3).method(method.clone())).unwrap();
        let fit = pca.fit(input.view()).unwrap();
        let projected = fit.model.transform(input.view()).unwrap();
        for (a, b) in projected.iter().zip(fit.result.scores.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
        }
        println!("{}: transform reproduces training scores", method.name());
    }
}

#[test]
fn test_integer_matrix_with_nipals() {
    // 10x3 matrix of 1..30, row-major. After centering it has rank one.
    let input = Array2::from_shape_fn((10, 3), |(i, j)| (3 * i + j + 1) as f64);
    let config = PcaConfig::new(2).method(PcaMethod::Nipals);
    let fit = Pca::new(config).unwrap().fit(input.view()).unwrap();
    let result = &fit.result;

    let loadings = result.loadings.as_explicit().unwrap();
    assert_orthonormal(loadings, 1e-8);
    assert!(result.explained_variance.sum() <= 1.0 + 1e-9);
    assert!(result.explained_variance[0] >= result.explained_variance[1]);
    assert_abs_diff_eq!(result.explained_variance[0], 1.0, epsilon = 1e-9);

    // All weight on (1, 1, 1)/sqrt(3), positive by the sign convention.
    let expected = 1.0 / 3f64.sqrt();
    for v in loadings.column(0) {
        assert_abs_diff_eq!(*v, expected, epsilon = 1e-9);
    }
    // scores = preprocessed data . loadings
    let reconstructed = fit.preprocessed.dot(loadings);
    for (a, b) in reconstructed.iter().zip(result.scores.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
fn test_result_layout_lengths() {
    let input = generate_random_data(25, 5, 3);
    let fit = Pca::new(PcaConfig::new(3)).unwrap().fit(input.view()).unwrap();
    let result = &fit.result;
    assert_eq!(result.scores.dim(), (25, 3));
    assert_eq!(result.eigenvalues.len(), 3);
    assert_eq!(result.explained_variance.len(), 3);
    assert_eq!(result.cumulative_variance.len(), 3);
    assert_eq!(result.component_labels, vec!["PC1", "PC2", "PC3"]);
    assert_eq!(result.all_eigenvalues.len(), 5);
    assert_eq!((result.n_samples, result.n_features), (25, 5));
    assert_eq!(fit.preprocessed.dim(), (25, 5));
    assert_eq!(fit.model.n_components(), 3);

    for pair in result.eigenvalues.windows(2) {
        assert!(pair[0] > pair[1]);
    }
    for pair in result.cumulative_variance.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[test]
fn test_preprocessed_matrix_is_centered() {
    let input = generate_random_data(30, 4, 11) + 5.0;
    let fit = Pca::new(PcaConfig::new(2)).unwrap().fit(input.view()).unwrap();
    for mean in fit.preprocessed.mean_axis(Axis(0)).unwrap() {
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-9);
    }
}

#[test]
fn test_kernel_fit_has_no_loadings() {
    let input = generate_random_data(15, 3, 5);
    let config = PcaConfig::new(2).method(PcaMethod::Kernel(KernelConfig::new(KernelType::Poly)));
    let fit = Pca::new(config).unwrap().fit(input.view()).unwrap();
    assert_eq!(fit.result.loadings, Loadings::NotAvailable);
    assert!(fit.model.loadings().is_none());

    let metrics = crate::calculate_metrics(
        &fit.result,
        fit.preprocessed.view(),
        &MetricsConfig::default(),
    )
    .unwrap();
    assert!(metrics.q_residuals.is_none());
    assert!(metrics.q_threshold.is_none());
    assert_eq!(metrics.hotelling_t2.len(), 15);
}

#[test]
fn test_custom_component_labels() {
    let input = generate_random_data(10, 3, 2);
    let labels = vec!["Size".to_string(), "Shape".to_string()];
    let fit = Pca::new(PcaConfig::new(2).component_labels(labels.clone()))
        .unwrap()
        .fit(input.view())
        .unwrap();
    assert_eq!(fit.result.component_labels, labels);

    let wrong = PcaConfig::new(3).component_labels(labels);
    assert!(matches!(Pca::new(wrong), Err(PcaError::Configuration(_))));
}

#[test]
fn test_pca_fit_insufficient_samples() {
    let x = array![[1.0, 2.0]];
    let pca = Pca::new(PcaConfig::new(1)).unwrap();
    assert!(matches!(pca.fit(x.view()), Err(PcaError::InvalidInput(_))));
}

#[test]
fn test_pca_fit_rejects_non_finite() {
    let x = array![[1.0, 2.0], [f64::NAN, 0.0], [3.0, 1.0]];
    let pca = Pca::new(PcaConfig::new(1)).unwrap();
    assert!(matches!(pca.fit(x.view()), Err(PcaError::InvalidInput(_))));
}

#[test]
fn test_too_many_components_is_rank_deficient() {
    let x = generate_random_data(4, 6, 1);
    for method in [PcaMethod::Svd, PcaMethod::Nipals] {
        let pca = Pca::new(PcaConfig::new(4).method(method)).unwrap();
        assert_eq!(
            pca.fit(x.view()).unwrap_err(),
            PcaError::RankDeficiency { requested: 4, available: 3 }
        );
    }
}

#[test]
fn test_conflicting_options_are_rejected() {
    let config = PcaConfig::new(2).standard_scale(true).robust_scale(true);
    assert!(matches!(Pca::new(config), Err(PcaError::Configuration(_))));
    let config = PcaConfig::new(0);
    assert!(matches!(Pca::new(config), Err(PcaError::Configuration(_))));
}

#[test]
fn test_standard_scale_respects_disabled_centering() {
    let x = array![[1.0, 10.0], [2.0, 30.0], [4.0, 20.0], [7.0, 50.0]];
    let config = PcaConfig::new(1).mean_center(false).standard_scale(true);
    let fit = Pca::new(config).unwrap().fit(x.view()).unwrap();
    let stds = x.std_axis(Axis(0), 1.0);
    let means = fit.preprocessed.mean_axis(Axis(0)).unwrap();
    // Column means 3.5 and 27.5, divided by their standard deviations.
    assert_abs_diff_eq!(means[0], 3.5 / stds[0], epsilon = 1e-12);
    assert_abs_diff_eq!(means[1], 27.5 / stds[1], epsilon = 1e-12);
    assert!(fit.model.preprocessor().params().unwrap().center.is_none());
}

#[test]
fn test_zero_variance_column_under_scaling() {
    let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
    let pca = Pca::new(PcaConfig::new(1).standard_scale(true)).unwrap();
    assert!(matches!(pca.fit(x.view()), Err(PcaError::Numerical(_))));
}

#[test]
fn test_generate_random_data_values() {
    let data = generate_random_data_012(10, 10, 123);
    assert!(data.iter().all(|&x| x == 0.0 || x == 1.0 || x == 2.0));
    let again = generate_random_data_012(10, 10, 123);
    assert_eq!(data, again);
}
