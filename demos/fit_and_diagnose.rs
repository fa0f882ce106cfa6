use ndarray::Array2;
use pca_diagnostics::{calculate_metrics, MetricsConfig, Pca, PcaConfig, PcaMethod};

fn main() {
    // 12 samples of 4 correlated measurements; the last row is off the trend.
    let mut data = Array2::from_shape_fn((12, 4), |(i, j)| {
        let t = i as f64;
        t * (j + 1) as f64 + (0.9 * t + j as f64).sin()
    });
    data.row_mut(11).assign(&ndarray::array![2.0, 40.0, 1.0, 30.0]);

    let pca = Pca::new(PcaConfig::new(2).standard_scale(true).method(PcaMethod::Svd))
        .expect("invalid PCA config");
    let fitted = pca.fit(data.view()).expect("PCA fit failed");

    println!("Explained variance (%): {:?}", fitted.result.explained_variance_percent());
    println!("Cumulative (%): {:?}", fitted.result.cumulative_variance_percent());

    let metrics = calculate_metrics(
        &fitted.result,
        fitted.preprocessed.view(),
        &MetricsConfig::default().significance_level(0.05).confidence_ellipse(true),
    )
    .expect("diagnostics failed");

    println!("T2 limit: {:.3}", metrics.t2_threshold);
    for (i, t2) in metrics.hotelling_t2.iter().enumerate() {
        let q = metrics.q_residuals.as_ref().map_or(f64::NAN, |q| q[i]);
        println!(
            "sample {:2}: T2 = {:7.3}{}  Q = {:7.3}",
            i + 1,
            t2,
            if metrics.outliers_t2[i] { " *" } else { "  " },
            q
        );
    }
    if let Some(ellipse) = metrics.confidence_ellipse {
        println!(
            "95% ellipse: axes {:.3} x {:.3}, angle {:.3} rad",
            ellipse.major_axis, ellipse.minor_axis, ellipse.angle
        );
    }
}
