// src/linalg_backends.rs

use crate::error::ThreadSafeStdError;
use ndarray::{Array1, Array2, ArrayView2};
use std::marker::PhantomData;

/// Dispatches to the linear algebra backend selected by compile-time features.
///
/// The default backend is pure Rust (`nalgebra`). Enabling `backend_lapack`
/// routes the same calls through `ndarray-linalg`.
#[derive(Debug, Default, Copy, Clone)]
pub struct LinAlgBackendProvider<F: 'static + Copy + Send + Sync> {
    _phantom: PhantomData<F>,
}

impl<F: 'static + Copy + Send + Sync> LinAlgBackendProvider<F> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

/// Output of a symmetric eigendecomposition.
///
/// No ordering is guaranteed; callers sort the pairs themselves.
#[derive(Debug)]
pub struct EighOutput<F: 'static> {
    pub eigenvalues: Array1<F>,
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<F>,
}

/// Symmetric eigendecomposition. Implementers may assume `matrix` is symmetric.
pub trait BackendEigh<F: 'static + Copy + Send + Sync> {
    fn eigh(&self, matrix: ArrayView2<F>) -> Result<EighOutput<F>, ThreadSafeStdError>;
}

/// Output of a thin singular value decomposition, singular values descending.
#[derive(Debug)]
pub struct SVDOutput<F: 'static> {
    pub u: Option<Array2<F>>,
    pub s: Array1<F>,
    pub vt: Option<Array2<F>>,
}

/// Thin singular value decomposition.
pub trait BackendSVD<F: 'static + Copy + Send + Sync> {
    fn svd(
        &self,
        matrix: ArrayView2<F>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput<F>, ThreadSafeStdError>;
}

fn to_dyn_error(msg: String) -> ThreadSafeStdError {
    Box::new(std::io::Error::new(std::io::ErrorKind::Other, msg))
}

// --- nalgebra backend (default) ---

#[derive(Debug, Default, Copy, Clone)]
pub struct NalgebraLinAlgBackend;

fn to_nalgebra(matrix: ArrayView2<f64>) -> nalgebra::DMatrix<f64> {
    let (nrows, ncols) = matrix.dim();
    nalgebra::DMatrix::from_fn(nrows, ncols, |i, j| matrix[[i, j]])
}

fn from_nalgebra(matrix: &nalgebra::DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((matrix.nrows(), matrix.ncols()), |(i, j)| matrix[(i, j)])
}

impl BackendEigh<f64> for NalgebraLinAlgBackend {
    fn eigh(&self, matrix: ArrayView2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(to_dyn_error(
                "Matrix must be square for eigendecomposition.".to_string(),
            ));
        }
        if matrix.is_empty() {
            return Ok(EighOutput {
                eigenvalues: Array1::zeros(0),
                eigenvectors: Array2::zeros((0, 0)),
            });
        }
        let eig = nalgebra::SymmetricEigen::try_new(to_nalgebra(matrix), f64::EPSILON, 0)
            .ok_or_else(|| {
                to_dyn_error(format!(
                    "Symmetric eigendecomposition of a {}x{} matrix did not converge",
                    matrix.nrows(),
                    matrix.ncols()
                ))
            })?;
        Ok(EighOutput {
            eigenvalues: Array1::from_iter(eig.eigenvalues.iter().copied()),
            eigenvectors: from_nalgebra(&eig.eigenvectors),
        })
    }
}

impl BackendSVD<f64> for NalgebraLinAlgBackend {
    fn svd(
        &self,
        matrix: ArrayView2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput<f64>, ThreadSafeStdError> {
        let (nrows, ncols) = matrix.dim();
        let k_dim = nrows.min(ncols);
        if matrix.is_empty() {
            return Ok(SVDOutput {
                u: if compute_u { Some(Array2::zeros((nrows, k_dim))) } else { None },
                s: Array1::zeros(k_dim),
                vt: if compute_v { Some(Array2::zeros((k_dim, ncols))) } else { None },
            });
        }
        let svd = nalgebra::linalg::SVD::try_new(
            to_nalgebra(matrix),
            compute_u,
            compute_v,
            f64::EPSILON,
            0,
        )
        .ok_or_else(|| {
            to_dyn_error(format!("SVD of a {}x{} matrix did not converge", nrows, ncols))
        })?;

        // nalgebra does not promise an order; sort descending.
        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| {
            svd.singular_values[b]
                .partial_cmp(&svd.singular_values[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let s = Array1::from_iter(order.iter().map(|&i| svd.singular_values[i]));
        let u = match (&svd.u, compute_u) {
            (Some(u), true) => Some(Array2::from_shape_fn((u.nrows(), order.len()), |(i, j)| {
                u[(i, order[j])]
            })),
            (None, true) => return Err(to_dyn_error("SVD U factor was not computed".to_string())),
            _ => None,
        };
        let vt = match (&svd.v_t, compute_v) {
            (Some(vt), true) => Some(Array2::from_shape_fn((order.len(), vt.ncols()), |(i, j)| {
                vt[(order[i], j)]
            })),
            (None, true) => return Err(to_dyn_error("SVD V^T factor was not computed".to_string())),
            _ => None,
        };
        Ok(SVDOutput { u, s, vt })
    }
}

// --- ndarray-linalg (LAPACK) backend ---

#[cfg(feature = "backend_lapack")]
mod lapack_specific_code {
    use super::{BackendEigh, BackendSVD, EighOutput, SVDOutput};
    use crate::error::ThreadSafeStdError;
    use ndarray::ArrayView2;
    use ndarray_linalg::{Eigh as NdLinalgEigh, SVDInto as NdLinalgSVDInto, UPLO};

    #[derive(Debug, Default, Copy, Clone)]
    pub struct NdarrayLinAlgBackend;

    impl BackendEigh<f64> for NdarrayLinAlgBackend {
        fn eigh(&self, matrix: ArrayView2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
            let (eigenvalues, eigenvectors) = matrix
                .to_owned()
                .eigh(UPLO::Upper)
                .map_err(|e| Box::new(e) as ThreadSafeStdError)?;
            Ok(EighOutput { eigenvalues, eigenvectors })
        }
    }

    impl BackendSVD<f64> for NdarrayLinAlgBackend {
        fn svd(
            &self,
            matrix: ArrayView2<f64>,
            compute_u: bool,
            compute_v: bool,
        ) -> Result<SVDOutput<f64>, ThreadSafeStdError> {
            let k_dim = matrix.nrows().min(matrix.ncols());
            let (u, s, vt) = matrix
                .to_owned()
                .svd_into(compute_u, compute_v)
                .map_err(|e| Box::new(e) as ThreadSafeStdError)?;
            // LAPACK returns full U / V^T; keep the thin part.
            let u = u.map(|u| u.slice(ndarray::s![.., ..k_dim]).to_owned());
            let vt = vt.map(|vt| vt.slice(ndarray::s![..k_dim, ..]).to_owned());
            Ok(SVDOutput { u, s, vt })
        }
    }
}

impl BackendEigh<f64> for LinAlgBackendProvider<f64> {
    fn eigh(&self, matrix: ArrayView2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_lapack")]
        {
            lapack_specific_code::NdarrayLinAlgBackend.eigh(matrix)
        }
        #[cfg(not(feature = "backend_lapack"))]
        {
            NalgebraLinAlgBackend.eigh(matrix)
        }
    }
}

impl BackendSVD<f64> for LinAlgBackendProvider<f64> {
    fn svd(
        &self,
        matrix: ArrayView2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SVDOutput<f64>, ThreadSafeStdError> {
        #[cfg(feature = "backend_lapack")]
        {
            lapack_specific_code::NdarrayLinAlgBackend.svd(matrix, compute_u, compute_v)
        }
        #[cfg(not(feature = "backend_lapack"))]
        {
            NalgebraLinAlgBackend.svd(matrix, compute_u, compute_v)
        }
    }
}

/// Eigenpairs of a symmetric matrix sorted by decreasing eigenvalue.
pub(crate) fn sorted_eigh_descending(
    matrix: ArrayView2<f64>,
) -> Result<(Vec<f64>, Array2<f64>), ThreadSafeStdError> {
    let output = LinAlgBackendProvider::<f64>::new().eigh(matrix)?;
    let mut order: Vec<usize> = (0..output.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| {
        output.eigenvalues[b]
            .partial_cmp(&output.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let values = order.iter().map(|&i| output.eigenvalues[i]).collect();
    let vectors = output.eigenvectors.select(ndarray::Axis(1), &order);
    Ok((values, vectors))
}
