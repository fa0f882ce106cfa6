// src/validation.rs

use crate::error::{PcaError, Result};
use ndarray::{Array2, ArrayView2};

/// Builds a matrix from row vectors, rejecting empty, ragged and non-finite input.
///
/// Row and column positions in error messages are 1-based.
///
/// # Examples
///
/// ```
/// use pca_diagnostics::matrix_from_rows;
/// let m = matrix_from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
/// assert_eq!(m.dim(), (2, 2));
/// assert!(matrix_from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
/// ```
pub fn matrix_from_rows(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let n_rows = rows.len();
    if n_rows == 0 {
        return Err(PcaError::InvalidInput("matrix has no rows".to_string()));
    }
    let n_cols = rows[0].len();
    if n_cols == 0 {
        return Err(PcaError::InvalidInput("matrix has no columns".to_string()));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.len() != n_cols {
            return Err(PcaError::InvalidInput(format!(
                "row {} has {} values, expected {}",
                i + 1,
                row.len(),
                n_cols
            )));
        }
    }
    let flat: Vec<f64> = rows.iter().flat_map(|row| row.iter().copied()).collect();
    let matrix = Array2::from_shape_vec((n_rows, n_cols), flat)
        .map_err(|e| PcaError::InvalidInput(e.to_string()))?;
    ensure_finite(matrix.view())?;
    Ok(matrix)
}

/// Converts a matrix back into row vectors.
pub fn matrix_to_rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}

/// Errors on the first NaN or infinite cell.
pub(crate) fn ensure_finite(data: ArrayView2<f64>) -> Result<()> {
    for ((i, j), &value) in data.indexed_iter() {
        if !value.is_finite() {
            return Err(PcaError::InvalidInput(format!(
                "non-finite value {} at row {}, column {}",
                value,
                i + 1,
                j + 1
            )));
        }
    }
    Ok(())
}

/// Shape and value checks shared by every fit: n >= 2, p >= 1, all cells finite.
pub(crate) fn validate_fit_input(data: ArrayView2<f64>) -> Result<()> {
    let (n_samples, n_features) = data.dim();
    if n_features == 0 {
        return Err(PcaError::InvalidInput(
            "input matrix has zero features".to_string(),
        ));
    }
    if n_samples < 2 {
        return Err(PcaError::InvalidInput(format!(
            "input matrix must have at least 2 samples, got {}",
            n_samples
        )));
    }
    ensure_finite(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rows_round_trip_through_matrix() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let matrix = matrix_from_rows(&rows).unwrap();
        assert_eq!(matrix, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(matrix_to_rows(&matrix), rows);
    }

    #[test]
    fn ragged_rows_name_the_offending_row() {
        let err = matrix_from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0]]).unwrap_err();
        match err {
            PcaError::InvalidInput(msg) => assert!(msg.contains("row 3"), "{}", msg),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn empty_and_non_finite_input_is_rejected() {
        assert!(matrix_from_rows(&[]).is_err());
        assert!(matrix_from_rows(&[vec![]]).is_err());
        let err = matrix_from_rows(&[vec![1.0, f64::NAN]]).unwrap_err();
        match err {
            PcaError::InvalidInput(msg) => assert!(msg.contains("column 2"), "{}", msg),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn fit_input_needs_two_samples() {
        let one_row = array![[1.0, 2.0]];
        assert!(validate_fit_input(one_row.view()).is_err());
        let no_cols = Array2::<f64>::zeros((3, 0));
        assert!(validate_fit_input(no_cols.view()).is_err());
        let ok = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(validate_fit_input(ok.view()).is_ok());
    }
}
