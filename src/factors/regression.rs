// =============================================================================
// Ridge-stabilized ordinary least squares
// =============================================================================
//
// Small dense regressions only: the orthogonalizer never regresses against
// more than five columns, so normal equations with Gaussian elimination are
// exact enough and dependency-free. The ridge term (1e-6 by default) keeps
// the system solvable when residual columns are nearly collinear.

use crate::error::ScanError;

/// Solve `min ‖Xβ − y‖² + ridge·‖β‖²` for β.
///
/// `columns` are the design-matrix columns (each of length `y.len()`); an
/// intercept column is NOT added here, callers include one if wanted.
pub fn ridge_ols(columns: &[Vec<f64>], y: &[f64], ridge: f64) -> Result<Vec<f64>, ScanError> {
    let k = columns.len();
    let n = y.len();
    if k == 0 {
        return Ok(Vec::new());
    }
    for col in columns {
        if col.len() != n {
            return Err(ScanError::InvalidInput(format!(
                "design column length {} != target length {}",
                col.len(),
                n
            )));
        }
    }

    // Normal equations: (XᵀX + ridge·I) β = Xᵀy.
    let mut ata = vec![vec![0.0f64; k]; k];
    let mut aty = vec![0.0f64; k];
    for i in 0..k {
        for j in i..k {
            let dot: f64 = columns[i]
                .iter()
                .zip(columns[j].iter())
                .map(|(a, b)| a * b)
                .sum();
            ata[i][j] = dot;
            ata[j][i] = dot;
        }
        ata[i][i] += ridge;
        aty[i] = columns[i].iter().zip(y.iter()).map(|(a, b)| a * b).sum();
    }

    solve(ata, aty)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, ScanError> {
    let n = b.len();

    for col in 0..n {
        // Pivot: largest absolute value in this column at or below the diagonal.
        let pivot_row = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if a[pivot_row][col].abs() < 1e-12 {
            return Err(ScanError::InvalidInput(
                "singular design matrix in residualization".into(),
            ));
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for c in col..n {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution.
    let mut x = vec![0.0f64; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for col in row + 1..n {
            sum -= a[row][col] * x[col];
        }
        x[row] = sum / a[row][row];
    }

    for v in &x {
        if !v.is_finite() {
            return Err(ScanError::InvalidInput(
                "non-finite regression coefficients".into(),
            ));
        }
    }
    Ok(x)
}

/// Predicted values `Xβ` for the fitted coefficients.
pub fn project(columns: &[Vec<f64>], beta: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![0.0f64; n];
    for (col, &coef) in columns.iter().zip(beta.iter()) {
        for (o, &v) in out.iter_mut().zip(col.iter()) {
            *o += coef * v;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_linear_relation() {
        // y = 2·x1 + 3·x2
        let x1 = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let x2 = vec![5.0, 3.0, 1.0, 4.0, 2.0];
        let y: Vec<f64> = x1.iter().zip(&x2).map(|(a, b)| 2.0 * a + 3.0 * b).collect();

        let beta = ridge_ols(&[x1, x2], &y, 1e-6).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-4);
        assert!((beta[1] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn residual_of_fit_is_orthogonal_to_design() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = vec![2.1, 3.9, 6.2, 7.8, 10.1, 12.2];
        let cols = vec![vec![1.0; 6], x.clone()];

        let beta = ridge_ols(&cols, &y, 1e-6).unwrap();
        let fitted = project(&cols, &beta, 6);
        let residual: Vec<f64> = y.iter().zip(&fitted).map(|(a, b)| a - b).collect();

        // Residual ⊥ regressor (up to the ridge perturbation).
        let dot: f64 = residual.iter().zip(&x).map(|(r, v)| r * v).sum();
        assert!(dot.abs() < 1e-3, "dot = {dot}");
    }

    #[test]
    fn ridge_keeps_collinear_system_solvable() {
        let x1 = vec![1.0, 2.0, 3.0, 4.0];
        let x2 = x1.clone(); // perfectly collinear
        let y = vec![2.0, 4.0, 6.0, 8.0];
        let beta = ridge_ols(&[x1, x2], &y, 1e-6).unwrap();
        // Coefficients split the weight but the fit is still y ≈ 2x.
        assert!((beta[0] + beta[1] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn mismatched_lengths_are_invalid() {
        let err = ridge_ols(&[vec![1.0, 2.0]], &[1.0, 2.0, 3.0], 1e-6).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn empty_design_yields_empty_beta() {
        assert!(ridge_ols(&[], &[1.0, 2.0], 1e-6).unwrap().is_empty());
    }
}
