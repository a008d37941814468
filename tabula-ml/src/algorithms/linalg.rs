//! Dense linear algebra helpers built on nalgebra.

use crate::error::MlError;
use crate::stats::pearson;
use nalgebra::{DMatrix, DVector};

const PINV_EPS: f64 = 1e-12;

/// Pearson correlation matrix of the given columns. Undefined entries are 0; the diagonal is 1.
pub fn correlation_matrix(columns: &[Vec<f64>]) -> DMatrix<f64> {
    let k = columns.len();
    DMatrix::from_fn(k, k, |i, j| {
        if i == j {
            1.0
        } else {
            let r = pearson(&columns[i], &columns[j]);
            if r.is_finite() { r } else { 0.0 }
        }
    })
}

/// Partial correlation of every pair controlling for all other variables,
/// from the pseudo-inverse of the correlation matrix.
pub fn partial_correlations(corr: &DMatrix<f64>) -> Result<DMatrix<f64>, MlError> {
    let precision = corr
        .clone()
        .pseudo_inverse(PINV_EPS)
        .map_err(|e| MlError::model(format!("pseudo-inverse failed: {}", e)))?;
    let k = precision.nrows();
    Ok(DMatrix::from_fn(k, k, |i, j| {
        if i == j {
            return 1.0;
        }
        let denom = (precision[(i, i)] * precision[(j, j)]).sqrt();
        let pc = -precision[(i, j)] / denom;
        if denom > 0.0 && pc.is_finite() {
            pc.clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }))
}

/// Ordinary least squares of `y` on `columns` with an intercept.
/// Returns the slope coefficients in column order.
pub fn ols(columns: &[Vec<f64>], y: &[f64]) -> Result<Vec<f64>, MlError> {
    let n = y.len();
    let p = columns.len();
    if p == 0 || n <= p || columns.iter().any(|c| c.len() != n) {
        return Err(MlError::insufficient(format!(
            "OLS needs more rows than regressors ({} rows, {} regressors)",
            n, p
        )));
    }
    let x = DMatrix::from_fn(n, p + 1, |i, j| if j == 0 { 1.0 } else { columns[j - 1][i] });
    let y = DVector::from_column_slice(y);
    let xtx = x.transpose() * &x;
    let xty = x.transpose() * &y;
    let xtx_inv = xtx
        .try_inverse()
        .ok_or_else(|| MlError::model("singular design matrix"))?;
    let beta = xtx_inv * xty;
    Ok(beta.iter().skip(1).copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_matrix() {
        let m = correlation_matrix(&[vec![1.0, 2.0, 3.0], vec![3.0, 2.0, 1.0], vec![1.0, 1.0, 1.0]]);
        assert_eq!(m[(0, 0)], 1.0);
        assert!((m[(0, 1)] + 1.0).abs() < 1e-12);
        assert_eq!(m[(0, 2)], 0.0);
    }

    #[test]
    fn test_partial_correlation_removes_confounder() {
        // a drives b and c; b and c correlate only through a.
        let n = 200;
        let a: Vec<f64> = (0..n).map(|i| ((i * 17) % 31) as f64).collect();
        let noise1: Vec<f64> = (0..n).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
        let noise2: Vec<f64> = (0..n).map(|i| ((i * 13) % 5) as f64 - 2.0).collect();
        let b: Vec<f64> = a.iter().zip(&noise1).map(|(x, e)| x + e).collect();
        let c: Vec<f64> = a.iter().zip(&noise2).map(|(x, e)| x + e).collect();
        let corr = correlation_matrix(&[a, b, c]);
        assert!(corr[(1, 2)] > 0.7);
        let pc = partial_correlations(&corr).unwrap();
        assert!(pc[(1, 2)].abs() < corr[(1, 2)]);
        assert!(pc[(0, 2)] > 0.5);
        assert_eq!(pc[(0, 0)], 1.0);
    }

    #[test]
    fn test_ols_recovers_coefficients() {
        let x1: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let x2: Vec<f64> = (0..20).map(|i| ((i * 3) % 7) as f64).collect();
        let y: Vec<f64> = x1.iter().zip(&x2).map(|(a, b)| 1.0 + 2.0 * a - 0.5 * b).collect();
        let beta = ols(&[x1, x2], &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-8);
        assert!((beta[1] + 0.5).abs() < 1e-8);
    }

    #[test]
    fn test_ols_errors() {
        assert!(ols(&[], &[1.0]).is_err());
        assert!(ols(&[vec![1.0, 2.0]], &[1.0, 2.0]).is_err());
        assert!(ols(&[vec![1.0, 2.0]], &[1.0, 2.0, 3.0]).is_err());
    }
}
