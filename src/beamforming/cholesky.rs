//! Complex Cholesky solver for the MMSE digital stage
//!
//! Matrices are row-major `Vec<Vec<Complex64>>`. The regularized normal
//! matrix `H^H H + N0 I` is factored as `L L^H` and solved with one forward
//! and one back substitution per right-hand side.

use rustfft::num_complex::Complex64;

use crate::error::{MmWaveError, MmWaveResult};

pub type ComplexMatrix = Vec<Vec<Complex64>>;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Lower-triangular `L` with `m = L L^H`.
///
/// Only the lower triangle of `m` is read. Fails on the first non-positive
/// pivot.
pub fn cholesky(m: &[Vec<Complex64>]) -> MmWaveResult<ComplexMatrix> {
    let n = m.len();
    let mut l = vec![vec![ZERO; n]; n];

    for j in 0..n {
        let pivot = m[j][j].re - (0..j).map(|k| l[j][k].norm_sqr()).sum::<f64>();
        if pivot <= 0.0 || !pivot.is_finite() {
            return Err(MmWaveError::NotPositiveDefinite { pivot });
        }
        let diag = pivot.sqrt();
        l[j][j] = Complex64::new(diag, 0.0);

        for i in (j + 1)..n {
            let dot: Complex64 = (0..j).map(|k| l[i][k] * l[j][k].conj()).sum();
            l[i][j] = (m[i][j] - dot) / diag;
        }
    }

    Ok(l)
}

/// Solve `L z = b`
pub fn forward_substitution(l: &[Vec<Complex64>], b: &[Complex64]) -> Vec<Complex64> {
    let n = l.len();
    let mut z = vec![ZERO; n];
    for i in 0..n {
        let dot: Complex64 = (0..i).map(|k| l[i][k] * z[k]).sum();
        z[i] = (b[i] - dot) / l[i][i];
    }
    z
}

/// Solve `L^H x = z`
pub fn back_substitution(l: &[Vec<Complex64>], z: &[Complex64]) -> Vec<Complex64> {
    let n = l.len();
    let mut x = vec![ZERO; n];
    for i in (0..n).rev() {
        let dot: Complex64 = ((i + 1)..n).map(|k| l[k][i].conj() * x[k]).sum();
        x[i] = (z[i] - dot) / l[i][i].conj();
    }
    x
}

/// Factor `H^H H + n0 I`
pub fn mmse_cholesky(h: &[Vec<Complex64>], n0: f64) -> MmWaveResult<ComplexMatrix> {
    let cols = h.first().map_or(0, |row| row.len());
    let mut gram = vec![vec![ZERO; cols]; cols];
    for (i, gram_row) in gram.iter_mut().enumerate() {
        for (j, g) in gram_row.iter_mut().enumerate() {
            *g = h.iter().map(|row| row[i].conj() * row[j]).sum();
        }
        gram_row[i] += n0;
    }
    cholesky(&gram)
}

/// `x = (H^H H + n0 I)^-1 H^H y`
pub fn mmse_solve(
    h: &[Vec<Complex64>],
    y: &[Complex64],
    n0: f64,
) -> MmWaveResult<Vec<Complex64>> {
    let l = mmse_cholesky(h, n0)?;
    Ok(solve_factored(&l, &hermitian_times(h, y)))
}

/// `X = (H^H H + n0 I)^-1 H^H`, factoring once for every column
pub fn mmse_solve_matrix(h: &[Vec<Complex64>], n0: f64) -> MmWaveResult<ComplexMatrix> {
    let l = mmse_cholesky(h, n0)?;
    let cols = l.len();
    let mut x = vec![vec![ZERO; h.len()]; cols];

    for k in 0..h.len() {
        // Column k of H^H is the conjugate of row k of H
        let rhs: Vec<Complex64> = h[k].iter().map(|v| v.conj()).collect();
        for (row, value) in x.iter_mut().zip(solve_factored(&l, &rhs)) {
            row[k] = value;
        }
    }

    Ok(x)
}

fn solve_factored(l: &[Vec<Complex64>], rhs: &[Complex64]) -> Vec<Complex64> {
    back_substitution(l, &forward_substitution(l, rhs))
}

fn hermitian_times(h: &[Vec<Complex64>], y: &[Complex64]) -> Vec<Complex64> {
    let cols = h.first().map_or(0, |row| row.len());
    (0..cols)
        .map(|i| {
            h.iter()
                .zip(y)
                .map(|(row, yr)| row[i].conj() * yr)
                .sum::<Complex64>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn make_identity(n: usize) -> ComplexMatrix {
        (0..n)
            .map(|i| (0..n).map(|j| if i == j { c(1.0, 0.0) } else { ZERO }).collect())
            .collect()
    }

    fn make_hermitian() -> ComplexMatrix {
        // Diagonally dominant, so positive definite
        vec![
            vec![c(4.0, 0.0), c(1.0, -1.0), c(0.5, 0.2)],
            vec![c(1.0, 1.0), c(3.0, 0.0), c(-0.3, 0.4)],
            vec![c(0.5, -0.2), c(-0.3, -0.4), c(2.0, 0.0)],
        ]
    }

    fn multiply(a: &[Vec<Complex64>], b: &[Vec<Complex64>]) -> ComplexMatrix {
        (0..a.len())
            .map(|i| {
                (0..b[0].len())
                    .map(|j| (0..b.len()).map(|k| a[i][k] * b[k][j]).sum::<Complex64>())
                    .collect()
            })
            .collect()
    }

    fn conjugate_transpose(a: &[Vec<Complex64>]) -> ComplexMatrix {
        (0..a[0].len())
            .map(|j| (0..a.len()).map(|i| a[i][j].conj()).collect())
            .collect()
    }

    fn assert_close(a: &[Vec<Complex64>], b: &[Vec<Complex64>]) {
        for (ra, rb) in a.iter().zip(b) {
            for (x, y) in ra.iter().zip(rb) {
                assert!((x - y).norm() < 1e-10, "{} vs {}", x, y);
            }
        }
    }

    // ========================================================================
    // FACTORIZATION
    // ========================================================================

    #[test]
    fn test_identity_factors_to_identity() {
        let l = cholesky(&make_identity(4)).unwrap();
        assert_close(&l, &make_identity(4));
    }

    #[test]
    fn test_reconstructs_hermitian_matrix() {
        let m = make_hermitian();
        let l = cholesky(&m).unwrap();
        for i in 0..3 {
            for j in (i + 1)..3 {
                assert_eq!(l[i][j], ZERO);
            }
        }
        assert_close(&multiply(&l, &conjugate_transpose(&l)), &m);
    }

    #[test]
    fn test_rejects_indefinite_matrix() {
        let m = vec![vec![c(1.0, 0.0), c(2.0, 0.0)], vec![c(2.0, 0.0), c(1.0, 0.0)]];
        assert!(matches!(
            cholesky(&m),
            Err(MmWaveError::NotPositiveDefinite { .. })
        ));
    }

    #[test]
    fn test_substitutions_solve_system() {
        let m = make_hermitian();
        let l = cholesky(&m).unwrap();
        let b = vec![c(1.0, 0.5), c(-2.0, 0.0), c(0.0, 3.0)];
        let x = back_substitution(&l, &forward_substitution(&l, &b));

        let mx: Vec<Complex64> = m
            .iter()
            .map(|row| row.iter().zip(&x).map(|(a, v)| a * v).sum::<Complex64>())
            .collect();
        for (got, want) in mx.iter().zip(&b) {
            assert!((got - want).norm() < 1e-10);
        }
    }

    // ========================================================================
    // MMSE
    // ========================================================================

    #[test]
    fn test_identity_channel_returns_input() {
        let h = make_identity(3);
        let vectors = [
            vec![c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0)],
            vec![c(0.3, -0.7), c(2.0, 1.0), c(-1.5, 0.25)],
        ];
        for v in &vectors {
            let x = mmse_solve(&h, v, 0.0).unwrap();
            for (got, want) in x.iter().zip(v) {
                assert!((got - want).norm() < 1e-12);
            }
        }
    }

    #[test]
    fn test_diagonal_channel_with_noise() {
        let h = vec![vec![c(2.0, 0.0), ZERO], vec![ZERO, c(0.0, 1.0)]];
        let y = vec![c(1.0, 0.0), c(1.0, 0.0)];
        let x = mmse_solve(&h, &y, 1.0).unwrap();
        // x_i = conj(h_i) y_i / (|h_i|^2 + 1)
        assert!((x[0] - c(0.4, 0.0)).norm() < 1e-12);
        assert!((x[1] - c(0.0, -0.5)).norm() < 1e-12);
    }

    #[test]
    fn test_matrix_solve_inverts_without_noise() {
        let h = vec![vec![c(1.0, 0.5), c(0.2, 0.0)], vec![c(-0.3, 0.1), c(0.8, -0.4)]];
        let x = mmse_solve_matrix(&h, 0.0).unwrap();
        assert_close(&multiply(&x, &h), &make_identity(2));
    }

    #[test]
    fn test_nearly_singular_channel_is_regularized() {
        let h = vec![
            vec![c(1.0, 0.0), c(1.0, 1e-9)],
            vec![c(1.0, 0.0), c(1.0, 1e-9)],
        ];
        let x = mmse_solve_matrix(&h, 1e-3).unwrap();
        assert!(x.iter().flatten().all(|v| v.is_finite() && v.norm() < 10.0));
    }
}
