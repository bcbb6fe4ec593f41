// magtrack_core/src/solver/cholesky.rs

use nalgebra::{SMatrix, SVector};

use crate::error::EngineError;

/// Smallest diagonal pivot accepted before a matrix is declared not positive-definite.
pub const CHOLESKY_TOLERANCE: f64 = 1e-30;

/// Lower-triangular Cholesky factor `L` of a symmetric positive-definite matrix `A = L·Lᵀ`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cholesky<const N: usize> {
    l: SMatrix<f64, N, N>,
}

impl<const N: usize> Cholesky<N> {
    /// Factorises `a`, reading only its lower triangle (diagonal included).
    ///
    /// Fails with [`EngineError::NotPositiveDefinite`] on the first pivot that is
    /// below [`CHOLESKY_TOLERANCE`] or NaN.
    pub fn decompose(a: &SMatrix<f64, N, N>) -> Result<Self, EngineError> {
        let mut l = SMatrix::<f64, N, N>::zeros();

        for i in 0..N {
            for j in 0..i {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l[(i, k)] * l[(j, k)];
                }
                l[(i, j)] = (a[(i, j)] - sum) / l[(j, j)];
            }

            let mut sum = 0.0;
            for k in 0..i {
                sum += l[(i, k)] * l[(i, k)];
            }
            let pivot = a[(i, i)] - sum;

            // Written this way round so NaN fails too.
            if !(pivot >= CHOLESKY_TOLERANCE) {
                return Err(EngineError::NotPositiveDefinite {
                    pivot: i,
                    value: pivot,
                });
            }
            l[(i, i)] = pivot.sqrt();
        }

        Ok(Self { l })
    }

    /// The lower-triangular factor. Entries above the diagonal are zero.
    pub fn l(&self) -> &SMatrix<f64, N, N> {
        &self.l
    }

    /// Solves `A·x = b` by forward substitution (`L·y = b`) then back
    /// substitution (`Lᵀ·x = y`).
    pub fn solve(&self, b: &SVector<f64, N>) -> SVector<f64, N> {
        let l = &self.l;
        let mut x = SVector::<f64, N>::zeros();

        for i in 0..N {
            let mut sum = 0.0;
            for j in 0..i {
                sum += l[(i, j)] * x[j];
            }
            x[i] = (b[i] - sum) / l[(i, i)];
        }

        for i in (0..N).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..N {
                sum += l[(j, i)] * x[j];
            }
            x[i] = (x[i] - sum) / l[(i, i)];
        }

        x
    }

    /// `L·Lᵀ`, the matrix this factor represents.
    pub fn reconstruct(&self) -> SMatrix<f64, N, N> {
        self.l * self.l.transpose()
    }
}
