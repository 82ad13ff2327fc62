use na::{DMatrix, SymmetricEigen};

use crate::{error::ConfigError, types::Float, util::{all_finite, asymmetry}};

/// Relative tolerance used for the symmetry and eigenvalue checks.
const PSD_TOL: Float = 1e-9;

/// Position and velocity feedback gains of a tracking objective.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackGains {
    pub kp: DMatrix<Float>,
    pub kd: DMatrix<Float>,
}

impl FeedbackGains {
    pub fn new(kp: DMatrix<Float>, kd: DMatrix<Float>) -> Self {
        FeedbackGains { kp, kd }
    }

    /// Same scalar gain on every task axis.
    pub fn uniform(dim: usize, kp: Float, kd: Float) -> Self {
        FeedbackGains {
            kp: DMatrix::identity(dim, dim) * kp,
            kd: DMatrix::identity(dim, dim) * kd,
        }
    }

    pub fn validate(&self, objective: &str, dim: usize) -> Result<(), ConfigError> {
        validate_psd(objective, "kp", &self.kp, dim)?;
        validate_psd(objective, "kd", &self.kd, dim)
    }
}

/// Check that `m` is a finite, symmetric, positive semi-definite dim x dim
/// matrix.
pub fn validate_psd(
    objective: &str,
    matrix: &'static str,
    m: &DMatrix<Float>,
    dim: usize,
) -> Result<(), ConfigError> {
    if m.shape() != (dim, dim) {
        return Err(ConfigError::DimensionMismatch {
            what: format!("{} of objective '{}'", matrix, objective),
            expected: dim,
            got: if m.nrows() != dim { m.nrows() } else { m.ncols() },
        });
    }
    if !all_finite(m) {
        return Err(ConfigError::NonFiniteMatrix {
            objective: objective.to_string(),
            matrix,
        });
    }

    let scale = m.amax().max(1.);
    if asymmetry(m) > PSD_TOL * scale {
        return Err(ConfigError::AsymmetricMatrix {
            objective: objective.to_string(),
            matrix,
        });
    }

    let min_eigenvalue = SymmetricEigen::new(m.clone()).eigenvalues.min();
    if min_eigenvalue < -PSD_TOL * scale {
        return Err(ConfigError::NotPositiveSemidefinite {
            objective: objective.to_string(),
            matrix,
            eigenvalue: min_eigenvalue,
        });
    }
    Ok(())
}

#[cfg(test)]
mod gains_tests {
    use na::{dmatrix, DMatrix};

    use super::*;

    #[test]
    fn accepts_psd_and_zero() {
        let w = dmatrix![2., 1., 0.; 1., 2., 0.; 0., 0., 0.];
        assert!(validate_psd("com", "weight", &w, 3).is_ok());
        assert!(validate_psd("com", "weight", &DMatrix::zeros(3, 3), 3).is_ok());
    }

    #[test]
    fn rejects_negative_eigenvalue() {
        // eigenvalues 3 and -1
        let w = dmatrix![1., 2.; 2., 1.];
        let err = validate_psd("foot", "weight", &w, 2).unwrap_err();
        match err {
            ConfigError::NotPositiveSemidefinite { eigenvalue, .. } => {
                crate::assert_close!(eigenvalue, -1., 1e-9);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_asymmetric_non_finite_and_wrong_size() {
        let asym = dmatrix![1., 0.5; 0., 1.];
        assert!(matches!(
            validate_psd("a", "weight", &asym, 2),
            Err(ConfigError::AsymmetricMatrix { .. })
        ));

        let nan = dmatrix![1., 0.; 0., Float::NAN];
        assert!(matches!(
            validate_psd("a", "kp", &nan, 2),
            Err(ConfigError::NonFiniteMatrix { .. })
        ));

        assert!(matches!(
            validate_psd("a", "kd", &DMatrix::identity(2, 2), 3),
            Err(ConfigError::DimensionMismatch { .. })
        ));
    }
}
