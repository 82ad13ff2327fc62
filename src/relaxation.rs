//! Soft holonomic constraints.
//!
//! A hard holonomic family is imposed exactly:
//!     J v_dot + J_dot v = 0
//! A soft one gets one free slack per row, penalized in the cost:
//!     J v_dot + J_dot v - s = 0,   cost += w ‖s‖²
//! so that the QP stays feasible when contacts, closed loops and the
//! dynamics cannot all be met exactly under a noisy state.

use std::ops::Range;

use na::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, types::Float};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConstraintMode {
    Hard,
    Soft { weight: Float },
}

impl ConstraintMode {
    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        match *self {
            ConstraintMode::Soft { weight } if !weight.is_finite() || weight <= 0. => {
                Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("soft constraint weight {} must be finite and > 0", weight),
                })
            }
            _ => Ok(()),
        }
    }

    /// Number of slack variables needed for `rows` constraint rows.
    pub fn slack_rows(&self, rows: usize) -> usize {
        match self {
            ConstraintMode::Hard => 0,
            ConstraintMode::Soft { .. } => rows,
        }
    }
}

/// Equality rows A x = b over the full decision vector for
///     J v_dot + J_dot v - s = 0
/// `slack` is the slack column range for soft rows, None for hard ones.
pub fn holonomic_rows(
    jacobian: &DMatrix<Float>,
    jdot_v: &DVector<Float>,
    accel: &Range<usize>,
    slack: Option<&Range<usize>>,
    num_variables: usize,
) -> (DMatrix<Float>, DVector<Float>) {
    let rows = jacobian.nrows();
    let mut A = DMatrix::zeros(rows, num_variables);
    A.view_mut((0, accel.start), (rows, accel.len()))
        .copy_from(jacobian);
    if let Some(slack) = slack {
        A.view_mut((0, slack.start), (rows, slack.len()))
            .copy_from(&-DMatrix::<Float>::identity(rows, rows));
    }
    (A, -jdot_v)
}

/// Adds w ‖s‖² to the cost ½ xᵀPx + qᵀx.
pub fn add_slack_penalty(P: &mut DMatrix<Float>, slack: &Range<usize>, weight: Float) {
    for i in slack.clone() {
        P[(i, i)] += 2. * weight;
    }
}

#[cfg(test)]
mod relaxation_tests {
    use na::{dmatrix, dvector};

    use super::*;

    #[test]
    fn hard_rows_have_no_slack() {
        // Arrange
        let J = dmatrix![1., -1.];
        let jdot_v = dvector![0.5];

        // Act
        let (A, b) = holonomic_rows(&J, &jdot_v, &(0..2), None, 4);

        // Assert
        assert_eq!(A, dmatrix![1., -1., 0., 0.]);
        assert_eq!(b, dvector![-0.5]);
        assert_eq!(ConstraintMode::Hard.slack_rows(3), 0);
    }

    #[test]
    fn soft_rows_subtract_slack() {
        let J = dmatrix![1., 0.; 0., 1.];
        let jdot_v = dvector![0., 2.];
        let mode = ConstraintMode::Soft { weight: 100. };

        let (A, b) = holonomic_rows(&J, &jdot_v, &(0..2), Some(&(3..5)), 5);
        let mut P = DMatrix::zeros(5, 5);
        add_slack_penalty(&mut P, &(3..5), 100.);

        assert_eq!(mode.slack_rows(2), 2);
        assert_eq!(
            A,
            dmatrix![1., 0., 0., -1., 0.;
                     0., 1., 0., 0., -1.]
        );
        assert_eq!(b, dvector![0., -2.]);
        assert_eq!(P[(3, 3)], 200.);
        assert_eq!(P[(4, 4)], 200.);
        assert_eq!(P.sum(), 400.);
    }

    #[test]
    fn soft_weight_must_be_positive() {
        assert!(ConstraintMode::Soft { weight: 0. }.validate("contact_mode").is_err());
        assert!(ConstraintMode::Soft {
            weight: Float::INFINITY
        }
        .validate("loop_mode")
        .is_err());
        assert!(ConstraintMode::Soft { weight: 200. }.validate("contact_mode").is_ok());
        assert!(ConstraintMode::Hard.validate("loop_mode").is_ok());
    }
}
