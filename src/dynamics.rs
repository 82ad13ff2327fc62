use na::{DMatrix, DVector, Matrix3xX, UnitQuaternion, Vector3};

use crate::{error::ModelError, types::Float, types::GeneralizedState};

/// A point fixed to a body, given in that body's frame.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyPoint {
    pub body: String,
    pub offset: Vector3<Float>,
}

impl BodyPoint {
    pub fn new(body: &str, offset: Vector3<Float>) -> Self {
        BodyPoint {
            body: body.to_string(),
            offset,
        }
    }
}

/// Position of a tracked point in world frame, its Jacobian J such that
/// p_dot = J v, and the bias term J_dot * v.
#[derive(Clone, Debug)]
pub struct PointKinematics {
    pub position: Vector3<Float>,
    pub jacobian: Matrix3xX<Float>,
    pub jdot_v: Vector3<Float>,
}

/// Orientation of a frame, its world-frame angular-velocity Jacobian J such
/// that ω = J v, and the bias term J_dot * v.
#[derive(Clone, Debug)]
pub struct FrameKinematics {
    pub orientation: UnitQuaternion<Float>,
    pub jacobian: Matrix3xX<Float>,
    pub jdot_v: Vector3<Float>,
}

/// Where a named joint lives in q and v.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JointIndex {
    pub position: usize,
    pub velocity: usize,
}

/// Closed kinematic loop constraints phi(q) = 0, differentiated twice:
///     J v_dot + J_dot v = 0
#[derive(Clone, Debug)]
pub struct LoopConstraints {
    pub jacobian: DMatrix<Float>,
    pub jdot_v: DVector<Float>,
}

impl LoopConstraints {
    pub fn rows(&self) -> usize {
        self.jacobian.nrows()
    }
}

/// Rigid-body dynamics evaluator for the controlled robot.
///
/// Uses the joint-space equations of motion
///     M(q) v_dot + c(q, v) = B u + J_c^T λ_c + J_h^T λ_h
/// where c is the 'dynamics bias term' (Coriolis, centrifugal and gravity).
pub trait DynamicsEvaluator {
    fn num_positions(&self) -> usize;

    fn num_velocities(&self) -> usize;

    fn num_actuators(&self) -> usize;

    /// Actuator-selection matrix B, of size nv x nu
    fn actuation_matrix(&self) -> DMatrix<Float>;

    /// Symmetric effort limits |u_i| <= limit_i, if the actuators have any.
    fn effort_limits(&self) -> Option<DVector<Float>> {
        None
    }

    fn has_body(&self, body: &str) -> bool;

    fn joint_index(&self, joint: &str) -> Option<JointIndex>;

    fn mass_matrix(&self, state: &GeneralizedState) -> Result<DMatrix<Float>, ModelError>;

    fn dynamics_bias(&self, state: &GeneralizedState) -> Result<DVector<Float>, ModelError>;

    fn center_of_mass(&self, state: &GeneralizedState) -> Result<PointKinematics, ModelError>;

    fn point(
        &self,
        state: &GeneralizedState,
        point: &BodyPoint,
    ) -> Result<PointKinematics, ModelError>;

    fn frame(&self, state: &GeneralizedState, body: &str) -> Result<FrameKinematics, ModelError>;

    /// Loop-closure constraints of the mechanism. Open chains have none.
    fn loop_constraints(
        &self,
        _state: &GeneralizedState,
    ) -> Result<Option<LoopConstraints>, ModelError> {
        Ok(None)
    }

    fn check_state(&self, state: &GeneralizedState) -> Result<(), ModelError> {
        let (nq, nv) = (self.num_positions(), self.num_velocities());
        if state.q.len() != nq || state.v.len() != nv {
            return Err(ModelError::StateDimension {
                nq,
                nv,
                got_nq: state.q.len(),
                got_nv: state.v.len(),
            });
        }
        Ok(())
    }
}
