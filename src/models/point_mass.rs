use na::{DMatrix, DVector, Matrix3xX, UnitQuaternion, Vector3};

use crate::{
    dynamics::{BodyPoint, DynamicsEvaluator, FrameKinematics, JointIndex, PointKinematics},
    error::ModelError,
    types::{Float, GeneralizedState},
};

/// A single unactuated point mass moving in 3D under gravity.
/// q = [x, y, z], v = [vx, vy, vz].
///
/// All points of the body coincide with the mass, so every contact Jacobian
/// is the identity. Useful as the simplest robot the controller can balance.
pub struct PointMassModel {
    pub body: String,
    pub mass: Float,
    pub gravity: Float,
}

impl PointMassModel {
    pub fn new(mass: Float, gravity: Float) -> Self {
        PointMassModel {
            body: "body".to_string(),
            mass,
            gravity,
        }
    }

    /// Semi-implicit Euler step
    pub fn integrate(
        &self,
        state: &GeneralizedState,
        v_dot: &DVector<Float>,
        dt: Float,
    ) -> GeneralizedState {
        let v = &state.v + v_dot * dt;
        let q = &state.q + &v * dt;
        GeneralizedState { q, v }
    }

    fn kinematics(&self, state: &GeneralizedState) -> Result<PointKinematics, ModelError> {
        self.check_state(state)?;
        Ok(PointKinematics {
            position: Vector3::new(state.q[0], state.q[1], state.q[2]),
            jacobian: Matrix3xX::identity(3),
            jdot_v: Vector3::zeros(),
        })
    }
}

impl DynamicsEvaluator for PointMassModel {
    fn num_positions(&self) -> usize {
        3
    }

    fn num_velocities(&self) -> usize {
        3
    }

    fn num_actuators(&self) -> usize {
        0
    }

    fn actuation_matrix(&self) -> DMatrix<Float> {
        DMatrix::zeros(3, 0)
    }

    fn has_body(&self, body: &str) -> bool {
        body == self.body
    }

    fn joint_index(&self, _joint: &str) -> Option<JointIndex> {
        None
    }

    fn mass_matrix(&self, state: &GeneralizedState) -> Result<DMatrix<Float>, ModelError> {
        self.check_state(state)?;
        Ok(DMatrix::identity(3, 3) * self.mass)
    }

    fn dynamics_bias(&self, state: &GeneralizedState) -> Result<DVector<Float>, ModelError> {
        self.check_state(state)?;
        Ok(DVector::from_column_slice(&[
            0.,
            0.,
            self.mass * self.gravity,
        ]))
    }

    fn center_of_mass(&self, state: &GeneralizedState) -> Result<PointKinematics, ModelError> {
        self.kinematics(state)
    }

    fn point(
        &self,
        state: &GeneralizedState,
        point: &BodyPoint,
    ) -> Result<PointKinematics, ModelError> {
        if !self.has_body(&point.body) {
            return Err(ModelError::UnknownBody(point.body.clone()));
        }
        self.kinematics(state)
    }

    fn frame(&self, state: &GeneralizedState, body: &str) -> Result<FrameKinematics, ModelError> {
        if !self.has_body(body) {
            return Err(ModelError::UnknownBody(body.to_string()));
        }
        self.check_state(state)?;
        // A point has no orientation to steer
        Ok(FrameKinematics {
            orientation: UnitQuaternion::identity(),
            jacobian: Matrix3xX::zeros(3),
            jdot_v: Vector3::zeros(),
        })
    }
}
