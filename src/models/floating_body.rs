use na::{
    DMatrix, DVector, Matrix3, Matrix3xX, Quaternion, UnitQuaternion, Vector3,
};

use crate::{
    dynamics::{
        BodyPoint, DynamicsEvaluator, FrameKinematics, JointIndex, LoopConstraints,
        PointKinematics,
    },
    error::ModelError,
    types::{Float, GeneralizedState},
    util::skew_symmetric,
};

/// Rotor joint carried by the floating body. Its inertia is decoupled from
/// the base, i.e. it only contributes a diagonal entry to the mass matrix.
#[derive(Clone, Debug)]
pub struct RotorJoint {
    pub name: String,
    pub inertia: Float,
}

/// A floating rigid body with its center of mass at the body origin,
/// optionally carrying decoupled actuated rotor joints.
///
/// q = [p (3), quaternion w, x, y, z (4), joint angles]
/// v = [p_dot (3), ω (3), joint rates]
/// The angular velocity ω is expressed in world frame.
pub struct FloatingBodyModel {
    pub body: String,
    pub mass: Float,
    /// Rotational inertia about the center of mass, in body frame
    pub inertia: Matrix3<Float>,
    pub gravity: Float,
    base_actuated: bool,
    joints: Vec<RotorJoint>,
    effort_limit: Option<Float>,
    loop_constraints: Option<LoopConstraints>,
}

impl FloatingBodyModel {
    pub fn new(body: &str, mass: Float, inertia: Matrix3<Float>, gravity: Float) -> Self {
        FloatingBodyModel {
            body: body.to_string(),
            mass,
            inertia,
            gravity,
            base_actuated: false,
            joints: vec![],
            effort_limit: None,
            loop_constraints: None,
        }
    }

    /// Box-shaped body of the given dimensions.
    pub fn cuboid(body: &str, mass: Float, dims: Vector3<Float>, gravity: Float) -> Self {
        let (a, b, c) = (dims.x, dims.y, dims.z);
        let inertia = Matrix3::from_diagonal(&Vector3::new(
            mass / 12. * (b * b + c * c),
            mass / 12. * (a * a + c * c),
            mass / 12. * (a * a + b * b),
        ));
        FloatingBodyModel::new(body, mass, inertia, gravity)
    }

    /// Puts a full 6-DOF wrench actuator on the base.
    pub fn with_base_actuation(mut self) -> Self {
        self.base_actuated = true;
        self
    }

    pub fn with_joint(mut self, name: &str, inertia: Float) -> Self {
        self.joints.push(RotorJoint {
            name: name.to_string(),
            inertia,
        });
        self
    }

    pub fn with_effort_limit(mut self, limit: Float) -> Self {
        self.effort_limit = Some(limit);
        self
    }

    /// Constant loop-closure rows J v_dot + jdot_v = 0 over the velocity vector.
    pub fn with_loop_constraints(
        mut self,
        jacobian: DMatrix<Float>,
        jdot_v: DVector<Float>,
    ) -> Self {
        self.loop_constraints = Some(LoopConstraints { jacobian, jdot_v });
        self
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Standing state at the given base position and orientation, at rest.
    pub fn rest_state(
        &self,
        position: Vector3<Float>,
        orientation: UnitQuaternion<Float>,
    ) -> GeneralizedState {
        let mut q = DVector::zeros(self.num_positions());
        q.fixed_rows_mut::<3>(0).copy_from(&position);
        q[3] = orientation.w;
        q[4] = orientation.i;
        q[5] = orientation.j;
        q[6] = orientation.k;
        GeneralizedState {
            q,
            v: DVector::zeros(self.num_velocities()),
        }
    }

    pub fn orientation(&self, state: &GeneralizedState) -> UnitQuaternion<Float> {
        UnitQuaternion::from_quaternion(Quaternion::new(
            state.q[3], state.q[4], state.q[5], state.q[6],
        ))
    }

    fn angular_velocity(&self, state: &GeneralizedState) -> Vector3<Float> {
        state.v.fixed_rows::<3>(3).into()
    }

    fn world_inertia(&self, state: &GeneralizedState) -> Matrix3<Float> {
        let R = self.orientation(state).to_rotation_matrix();
        R.matrix() * self.inertia * R.matrix().transpose()
    }

    /// Semi-implicit Euler step. The orientation is advanced by the
    /// exponential map of the world-frame angular velocity.
    pub fn integrate(
        &self,
        state: &GeneralizedState,
        v_dot: &DVector<Float>,
        dt: Float,
    ) -> GeneralizedState {
        let v = &state.v + v_dot * dt;

        let mut q = state.q.clone();
        let p_dot: Vector3<Float> = v.fixed_rows::<3>(0).into();
        let omega: Vector3<Float> = v.fixed_rows::<3>(3).into();
        let p = Vector3::new(q[0], q[1], q[2]) + p_dot * dt;
        q.fixed_rows_mut::<3>(0).copy_from(&p);

        let orientation = UnitQuaternion::from_scaled_axis(omega * dt) * self.orientation(state);
        q[3] = orientation.w;
        q[4] = orientation.i;
        q[5] = orientation.j;
        q[6] = orientation.k;

        for k in 0..self.joints.len() {
            q[7 + k] += v[6 + k] * dt;
        }
        GeneralizedState { q, v }
    }

    fn check_body(&self, body: &str) -> Result<(), ModelError> {
        if !self.has_body(body) {
            return Err(ModelError::UnknownBody(body.to_string()));
        }
        Ok(())
    }
}

impl DynamicsEvaluator for FloatingBodyModel {
    fn num_positions(&self) -> usize {
        7 + self.joints.len()
    }

    fn num_velocities(&self) -> usize {
        6 + self.joints.len()
    }

    fn num_actuators(&self) -> usize {
        let base = if self.base_actuated { 6 } else { 0 };
        base + self.joints.len()
    }

    fn actuation_matrix(&self) -> DMatrix<Float> {
        let nv = self.num_velocities();
        let nu = self.num_actuators();
        let mut B = DMatrix::zeros(nv, nu);
        let first_joint_column = if self.base_actuated {
            B.view_mut((0, 0), (6, 6))
                .copy_from(&DMatrix::identity(6, 6));
            6
        } else {
            0
        };
        for k in 0..self.joints.len() {
            B[(6 + k, first_joint_column + k)] = 1.;
        }
        B
    }

    fn effort_limits(&self) -> Option<DVector<Float>> {
        self.effort_limit
            .map(|limit| DVector::from_element(self.num_actuators(), limit))
    }

    fn has_body(&self, body: &str) -> bool {
        body == self.body
    }

    fn joint_index(&self, joint: &str) -> Option<JointIndex> {
        self.joints
            .iter()
            .position(|j| j.name == joint)
            .map(|k| JointIndex {
                position: 7 + k,
                velocity: 6 + k,
            })
    }

    fn mass_matrix(&self, state: &GeneralizedState) -> Result<DMatrix<Float>, ModelError> {
        self.check_state(state)?;
        let nv = self.num_velocities();
        let mut M = DMatrix::zeros(nv, nv);
        M.view_mut((0, 0), (3, 3))
            .copy_from(&(Matrix3::identity() * self.mass));
        M.view_mut((3, 3), (3, 3))
            .copy_from(&self.world_inertia(state));
        for (k, joint) in self.joints.iter().enumerate() {
            M[(6 + k, 6 + k)] = joint.inertia;
        }
        Ok(M)
    }

    fn dynamics_bias(&self, state: &GeneralizedState) -> Result<DVector<Float>, ModelError> {
        self.check_state(state)?;
        let mut c = DVector::zeros(self.num_velocities());
        c[2] = self.mass * self.gravity;

        // Gyroscopic term ω x (I ω), with I expressed in world frame
        let omega = self.angular_velocity(state);
        let gyroscopic = omega.cross(&(self.world_inertia(state) * omega));
        c.fixed_rows_mut::<3>(3).copy_from(&gyroscopic);
        Ok(c)
    }

    fn center_of_mass(&self, state: &GeneralizedState) -> Result<PointKinematics, ModelError> {
        self.check_state(state)?;
        let mut jacobian = Matrix3xX::zeros(self.num_velocities());
        jacobian
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&Matrix3::identity());
        Ok(PointKinematics {
            position: Vector3::new(state.q[0], state.q[1], state.q[2]),
            jacobian,
            jdot_v: Vector3::zeros(),
        })
    }

    fn point(
        &self,
        state: &GeneralizedState,
        point: &BodyPoint,
    ) -> Result<PointKinematics, ModelError> {
        self.check_body(&point.body)?;
        self.check_state(state)?;

        let r = self.orientation(state) * point.offset;
        let omega = self.angular_velocity(state);

        // p_dot = v_base + ω x r = v_base - [r]x ω
        let mut jacobian = Matrix3xX::zeros(self.num_velocities());
        jacobian
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&Matrix3::identity());
        jacobian
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&-skew_symmetric(&r));

        Ok(PointKinematics {
            position: Vector3::new(state.q[0], state.q[1], state.q[2]) + r,
            jacobian,
            jdot_v: omega.cross(&omega.cross(&r)),
        })
    }

    fn frame(&self, state: &GeneralizedState, body: &str) -> Result<FrameKinematics, ModelError> {
        self.check_body(body)?;
        self.check_state(state)?;
        let mut jacobian = Matrix3xX::zeros(self.num_velocities());
        jacobian
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&Matrix3::identity());
        Ok(FrameKinematics {
            orientation: self.orientation(state),
            jacobian,
            jdot_v: Vector3::zeros(),
        })
    }

    fn loop_constraints(
        &self,
        state: &GeneralizedState,
    ) -> Result<Option<LoopConstraints>, ModelError> {
        self.check_state(state)?;
        Ok(self.loop_constraints.clone())
    }
}

#[cfg(test)]
mod floating_body_tests {
    use na::{vector, UnitQuaternion, Vector3};

    use super::*;
    use crate::{assert_close, assert_vec_close, GRAVITY, PI};

    fn model() -> FloatingBodyModel {
        FloatingBodyModel::cuboid("pelvis", 10., vector![0.4, 0.3, 0.2], GRAVITY)
            .with_joint("hip_left", 0.05)
            .with_joint("hip_right", 0.05)
    }

    #[test]
    fn point_jacobian_matches_finite_difference() {
        // Arrange
        let model = model();
        let mut state = model.rest_state(
            vector![0.1, -0.2, 0.9],
            UnitQuaternion::from_euler_angles(0.2, -0.1, PI / 3.),
        );
        state.v = na::dvector![0.3, -0.1, 0.2, 0.5, -0.4, 1.2, 0.7, -0.7];
        let point = BodyPoint::new("pelvis", vector![0.2, 0.15, -0.1]);

        // Act
        let kin = model.point(&state, &point).unwrap();
        let dt = 1e-6;
        let zero_accel = DVector::zeros(model.num_velocities());
        let next = model.integrate(&state, &zero_accel, dt);
        let next_kin = model.point(&next, &point).unwrap();

        // Assert
        let fd_velocity = (next_kin.position - kin.position) / dt;
        assert_vec_close!(kin.jacobian * &state.v, fd_velocity, 1e-4);
    }

    #[test]
    fn actuation_matrix_selects_joints() {
        let model = model();
        let B = model.actuation_matrix();
        assert_eq!(B.shape(), (8, 2));
        assert_close!(B[(6, 0)], 1., 0.);
        assert_close!(B[(7, 1)], 1., 0.);
        assert_close!(B.rows(0, 6).amax(), 0., 0.);

        let actuated = FloatingBodyModel::cuboid("pelvis", 1., vector![1., 1., 1.], GRAVITY)
            .with_base_actuation();
        assert_eq!(actuated.actuation_matrix(), DMatrix::identity(6, 6));
    }

    #[test]
    fn torque_free_spin_about_principal_axis() {
        // Spinning about a principal axis has no gyroscopic torque
        let model = model();
        let mut state = model.rest_state(Vector3::zeros(), UnitQuaternion::identity());
        state.v[5] = 3.0;

        let c = model.dynamics_bias(&state).unwrap();
        assert_close!(c[2], 10. * GRAVITY, 1e-12);
        assert_vec_close!(c.rows(3, 3), vector![0., 0., 0.], 1e-12);
    }

    #[test]
    fn joint_indices() {
        let model = model();
        let idx = model.joint_index("hip_right").unwrap();
        assert_eq!(idx, JointIndex { position: 8, velocity: 7 });
        assert!(model.joint_index("knee").is_none());
    }
}
