use std::collections::BTreeMap;

use na::{DMatrix, DVector, Matrix3xX, Vector3};

use super::{
    binding::{ActiveWindow, PhaseBinding},
    gains::{validate_psd, FeedbackGains},
    rotation::{orientation_error, quaternion_from_sample},
};
use crate::{
    dynamics::{BodyPoint, DynamicsEvaluator},
    error::{ConfigError, InputError, ModelError, OscError},
    types::{Float, GeneralizedState, PhaseId, TrajectorySample},
};

/// The quantity an objective tracks, and what it is bound to in each phase.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectiveKind {
    /// Whole-body center of mass, in world frame.
    CenterOfMass(PhaseBinding<()>),
    /// A point fixed to a body, in world frame.
    TranslationalPoint(PhaseBinding<BodyPoint>),
    /// Orientation of a body frame. See [`orientation_error`].
    RotationalFrame(PhaseBinding<String>),
    /// A single joint coordinate.
    JointSpace(PhaseBinding<String>),
}

impl ObjectiveKind {
    /// Dimension of the task-space velocity/acceleration.
    pub fn dim(&self) -> usize {
        match self {
            ObjectiveKind::JointSpace(_) => 1,
            _ => 3,
        }
    }

    /// Length of the desired `value` in a trajectory sample.
    pub fn value_dim(&self) -> usize {
        match self {
            ObjectiveKind::RotationalFrame(_) => 4,
            _ => self.dim(),
        }
    }

    fn resolve(&self, phase: PhaseId) -> Option<ResolvedTarget<'_>> {
        match self {
            ObjectiveKind::CenterOfMass(b) => {
                b.resolve(phase).map(|_| ResolvedTarget::CenterOfMass)
            }
            ObjectiveKind::TranslationalPoint(b) => b.resolve(phase).map(ResolvedTarget::Point),
            ObjectiveKind::RotationalFrame(b) => {
                b.resolve(phase).map(|body| ResolvedTarget::Frame(body.as_str()))
            }
            ObjectiveKind::JointSpace(b) => {
                b.resolve(phase).map(|joint| ResolvedTarget::Joint(joint.as_str()))
            }
        }
    }
}

/// Concrete physical target of an objective for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResolvedTarget<'a> {
    CenterOfMass,
    Point(&'a BodyPoint),
    Frame(&'a str),
    Joint(&'a str),
}

/// Where the desired trajectory of an objective comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum DesiredSource {
    /// A sample keyed by the objective name is supplied with every tick.
    Trajectory,
    /// A fixed target configured at startup.
    Constant(TrajectorySample),
}

/// One unit of task-space tracking.
///
/// Computes the commanded task acceleration
///     ddy_cmd = ddy_des + Kd (dy_des - dy) + Kp (y_des - y)
/// together with the task map ddy = J v_dot + J_dot v, and contributes
///     W ‖J v_dot + J_dot v - ddy_cmd‖²
/// to the QP cost.
///
/// Configuration is checked once here: gains and weight must be finite,
/// symmetric, positive semi-definite and of the task dimension. A zero weight
/// is allowed and makes the objective inert.
#[derive(Clone, Debug)]
pub struct TrackingObjective {
    name: String,
    kind: ObjectiveKind,
    gains: FeedbackGains,
    weight: DMatrix<Float>,
    phase_scales: BTreeMap<PhaseId, Float>,
    window: Option<ActiveWindow>,
    source: DesiredSource,
}

impl TrackingObjective {
    pub fn new(
        name: &str,
        kind: ObjectiveKind,
        gains: FeedbackGains,
        weight: DMatrix<Float>,
    ) -> Result<Self, ConfigError> {
        let dim = kind.dim();
        gains.validate(name, dim)?;
        validate_psd(name, "weight", &weight, dim)?;
        Ok(TrackingObjective {
            name: name.to_string(),
            kind,
            gains,
            weight,
            phase_scales: BTreeMap::new(),
            window: None,
            source: DesiredSource::Trajectory,
        })
    }

    pub fn center_of_mass(
        name: &str,
        gains: FeedbackGains,
        weight: DMatrix<Float>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            name,
            ObjectiveKind::CenterOfMass(PhaseBinding::Always(())),
            gains,
            weight,
        )
    }

    pub fn translational_point(
        name: &str,
        binding: PhaseBinding<BodyPoint>,
        gains: FeedbackGains,
        weight: DMatrix<Float>,
    ) -> Result<Self, ConfigError> {
        Self::new(name, ObjectiveKind::TranslationalPoint(binding), gains, weight)
    }

    pub fn rotational_frame(
        name: &str,
        binding: PhaseBinding<String>,
        gains: FeedbackGains,
        weight: DMatrix<Float>,
    ) -> Result<Self, ConfigError> {
        Self::new(name, ObjectiveKind::RotationalFrame(binding), gains, weight)
    }

    pub fn joint_space(
        name: &str,
        binding: PhaseBinding<String>,
        gains: FeedbackGains,
        weight: DMatrix<Float>,
    ) -> Result<Self, ConfigError> {
        Self::new(name, ObjectiveKind::JointSpace(binding), gains, weight)
    }

    /// Track a fixed target instead of a per-tick trajectory sample.
    pub fn with_constant_target(mut self, sample: TrajectorySample) -> Result<Self, ConfigError> {
        self.check_dimensions(&sample).map_err(|e| match e {
            InputError::SampleDimension {
                field,
                expected,
                got,
                ..
            } => ConfigError::DimensionMismatch {
                what: format!("constant target {} of objective '{}'", field, self.name),
                expected,
                got,
            },
            other => ConfigError::InvalidValue {
                field: format!("constant target of objective '{}'", self.name),
                message: other.to_string(),
            },
        })?;
        self.source = DesiredSource::Constant(sample);
        Ok(self)
    }

    /// Only track while the time since the last phase transition is within
    /// [start, end].
    pub fn with_window(mut self, start: Float, end: Float) -> Result<Self, ConfigError> {
        if !start.is_finite() || !end.is_finite() || start > end {
            return Err(ConfigError::InvalidValue {
                field: format!("window of objective '{}'", self.name),
                message: format!("[{}, {}] is not a valid interval", start, end),
            });
        }
        self.window = Some(ActiveWindow { start, end });
        Ok(self)
    }

    /// Scale the weight by `scale` in the given phase.
    pub fn with_phase_scale(mut self, phase: PhaseId, scale: Float) -> Result<Self, ConfigError> {
        if !scale.is_finite() || scale < 0. {
            return Err(ConfigError::InvalidValue {
                field: format!("phase scale of objective '{}'", self.name),
                message: format!("{} must be finite and >= 0", scale),
            });
        }
        self.phase_scales.insert(phase, scale);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ObjectiveKind {
        &self.kind
    }

    pub fn gains(&self) -> &FeedbackGains {
        &self.gains
    }

    pub fn weight(&self) -> &DMatrix<Float> {
        &self.weight
    }

    pub fn window(&self) -> Option<ActiveWindow> {
        self.window
    }

    pub fn source(&self) -> &DesiredSource {
        &self.source
    }

    pub fn dim(&self) -> usize {
        self.kind.dim()
    }

    /// Weight in effect during `phase`.
    pub fn effective_weight(&self, phase: PhaseId) -> DMatrix<Float> {
        match self.phase_scales.get(&phase) {
            Some(scale) => &self.weight * *scale,
            None => self.weight.clone(),
        }
    }

    /// What this objective tracks right now, if anything.
    pub fn active_target(
        &self,
        phase: PhaseId,
        time_in_phase: Float,
    ) -> Option<ResolvedTarget<'_>> {
        if let Some(window) = self.window {
            if !window.contains(time_in_phase) {
                return None;
            }
        }
        self.kind.resolve(phase)
    }

    /// Check every body and joint this objective may bind to.
    pub fn validate_against(&self, model: &dyn DynamicsEvaluator) -> Result<(), ConfigError> {
        match &self.kind {
            ObjectiveKind::CenterOfMass(_) => Ok(()),
            ObjectiveKind::TranslationalPoint(b) => b.targets().try_for_each(|point| {
                if model.has_body(&point.body) {
                    Ok(())
                } else {
                    Err(ConfigError::UnknownBody(point.body.clone()))
                }
            }),
            ObjectiveKind::RotationalFrame(b) => b.targets().try_for_each(|body| {
                if model.has_body(body) {
                    Ok(())
                } else {
                    Err(ConfigError::UnknownBody(body.clone()))
                }
            }),
            ObjectiveKind::JointSpace(b) => b.targets().try_for_each(|joint| {
                match model.joint_index(joint) {
                    Some(_) => Ok(()),
                    None => Err(ConfigError::UnknownJoint(joint.clone())),
                }
            }),
        }
    }

    fn check_dimensions(&self, sample: &TrajectorySample) -> Result<(), InputError> {
        let dim = self.kind.dim();
        for (field, expected, got) in [
            ("value", self.kind.value_dim(), sample.value.len()),
            ("dot", dim, sample.dot.len()),
            ("ddot", dim, sample.ddot.len()),
        ] {
            if expected != got {
                return Err(InputError::SampleDimension {
                    objective: self.name.clone(),
                    field,
                    expected,
                    got,
                });
            }
        }
        if !sample.is_finite() {
            return Err(InputError::NonFinite("trajectory sample"));
        }
        if let ObjectiveKind::RotationalFrame(_) = self.kind {
            if quaternion_from_sample(&sample.value).is_none() {
                return Err(InputError::NonFinite("desired orientation"));
            }
        }
        Ok(())
    }

    /// Task term of this objective for one tick, or None if it is inactive in
    /// this phase or outside its window.
    ///
    /// `sample` is only consulted for trajectory-driven objectives.
    pub fn evaluate(
        &self,
        model: &dyn DynamicsEvaluator,
        state: &GeneralizedState,
        phase: PhaseId,
        time_in_phase: Float,
        sample: Option<&TrajectorySample>,
    ) -> Result<Option<TaskTerm>, OscError> {
        let Some(target) = self.active_target(phase, time_in_phase) else {
            return Ok(None);
        };
        let sample = match &self.source {
            DesiredSource::Constant(constant) => constant,
            DesiredSource::Trajectory => {
                sample.ok_or_else(|| InputError::MissingSample(self.name.clone()))?
            }
        };
        self.check_dimensions(sample)?;

        let nv = model.num_velocities();
        let (jacobian, jdot_v, error) = match target {
            ResolvedTarget::CenterOfMass => {
                let kin = model.center_of_mass(state)?;
                let error = vector3_from(&sample.value) - kin.position;
                (self.task_jacobian(&kin.jacobian, nv)?, kin.jdot_v, error)
            }
            ResolvedTarget::Point(point) => {
                let kin = model.point(state, point)?;
                let error = vector3_from(&sample.value) - kin.position;
                (self.task_jacobian(&kin.jacobian, nv)?, kin.jdot_v, error)
            }
            ResolvedTarget::Frame(body) => {
                let kin = model.frame(state, body)?;
                let desired = quaternion_from_sample(&sample.value)
                    .ok_or(InputError::NonFinite("desired orientation"))?;
                let error = orientation_error(&desired, &kin.orientation);
                (self.task_jacobian(&kin.jacobian, nv)?, kin.jdot_v, error)
            }
            ResolvedTarget::Joint(joint) => {
                let index = model
                    .joint_index(joint)
                    .ok_or_else(|| ModelError::UnknownJoint(joint.to_string()))?;
                let mut jacobian = DMatrix::zeros(1, nv);
                jacobian[(0, index.velocity)] = 1.;
                let error = DVector::from_element(1, sample.value[0] - state.q[index.position]);
                let jdot_v = DVector::zeros(1);
                return Ok(Some(self.term(phase, jacobian, jdot_v, error, state, sample)));
            }
        };
        let jdot_v = DVector::from_column_slice(jdot_v.as_slice());
        let error = DVector::from_column_slice(error.as_slice());
        Ok(Some(self.term(phase, jacobian, jdot_v, error, state, sample)))
    }

    fn task_jacobian(
        &self,
        jacobian: &Matrix3xX<Float>,
        nv: usize,
    ) -> Result<DMatrix<Float>, ModelError> {
        if jacobian.ncols() != nv {
            return Err(ModelError::JacobianColumns {
                what: format!("jacobian of objective '{}'", self.name),
                expected: nv,
                got: jacobian.ncols(),
            });
        }
        Ok(DMatrix::from_column_slice(3, nv, jacobian.as_slice()))
    }

    fn term(
        &self,
        phase: PhaseId,
        jacobian: DMatrix<Float>,
        jdot_v: DVector<Float>,
        error: DVector<Float>,
        state: &GeneralizedState,
        sample: &TrajectorySample,
    ) -> TaskTerm {
        let velocity = &jacobian * &state.v;
        let ddy_cmd = &sample.ddot
            + &self.gains.kd * (&sample.dot - velocity)
            + &self.gains.kp * &error;
        TaskTerm {
            name: self.name.clone(),
            jacobian,
            jdot_v,
            ddy_cmd,
            weight: self.effective_weight(phase),
            error,
        }
    }
}

fn vector3_from(value: &DVector<Float>) -> Vector3<Float> {
    Vector3::new(value[0], value[1], value[2])
}

/// Acceleration-space cost term of one active objective for one tick.
#[derive(Clone, Debug)]
pub struct TaskTerm {
    pub name: String,
    pub jacobian: DMatrix<Float>,
    pub jdot_v: DVector<Float>,
    pub ddy_cmd: DVector<Float>,
    pub weight: DMatrix<Float>,
    /// Position-level tracking error y_des - y
    pub error: DVector<Float>,
}

impl TaskTerm {
    /// Adds W ‖J v_dot + J_dot v - ddy_cmd‖² to the cost ½ xᵀPx + qᵀx,
    /// dropping the constant. v_dot is the leading block of x.
    pub fn add_cost(&self, P: &mut DMatrix<Float>, q: &mut DVector<Float>) {
        let nv = self.jacobian.ncols();
        let JtW = self.jacobian.tr_mul(&self.weight);
        let residual = &self.jdot_v - &self.ddy_cmd;

        let mut P_vv = P.view_mut((0, 0), (nv, nv));
        P_vv += (&JtW * &self.jacobian).scale(2.);

        let mut q_v = q.rows_mut(0, nv);
        q_v += (&JtW * residual).scale(2.);
    }
}
