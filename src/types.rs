use std::fmt;

use na::DVector;
use serde::{Deserialize, Serialize};

pub type Float = f64;

/// Generalized position q and velocity v of the robot, as reported by the
/// state estimator for one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneralizedState {
    pub q: DVector<Float>,
    pub v: DVector<Float>,
}

impl GeneralizedState {
    pub fn new(q: DVector<Float>, v: DVector<Float>) -> Self {
        GeneralizedState { q, v }
    }

    pub fn is_finite(&self) -> bool {
        self.q.iter().chain(self.v.iter()).all(|x| x.is_finite())
    }
}

/// Discrete stance-pattern label emitted by the gait state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseId(pub u32);

impl PhaseId {
    pub const LEFT_STANCE: PhaseId = PhaseId(0);
    pub const RIGHT_STANCE: PhaseId = PhaseId(1);
    pub const DOUBLE_STANCE: PhaseId = PhaseId(2);
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PhaseId::LEFT_STANCE => write!(f, "left_stance"),
            PhaseId::RIGHT_STANCE => write!(f, "right_stance"),
            PhaseId::DOUBLE_STANCE => write!(f, "double_stance"),
            PhaseId(id) => write!(f, "phase_{}", id),
        }
    }
}

/// Current gait phase, and the time at which the state machine last switched
/// into it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaitPhase {
    pub id: PhaseId,
    pub transition_time: Float,
}

impl GaitPhase {
    pub fn new(id: PhaseId, transition_time: Float) -> Self {
        GaitPhase {
            id,
            transition_time,
        }
    }

    /// Time elapsed since the last phase transition.
    pub fn time_in_phase(&self, time: Float) -> Float {
        time - self.transition_time
    }
}

/// One sample of a desired trajectory at the current time: value, first and
/// second time derivative.
///
/// For orientation targets, `value` is a unit quaternion stored as
/// [w, x, y, z], and `dot`/`ddot` are the angular velocity and acceleration in
/// world frame.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectorySample {
    pub value: DVector<Float>,
    pub dot: DVector<Float>,
    pub ddot: DVector<Float>,
}

impl TrajectorySample {
    pub fn new(value: DVector<Float>, dot: DVector<Float>, ddot: DVector<Float>) -> Self {
        TrajectorySample { value, dot, ddot }
    }

    /// A sample holding `value` with zero derivatives.
    pub fn stationary(value: DVector<Float>, derivative_dim: usize) -> Self {
        TrajectorySample {
            value,
            dot: DVector::zeros(derivative_dim),
            ddot: DVector::zeros(derivative_dim),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.value
            .iter()
            .chain(self.dot.iter())
            .chain(self.ddot.iter())
            .all(|x| x.is_finite())
    }
}
