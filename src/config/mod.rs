//! Controller configuration.
//!
//! Everything here is fixed once the controller is constructed. Settings
//! load from TOML with a default for every field; [`file`] describes whole
//! controllers (objectives and contacts included) in TOML.

pub mod file;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    contact::{ConeModel, ContactSet, Friction},
    error::ConfigError,
    qp::solver::SolverBudget,
    relaxation::ConstraintMode,
    tracking::TrackingObjective,
    types::Float,
};

pub use file::OscConfigFile;

/// What the controller emits when a tick cannot be solved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Repeat the last emitted command, or zeros if there is none yet.
    #[default]
    HoldPrevious,
    /// Command zero torque.
    Zero,
}

/// Numeric settings of the QP, shared by all objectives and contacts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OscSettings {
    /// w in w ‖v_dot‖², keeps the acceleration block strictly convex
    #[serde(default = "default_acceleration_regularization")]
    pub acceleration_regularization: Float,

    /// Extra w ‖v_dot_j‖² per named joint
    #[serde(default)]
    pub joint_acceleration_costs: BTreeMap<String, Float>,

    /// w in w ‖u‖², 0 disables
    #[serde(default)]
    pub input_regularization: Float,

    /// w in w ‖λ_contact‖², 0 disables
    #[serde(default)]
    pub contact_force_regularization: Float,

    /// How contact no-slip rows are imposed
    #[serde(default = "default_contact_mode")]
    pub contact_mode: ConstraintMode,

    /// How closed kinematic loop rows are imposed
    #[serde(default = "default_loop_mode")]
    pub loop_mode: ConstraintMode,

    /// Friction of contacts that do not set their own
    #[serde(default = "default_friction")]
    pub default_friction: Friction,

    /// Cone model of contacts that do not set their own
    #[serde(default)]
    pub default_cone: ConeModel,

    /// Lower bound on every active contact's normal force, in N
    #[serde(default)]
    pub min_normal_force: Float,

    #[serde(default)]
    pub solver: SolverBudget,

    #[serde(default)]
    pub fallback: FallbackPolicy,
}

fn default_acceleration_regularization() -> Float {
    1e-4
}

fn default_contact_mode() -> ConstraintMode {
    ConstraintMode::Soft { weight: 200. }
}

fn default_loop_mode() -> ConstraintMode {
    ConstraintMode::Hard
}

fn default_friction() -> Friction {
    Friction::Isotropic(0.4)
}

impl Default for OscSettings {
    fn default() -> Self {
        OscSettings {
            acceleration_regularization: default_acceleration_regularization(),
            joint_acceleration_costs: BTreeMap::new(),
            input_regularization: 0.,
            contact_force_regularization: 0.,
            contact_mode: default_contact_mode(),
            loop_mode: default_loop_mode(),
            default_friction: default_friction(),
            default_cone: ConeModel::default(),
            min_normal_force: 0.,
            solver: SolverBudget::default(),
            fallback: FallbackPolicy::default(),
        }
    }
}

impl OscSettings {
    /// Parse settings from a TOML string. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let settings: OscSettings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Model-independent checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.acceleration_regularization.is_finite() || self.acceleration_regularization <= 0. {
            return Err(invalid(
                "acceleration_regularization",
                "must be finite and > 0",
            ));
        }
        for (field, value) in [
            ("input_regularization", self.input_regularization),
            ("contact_force_regularization", self.contact_force_regularization),
            ("min_normal_force", self.min_normal_force),
        ] {
            if !value.is_finite() || value < 0. {
                return Err(invalid(field, "must be finite and >= 0"));
            }
        }
        for (joint, weight) in &self.joint_acceleration_costs {
            if !weight.is_finite() || *weight < 0. {
                return Err(invalid(
                    &format!("joint_acceleration_costs.{}", joint),
                    "must be finite and >= 0",
                ));
            }
        }
        self.contact_mode.validate("contact_mode")?;
        self.loop_mode.validate("loop_mode")?;
        self.default_friction.validate()?;
        self.default_cone.validate()?;
        if self.solver.max_iterations == 0 {
            return Err(invalid("solver.max_iterations", "must be > 0"));
        }
        if self.solver.time_limit.is_nan() || self.solver.time_limit <= 0. {
            return Err(invalid("solver.time_limit", "must be > 0"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Complete, immutable controller configuration, handed to
/// [`OscCore::new`](crate::osc::OscCore::new).
#[derive(Clone, Debug, Default)]
pub struct OscConfig {
    pub settings: OscSettings,
    pub objectives: Vec<TrackingObjective>,
    pub contacts: ContactSet,
}

impl OscConfig {
    pub fn new(settings: OscSettings) -> Self {
        OscConfig {
            settings,
            objectives: vec![],
            contacts: ContactSet::new(),
        }
    }

    pub fn with_objective(mut self, objective: TrackingObjective) -> Self {
        self.objectives.push(objective);
        self
    }

    pub fn with_contacts(mut self, contacts: ContactSet) -> Self {
        self.contacts = contacts;
        self
    }
}
