//! TOML description of a whole controller.
//!
//! ```toml
//! [settings]
//! min_normal_force = 20.0
//!
//! [[objectives]]
//! name = "com"
//! kind = "center_of_mass"
//! kp = 100.0                    # scalar, diagonal list or nested rows
//! kd = 10.0
//! weight = [2.0, 2.0, 2000.0]
//! phase_scales = { double_stance = 0.5 }
//!
//! [[objectives]]
//! name = "swing_foot"
//! kind = "translational_point"
//! kp = 100.0
//! kd = 10.0
//! weight = 1.0
//! phases.left_stance = { body = "pelvis", offset = [0.0, -0.1, -0.5] }
//! phases.right_stance = { body = "pelvis", offset = [0.0, 0.1, -0.5] }
//!
//! [[contacts]]
//! name = "toe_left"
//! body = "pelvis"
//! offset = [0.1, 0.1, -0.5]
//! phases = ["left_stance", "double_stance"]
//! friction = 0.6
//! ```
//!
//! Phases are named `left_stance`, `right_stance`, `double_stance` or given
//! by their numeric id.

use std::{collections::BTreeMap, path::Path};

use na::{DMatrix, DVector, Vector3};
use serde::Deserialize;

use super::{OscConfig, OscSettings};
use crate::{
    contact::{ConeModel, ContactPoint, ContactSet, Friction},
    dynamics::BodyPoint,
    error::ConfigError,
    tracking::{FeedbackGains, ObjectiveKind, PhaseBinding, TrackingObjective},
    types::{Float, PhaseId, TrajectorySample},
};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OscConfigFile {
    #[serde(default)]
    pub settings: OscSettings,
    #[serde(default)]
    pub objectives: Vec<ObjectiveSpec>,
    #[serde(default)]
    pub contacts: Vec<ContactSpec>,
}

/// A gain or weight matrix: `2.0` is 2 I, `[1.0, 2.0, 3.0]` a diagonal,
/// `[[..], [..], [..]]` a full matrix given row by row.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MatrixSpec {
    Scalar(Float),
    Diagonal(Vec<Float>),
    Full(Vec<Vec<Float>>),
}

impl MatrixSpec {
    pub fn to_matrix(&self, dim: usize, what: &str) -> Result<DMatrix<Float>, ConfigError> {
        let mismatch = |got| ConfigError::DimensionMismatch {
            what: what.to_string(),
            expected: dim,
            got,
        };
        match self {
            MatrixSpec::Scalar(s) => Ok(DMatrix::identity(dim, dim) * *s),
            MatrixSpec::Diagonal(d) => {
                if d.len() != dim {
                    return Err(mismatch(d.len()));
                }
                Ok(DMatrix::from_diagonal(&DVector::from_column_slice(d)))
            }
            MatrixSpec::Full(rows) => {
                if rows.len() != dim {
                    return Err(mismatch(rows.len()));
                }
                if let Some(row) = rows.iter().find(|r| r.len() != dim) {
                    return Err(mismatch(row.len()));
                }
                Ok(DMatrix::from_fn(dim, dim, |i, j| rows[i][j]))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKindSpec {
    CenterOfMass,
    TranslationalPoint,
    RotationalFrame,
    JointSpace,
}

/// What an objective is bound to: a body point, a body frame or a joint,
/// depending on the objective kind.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TargetSpec {
    pub body: Option<String>,
    pub offset: Option<[Float; 3]>,
    pub joint: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ConstantSpec {
    pub value: Vec<Float>,
    pub dot: Option<Vec<Float>>,
    pub ddot: Option<Vec<Float>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ObjectiveSpec {
    pub name: String,
    pub kind: ObjectiveKindSpec,
    pub kp: MatrixSpec,
    pub kd: MatrixSpec,
    pub weight: MatrixSpec,
    /// Target in every phase
    pub target: Option<TargetSpec>,
    /// Target per phase, keyed by phase. Exclusive with `target`.
    #[serde(default)]
    pub phases: BTreeMap<String, TargetSpec>,
    /// [start, end] in seconds since the last phase transition
    pub window: Option<[Float; 2]>,
    #[serde(default)]
    pub phase_scales: BTreeMap<String, Float>,
    pub constant: Option<ConstantSpec>,
}

/// Phase given by id or by name.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PhaseKey {
    Id(u32),
    Name(String),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ContactSpec {
    pub name: String,
    pub body: String,
    pub offset: [Float; 3],
    pub phases: Vec<PhaseKey>,
    pub normal: Option<[Float; 3]>,
    pub friction: Option<Friction>,
    pub cone: Option<ConeModel>,
}

pub fn parse_phase(key: &str) -> Result<PhaseId, ConfigError> {
    match key {
        "left_stance" => Ok(PhaseId::LEFT_STANCE),
        "right_stance" => Ok(PhaseId::RIGHT_STANCE),
        "double_stance" => Ok(PhaseId::DOUBLE_STANCE),
        other => other
            .parse::<u32>()
            .map(PhaseId)
            .map_err(|_| ConfigError::InvalidValue {
                field: "phase".to_string(),
                message: format!("'{}' is neither a phase name nor a phase id", other),
            }),
    }
}

impl PhaseKey {
    fn phase(&self) -> Result<PhaseId, ConfigError> {
        match self {
            PhaseKey::Id(id) => Ok(PhaseId(*id)),
            PhaseKey::Name(name) => parse_phase(name),
        }
    }
}

fn missing(objective: &str, field: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: format!("objectives.{}.{}", objective, field),
        message: "missing".to_string(),
    }
}

impl TargetSpec {
    fn body_point(&self, objective: &str) -> Result<BodyPoint, ConfigError> {
        let body = self.body.as_deref().ok_or_else(|| missing(objective, "body"))?;
        let offset = self.offset.map(Vector3::from).unwrap_or_else(Vector3::zeros);
        Ok(BodyPoint::new(body, offset))
    }

    fn body(&self, objective: &str) -> Result<String, ConfigError> {
        self.body.clone().ok_or_else(|| missing(objective, "body"))
    }

    fn joint(&self, objective: &str) -> Result<String, ConfigError> {
        self.joint.clone().ok_or_else(|| missing(objective, "joint"))
    }
}

impl ObjectiveSpec {
    fn binding<T>(
        &self,
        resolve: impl Fn(&TargetSpec) -> Result<T, ConfigError>,
    ) -> Result<PhaseBinding<T>, ConfigError> {
        match (&self.target, self.phases.is_empty()) {
            (Some(target), true) => Ok(PhaseBinding::Always(resolve(target)?)),
            (None, false) => {
                let bindings = self
                    .phases
                    .iter()
                    .map(|(key, target)| Ok((parse_phase(key)?, resolve(target)?)))
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                Ok(PhaseBinding::per_phase(bindings))
            }
            (Some(_), false) => Err(ConfigError::InvalidValue {
                field: format!("objectives.{}", self.name),
                message: "set either 'target' or 'phases', not both".to_string(),
            }),
            (None, true) => Err(missing(&self.name, "target")),
        }
    }

    fn kind(&self) -> Result<ObjectiveKind, ConfigError> {
        let name = self.name.as_str();
        Ok(match self.kind {
            ObjectiveKindSpec::CenterOfMass => {
                if self.phases.is_empty() {
                    ObjectiveKind::CenterOfMass(PhaseBinding::Always(()))
                } else {
                    ObjectiveKind::CenterOfMass(self.binding(|_| Ok(()))?)
                }
            }
            ObjectiveKindSpec::TranslationalPoint => {
                ObjectiveKind::TranslationalPoint(self.binding(|t| t.body_point(name))?)
            }
            ObjectiveKindSpec::RotationalFrame => {
                ObjectiveKind::RotationalFrame(self.binding(|t| t.body(name))?)
            }
            ObjectiveKindSpec::JointSpace => {
                ObjectiveKind::JointSpace(self.binding(|t| t.joint(name))?)
            }
        })
    }

    pub fn into_objective(self) -> Result<TrackingObjective, ConfigError> {
        let kind = self.kind()?;
        let dim = kind.dim();
        let what = |m: &str| format!("{} of objective '{}'", m, self.name);
        let gains = FeedbackGains::new(
            self.kp.to_matrix(dim, &what("kp"))?,
            self.kd.to_matrix(dim, &what("kd"))?,
        );
        let weight = self.weight.to_matrix(dim, &what("weight"))?;
        let mut objective = TrackingObjective::new(&self.name, kind, gains, weight)?;

        if let Some([start, end]) = self.window {
            objective = objective.with_window(start, end)?;
        }
        for (key, scale) in &self.phase_scales {
            objective = objective.with_phase_scale(parse_phase(key)?, *scale)?;
        }
        if let Some(constant) = self.constant {
            let zeros = || vec![0.; dim];
            let sample = TrajectorySample::new(
                DVector::from_vec(constant.value),
                DVector::from_vec(constant.dot.unwrap_or_else(zeros)),
                DVector::from_vec(constant.ddot.unwrap_or_else(zeros)),
            );
            objective = objective.with_constant_target(sample)?;
        }
        Ok(objective)
    }
}

impl ContactSpec {
    fn contact_point(&self) -> ContactPoint {
        let mut contact = ContactPoint::new(&self.name, &self.body, Vector3::from(self.offset));
        if let Some(normal) = self.normal {
            contact = contact.with_normal(Vector3::from(normal));
        }
        contact.friction = self.friction;
        contact.cone = self.cone;
        contact
    }
}

impl OscConfigFile {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Build the controller configuration. Model-dependent checks happen in
    /// [`OscCore::new`](crate::osc::OscCore::new).
    pub fn into_config(self) -> Result<OscConfig, ConfigError> {
        self.settings.validate()?;

        let mut contacts = ContactSet::new();
        for spec in &self.contacts {
            if spec.phases.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("contacts.{}.phases", spec.name),
                    message: "contact is never active".to_string(),
                });
            }
            for key in &spec.phases {
                contacts.insert(key.phase()?, spec.contact_point());
            }
        }

        let objectives = self
            .objectives
            .into_iter()
            .map(ObjectiveSpec::into_objective)
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(OscConfig {
            settings: self.settings,
            objectives,
            contacts,
        })
    }
}

impl OscConfig {
    /// Load a whole controller description from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        OscConfigFile::from_file(path)?.into_config()
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        OscConfigFile::from_toml_str(s)?.into_config()
    }
}

#[cfg(test)]
mod file_tests {
    use na::{dmatrix, dvector, vector};

    use super::*;
    use crate::{
        contact::ConeModel,
        relaxation::ConstraintMode,
        tracking::{DesiredSource, ResolvedTarget},
    };

    const WALKING: &str = r#"
        [settings]
        min_normal_force = 20.0
        contact_mode = { mode = "soft", weight = 200.0 }
        default_cone = { model = "linear", facets = 6 }

        [settings.joint_acceleration_costs]
        hip_left = 0.1

        [[objectives]]
        name = "com"
        kind = "center_of_mass"
        kp = [50.0, 50.0, 100.0]
        kd = 10.0
        weight = [2.0, 2.0, 2000.0]
        phase_scales = { double_stance = 0.5 }

        [[objectives]]
        name = "swing_toe"
        kind = "translational_point"
        kp = 100.0
        kd = 10.0
        weight = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
        phases.left_stance = { body = "pelvis", offset = [0.0, -0.1, -0.5] }
        phases.1 = { body = "pelvis", offset = [0.0, 0.1, -0.5] }

        [[objectives]]
        name = "pelvis_heading"
        kind = "rotational_frame"
        kp = 10.0
        kd = 1.0
        weight = [0.0, 0.0, 1.0]
        target = { body = "pelvis" }

        [[objectives]]
        name = "hip_left_hold"
        kind = "joint_space"
        kp = 20.0
        kd = 1.0
        weight = 1.0
        target = { joint = "hip_left" }
        window = [0.0, 0.3]
        constant = { value = [0.1] }

        [[contacts]]
        name = "toe_left"
        body = "pelvis"
        offset = [0.1, 0.1, -0.5]
        phases = ["left_stance", "double_stance"]

        [[contacts]]
        name = "toe_right"
        body = "pelvis"
        offset = [0.1, -0.1, -0.5]
        phases = [1, "double_stance"]
        friction = { mu_t1 = 0.5, mu_t2 = 0.8 }
        cone = { model = "conic" }
    "#;

    #[test]
    fn loads_walking_controller() {
        // Act
        let config = OscConfig::from_toml_str(WALKING).unwrap();

        // Assert
        let settings = &config.settings;
        assert_eq!(settings.min_normal_force, 20.);
        assert_eq!(settings.contact_mode, ConstraintMode::Soft { weight: 200. });
        assert_eq!(settings.default_cone, ConeModel::Linear { facets: 6 });

        let names: Vec<&str> = config.objectives.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["com", "swing_toe", "pelvis_heading", "hip_left_hold"]);

        let com = &config.objectives[0];
        assert_eq!(com.gains().kp, DMatrix::from_diagonal(&dvector![50., 50., 100.]));
        assert_eq!(
            com.effective_weight(PhaseId::DOUBLE_STANCE),
            DMatrix::from_diagonal(&dvector![1., 1., 1000.])
        );

        let swing = &config.objectives[1];
        let right_toe = BodyPoint::new("pelvis", vector![0., -0.1, -0.5]);
        assert_eq!(
            swing.active_target(PhaseId::LEFT_STANCE, 0.),
            Some(ResolvedTarget::Point(&right_toe))
        );
        assert!(swing.active_target(PhaseId::DOUBLE_STANCE, 0.).is_none());

        let hold = &config.objectives[3];
        assert_eq!(
            hold.source(),
            &DesiredSource::Constant(TrajectorySample::stationary(dvector![0.1], 1))
        );
        assert!(hold.active_target(PhaseId::LEFT_STANCE, 0.5).is_none());

        let left: Vec<&str> = config
            .contacts
            .active(PhaseId::LEFT_STANCE)
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(left, vec!["toe_left"]);
        assert_eq!(config.contacts.active(PhaseId::DOUBLE_STANCE).len(), 2);
        let right = &config.contacts.active(PhaseId::RIGHT_STANCE)[0];
        assert_eq!(right.cone, Some(ConeModel::Conic));
        assert_eq!(
            right.friction,
            Some(Friction::Anisotropic {
                mu_t1: 0.5,
                mu_t2: 0.8
            })
        );
    }

    #[test]
    fn matrix_spec_shapes() {
        assert_eq!(
            MatrixSpec::Scalar(2.).to_matrix(2, "w").unwrap(),
            dmatrix![2., 0.; 0., 2.]
        );
        assert!(matches!(
            MatrixSpec::Diagonal(vec![1., 2.]).to_matrix(3, "w"),
            Err(ConfigError::DimensionMismatch { expected: 3, got: 2, .. })
        ));
        assert!(matches!(
            MatrixSpec::Full(vec![vec![1., 0.], vec![0.]]).to_matrix(2, "w"),
            Err(ConfigError::DimensionMismatch { got: 1, .. })
        ));
    }

    #[test]
    fn rejects_bad_objectives() {
        let negative = r#"
            [[objectives]]
            name = "com"
            kind = "center_of_mass"
            kp = 1.0
            kd = 1.0
            weight = [1.0, -1.0, 1.0]
        "#;
        assert!(matches!(
            OscConfig::from_toml_str(negative),
            Err(ConfigError::NotPositiveSemidefinite { .. })
        ));

        let no_target = r#"
            [[objectives]]
            name = "foot"
            kind = "translational_point"
            kp = 1.0
            kd = 1.0
            weight = 1.0
        "#;
        assert!(matches!(
            OscConfig::from_toml_str(no_target),
            Err(ConfigError::InvalidValue { .. })
        ));

        let bad_phase = r#"
            [[contacts]]
            name = "toe"
            body = "pelvis"
            offset = [0.0, 0.0, 0.0]
            phases = ["flight"]
        "#;
        assert!(matches!(
            OscConfig::from_toml_str(bad_phase),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            OscConfig::from_file("/nonexistent/osc.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn phase_names() {
        assert_eq!(parse_phase("double_stance").unwrap(), PhaseId::DOUBLE_STANCE);
        assert_eq!(parse_phase("7").unwrap(), PhaseId(7));
        assert!(parse_phase("-1").is_err());
    }
}
