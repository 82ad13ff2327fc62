use std::collections::{BTreeMap, HashSet};

use na::Vector3;

use super::friction::{ConeModel, ContactFrame, Friction};
use crate::{
    dynamics::{BodyPoint, DynamicsEvaluator},
    error::ConfigError,
    types::{Float, PhaseId},
};

/// A body-fixed point that can push against the ground.
///
/// Friction and cone model fall back to the controller-wide defaults when
/// left unset.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactPoint {
    pub name: String,
    pub point: BodyPoint,
    /// Ground normal at the contact, in world frame
    pub normal: Vector3<Float>,
    pub friction: Option<Friction>,
    pub cone: Option<ConeModel>,
}

impl ContactPoint {
    pub fn new(name: &str, body: &str, offset: Vector3<Float>) -> Self {
        ContactPoint {
            name: name.to_string(),
            point: BodyPoint::new(body, offset),
            normal: Vector3::z(),
            friction: None,
            cone: None,
        }
    }

    pub fn with_normal(mut self, normal: Vector3<Float>) -> Self {
        self.normal = normal;
        self
    }

    pub fn with_friction(mut self, friction: Friction) -> Self {
        self.friction = Some(friction);
        self
    }

    pub fn with_cone(mut self, cone: ConeModel) -> Self {
        self.cone = Some(cone);
        self
    }

    pub fn frame(&self) -> ContactFrame {
        ContactFrame::new(&self.normal)
    }

    pub fn friction_or(&self, default: Friction) -> Friction {
        self.friction.unwrap_or(default)
    }

    pub fn cone_or(&self, default: ConeModel) -> ConeModel {
        self.cone.unwrap_or(default)
    }
}

/// Contacts that are on the ground in each gait phase, in QP order.
///
/// A phase with no entry has no contacts. Inactive contacts have no force
/// variables at all in that tick's QP.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContactSet {
    phases: BTreeMap<PhaseId, Vec<ContactPoint>>,
}

impl ContactSet {
    pub fn new() -> Self {
        ContactSet::default()
    }

    pub fn with_phase(mut self, phase: PhaseId, contacts: Vec<ContactPoint>) -> Self {
        self.phases.insert(phase, contacts);
        self
    }

    pub fn insert(&mut self, phase: PhaseId, contact: ContactPoint) {
        self.phases.entry(phase).or_default().push(contact);
    }

    /// Contacts active in `phase`.
    pub fn active(&self, phase: PhaseId) -> &[ContactPoint] {
        self.phases.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn phases(&self) -> impl Iterator<Item = PhaseId> + '_ {
        self.phases.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PhaseId, &ContactPoint)> {
        self.phases
            .iter()
            .flat_map(|(phase, contacts)| contacts.iter().map(move |c| (*phase, c)))
    }

    /// Check names, bodies, normals, friction and cone choice of every
    /// contact, with the defaults filled in.
    pub fn validate(
        &self,
        model: &dyn DynamicsEvaluator,
        default_friction: Friction,
        default_cone: ConeModel,
        supports_second_order_cones: bool,
    ) -> Result<(), ConfigError> {
        for (phase, contacts) in &self.phases {
            let mut names = HashSet::new();
            for contact in contacts {
                if !names.insert(contact.name.as_str()) {
                    return Err(ConfigError::DuplicateContact(contact.name.clone(), *phase));
                }
                if !model.has_body(&contact.point.body) {
                    return Err(ConfigError::UnknownBody(contact.point.body.clone()));
                }
                let normal_norm = contact.normal.norm();
                if !normal_norm.is_finite() || normal_norm < 1e-9 {
                    return Err(ConfigError::InvalidValue {
                        field: format!("normal of contact '{}'", contact.name),
                        message: "must be finite and non-zero".to_string(),
                    });
                }
                if !contact.point.offset.iter().all(|x| x.is_finite()) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("offset of contact '{}'", contact.name),
                        message: "must be finite".to_string(),
                    });
                }
                contact.friction_or(default_friction).validate()?;
                let cone = contact.cone_or(default_cone);
                cone.validate()?;
                if cone == ConeModel::Conic && !supports_second_order_cones {
                    return Err(ConfigError::ConeNotSupported(contact.name.clone()));
                }
            }
        }
        Ok(())
    }
}
