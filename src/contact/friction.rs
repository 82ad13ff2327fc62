use na::{DMatrix, Matrix3, RowVector3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, types::Float, util::tangent_basis, PI};

/// Coulomb friction coefficient of a contact.
///
/// Anisotropic friction uses a different coefficient along each tangent of
/// the contact frame. In TOML an isotropic coefficient is a bare number and
/// an anisotropic one is a table `{ mu_t1 = .., mu_t2 = .. }`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Friction {
    Isotropic(Float),
    Anisotropic { mu_t1: Float, mu_t2: Float },
}

impl Friction {
    /// (μ along t1, μ along t2)
    pub fn coefficients(&self) -> (Float, Float) {
        match *self {
            Friction::Isotropic(mu) => (mu, mu),
            Friction::Anisotropic { mu_t1, mu_t2 } => (mu_t1, mu_t2),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (mu_t1, mu_t2) = self.coefficients();
        for mu in [mu_t1, mu_t2] {
            if !mu.is_finite() || mu <= 0. {
                return Err(ConfigError::InvalidFriction(mu));
            }
        }
        Ok(())
    }
}

/// How the friction cone enters the QP.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ConeModel {
    /// Inscribed polygon with `facets` sides: plain linear inequalities.
    Linear { facets: usize },
    /// Exact second-order (Lorentz) cone. Needs a solver with SOC support.
    Conic,
}

impl ConeModel {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            ConeModel::Linear { facets } if facets < 3 => Err(ConfigError::TooFewFacets(facets)),
            _ => Ok(()),
        }
    }
}

impl Default for ConeModel {
    fn default() -> Self {
        ConeModel::Linear { facets: 8 }
    }
}

/// Orthonormal contact frame (t1, t2, n). Forces are expressed in world
/// frame; the frame only projects them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactFrame {
    pub t1: Vector3<Float>,
    pub t2: Vector3<Float>,
    pub normal: Vector3<Float>,
}

impl ContactFrame {
    pub fn new(normal: &Vector3<Float>) -> Self {
        let (t1, t2) = tangent_basis(normal);
        ContactFrame {
            t1,
            t2,
            normal: normal.normalize(),
        }
    }

    /// Force components (f_t1, f_t2, f_n) in the contact frame.
    pub fn components(&self, force: &Vector3<Float>) -> Vector3<Float> {
        Vector3::new(
            self.t1.dot(force),
            self.t2.dot(force),
            self.normal.dot(force),
        )
    }

    /// ‖(f_t1/μ1, f_t2/μ2)‖ / f_n: at most 1 for a force inside the true
    /// cone. Infinite for a non-positive normal force with any tangential
    /// load.
    pub fn friction_ratio(&self, force: &Vector3<Float>, friction: &Friction) -> Float {
        let (mu_t1, mu_t2) = friction.coefficients();
        let f = self.components(force);
        let tangential = (f.x / mu_t1).hypot(f.y / mu_t2);
        if f.z <= 0. {
            return if tangential == 0. { 0. } else { Float::INFINITY };
        }
        tangential / f.z
    }
}

/// Friction cone of one contact as QP rows over its force λ (world frame).
#[derive(Clone, Debug, PartialEq)]
pub enum ConeRows {
    /// G λ <= 0, one row per facet.
    Polyhedral(DMatrix<Float>),
    /// S λ lies in {(t, x) : ‖x‖ <= t}.
    SecondOrder(Matrix3<Float>),
}

/// Rows of the friction cone of one contact.
///
/// The linear model uses the facets
///     cos θ_k f_t1/μ1 + sin θ_k f_t2/μ2 <= cos(π/n) f_n,   θ_k = 2πk/n
/// i.e. a polygon inscribed in the exact cone. Every force it admits is
/// physically realizable, and it tightens towards the exact cone as n grows.
pub fn friction_cone_rows(frame: &ContactFrame, friction: &Friction, cone: &ConeModel) -> ConeRows {
    let (mu_t1, mu_t2) = friction.coefficients();
    let t1 = frame.t1.transpose() / mu_t1;
    let t2 = frame.t2.transpose() / mu_t2;
    let n = frame.normal.transpose();

    match *cone {
        ConeModel::Linear { facets } => {
            let apothem = (PI / facets as Float).cos();
            let mut G = DMatrix::zeros(facets, 3);
            for k in 0..facets {
                let theta = 2. * PI * k as Float / facets as Float;
                let row: RowVector3<Float> = theta.cos() * t1 + theta.sin() * t2 - apothem * n;
                G.row_mut(k).copy_from(&row);
            }
            ConeRows::Polyhedral(G)
        }
        ConeModel::Conic => {
            let mut S = Matrix3::zeros();
            S.set_row(0, &n);
            S.set_row(1, &t1);
            S.set_row(2, &t2);
            ConeRows::SecondOrder(S)
        }
    }
}

/// Row r and bound b such that r λ <= b encodes f_n >= min_normal_force.
pub fn min_normal_row(frame: &ContactFrame, min_normal_force: Float) -> (RowVector3<Float>, Float) {
    (-frame.normal.transpose(), -min_normal_force)
}

#[cfg(test)]
mod friction_tests {
    use na::{vector, Vector3};

    use super::*;
    use crate::assert_close;

    #[test]
    fn polygon_vertices_touch_the_cone() {
        // Arrange
        let frame = ContactFrame::new(&Vector3::z());
        let friction = Friction::Isotropic(0.5);
        let facets = 6;
        let ConeRows::Polyhedral(G) =
            friction_cone_rows(&frame, &friction, &ConeModel::Linear { facets })
        else {
            panic!("expected polyhedral rows");
        };

        // Act: a force on the exact cone, halfway between two facet normals
        let angle = PI / facets as Float;
        let on_vertex = vector![0.5 * angle.cos(), 0.5 * angle.sin(), 1.];
        let outside = vector![0.5, 0., 1.];
        let inside = vector![0.4 * angle.cos(), 0., 1.];

        // Assert
        assert_close!((&G * on_vertex).max(), 0., 1e-12);
        assert!((&G * outside).max() > 0.);
        assert!((&G * inside).max() < 0.);
    }

    #[test]
    fn admitted_forces_stay_inside_exact_cone() {
        let frame = ContactFrame::new(&vector![0.2, -0.1, 1.]);
        let friction = Friction::Anisotropic {
            mu_t1: 0.3,
            mu_t2: 0.7,
        };
        let ConeRows::Polyhedral(G) =
            friction_cone_rows(&frame, &friction, &ConeModel::Linear { facets: 4 })
        else {
            panic!("expected polyhedral rows");
        };

        let mut rng = rand::rng();
        let mut admitted = 0;
        for _ in 0..500 {
            let force = crate::util::test_utils::random_vector(&mut rng, 1.)
                + frame.normal * 0.5;
            if (&G * force).max() <= 0. {
                admitted += 1;
                assert!(frame.friction_ratio(&force, &friction) <= 1. + 1e-12);
            }
        }
        assert!(admitted > 0);
    }

    #[test]
    fn second_order_rows() {
        let frame = ContactFrame::new(&Vector3::z());
        let friction = Friction::Isotropic(0.5);
        let ConeRows::SecondOrder(S) = friction_cone_rows(&frame, &friction, &ConeModel::Conic)
        else {
            panic!("expected second-order rows");
        };

        let force = vector![0.3, -0.4, 1.];
        let s = S * force;
        assert_close!(s[0], 1., 1e-12);
        // ‖(0.3, -0.4)‖ / 0.5 = 1, i.e. exactly on the cone
        assert_close!(s.fixed_rows::<2>(1).norm(), 1., 1e-12);
        assert_close!(frame.friction_ratio(&force, &friction), 1., 1e-12);
    }

    #[test]
    fn min_normal_force_row() {
        let frame = ContactFrame::new(&Vector3::z());
        let (row, bound) = min_normal_row(&frame, 20.);
        assert!((row * vector![0., 0., 25.])[0] <= bound);
        assert!((row * vector![0., 0., 15.])[0] > bound);
    }

    #[test]
    fn validation() {
        assert!(Friction::Isotropic(0.).validate().is_err());
        assert!(Friction::Anisotropic {
            mu_t1: 0.5,
            mu_t2: Float::NAN
        }
        .validate()
        .is_err());
        assert!(matches!(
            ConeModel::Linear { facets: 2 }.validate(),
            Err(ConfigError::TooFewFacets(2))
        ));
        assert!(ConeModel::Conic.validate().is_ok());
    }
}
