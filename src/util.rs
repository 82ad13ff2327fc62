use na::{DMatrix, Matrix3, Vector3};

use crate::types::Float;

/// Skew-symmetric matrix of v, so that skew_symmetric(v) * w == v x w
pub fn skew_symmetric(v: &Vector3<Float>) -> Matrix3<Float> {
    #[rustfmt::skip]
    let mat = Matrix3::new(
        0.,   -v.z,  v.y,
        v.z,   0.,  -v.x,
        -v.y,  v.x,  0.,
    );
    mat
}

/// Two unit tangents t1, t2 such that (t1, t2, n) is a right-handed
/// orthonormal frame.
pub fn tangent_basis(normal: &Vector3<Float>) -> (Vector3<Float>, Vector3<Float>) {
    let n = normal.normalize();
    // Pick the world axis least aligned with n to seed t1
    let seed = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let t1 = (seed - n * n.dot(&seed)).normalize();
    let t2 = n.cross(&t1);
    (t1, t2)
}

pub fn all_finite(m: &DMatrix<Float>) -> bool {
    m.iter().all(|x| x.is_finite())
}

/// Largest absolute difference between m and its transpose.
pub fn asymmetry(m: &DMatrix<Float>) -> Float {
    (m - m.transpose()).amax()
}

#[macro_export]
macro_rules! assert_close {
    ($left:expr, $right:expr, $tolerance:expr) => {
        let left = $left;
        let right = $right;
        let tol = $tolerance;
        let diff = (left - right).abs();
        if diff > tol {
            panic!(
                "assertion failed: {} ~= {} \
                (tolerance: {}, difference: {})",
                left, right, tol, diff
            );
        }
    };
}

#[macro_export]
macro_rules! assert_vec_close {
    ($left:expr, $right:expr, $tolerance:expr) => {
        let left = $left;
        let right = $right;
        let tol = $tolerance;
        assert_eq!(left.len(), right.len(), "length mismatch");
        for (a, b) in left.iter().zip(right.iter()) {
            $crate::assert_close!(a, b, tol);
        }
    };
}

#[cfg(test)]
pub mod test_utils {
    use na::{vector, UnitQuaternion, Vector3};
    use rand::{rngs::ThreadRng, Rng};

    use crate::types::Float;

    /// Build a Vector3 where each element is random between (-range, range)
    pub fn random_vector(rng: &mut ThreadRng, range: Float) -> Vector3<Float> {
        vector![
            rng.random_range(-range..range),
            rng.random_range(-range..range),
            rng.random_range(-range..range)
        ]
    }

    /// Build a UnitQuaternion from Euler angles, where each angle is random
    /// between (-range, range)
    pub fn random_quaternion(rng: &mut ThreadRng, range: Float) -> UnitQuaternion<Float> {
        UnitQuaternion::from_euler_angles(
            rng.random_range(-range..range),
            rng.random_range(-range..range),
            rng.random_range(-range..range),
        )
    }
}

#[cfg(test)]
mod util_tests {
    use na::{vector, Vector3};

    use super::test_utils::random_vector;
    use super::*;

    #[test]
    fn skew_symmetric_is_cross_product() {
        let mut rng = rand::rng();
        for _ in 0..20 {
            let a = random_vector(&mut rng, 5.);
            let b = random_vector(&mut rng, 5.);
            assert_vec_close!(skew_symmetric(&a) * b, a.cross(&b), 1e-10);
        }
    }

    #[test]
    fn tangent_basis_is_orthonormal() {
        for n in [Vector3::z(), Vector3::x(), vector![0.3, -0.2, 0.9]] {
            let (t1, t2) = tangent_basis(&n);
            let n = n.normalize();
            assert_close!(t1.norm(), 1., 1e-12);
            assert_close!(t2.norm(), 1., 1e-12);
            assert_close!(t1.dot(&n), 0., 1e-12);
            assert_close!(t2.dot(&n), 0., 1e-12);
            assert_vec_close!(t1.cross(&t2), n, 1e-12);
        }
    }
}
