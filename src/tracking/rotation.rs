use na::{DVector, Quaternion, UnitQuaternion, Vector3};

use crate::types::Float;

/// Orientation error of a frame, as a rotation vector in world frame.
///
/// The error is log(R_des * R_act^T): the world-frame rotation that carries
/// the actual orientation onto the desired one. It is taken along the
/// shortest path, i.e. its norm lies in [0, π], so it pairs directly with
/// world-frame angular velocity and world-frame gains:
///     ω_dot_cmd = ω_dot_des + Kd (ω_des - ω) + Kp log(R_des R_act^T)
pub fn orientation_error(
    desired: &UnitQuaternion<Float>,
    actual: &UnitQuaternion<Float>,
) -> Vector3<Float> {
    let dq = desired * actual.inverse();
    // q and -q are the same rotation; w >= 0 selects the short way around
    let dq = if dq.w < 0. {
        UnitQuaternion::new_unchecked(-dq.into_inner())
    } else {
        dq
    };
    dq.scaled_axis()
}

/// Reads a [w, x, y, z] quaternion sample. Returns None if it cannot be
/// normalized.
pub fn quaternion_from_sample(value: &DVector<Float>) -> Option<UnitQuaternion<Float>> {
    if value.len() != 4 {
        return None;
    }
    let q = Quaternion::new(value[0], value[1], value[2], value[3]);
    let norm = q.norm();
    if !norm.is_finite() || norm < 1e-9 {
        return None;
    }
    Some(UnitQuaternion::from_quaternion(q))
}

/// [w, x, y, z] layout of a quaternion, as stored in trajectory samples.
pub fn quaternion_to_sample(q: &UnitQuaternion<Float>) -> DVector<Float> {
    DVector::from_column_slice(&[q.w, q.i, q.j, q.k])
}

#[cfg(test)]
mod rotation_tests {
    use na::{dvector, vector};

    use super::*;
    use crate::{
        assert_close, assert_vec_close,
        util::test_utils::{random_quaternion, random_vector},
        PI,
    };

    #[test]
    fn recovers_relative_rotation() {
        let mut rng = rand::rng();
        for _ in 0..20 {
            let actual = random_quaternion(&mut rng, PI);
            let delta = random_vector(&mut rng, 1.);
            let desired = UnitQuaternion::from_scaled_axis(delta) * actual;
            assert_vec_close!(orientation_error(&desired, &actual), delta, 1e-9);
        }
    }

    #[test]
    fn error_is_expressed_in_world_frame() {
        // Arrange: body yawed by 90°, desired is a small roll about the
        // body x axis, which points along world y
        let actual = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 2.);
        let body_roll = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.1);
        let desired = actual * body_roll;

        // Act
        let err = orientation_error(&desired, &actual);

        // Assert
        assert_vec_close!(err, vector![0., 0.1, 0.], 1e-10);
    }

    #[test]
    fn takes_short_way_around_near_pi() {
        let actual = UnitQuaternion::identity();

        let below = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI - 0.01);
        assert_vec_close!(
            orientation_error(&below, &actual),
            vector![0., 0., PI - 0.01],
            1e-9
        );

        // Just past π is reached faster by turning the other way
        let above = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI + 0.01);
        assert_vec_close!(
            orientation_error(&above, &actual),
            vector![0., 0., -(PI - 0.01)],
            1e-9
        );

        let three_quarter = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.5 * PI);
        assert_vec_close!(
            orientation_error(&three_quarter, &actual),
            vector![0., 0., -PI / 2.],
            1e-9
        );
    }

    #[test]
    fn antipodal_quaternions_give_same_error() {
        let actual = UnitQuaternion::from_euler_angles(0.2, -0.1, 0.4);
        let desired = UnitQuaternion::from_euler_angles(0.5, 0.3, -0.2);
        let flipped = UnitQuaternion::new_unchecked(-desired.into_inner());
        assert_vec_close!(
            orientation_error(&desired, &actual),
            orientation_error(&flipped, &actual),
            1e-12
        );
    }

    #[test]
    fn sample_conversion() {
        let q = quaternion_from_sample(&dvector![2., 0., 0., 0.]).unwrap();
        assert_close!(q.angle(), 0., 1e-12);
        assert!(quaternion_from_sample(&dvector![0., 0., 0., 0.]).is_none());
        assert!(quaternion_from_sample(&dvector![1., 0., 0.]).is_none());

        let r = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let back = quaternion_from_sample(&quaternion_to_sample(&r)).unwrap();
        assert_close!(back.angle_to(&r), 0., 1e-6);
    }
}
