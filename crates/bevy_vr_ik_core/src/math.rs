//! Vector and quaternion helpers shared by every part of the solver.
//!
//! Convention: right-handed, `+Y` up and characters facing `+Z`. Seen from
//! behind the character, its left hand side is `+X`.

use std::f32::consts::{FRAC_PI_2, PI};

use bevy_math::{Mat3, Quat, Vec3};
use bevy_reflect::{Reflect, std_traits::ReflectDefault};
use serde::{Deserialize, Serialize};

pub const UP: Vec3 = Vec3::Y;
pub const DOWN: Vec3 = Vec3::NEG_Y;
pub const FORWARD: Vec3 = Vec3::Z;
pub const BACK: Vec3 = Vec3::NEG_Z;
pub const LEFT: Vec3 = Vec3::X;
pub const RIGHT: Vec3 = Vec3::NEG_X;

/// Shortest rotation taking direction `from` onto direction `to`.
///
/// Zero-length inputs produce the identity instead of NaNs.
pub fn from_to_rotation(from: Vec3, to: Vec3) -> Quat {
    let (Some(from), Some(to)) = (from.try_normalize(), to.try_normalize()) else {
        return Quat::IDENTITY;
    };
    Quat::from_rotation_arc(from, to)
}

/// Rotation that, applied on the left, turns `from` into `to`.
pub fn rotation_delta(from: Quat, to: Quat) -> Quat {
    if from == to {
        return Quat::IDENTITY;
    }
    (to * from.inverse()).normalize()
}

/// Limits the angle of `rotation` smoothly. `clamp_weight` of 1 clamps everything
/// away, 0 leaves the rotation untouched.
pub fn clamp_rotation(rotation: Quat, clamp_weight: f32, smoothing: u32) -> Quat {
    if clamp_weight >= 1.0 {
        return Quat::IDENTITY;
    }
    if clamp_weight <= 0.0 {
        return rotation;
    }

    let angle = Quat::IDENTITY.angle_between(rotation);
    let dot = 1.0 - angle / PI;
    let target_clamp_mlp = (1.0 - (clamp_weight - dot) / (1.0 - dot)).clamp(0.0, 1.0);
    let mut clamp_mlp = (dot / clamp_weight).clamp(0.0, 1.0);

    for _ in 0..smoothing {
        clamp_mlp = (clamp_mlp * FRAC_PI_2).sin();
    }

    Quat::IDENTITY.slerp(rotation, clamp_mlp * target_clamp_mlp)
}

/// Rotation whose local `+Z` points along `forward` and local `+Y` is as close
/// to `up` as possible.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let Some(forward) = forward.try_normalize() else {
        return Quat::IDENTITY;
    };
    let side = up
        .cross(forward)
        .try_normalize()
        .unwrap_or_else(|| forward.any_orthonormal_vector());
    let up = forward.cross(side);

    Quat::from_mat3(&Mat3::from_cols(side, up, forward)).normalize()
}

/// Heading angle (radians) of a direction expressed in a local frame, measured
/// from `+Z` towards `+X` around `+Y`.
pub fn yaw_of(local_direction: Vec3) -> f32 {
    local_direction.x.atan2(local_direction.z)
}

pub fn extract_vertical(v: Vec3, up: Vec3, weight: f32) -> Vec3 {
    if weight == 0.0 {
        return Vec3::ZERO;
    }
    let up = up.normalize_or_zero();
    up * v.dot(up) * weight
}

pub fn extract_horizontal(v: Vec3, up: Vec3, weight: f32) -> Vec3 {
    if weight == 0.0 {
        return Vec3::ZERO;
    }
    (v - extract_vertical(v, up, 1.0)) * weight
}

/// Removes the component of `v` along `normal`.
pub fn flatten(v: Vec3, normal: Vec3) -> Vec3 {
    v - extract_vertical(v, normal, 1.0)
}

/// Projects `point` onto the plane through `plane_position` with `plane_normal`.
pub fn point_to_plane(point: Vec3, plane_position: Vec3, plane_normal: Vec3) -> Vec3 {
    plane_position + flatten(point - plane_position, plane_normal)
}

pub fn lerp_clamped(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a.lerp(b, t.clamp(0.0, 1.0))
}

pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

pub fn quat_lerp(a: Quat, b: Quat, t: f32) -> Quat {
    let t = t.clamp(0.0, 1.0);
    if t <= 0.0 {
        return a;
    }
    if t >= 1.0 {
        return b;
    }
    a.lerp(b, t)
}

pub fn quat_slerp(a: Quat, b: Quat, t: f32) -> Quat {
    let t = t.clamp(0.0, 1.0);
    if t <= 0.0 {
        return a;
    }
    if t >= 1.0 {
        return b;
    }
    a.slerp(b, t)
}

/// Critically damped spring towards `target`.
pub fn smooth_damp(
    current: f32,
    target: f32,
    velocity: &mut f32,
    smooth_time: f32,
    max_speed: f32,
    delta_time: f32,
) -> f32 {
    if delta_time <= 0.0 {
        return current;
    }
    let smooth_time = smooth_time.max(0.0001);
    let omega = 2.0 / smooth_time;
    let x = omega * delta_time;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let original_target = target;
    let max_change = max_speed * smooth_time;
    let change = (current - target).clamp(-max_change, max_change);
    let target = current - change;

    let temp = (*velocity + omega * change) * delta_time;
    *velocity = (*velocity - omega * temp) * exp;
    let mut output = target + (change + temp) * exp;

    // Never overshoot
    if (original_target - current > 0.0) == (output > original_target) {
        output = original_target;
        *velocity = 0.0;
    }

    output
}

/// Vector version of [`smooth_damp`].
pub fn smooth_damp_vec3(
    current: Vec3,
    target: Vec3,
    velocity: &mut Vec3,
    smooth_time: f32,
    max_speed: f32,
    delta_time: f32,
) -> Vec3 {
    if delta_time <= 0.0 {
        return current;
    }
    let smooth_time = smooth_time.max(0.0001);
    let omega = 2.0 / smooth_time;
    let x = omega * delta_time;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let original_target = target;
    let change = (current - target).clamp_length_max(max_speed * smooth_time);
    let target = current - change;

    let temp = (*velocity + omega * change) * delta_time;
    *velocity = (*velocity - omega * temp) * exp;
    let mut output = target + (change + temp) * exp;

    // Never overshoot
    if (original_target - current).dot(output - original_target) > 0.0 {
        output = original_target;
        *velocity = Vec3::ZERO;
    }

    output
}

pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

/// Rotates `from` towards `to` by at most `max_radians`.
pub fn rotate_towards(from: Quat, to: Quat, max_radians: f32) -> Quat {
    let angle = from.angle_between(to);
    if angle <= f32::EPSILON {
        return to;
    }
    from.slerp(to, (max_radians / angle).min(1.0))
}

/// Shortest signed difference between two angles in degrees.
pub fn delta_angle(current: f32, target: f32) -> f32 {
    let delta = (target - current).rem_euclid(360.0);
    if delta > 180.0 { delta - 360.0 } else { delta }
}

/// Squashes `value` into `[min, max]` with eased edges instead of a hard clamp.
pub fn damper_value(value: f32, min: f32, max: f32, weight: f32) -> f32 {
    let range = max - min;
    if range <= 0.0 {
        return min;
    }
    let mut value = value;
    if weight < 1.0 {
        let mid = max - range * 0.5;
        value = mid + (value - mid) * weight.clamp(0.0, 1.0);
    }
    let t = Interpolation::InOutQuintic.sample(((value - min) / range).clamp(0.0, 1.0));
    min + range * t
}

/// Easing curves applied to normalized progress values.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[reflect(Default)]
pub enum Interpolation {
    Linear,
    #[default]
    InOutSine,
    InOutCubic,
    InOutQuintic,
    InQuad,
    OutQuad,
}

impl Interpolation {
    pub fn sample(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Interpolation::Linear => t,
            Interpolation::InOutSine => -0.5 * ((PI * t).cos() - 1.0),
            Interpolation::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) * 0.5
                }
            }
            Interpolation::InOutQuintic => {
                if t < 0.5 {
                    16.0 * t.powi(5)
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(5) * 0.5
                }
            }
            Interpolation::InQuad => t * t,
            Interpolation::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn look_rotation_maps_forward_and_up() {
        let forward = Vec3::new(1.0, 0.0, 1.0).normalize();
        let q = look_rotation(forward, UP);

        assert!((q * FORWARD).abs_diff_eq(forward, 1e-5));
        assert!((q * UP).abs_diff_eq(UP, 1e-5));
    }

    #[test]
    fn look_rotation_handles_degenerate_input() {
        assert_eq!(look_rotation(Vec3::ZERO, UP), Quat::IDENTITY);
        let q = look_rotation(UP, UP);
        assert!((q * FORWARD).abs_diff_eq(UP, 1e-5));
        assert!(q.is_finite());
    }

    #[test]
    fn yaw_matches_axis_angle() {
        let dir = Quat::from_axis_angle(UP, 0.7) * FORWARD;
        assert!((yaw_of(dir) - 0.7).abs() < 1e-5);
    }

    #[test]
    fn clamp_rotation_limits() {
        let q = Quat::from_axis_angle(UP, 1.0);
        assert_eq!(clamp_rotation(q, 0.0, 2), q);
        assert_eq!(clamp_rotation(q, 1.0, 2), Quat::IDENTITY);

        let clamped = clamp_rotation(q, 0.5, 2);
        let angle = Quat::IDENTITY.angle_between(clamped);
        assert!(angle > 0.0 && angle <= 1.0 + 1e-5);
    }

    #[test]
    fn smooth_damp_converges_without_overshoot() {
        let mut velocity = 0.0;
        let mut value = 0.0;
        for _ in 0..200 {
            value = smooth_damp(value, 1.0, &mut velocity, 0.2, f32::INFINITY, 1.0 / 60.0);
            assert!(value <= 1.0);
        }
        assert!((value - 1.0).abs() < 1e-3);
    }

    #[test]
    fn smooth_damp_ignores_zero_delta_time() {
        let mut velocity = Vec3::ONE;
        let out = smooth_damp_vec3(Vec3::ZERO, Vec3::X, &mut velocity, 0.1, f32::INFINITY, 0.0);
        assert_eq!(out, Vec3::ZERO);
        assert_eq!(velocity, Vec3::ONE);
    }

    #[test]
    fn delta_angle_wraps() {
        assert_eq!(delta_angle(350.0, 10.0), 20.0);
        assert_eq!(delta_angle(10.0, 350.0), -20.0);
    }

    #[test]
    fn point_to_plane_drops_height() {
        let p = point_to_plane(Vec3::new(1.0, 5.0, 2.0), Vec3::new(0.0, 1.0, 0.0), UP);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 1.0, 2.0), 1e-6));
    }

    #[test]
    fn damper_stays_in_range() {
        for v in [-100.0, -10.0, 0.0, 10.0, 100.0] {
            let d = damper_value(v, -20.0, 50.0, 1.0);
            assert!((-20.0..=50.0).contains(&d));
        }
    }

    #[test]
    fn interpolation_endpoints() {
        for mode in [
            Interpolation::Linear,
            Interpolation::InOutSine,
            Interpolation::InOutCubic,
            Interpolation::InOutQuintic,
            Interpolation::InQuad,
            Interpolation::OutQuad,
        ] {
            assert!(mode.sample(0.0).abs() < 1e-6);
            assert!((mode.sample(1.0) - 1.0).abs() < 1e-6);
        }
    }
}
