use bevy_math::{Quat, Vec3};
use bevy_reflect::{Reflect, std_traits::ReflectDefault};

use crate::{
    curve::FloatCurve,
    math::{from_to_rotation, lerp_clamped, look_rotation, quat_lerp, rotation_delta},
};

/// One joint of a solver chain.
///
/// The read pose is what was sampled from the rig this frame, the solver pose is
/// the working copy that the solvers mutate. Chains are plain slices of bones
/// owned by the body part, and every chain operation addresses bones by index.
#[derive(Reflect, Clone, Debug, Default)]
#[reflect(Default)]
pub struct VirtualBone {
    rest_length: f32,
    /// Distance to the next bone in the chain for the current frame.
    pub length: f32,
    pub sqr_mag: f32,
    /// Direction to the next bone in this bone's local space.
    pub axis: Vec3,
    pub read_position: Vec3,
    pub read_rotation: Quat,
    pub solver_position: Vec3,
    pub solver_rotation: Quat,
}

impl VirtualBone {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        let mut bone = Self::default();
        bone.read(position, rotation);
        bone
    }

    /// Distance to the next bone in the bind pose. Zero for the last bone.
    pub fn rest_length(&self) -> f32 {
        self.rest_length
    }

    /// Samples a new tracked pose. The solver pose restarts from it.
    pub fn read(&mut self, position: Vec3, rotation: Quat) {
        self.read_position = position;
        self.read_rotation = rotation;
        self.solver_position = position;
        self.solver_rotation = rotation;
    }

    /// Records the bind pose lengths of a chain. Called once when the chain is
    /// created.
    pub fn bind_rest_lengths(bones: &mut [VirtualBone]) {
        let count = bones.len();
        for i in 0..count {
            bones[i].rest_length = if i + 1 < count {
                bones[i].read_position.distance(bones[i + 1].read_position)
            } else {
                0.0
            };
        }
    }

    /// Updates per-frame lengths and local axes. Returns the chain length.
    pub fn pre_solve(bones: &mut [VirtualBone]) -> f32 {
        let count = bones.len();
        let mut total = 0.0;
        for i in 0..count {
            if i + 1 < count {
                let to_next = bones[i + 1].solver_position - bones[i].solver_position;
                bones[i].sqr_mag = to_next.length_squared();
                bones[i].length = bones[i].sqr_mag.sqrt();
                bones[i].axis = bones[i].solver_rotation.inverse() * to_next;
                total += bones[i].length;
            } else {
                bones[i].sqr_mag = 0.0;
                bones[i].length = 0.0;
            }
        }
        total
    }

    /// Rotates `bones[index..]` around `point`.
    pub fn rotate_around_point(bones: &mut [VirtualBone], index: usize, point: Vec3, rotation: Quat) {
        for bone in bones.iter_mut().skip(index) {
            let dir = bone.solver_position - point;
            bone.solver_position = point + rotation * dir;
            bone.solver_rotation = (rotation * bone.solver_rotation).normalize();
        }
    }

    /// Rotates `bones[index..]` around the position of `bones[index]`.
    pub fn rotate_by(bones: &mut [VirtualBone], index: usize, rotation: Quat) {
        let Some(pivot) = bones.get(index).map(|b| b.solver_position) else {
            return;
        };
        Self::rotate_around_point(bones, index, pivot, rotation);
    }

    /// Rotates `bones[index..]` so that `bones[index]` ends up with `rotation`.
    pub fn rotate_to(bones: &mut [VirtualBone], index: usize, rotation: Quat, weight: f32) {
        if weight <= 0.0 || index >= bones.len() {
            return;
        }
        let mut q = rotation_delta(bones[index].solver_rotation, rotation);
        if weight < 1.0 {
            q = Quat::IDENTITY.slerp(q, weight);
        }
        Self::rotate_by(bones, index, q);
    }

    /// Swings the rotations of `bones[index..]` so that `bones[index]` points at
    /// `swing_target`. Positions are left as they are.
    pub fn swing_rotation(bones: &mut [VirtualBone], index: usize, swing_target: Vec3, weight: f32) {
        if weight <= 0.0 || index >= bones.len() {
            return;
        }
        let bone = &bones[index];
        let mut q = from_to_rotation(
            bone.solver_rotation * bone.axis,
            swing_target - bone.solver_position,
        );
        if weight < 1.0 {
            q = quat_lerp(Quat::IDENTITY, q, weight);
        }
        for bone in bones.iter_mut().skip(index) {
            bone.solver_rotation = (q * bone.solver_rotation).normalize();
        }
    }

    /// Law of cosines solve of the `first -> second -> third` triangle.
    ///
    /// The target distance is clamped into `[|l1 - l2|, l1 + l2]` so unreachable
    /// targets fully extend the chain towards the target. The middle joint
    /// bends towards `target - root` crossed with `bend_normal`; a degenerate
    /// normal falls back to an arbitrary perpendicular.
    pub fn solve_trigonometric(
        bones: &mut [VirtualBone],
        first: usize,
        second: usize,
        third: usize,
        target_position: Vec3,
        bend_normal: Vec3,
        weight: f32,
    ) {
        if weight <= 0.0 || third >= bones.len() {
            return;
        }

        let target = lerp_clamped(bones[third].solver_position, target_position, weight);
        let root = bones[first].solver_position;
        let dir = target - root;
        let distance = dir.length();
        if distance <= f32::EPSILON {
            return;
        }

        let sqr_mag_1 = (bones[second].solver_position - root).length_squared();
        let sqr_mag_2 = (bones[third].solver_position - bones[second].solver_position).length_squared();
        let len_1 = sqr_mag_1.sqrt();
        let len_2 = sqr_mag_2.sqrt();
        if len_1 <= f32::EPSILON || len_2 <= f32::EPSILON {
            return;
        }
        let reach = distance.max((len_1 - len_2).abs()).min(len_1 + len_2);

        let bend_direction = dir.cross(bend_normal);
        let to_bend_point =
            direction_to_bend_point(dir / distance, reach, bend_direction, sqr_mag_1, sqr_mag_2);

        let q1 = from_to_rotation(bones[second].solver_position - root, to_bend_point);
        Self::rotate_around_point(bones, first, root, q1);

        let mid = bones[second].solver_position;
        let q2 = from_to_rotation(bones[third].solver_position - mid, target - mid);
        Self::rotate_around_point(bones, second, mid, q2);
    }

    /// Single-pass-per-iteration FABRIK over the whole chain followed by
    /// rotation swings.
    #[allow(clippy::too_many_arguments)]
    pub fn solve_fabrik(
        bones: &mut [VirtualBone],
        start_position: Vec3,
        target_position: Vec3,
        weight: f32,
        min_normalized_target_distance: f32,
        iterations: usize,
        length: f32,
        start_offset: Vec3,
    ) {
        let count = bones.len();
        if weight <= 0.0 || count < 2 {
            return;
        }

        let mut target = target_position;
        if min_normalized_target_distance > 0.0 {
            let to_target = target - start_position;
            let target_length = to_target.length();
            if target_length > f32::EPSILON {
                let limited = start_position
                    + (to_target / target_length)
                        * (length * min_normalized_target_distance).max(target_length);
                target = lerp_clamped(target, limited, weight);
            }
        }

        for iteration in 0..iterations {
            // Backward
            bones[count - 1].solver_position =
                lerp_clamped(bones[count - 1].solver_position, target, weight);
            for i in (0..count - 1).rev() {
                bones[i].solver_position = fabrik_joint(
                    bones[i].solver_position,
                    bones[i + 1].solver_position,
                    bones[i].length,
                );
            }

            // Forward
            if iteration == 0 {
                for bone in bones.iter_mut() {
                    bone.solver_position += start_offset;
                }
            }
            bones[0].solver_position = start_position;
            for i in 1..count {
                bones[i].solver_position = fabrik_joint(
                    bones[i].solver_position,
                    bones[i - 1].solver_position,
                    bones[i - 1].length,
                );
            }
        }

        for i in 0..count - 1 {
            let next = bones[i + 1].solver_position;
            Self::swing_rotation(bones, i, next, 1.0);
        }
    }

    pub fn solve_ccd(bones: &mut [VirtualBone], target_position: Vec3, weight: f32, iterations: usize) {
        let count = bones.len();
        if weight <= 0.0 || count < 2 {
            return;
        }
        for _ in 0..iterations {
            for i in (0..count - 1).rev() {
                let to_last = bones[count - 1].solver_position - bones[i].solver_position;
                let to_target = target_position - bones[i].solver_position;
                let mut q = from_to_rotation(to_last, to_target);
                if weight < 1.0 {
                    q = quat_lerp(Quat::IDENTITY, q, weight);
                }
                Self::rotate_by(bones, i, q);
            }
        }
    }
}

/// Elastic reach for a `first -> first + 1 -> first + 2` limb.
///
/// Both segments are scaled by `length_mlp` and by the stretch curve sampled at
/// the reach ratio (target distance over limb length), blended in by
/// `position_weight`. Bones past `first + 2` move with the end bone. An empty
/// curve, or a constant curve of 1.0, with `length_mlp` of 1.0 leaves the chain
/// untouched.
pub fn stretch_two_bone(
    bones: &mut [VirtualBone],
    first: usize,
    target: Vec3,
    length_mlp: f32,
    stretch_curve: &FloatCurve,
    position_weight: f32,
) {
    let mid = first + 1;
    let end = first + 2;
    if end >= bones.len() {
        return;
    }

    let upper = bones[mid].solver_position - bones[first].solver_position;
    let lower = bones[end].solver_position - bones[mid].solver_position;
    let limb_length = (upper.length() + lower.length()) * length_mlp;
    if limb_length <= f32::EPSILON {
        return;
    }

    let curve_value = if stretch_curve.is_empty() {
        1.0
    } else {
        stretch_curve.evaluate(bones[first].solver_position.distance(target) / limb_length)
    };
    let stretch = 1.0 + (curve_value - 1.0) * position_weight.clamp(0.0, 1.0);
    let scale = length_mlp * stretch;
    if scale == 1.0 {
        return;
    }

    let mid_add = upper * (scale - 1.0);
    let end_add = lower * (scale - 1.0);
    bones[mid].solver_position += mid_add;
    for bone in bones.iter_mut().skip(end) {
        bone.solver_position += mid_add + end_add;
    }
}

fn fabrik_joint(position: Vec3, anchor: Vec3, length: f32) -> Vec3 {
    anchor + (position - anchor).normalize_or_zero() * length
}

fn direction_to_bend_point(
    direction: Vec3,
    reach: f32,
    bend_direction: Vec3,
    sqr_mag_1: f32,
    sqr_mag_2: f32,
) -> Vec3 {
    let x = (reach * reach + (sqr_mag_1 - sqr_mag_2)) / 2.0 / reach;
    let y = (sqr_mag_1 - x * x).max(0.0).sqrt();
    look_rotation(direction, bend_direction) * Vec3::new(0.0, y, x)
}
