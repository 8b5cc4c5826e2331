use bevy_math::{Quat, Vec3};
use bevy_reflect::Reflect;
use bevy_vr_ik_core::math::{
    Interpolation, lerp_clamped, lerp_f32, move_towards, quat_lerp, rotate_towards, smooth_damp,
};

use super::StepPhase;

/// Where one foot is planted, or where it is stepping from and to.
#[derive(Reflect, Clone, Debug)]
pub struct Footstep {
    /// Progress per second.
    pub step_speed: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub step_from: Vec3,
    pub step_to: Vec3,
    pub step_from_rotation: Quat,
    pub step_to_rotation: Quat,
    /// Root rotation the current step is heading for.
    pub step_to_root_rotation: Quat,
    /// Offset of this foot from the centre of the feet in root space.
    pub character_space_offset: Vec3,
    foot_relative_to_root: Quat,
    step_progress: f32,
    is_support_leg: bool,
    support_leg_weight: f32,
    support_leg_weight_velocity: f32,
    /// Height of the ground under the foot above the root plane.
    ground_from: f32,
    ground_to: f32,
    pub ground_offset: f32,
}

impl Footstep {
    pub fn new(root_rotation: Quat, position: Vec3, rotation: Quat, character_space_offset: Vec3) -> Self {
        let mut footstep = Self {
            step_speed: 3.0,
            position,
            rotation,
            step_from: position,
            step_to: position,
            step_from_rotation: rotation,
            step_to_rotation: rotation,
            step_to_root_rotation: root_rotation,
            character_space_offset,
            foot_relative_to_root: Quat::IDENTITY,
            step_progress: 1.0,
            is_support_leg: false,
            support_leg_weight: 0.0,
            support_leg_weight_velocity: 0.0,
            ground_from: 0.0,
            ground_to: 0.0,
            ground_offset: 0.0,
        };
        footstep.reset(root_rotation, position, rotation);
        footstep
    }

    /// Plants the foot where it is.
    pub fn reset(&mut self, root_rotation: Quat, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation;
        self.step_from = position;
        self.step_to = position;
        self.step_from_rotation = rotation;
        self.step_to_rotation = rotation;
        self.step_to_root_rotation = root_rotation;
        self.step_progress = 1.0;
        self.foot_relative_to_root = root_rotation.inverse() * rotation;
        self.ground_from = 0.0;
        self.ground_to = 0.0;
        self.ground_offset = 0.0;
    }

    /// 0 when a step starts, 1 once planted.
    pub fn step_progress(&self) -> f32 {
        self.step_progress
    }

    pub fn is_stepping(&self) -> bool {
        self.step_progress < 1.0
    }

    pub fn set_support_leg(&mut self, is_support_leg: bool) {
        self.is_support_leg = is_support_leg;
    }

    pub fn step_to(&mut self, position: Vec3, root_rotation: Quat) {
        self.step_from = self.position;
        self.step_to = position;
        self.step_from_rotation = self.rotation;
        self.step_to_root_rotation = root_rotation;
        self.step_to_rotation = root_rotation * self.foot_relative_to_root;
        self.ground_from = self.ground_offset;
        self.step_progress = 0.0;
    }

    /// Follows a moving step target while the foot is in the air.
    pub fn update_stepping(&mut self, position: Vec3, root_rotation: Quat, speed: f32, delta_time: f32) {
        let t = delta_time * speed;
        self.step_to = lerp_clamped(self.step_to, position, t);
        self.step_to_rotation = quat_lerp(self.step_to_rotation, root_rotation * self.foot_relative_to_root, t);
        self.step_to_root_rotation = self.step_to_rotation * self.foot_relative_to_root.inverse();
    }

    /// Slowly untwists a planted foot that is turned too far from the root.
    pub fn update_standing(&mut self, root_rotation: Quat, min_angle: f32, speed: f32, delta_time: f32) {
        if speed <= 0.0 || min_angle >= 180.0 {
            return;
        }
        let relaxed = root_rotation * self.foot_relative_to_root;
        let angle = self.rotation.angle_between(relaxed).to_degrees();
        if angle > min_angle {
            let max_degrees = (delta_time * speed * (1.0 - self.support_leg_weight)).min(angle - min_angle);
            self.rotation = rotate_towards(self.rotation, relaxed, max_degrees.to_radians());
        }
    }

    /// Sets the height of the ground the step will land on.
    pub fn set_ground(&mut self, height: f32) {
        self.ground_to = height;
        if !self.is_stepping() {
            self.ground_from = height;
            self.ground_offset = height;
        }
    }

    /// Advances the step. Returns [`StepPhase::Plant`] on the frame the foot
    /// lands.
    pub fn update(&mut self, interpolation: Interpolation, delta_time: f32) -> Option<StepPhase> {
        let target = if self.is_support_leg { 1.0 } else { 0.0 };
        self.support_leg_weight = smooth_damp(
            self.support_leg_weight,
            target,
            &mut self.support_leg_weight_velocity,
            0.2,
            f32::INFINITY,
            delta_time,
        );

        if !self.is_stepping() {
            return None;
        }

        self.step_progress = move_towards(self.step_progress, 1.0, delta_time * self.step_speed);
        let t = interpolation.sample(self.step_progress);
        self.position = self.step_from.lerp(self.step_to, t);
        self.rotation = quat_lerp(self.step_from_rotation, self.step_to_rotation, t);
        self.ground_offset = lerp_f32(self.ground_from, self.ground_to, t);

        (!self.is_stepping()).then_some(StepPhase::Plant)
    }

    pub fn add_delta_position(&mut self, delta: Vec3) {
        self.position += delta;
        self.step_from += delta;
        self.step_to += delta;
    }

    pub fn add_delta_rotation(&mut self, delta: Quat, pivot: Vec3) {
        let rotate = |p: Vec3| pivot + delta * (p - pivot);
        self.position = rotate(self.position);
        self.step_from = rotate(self.step_from);
        self.step_to = rotate(self.step_to);
        self.rotation = delta * self.rotation;
        self.step_from_rotation = delta * self.step_from_rotation;
        self.step_to_rotation = delta * self.step_to_rotation;
        self.step_to_root_rotation = delta * self.step_to_root_rotation;
    }
}
