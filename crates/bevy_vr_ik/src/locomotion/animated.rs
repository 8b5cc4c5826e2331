use bevy_math::{Quat, Vec3};
use bevy_reflect::{Reflect, std_traits::ReflectDefault};
use bevy_vr_ik_core::{
    math::{FORWARD, UP, flatten, lerp_f32, smooth_damp, smooth_damp_vec3, yaw_of},
    virtual_bone::VirtualBone,
};
use serde::{Deserialize, Serialize};

use super::{AnimatorFeedback, AnimatorParameters};
use crate::{settings::AnimatedLocomotionSettings, spine::Spine};

/// Smoothing time of the spine's max root angle between moving and standing.
const ROOT_ANGLE_SMOOTH_TIME: f32 = 0.2;

#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[reflect(Default)]
pub enum AnimatedLocomotionState {
    #[default]
    Idle,
    Moving,
    Turning,
    /// The animator is playing the stop transition.
    Stopping,
}

/// `is_moving` with hysteresis: starts above the threshold, keeps going above
/// 90 % of it and only stops after staying below it for the debounce time.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq)]
#[reflect(Default)]
pub struct MoveDetector {
    is_moving: bool,
    stop_timer: f32,
}

impl MoveDetector {
    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    pub fn update(&mut self, speed: f32, threshold: f32, debounce: f32, delta_time: f32) -> bool {
        let threshold = if self.is_moving { threshold * 0.9 } else { threshold };
        if speed > threshold {
            self.is_moving = true;
            self.stop_timer = 0.0;
        } else if self.is_moving {
            self.stop_timer += delta_time;
            if self.stop_timer >= debounce {
                self.is_moving = false;
                self.stop_timer = 0.0;
            }
        }
        self.is_moving
    }
}

/// What the animated locomotion reads from, and moves, this frame.
pub struct AnimatedContext<'a> {
    pub root_bone: &'a mut VirtualBone,
    pub spine: &'a Spine,
    pub feedback: &'a AnimatorFeedback,
    /// Degrees to the right the body should face relative to the head.
    pub root_heading_offset: f32,
    pub weight: f32,
    pub scale: f32,
    pub delta_time: f32,
}

/// Drives an external locomotion blend tree from the head target and keeps
/// the root within reach of the head.
#[derive(Reflect, Clone, Debug)]
pub struct AnimatedLocomotion {
    state: AnimatedLocomotionState,
    parameters: AnimatorParameters,
    mover: MoveDetector,
    first_frame: bool,
    last_head_target: Vec3,
    velocity_local: Vec3,
    velocity_local_velocity: Vec3,
    turn: f32,
    max_root_angle: f32,
    max_root_angle_velocity: f32,
    last_correction: Vec3,
}

impl Default for AnimatedLocomotion {
    fn default() -> Self {
        Self {
            state: AnimatedLocomotionState::Idle,
            parameters: AnimatorParameters {
                speed: 1.0,
                ..Default::default()
            },
            mover: MoveDetector::default(),
            first_frame: true,
            last_head_target: Vec3::ZERO,
            velocity_local: Vec3::ZERO,
            velocity_local_velocity: Vec3::ZERO,
            turn: 0.0,
            max_root_angle: 0.0,
            max_root_angle_velocity: 0.0,
            last_correction: Vec3::ZERO,
        }
    }
}

impl AnimatedLocomotion {
    /// Forgets velocities and smoothing, as after a teleport.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn state(&self) -> AnimatedLocomotionState {
        self.state
    }

    pub fn parameters(&self) -> &AnimatorParameters {
        &self.parameters
    }

    /// Root movement applied during the last solve.
    pub fn last_correction(&self) -> Vec3 {
        self.last_correction
    }

    pub fn add_delta_position(&mut self, delta: Vec3) {
        self.last_head_target += delta;
    }

    pub fn add_delta_rotation(&mut self, delta: Quat, pivot: Vec3) {
        self.last_head_target = pivot + delta * (self.last_head_target - pivot);
    }

    /// Updates the animator parameters and moves the root towards the head
    /// target. Returns the max root angle the spine should use this frame.
    pub fn solve(&mut self, settings: &AnimatedLocomotionSettings, ctx: AnimatedContext) -> f32 {
        let AnimatedContext {
            root_bone,
            spine,
            feedback,
            root_heading_offset,
            weight,
            scale,
            delta_time,
        } = ctx;

        if self.first_frame {
            self.max_root_angle = settings.max_root_angle_standing;
        }
        if delta_time <= 0.0 {
            return self.max_root_angle;
        }

        let up = root_bone.read_rotation * UP;
        let root_rotation = root_bone.solver_rotation;
        let root_position = root_bone.solver_position;

        let stand_offset = Vec3::new(settings.stand_offset.x, 0.0, settings.stand_offset.y);
        let head_target = spine.head_position + root_rotation * stand_offset * scale;
        if self.first_frame {
            self.last_head_target = head_target;
            self.first_frame = false;
        }
        let head_velocity = flatten((head_target - self.last_head_target) / delta_time, up);
        self.last_head_target = head_target;
        let offset = flatten(head_target - root_position, up);

        // Turning in place towards the head
        let head_forward = spine.head_rotation * spine.anchor_relative_to_head() * FORWARD;
        let yaw = yaw_of(root_rotation.inverse() * flatten(head_forward, up)).to_degrees();
        let mut turn_target = ((-yaw + root_heading_offset) / 90.0).clamp(-1.0, 1.0);
        if turn_target.abs() < settings.turn_dead_zone {
            turn_target = 0.0;
        }
        self.turn = lerp_f32(self.turn, turn_target, delta_time * 3.0);
        let turning = turn_target != 0.0;

        let target_local = root_rotation.inverse() * (head_velocity + offset) * weight * settings.step_length_mlp;
        let smooth_time = if turning && !self.mover.is_moving() {
            settings.turning_smooth_time
        } else {
            settings.animation_smooth_time
        };
        self.velocity_local = smooth_damp_vec3(
            self.velocity_local,
            target_local,
            &mut self.velocity_local_velocity,
            smooth_time,
            f32::INFINITY,
            delta_time,
        );

        let is_moving = self.mover.update(
            self.velocity_local.length(),
            settings.move_threshold * scale,
            settings.stop_debounce,
            delta_time,
        );

        // Match the clip speed to the head speed
        let head_speed = head_velocity.length();
        let animation_speed = flatten(feedback.delta_position, up).length() / delta_time;
        let target_speed = if is_moving && animation_speed > f32::EPSILON {
            (self.parameters.speed * head_speed / animation_speed)
                .clamp(settings.min_animation_speed, settings.max_animation_speed)
        } else {
            1.0
        };

        let stopping = feedback.transition_tag.as_deref() == Some(settings.stop_transition_tag.as_str());
        self.state = if stopping {
            AnimatedLocomotionState::Stopping
        } else if is_moving {
            AnimatedLocomotionState::Moving
        } else if turning {
            AnimatedLocomotionState::Turning
        } else {
            AnimatedLocomotionState::Idle
        };

        self.parameters = AnimatorParameters {
            horizontal: -self.velocity_local.x / scale,
            vertical: self.velocity_local.z / scale,
            turn: self.turn * weight,
            is_moving,
            speed: lerp_f32(self.parameters.speed, target_speed, delta_time * 3.0),
        };

        let max_root_angle = if is_moving {
            settings.max_root_angle_moving
        } else {
            settings.max_root_angle_standing
        };
        self.max_root_angle = smooth_damp(
            self.max_root_angle,
            max_root_angle,
            &mut self.max_root_angle_velocity,
            ROOT_ANGLE_SMOOTH_TIME,
            f32::INFINITY,
            delta_time,
        );

        // Pull the root under the head, never letting it fall further behind
        // than the max offset
        let lerp_speed = match self.state {
            AnimatedLocomotionState::Stopping => settings.root_lerp_speed_while_stopping,
            AnimatedLocomotionState::Moving => settings.root_lerp_speed_while_moving,
            AnimatedLocomotionState::Turning => settings.root_lerp_speed_while_turning,
            AnimatedLocomotionState::Idle => 0.0,
        };
        let lerp = (lerp_speed * head_speed.max(0.2) * delta_time).clamp(0.0, 1.0);
        let mut correction = offset * lerp;
        let remaining = offset - correction;
        correction += remaining - remaining.clamp_length_max(settings.max_root_offset * scale);
        correction *= weight.clamp(0.0, 1.0);

        root_bone.solver_position += correction;
        self.last_correction = correction;
        self.max_root_angle
    }
}
