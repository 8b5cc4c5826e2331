//! Solver configuration. Every struct is `#[serde(default)]`, so a settings
//! file only needs the values it changes:
//!
//! ```ron
//! (
//!     scale: 1.1,
//!     spine: (min_head_height: 0.7),
//!     locomotion: (mode: Animated),
//! )
//! ```

use bevy_math::{Vec2, Vec3};
use bevy_reflect::{Reflect, std_traits::ReflectDefault};
use bevy_vr_ik_core::{
    curve::FloatCurve, environment::LayerMask, errors::ConfigurationError, math::Interpolation,
    skeleton::Side,
};
use serde::{Deserialize, Serialize};

#[derive(Reflect, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct VrIkSettings {
    /// Uniform scale of the character relative to its bind pose.
    pub scale: f32,
    /// 0 solves everything, 1 skips the expensive refinements, 2 culls solving
    /// and only keeps the root under the head.
    pub lod: u8,
    /// Solve the legs twice so planted feet stay put while the pelvis moves.
    pub plant_feet: bool,
    /// Master blend between the animated pose and the solved pose.
    pub ik_position_weight: f32,
    pub spine: SpineSettings,
    pub left_arm: ArmSettings,
    pub right_arm: ArmSettings,
    pub left_leg: LegSettings,
    pub right_leg: LegSettings,
    pub locomotion: LocomotionSettings,
    pub twist_relaxers: Vec<TwistSolverSettings>,
}

impl Default for VrIkSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            lod: 0,
            plant_feet: true,
            ik_position_weight: 1.0,
            spine: SpineSettings::default(),
            left_arm: ArmSettings::default(),
            right_arm: ArmSettings::default(),
            left_leg: LegSettings::default(),
            right_leg: LegSettings::default(),
            locomotion: LocomotionSettings::default(),
            twist_relaxers: vec![],
        }
    }
}

#[derive(Reflect, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct SpineSettings {
    pub position_weight: f32,
    pub rotation_weight: f32,
    pub pelvis_position_weight: f32,
    pub pelvis_rotation_weight: f32,
    pub chest_goal_weight: f32,
    /// Lowest the head may go above the root, before scaling.
    pub min_head_height: f32,
    /// How much the pelvis follows the head's translation.
    pub body_pos_stiffness: f32,
    /// How much the pelvis follows the head's rotation.
    pub body_rot_stiffness: f32,
    /// How much the chest leaves the neck to rotate towards the head.
    pub neck_stiffness: f32,
    /// Rotation of the chest driven by hand positions.
    pub rotate_chest_by_hands: f32,
    pub chest_clamp_weight: f32,
    pub head_clamp_weight: f32,
    pub move_body_back_when_crouching: f32,
    /// How much the pelvis holds on to its animated position.
    pub maintain_pelvis_position: f32,
    /// Degrees the head may turn away from the root before the root follows.
    pub max_root_angle: f32,
    /// Degrees added to the root heading.
    pub root_heading_offset: f32,
}

impl Default for SpineSettings {
    fn default() -> Self {
        Self {
            position_weight: 1.0,
            rotation_weight: 1.0,
            pelvis_position_weight: 0.0,
            pelvis_rotation_weight: 0.0,
            chest_goal_weight: 0.0,
            min_head_height: 0.8,
            body_pos_stiffness: 0.55,
            body_rot_stiffness: 0.1,
            neck_stiffness: 0.2,
            rotate_chest_by_hands: 1.0,
            chest_clamp_weight: 0.5,
            head_clamp_weight: 0.6,
            move_body_back_when_crouching: 0.5,
            maintain_pelvis_position: 0.2,
            max_root_angle: 25.0,
            root_heading_offset: 0.0,
        }
    }
}

#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[reflect(Default)]
pub enum ShoulderRotationMode {
    /// Separate yaw and pitch of the shoulder, limited to a natural range.
    #[default]
    YawPitch,
    /// Shortest rotation of the shoulder towards the hand target.
    FromTo,
}

#[derive(Reflect, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct ArmSettings {
    pub position_weight: f32,
    pub rotation_weight: f32,
    pub shoulder_rotation_mode: ShoulderRotationMode,
    pub shoulder_rotation_weight: f32,
    pub shoulder_twist_weight: f32,
    pub shoulder_yaw_offset: f32,
    pub shoulder_pitch_offset: f32,
    pub bend_goal_weight: f32,
    /// Degrees to roll the elbow around the shoulder to hand axis.
    pub swivel_offset: f32,
    /// Local axis of the hand bone pointing from the wrist towards the palm.
    /// Zero means "guess from the bind pose".
    pub wrist_to_palm_axis: Vec3,
    /// Local axis of the hand bone pointing from the palm towards the thumb.
    /// Zero means "guess from the bind pose".
    pub palm_to_thumb_axis: Vec3,
    pub arm_length_mlp: f32,
    /// Bone length scale by reach ratio (target distance over arm length).
    pub stretch_curve: FloatCurve,
}

impl Default for ArmSettings {
    fn default() -> Self {
        Self {
            position_weight: 1.0,
            rotation_weight: 1.0,
            shoulder_rotation_mode: ShoulderRotationMode::YawPitch,
            shoulder_rotation_weight: 1.0,
            shoulder_twist_weight: 1.0,
            shoulder_yaw_offset: 45.0,
            shoulder_pitch_offset: -30.0,
            bend_goal_weight: 0.0,
            swivel_offset: 0.0,
            wrist_to_palm_axis: Vec3::ZERO,
            palm_to_thumb_axis: Vec3::ZERO,
            arm_length_mlp: 1.0,
            stretch_curve: FloatCurve::default(),
        }
    }
}

/// Unlike the arms, the legs have no hip repositioning. The thighs move only
/// with the pelvis, which the spine keeps within reach of both foot targets.
/// A foot target beyond that reach straightens the leg towards it.
#[derive(Reflect, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct LegSettings {
    pub position_weight: f32,
    pub rotation_weight: f32,
    pub bend_goal_weight: f32,
    /// Degrees to roll the knee around the hip to foot axis.
    pub swivel_offset: f32,
    /// How much the thigh twists so the knee points where the foot points.
    pub bend_to_target_weight: f32,
    pub leg_length_mlp: f32,
    pub stretch_curve: FloatCurve,
}

impl Default for LegSettings {
    fn default() -> Self {
        Self {
            position_weight: 0.0,
            rotation_weight: 0.0,
            bend_goal_weight: 0.0,
            swivel_offset: 0.0,
            bend_to_target_weight: 0.5,
            leg_length_mlp: 1.0,
            stretch_curve: FloatCurve::default(),
        }
    }
}

#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[reflect(Default)]
pub enum LocomotionMode {
    /// Feet are placed by the solver.
    #[default]
    Procedural,
    /// Feet come from an external animation driven by the emitted parameters.
    Animated,
}

#[derive(Reflect, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct LocomotionSettings {
    pub mode: LocomotionMode,
    pub weight: f32,
    pub procedural: ProceduralLocomotionSettings,
    pub animated: AnimatedLocomotionSettings,
}

impl Default for LocomotionSettings {
    fn default() -> Self {
        Self {
            mode: LocomotionMode::Procedural,
            weight: 1.0,
            procedural: ProceduralLocomotionSettings::default(),
            animated: AnimatedLocomotionSettings::default(),
        }
    }
}

#[derive(Reflect, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct ProceduralLocomotionSettings {
    /// Half the distance between the feet when standing.
    pub foot_distance: f32,
    /// Distance of the planted foot from its ideal spot that triggers a step.
    pub step_threshold: f32,
    /// Degrees the root may turn away from a foot before it steps.
    pub angle_threshold: f32,
    /// Lowers the step threshold when the centre of mass leans.
    pub com_angle_mlp: f32,
    /// Clamp of the centre of mass velocity used for prediction.
    pub max_velocity: f32,
    /// Seconds of centre of mass velocity to predict ahead.
    pub velocity_factor: f32,
    /// Leg stretch (relative to its length) that forces a step.
    pub max_leg_stretch: f32,
    /// Speed of the root following the feet.
    pub root_speed: f32,
    /// Steps per second.
    pub step_speed: f32,
    /// Foot lift by step progress.
    pub step_height: FloatCurve,
    /// Heel lift by step progress.
    pub heel_height: FloatCurve,
    /// Degrees of foot twist tolerated while standing.
    pub relax_leg_twist_min_angle: f32,
    /// Degrees per second at which a standing foot untwists.
    pub relax_leg_twist_speed: f32,
    pub step_interpolation: Interpolation,
    /// Centre of mass offset in root space.
    pub offset: Vec3,
    /// Cap of the pelvis bob caused by stepping.
    pub max_body_y_offset: f32,
    pub blocking_enabled: bool,
    pub blocking_layers: LayerMask,
    pub raycast_radius: f32,
    pub raycast_height: f32,
    /// Layers probed for the ground under each step. Empty disables probing.
    pub ground_layers: LayerMask,
    /// How far above and below a step target the ground is searched.
    pub ground_probe_height: f32,
}

impl Default for ProceduralLocomotionSettings {
    fn default() -> Self {
        Self {
            foot_distance: 0.3,
            step_threshold: 0.4,
            angle_threshold: 60.0,
            com_angle_mlp: 1.0,
            max_velocity: 0.4,
            velocity_factor: 0.4,
            max_leg_stretch: 1.0,
            root_speed: 20.0,
            step_speed: 3.0,
            step_height: FloatCurve::sine_pulse(0.03),
            heel_height: FloatCurve::sine_pulse(0.03),
            relax_leg_twist_min_angle: 20.0,
            relax_leg_twist_speed: 400.0,
            step_interpolation: Interpolation::InOutSine,
            offset: Vec3::ZERO,
            max_body_y_offset: 0.05,
            blocking_enabled: false,
            blocking_layers: LayerMask::NONE,
            raycast_radius: 0.2,
            raycast_height: 0.2,
            ground_layers: LayerMask::NONE,
            ground_probe_height: 0.5,
        }
    }
}

#[derive(Reflect, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct AnimatedLocomotionSettings {
    /// Smoothing time of the emitted velocity.
    pub animation_smooth_time: f32,
    /// Smoothing time of the emitted velocity while turning on the spot.
    pub turning_smooth_time: f32,
    /// Head speed (before scaling) that starts the moving state.
    pub move_threshold: f32,
    /// Seconds below threshold before the moving state ends.
    pub stop_debounce: f32,
    pub min_animation_speed: f32,
    pub max_animation_speed: f32,
    pub root_lerp_speed_while_moving: f32,
    pub root_lerp_speed_while_stopping: f32,
    pub root_lerp_speed_while_turning: f32,
    /// Furthest the root may lag behind the head, before scaling.
    pub max_root_offset: f32,
    pub max_root_angle_moving: f32,
    pub max_root_angle_standing: f32,
    pub step_length_mlp: f32,
    /// Root space (x, z) offset of the standing spot from the head.
    pub stand_offset: Vec2,
    /// Normalized turn below which the character does not turn.
    pub turn_dead_zone: f32,
    /// Transition tag that marks a stopping transition.
    pub stop_transition_tag: String,
}

impl Default for AnimatedLocomotionSettings {
    fn default() -> Self {
        Self {
            animation_smooth_time: 0.1,
            turning_smooth_time: 0.2,
            move_threshold: 0.3,
            stop_debounce: 0.05,
            min_animation_speed: 0.2,
            max_animation_speed: 3.0,
            root_lerp_speed_while_moving: 30.0,
            root_lerp_speed_while_stopping: 10.0,
            root_lerp_speed_while_turning: 10.0,
            max_root_offset: 0.5,
            max_root_angle_moving: 10.0,
            max_root_angle_standing: 90.0,
            step_length_mlp: 1.0,
            stand_offset: Vec2::ZERO,
            turn_dead_zone: 0.2,
            stop_transition_tag: "VRIK_Stop".into(),
        }
    }
}

#[derive(Reflect, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(default)]
pub struct TwistSolverSettings {
    /// Name of the bone to relax.
    pub bone: String,
    pub weight: f32,
    /// 0 follows the parent bone, 1 follows the child bone.
    pub parent_child_crossfade: f32,
    /// Degrees.
    pub twist_angle_offset: f32,
}

impl Default for TwistSolverSettings {
    fn default() -> Self {
        Self {
            bone: String::new(),
            weight: 1.0,
            parent_child_crossfade: 0.5,
            twist_angle_offset: 0.0,
        }
    }
}

fn check(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigurationError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigurationError::SettingOutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn check_weight(name: &'static str, value: f32) -> Result<(), ConfigurationError> {
    check(name, value, 0.0, 1.0)
}

fn check_curve(name: &'static str, curve: &FloatCurve) -> Result<(), ConfigurationError> {
    if !curve.is_sorted() {
        return Err(ConfigurationError::UnsortedCurve(name));
    }
    Ok(())
}

impl VrIkSettings {
    pub fn arm(&self, side: Side) -> &ArmSettings {
        match side {
            Side::Left => &self.left_arm,
            Side::Right => &self.right_arm,
        }
    }

    pub fn leg(&self, side: Side) -> &LegSettings {
        match side {
            Side::Left => &self.left_leg,
            Side::Right => &self.right_leg,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.scale > 0.0) || !self.scale.is_finite() {
            return Err(ConfigurationError::InvalidScale(self.scale));
        }
        if self.lod > 2 {
            return Err(ConfigurationError::InvalidLod(self.lod));
        }
        check_weight("ik_position_weight", self.ik_position_weight)?;

        let spine = &self.spine;
        check_weight("spine.position_weight", spine.position_weight)?;
        check_weight("spine.rotation_weight", spine.rotation_weight)?;
        check_weight("spine.pelvis_position_weight", spine.pelvis_position_weight)?;
        check_weight("spine.pelvis_rotation_weight", spine.pelvis_rotation_weight)?;
        check_weight("spine.chest_goal_weight", spine.chest_goal_weight)?;
        check_weight("spine.body_pos_stiffness", spine.body_pos_stiffness)?;
        check_weight("spine.body_rot_stiffness", spine.body_rot_stiffness)?;
        check_weight("spine.neck_stiffness", spine.neck_stiffness)?;
        check_weight("spine.rotate_chest_by_hands", spine.rotate_chest_by_hands)?;
        check_weight("spine.chest_clamp_weight", spine.chest_clamp_weight)?;
        check_weight("spine.head_clamp_weight", spine.head_clamp_weight)?;
        check_weight("spine.move_body_back_when_crouching", spine.move_body_back_when_crouching)?;
        check_weight("spine.maintain_pelvis_position", spine.maintain_pelvis_position)?;
        check("spine.min_head_height", spine.min_head_height, 0.0, 2.0)?;
        check("spine.max_root_angle", spine.max_root_angle, 0.0, 180.0)?;
        check("spine.root_heading_offset", spine.root_heading_offset, -180.0, 180.0)?;

        for arm in [&self.left_arm, &self.right_arm] {
            check_weight("arm.position_weight", arm.position_weight)?;
            check_weight("arm.rotation_weight", arm.rotation_weight)?;
            check_weight("arm.shoulder_rotation_weight", arm.shoulder_rotation_weight)?;
            check_weight("arm.shoulder_twist_weight", arm.shoulder_twist_weight)?;
            check_weight("arm.bend_goal_weight", arm.bend_goal_weight)?;
            check("arm.shoulder_yaw_offset", arm.shoulder_yaw_offset, -180.0, 180.0)?;
            check("arm.shoulder_pitch_offset", arm.shoulder_pitch_offset, -180.0, 180.0)?;
            check("arm.swivel_offset", arm.swivel_offset, -180.0, 180.0)?;
            check("arm.arm_length_mlp", arm.arm_length_mlp, 0.01, 2.0)?;
            check_curve("arm.stretch_curve", &arm.stretch_curve)?;
        }

        for leg in [&self.left_leg, &self.right_leg] {
            check_weight("leg.position_weight", leg.position_weight)?;
            check_weight("leg.rotation_weight", leg.rotation_weight)?;
            check_weight("leg.bend_goal_weight", leg.bend_goal_weight)?;
            check_weight("leg.bend_to_target_weight", leg.bend_to_target_weight)?;
            check("leg.swivel_offset", leg.swivel_offset, -180.0, 180.0)?;
            check("leg.leg_length_mlp", leg.leg_length_mlp, 0.01, 2.0)?;
            check_curve("leg.stretch_curve", &leg.stretch_curve)?;
        }

        let locomotion = &self.locomotion;
        check_weight("locomotion.weight", locomotion.weight)?;

        let procedural = &locomotion.procedural;
        check("procedural.foot_distance", procedural.foot_distance, 0.0, 0.99)?;
        check("procedural.step_threshold", procedural.step_threshold, 0.0, 1.0)?;
        check("procedural.angle_threshold", procedural.angle_threshold, 0.0, 180.0)?;
        check("procedural.com_angle_mlp", procedural.com_angle_mlp, 0.0, f32::MAX)?;
        check("procedural.max_velocity", procedural.max_velocity, 0.0, f32::MAX)?;
        check("procedural.velocity_factor", procedural.velocity_factor, 0.0, f32::MAX)?;
        check("procedural.max_leg_stretch", procedural.max_leg_stretch, 0.9, 1.0)?;
        check("procedural.root_speed", procedural.root_speed, 0.0, f32::MAX)?;
        check("procedural.step_speed", procedural.step_speed, 0.01, f32::MAX)?;
        check("procedural.relax_leg_twist_min_angle", procedural.relax_leg_twist_min_angle, 0.0, 360.0)?;
        check("procedural.relax_leg_twist_speed", procedural.relax_leg_twist_speed, 0.0, f32::MAX)?;
        check("procedural.max_body_y_offset", procedural.max_body_y_offset, 0.0, f32::MAX)?;
        check("procedural.raycast_radius", procedural.raycast_radius, 0.0, f32::MAX)?;
        check("procedural.raycast_height", procedural.raycast_height, 0.0, f32::MAX)?;
        check("procedural.ground_probe_height", procedural.ground_probe_height, 0.0, f32::MAX)?;
        check_curve("procedural.step_height", &procedural.step_height)?;
        check_curve("procedural.heel_height", &procedural.heel_height)?;

        let animated = &locomotion.animated;
        check("animated.animation_smooth_time", animated.animation_smooth_time, 0.0, f32::MAX)?;
        check("animated.turning_smooth_time", animated.turning_smooth_time, 0.0, f32::MAX)?;
        check("animated.move_threshold", animated.move_threshold, 0.0, f32::MAX)?;
        check("animated.stop_debounce", animated.stop_debounce, 0.0, f32::MAX)?;
        check("animated.min_animation_speed", animated.min_animation_speed, 0.0, animated.max_animation_speed)?;
        check("animated.max_animation_speed", animated.max_animation_speed, animated.min_animation_speed, f32::MAX)?;
        check("animated.max_root_offset", animated.max_root_offset, 0.0, f32::MAX)?;
        check("animated.max_root_angle_moving", animated.max_root_angle_moving, 0.0, 180.0)?;
        check("animated.max_root_angle_standing", animated.max_root_angle_standing, 0.0, 180.0)?;
        check("animated.step_length_mlp", animated.step_length_mlp, 0.01, f32::MAX)?;
        check("animated.turn_dead_zone", animated.turn_dead_zone, 0.0, 1.0)?;

        for twist in &self.twist_relaxers {
            check_weight("twist.weight", twist.weight)?;
            check_weight("twist.parent_child_crossfade", twist.parent_child_crossfade)?;
            check("twist.twist_angle_offset", twist.twist_angle_offset, -180.0, 180.0)?;
        }

        Ok(())
    }
}
