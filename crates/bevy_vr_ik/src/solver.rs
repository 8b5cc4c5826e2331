use bevy_log::{debug, info, warn};
use bevy_math::{Quat, Vec3};
use bevy_reflect::Reflect;
use bevy_vr_ik_core::{
    errors::ConfigurationError,
    math::{FORWARD, UP, flatten, look_rotation, quat_slerp},
    skeleton::{BodyBones, BodySlot, BoneTransform, Pose, Side, Skeleton},
    virtual_bone::VirtualBone,
};

use crate::{
    arm::{Arm, guess_hand_orientations},
    body_part::{BodyLayout, BodyPart, SlotPoses},
    input::{SolveContext, TrackingInput},
    leg::Leg,
    locomotion::{
        AnimatedContext, AnimatedLocomotion, AnimatorParameters, FootstepEvent, PelvisBlocking,
        ProceduralContext, ProceduralLocomotion, SupportLegTracker,
    },
    settings::{ArmSettings, LocomotionMode, VrIkSettings},
    spine::{Spine, SpineSolveContext},
    twist::TwistRelaxer,
};

/// Where an extra position offset is added for one frame.
#[derive(Reflect, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionOffset {
    Pelvis,
    Chest,
    Head,
    LeftHand,
    RightHand,
    LeftFoot,
    RightFoot,
    LeftHeel,
    RightHeel,
}

/// Where an extra rotation offset is added for one frame.
#[derive(Reflect, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotationOffset {
    Pelvis,
    Chest,
    Head,
}

/// Full body solver for a character tracked at the head and hands, and
/// optionally at the pelvis and feet.
///
/// Every [`update`](Self::update) samples the animated pose, solves the body
/// towards the tracked targets and returns the solved world pose. The root of
/// the character is moved by locomotion through [`root`](Self::root).
#[derive(Clone)]
pub struct VrIkSolver {
    skeleton: Skeleton,
    bones: BodyBones,
    layout: BodyLayout,
    settings: VrIkSettings,
    /// Body slot of every skeleton bone that is mapped to one.
    bone_slots: Vec<Option<BodySlot>>,

    placement: BoneTransform,
    animated_local: Pose,

    root_bone: VirtualBone,
    spine: Spine,
    arms: Vec<Arm>,
    legs: Vec<Leg>,
    hand_axes: [(Vec3, Vec3); 2],

    procedural: Option<ProceduralLocomotion>,
    animated: AnimatedLocomotion,
    pelvis_blocking: PelvisBlocking,
    support_leg: SupportLegTracker,
    twist_relaxer: TwistRelaxer,
    last_lod: u8,

    solved_pose: Pose,
    solved_local: Pose,
    parameters: AnimatorParameters,
    events: Vec<FootstepEvent>,
}

impl VrIkSolver {
    pub fn new(skeleton: Skeleton, bones: BodyBones, settings: VrIkSettings) -> Result<Self, ConfigurationError> {
        if skeleton.is_empty() {
            return Err(ConfigurationError::EmptySkeleton);
        }
        settings.validate()?;
        bones.validate(&skeleton)?;

        let layout = BodyLayout::from_bones(&bones);
        let twist_relaxer = TwistRelaxer::new(&skeleton, &settings.twist_relaxers)?;
        let hand_axes = [
            hand_axes(&skeleton, &bones, settings.arm(Side::Left), Side::Left)?,
            hand_axes(&skeleton, &bones, settings.arm(Side::Right), Side::Right)?,
        ];

        let mut bone_slots = vec![None; skeleton.len()];
        for slot in BodySlot::ALL {
            if let Some(bone) = bones.get(slot)
                && let Some(entry) = bone_slots.get_mut(bone)
            {
                *entry = Some(slot);
            }
        }

        let animated_local = skeleton.rest_pose();
        let placement = BoneTransform::IDENTITY;
        let world = skeleton.to_world(&animated_local, &placement, settings.scale);
        let poses = SlotPoses::from_pose(&world, &bones);

        let arms = Side::BOTH
            .iter()
            .map(|&side| Arm::new(side, layout.has_shoulder(side), &poses, hand_axes[side.index()]))
            .collect();
        let legs = if layout.has_legs {
            Side::BOTH
                .iter()
                .map(|&side| Leg::new(side, layout.has_toes, &poses))
                .collect()
        } else {
            vec![]
        };
        let procedural = layout
            .has_legs
            .then(|| ProceduralLocomotion::new(&poses, layout.has_toes));
        let mut pelvis_blocking = PelvisBlocking::default();
        pelvis_blocking.reset(poses.position(BodySlot::Pelvis));

        info!(
            "Built VR IK solver for {} bones (chest: {}, neck: {}, legs: {}, toes: {})",
            skeleton.len(),
            layout.has_chest,
            layout.has_neck,
            layout.has_legs,
            layout.has_toes,
        );
        warn_plant_feet(&settings, &layout);

        Ok(Self {
            root_bone: VirtualBone::new(poses.position(BodySlot::Root), poses.rotation(BodySlot::Root)),
            spine: Spine::new(layout.has_chest, layout.has_neck, &poses),
            arms,
            legs,
            hand_axes,
            procedural,
            animated: AnimatedLocomotion::default(),
            pelvis_blocking,
            support_leg: SupportLegTracker::default(),
            twist_relaxer,
            last_lod: settings.lod,
            solved_local: animated_local.clone(),
            solved_pose: world,
            parameters: AnimatorParameters {
                speed: 1.0,
                ..Default::default()
            },
            events: vec![],
            skeleton,
            bones,
            layout,
            settings,
            bone_slots,
            placement,
            animated_local,
        })
    }

    pub fn settings(&self) -> &VrIkSettings {
        &self.settings
    }

    /// Replaces the settings. The solver keeps its state, except that the arms
    /// are rebound when their hand axes change and locomotion restarts when
    /// its mode changes.
    pub fn set_settings(&mut self, settings: VrIkSettings) -> Result<(), ConfigurationError> {
        settings.validate()?;
        let twist_relaxer = TwistRelaxer::new(&self.skeleton, &settings.twist_relaxers)?;
        let hand_axes = [
            hand_axes(&self.skeleton, &self.bones, settings.arm(Side::Left), Side::Left)?,
            hand_axes(&self.skeleton, &self.bones, settings.arm(Side::Right), Side::Right)?,
        ];

        let mode_changed = settings.locomotion.mode != self.settings.locomotion.mode;
        let axes_changed = hand_axes != self.hand_axes;
        let scale_changed = settings.scale != self.settings.scale;
        warn_plant_feet(&settings, &self.layout);
        self.settings = settings;
        self.twist_relaxer = twist_relaxer;
        self.hand_axes = hand_axes;

        if axes_changed || scale_changed {
            let poses = self.animated_slots();
            for arm in self.arms.iter_mut() {
                let side = arm.side();
                *arm = Arm::new(side, self.layout.has_shoulder(side), &poses, hand_axes[side.index()]);
            }
            if scale_changed {
                self.spine = Spine::new(self.layout.has_chest, self.layout.has_neck, &poses);
                for leg in self.legs.iter_mut() {
                    *leg = Leg::new(leg.side(), self.layout.has_toes, &poses);
                }
            }
        }
        if mode_changed || scale_changed {
            debug!("Locomotion restarted after a settings change");
            self.reset();
        }
        Ok(())
    }

    /// Parent relative pose the next update starts from, usually this frame's
    /// animation. Bones missing from `pose` use their bind transform.
    pub fn set_animated_pose(&mut self, pose: Pose) {
        self.animated_local = pose;
    }

    /// World transform of the character. Locomotion moves it while solving.
    pub fn root(&self) -> BoneTransform {
        self.placement
    }

    /// Places the character. Call [`reset`](Self::reset) after a teleport.
    pub fn set_root(&mut self, root: BoneTransform) {
        self.placement = root;
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// World space result of the last update.
    pub fn solved_pose(&self) -> &Pose {
        &self.solved_pose
    }

    /// Parent relative result of the last update, for writing back into an
    /// animation system.
    pub fn solved_local_pose(&self) -> &Pose {
        &self.solved_local
    }

    pub fn animator_parameters(&self) -> &AnimatorParameters {
        &self.parameters
    }

    /// Steps started and finished during the last update.
    pub fn footstep_events(&self) -> &[FootstepEvent] {
        &self.events
    }

    pub fn support_leg(&self) -> Option<Side> {
        self.support_leg.current()
    }

    pub fn add_position_offset(&mut self, target: PositionOffset, offset: Vec3) {
        match target {
            PositionOffset::Pelvis => self.spine.pelvis_position_offset += offset,
            PositionOffset::Chest => self.spine.chest_position_offset += offset,
            PositionOffset::Head => self.spine.head_position_offset += offset,
            PositionOffset::LeftHand => self.arms[Side::Left.index()].hand_position_offset += offset,
            PositionOffset::RightHand => self.arms[Side::Right.index()].hand_position_offset += offset,
            PositionOffset::LeftFoot | PositionOffset::RightFoot => {
                let side = if target == PositionOffset::LeftFoot { Side::Left } else { Side::Right };
                if let Some(leg) = self.legs.get_mut(side.index()) {
                    leg.foot_position_offset += offset;
                }
            }
            PositionOffset::LeftHeel | PositionOffset::RightHeel => {
                let side = if target == PositionOffset::LeftHeel { Side::Left } else { Side::Right };
                if let Some(leg) = self.legs.get_mut(side.index()) {
                    leg.heel_position_offset += offset;
                }
            }
        }
    }

    pub fn add_rotation_offset(&mut self, target: RotationOffset, offset: Quat) {
        let current = match target {
            RotationOffset::Pelvis => &mut self.spine.pelvis_rotation_offset,
            RotationOffset::Chest => &mut self.spine.chest_rotation_offset,
            RotationOffset::Head => &mut self.spine.head_rotation_offset,
        };
        *current = offset * *current;
    }

    /// Moves the character and its planted feet with a moving platform.
    /// `delta_rotation` turns around `pivot` after the translation.
    pub fn add_platform_motion(&mut self, delta_position: Vec3, delta_rotation: Quat, pivot: Vec3) {
        self.placement.translation += delta_position;
        self.placement = BoneTransform::new(
            pivot + delta_rotation * (self.placement.translation - pivot),
            delta_rotation * self.placement.rotation,
        );

        if let Some(procedural) = &mut self.procedural {
            procedural.add_delta_position(delta_position);
            procedural.add_delta_rotation(delta_rotation, pivot);
        }
        self.animated.add_delta_position(delta_position);
        self.animated.add_delta_rotation(delta_rotation, pivot);
        self.pelvis_blocking.add_delta_position(delta_position);
        self.spine.face_direction = delta_rotation * self.spine.face_direction;
    }

    /// Forgets everything locomotion remembers, as needed after a teleport.
    pub fn reset(&mut self) {
        let poses = self.animated_slots();
        self.read(&poses);
        self.spine.face_direction = self.root_bone.read_rotation * FORWARD;
        self.reset_locomotion(&poses);
    }

    fn reset_locomotion(&mut self, poses: &SlotPoses) {
        if let Some(procedural) = &mut self.procedural {
            procedural.reset(poses, self.layout.has_toes);
        }
        self.animated.reset();
        self.support_leg.reset();
        self.pelvis_blocking.reset(poses.position(BodySlot::Pelvis));
        self.events.clear();
    }

    fn animated_slots(&self) -> SlotPoses {
        let world = self
            .skeleton
            .to_world(&self.animated_local, &self.placement, self.settings.scale);
        SlotPoses::from_pose(&world, &self.bones)
    }

    fn read(&mut self, poses: &SlotPoses) {
        self.root_bone
            .read(poses.position(BodySlot::Root), poses.rotation(BodySlot::Root));
        self.spine.read(poses);
        for arm in self.arms.iter_mut() {
            arm.read(poses);
        }
        for leg in self.legs.iter_mut() {
            leg.read(poses);
        }
    }

    /// Solves one frame and returns the solved world pose.
    pub fn update(&mut self, input: &TrackingInput, ctx: &SolveContext) -> &Pose {
        self.events.clear();
        let lod = self.settings.lod;
        let was_culled = self.last_lod >= 2;
        self.last_lod = lod;

        if lod >= 2 {
            self.cull(input);
            return &self.solved_pose;
        }

        let locomotion = &self.settings.locomotion;
        if locomotion.mode == LocomotionMode::Animated && locomotion.weight > 0.0 {
            self.placement.translation += ctx.animator.delta_position;
        }

        let world = self
            .skeleton
            .to_world(&self.animated_local, &self.placement, self.settings.scale);
        let poses = SlotPoses::from_pose(&world, &self.bones);
        self.read(&poses);
        if was_culled {
            debug!("Solving again after being culled, locomotion restarts");
            self.spine.face_direction = self.root_bone.read_rotation * FORWARD;
            self.reset_locomotion(&poses);
        }

        self.solve(input, ctx, lod);
        self.write(world, lod);
        &self.solved_pose
    }

    fn solve(&mut self, input: &TrackingInput, ctx: &SolveContext, lod: u8) {
        let Self {
            settings,
            layout,
            root_bone,
            spine,
            arms,
            legs,
            procedural,
            animated,
            pelvis_blocking,
            support_leg,
            parameters,
            events,
            ..
        } = self;
        let settings = &*settings;
        let scale = settings.scale;
        let delta_time = ctx.delta_time;
        let locomotion = &settings.locomotion;

        spine.set_targets(input.head, input.pelvis, input.chest_goal);
        for arm in arms.iter_mut() {
            let side = arm.side();
            arm.set_target(input.hand(side), input.elbow_goal(side));
        }
        for leg in legs.iter_mut() {
            let side = leg.side();
            leg.set_target(input.foot(side), input.knee_goal(side));
        }

        spine.pre_solve(&settings.spine);
        for arm in arms.iter_mut() {
            arm.pre_solve(settings.arm(arm.side()));
        }
        for leg in legs.iter_mut() {
            leg.pre_solve(settings.leg(leg.side()));
        }

        for arm in arms.iter_mut() {
            arm.apply_offsets();
        }
        spine.apply_offsets(&settings.spine, scale);

        let mut max_root_angle = settings.spine.max_root_angle;
        if locomotion.mode == LocomotionMode::Animated && locomotion.weight > 0.0 {
            max_root_angle = animated.solve(
                &locomotion.animated,
                AnimatedContext {
                    root_bone: &mut *root_bone,
                    spine: &*spine,
                    feedback: &ctx.animator,
                    root_heading_offset: settings.spine.root_heading_offset,
                    weight: locomotion.weight,
                    scale,
                    delta_time,
                },
            );
            *parameters = *animated.parameters();
        }

        let hand_positions = [arms[0].position, arms[1].position];
        spine.solve(
            &settings.spine,
            SpineSolveContext {
                root_bone: &mut *root_bone,
                legs: legs.as_mut_slice(),
                hand_positions,
                max_root_angle,
                lod,
                scale,
            },
        );

        let mut body_offset = Vec3::ZERO;
        if locomotion.mode == LocomotionMode::Procedural
            && locomotion.weight > 0.0
            && let Some(procedural) = procedural.as_mut()
        {
            body_offset = procedural.solve(
                &locomotion.procedural,
                ProceduralContext {
                    root_bone: &mut *root_bone,
                    spine: &*spine,
                    legs: legs.as_mut_slice(),
                    leg_settings: [&settings.left_leg, &settings.right_leg],
                    hand_positions,
                    support_leg: support_leg.current(),
                    ik_position_weight: settings.ik_position_weight,
                    weight: locomotion.weight,
                    scale,
                    delta_time,
                    raycaster: ctx.raycaster,
                },
            );
            events.extend_from_slice(procedural.events());
        }

        if layout.has_legs {
            for leg in legs.iter_mut() {
                leg.apply_offsets(settings.leg(leg.side()));
            }
            // Planting the feet converges pelvis and legs over two passes
            let passes = if settings.plant_feet && lod < 1 { 2 } else { 1 };
            for pass in 0..passes {
                let planted = passes == 2;
                spine.inverse_translate_to_head(legs, planted, planted, body_offset, 1.0);
                let pelvis = spine.pelvis();
                let (position, rotation) = (pelvis.solver_position, pelvis.solver_rotation);
                for leg in legs.iter_mut() {
                    leg.translate_root(position, rotation);
                    leg.solve(settings.leg(leg.side()), pass == 0, lod);
                }
            }
        } else {
            spine.inverse_translate_to_head(legs, false, false, body_offset, 1.0);
        }

        let chest = spine.chest();
        let (position, rotation) = (chest.solver_position, chest.solver_rotation);
        for arm in arms.iter_mut() {
            arm.translate_root(position, rotation);
            arm.solve(settings.arm(arm.side()), lod);
        }

        spine.reset_offsets();
        for arm in arms.iter_mut() {
            arm.reset_offsets();
        }
        for leg in legs.iter_mut() {
            leg.reset_offsets();
        }

        if layout.has_legs {
            let up = root_bone.read_rotation * UP;
            let offset = pelvis_blocking.offset(
                &locomotion.procedural,
                spine.pelvis(),
                up,
                delta_time,
                ctx.raycaster,
            );
            spine.pelvis_position_offset += offset;
            spine.chest_position_offset += spine.pelvis_position_offset;

            let positions = [legs[0].last_bone().solver_position, legs[1].last_bone().solver_position];
            let planted = match procedural.as_ref() {
                Some(procedural) if locomotion.mode == LocomotionMode::Procedural => {
                    Side::BOTH.map(|side| procedural.is_planted(side))
                }
                _ => [true, true],
            };
            support_leg.update(positions, planted);
        }
    }

    /// Blends the solved bones over the animated pose and runs forward
    /// kinematics for everything in between.
    fn write(&mut self, read: Pose, lod: u8) {
        let mut solved = SlotPoses::default();
        solved.set(
            BodySlot::Root,
            self.root_bone.solver_position,
            self.root_bone.solver_rotation,
        );
        self.spine.write(&mut solved);
        for arm in &self.arms {
            arm.write(&mut solved);
        }
        for leg in &self.legs {
            leg.write(&mut solved);
        }

        let weight = self.settings.ik_position_weight;
        let scale = self.settings.scale;
        let mut world: Vec<BoneTransform> = Vec::with_capacity(self.skeleton.len());
        for (index, bone) in self.skeleton.bones().iter().enumerate() {
            let local = self.animated_local.get(index).unwrap_or(&bone.rest);
            let parent = match bone.parent {
                Some(parent) => world[parent],
                None => self.placement,
            };
            let forward_kinematics = parent.mul_scaled(local, scale);
            let transform = match self.bone_slots[index] {
                Some(slot) => {
                    let animated = read.get(index).copied().unwrap_or(forward_kinematics);
                    let translation = if writes_position(slot, lod) {
                        animated.translation.lerp(solved.position(slot), weight)
                    } else {
                        forward_kinematics.translation
                    };
                    BoneTransform::new(
                        translation,
                        quat_slerp(animated.rotation, solved.rotation(slot), weight),
                    )
                }
                None => forward_kinematics,
            };
            world.push(transform);
        }

        // Carry the character along with its root
        if let Some(root) = self.bones.root
            && self.skeleton.parent(root).is_none()
            && let (Some(before), Some(after)) = (read.get(root), world.get(root))
        {
            let delta_rotation = after.rotation * before.rotation.inverse();
            self.placement = BoneTransform::new(
                after.translation + delta_rotation * (self.placement.translation - before.translation),
                delta_rotation * self.placement.rotation,
            );
        }

        let mut pose = Pose::new(world);
        self.twist_relaxer.relax(&mut pose);
        self.solved_local = self.skeleton.to_local(&pose, &self.placement, scale);
        self.solved_pose = pose;
    }

    /// Culled: no solving, the root keeps following the head target so that
    /// the character is in place when it becomes visible again.
    fn cull(&mut self, input: &TrackingInput) {
        let head = input.head.unwrap_or(self.spine.head_target());
        if self.settings.locomotion.weight > 0.0
            && let Some(root) = self.bones.root
        {
            let world = self
                .skeleton
                .to_world(&self.animated_local, &self.placement, self.settings.scale);
            let root_world = world.get(root).copied().unwrap_or(self.placement);
            let up = root_world.rotation * UP;
            let translation = root_world.translation + flatten(head.position - root_world.translation, up);

            let face = flatten(head.rotation * self.spine.anchor_relative_to_head() * FORWARD, up);
            let delta_rotation = if face.length_squared() > f32::EPSILON {
                look_rotation(face, up) * root_world.rotation.inverse()
            } else {
                Quat::IDENTITY
            };
            self.placement = BoneTransform::new(
                translation + delta_rotation * (self.placement.translation - root_world.translation),
                delta_rotation * self.placement.rotation,
            );
        }

        self.solved_pose = self
            .skeleton
            .to_world(&self.animated_local, &self.placement, self.settings.scale);
        self.solved_local = self.animated_local.clone();
    }
}

/// Slots whose solved position is written. Everything else follows its
/// parent. Stretched limb bones are only written at full detail.
fn writes_position(slot: BodySlot, lod: u8) -> bool {
    match slot {
        BodySlot::Root | BodySlot::Pelvis => true,
        BodySlot::LeftForearm
        | BodySlot::LeftHand
        | BodySlot::RightForearm
        | BodySlot::RightHand
        | BodySlot::LeftCalf
        | BodySlot::LeftFoot
        | BodySlot::LeftToes
        | BodySlot::RightCalf
        | BodySlot::RightFoot
        | BodySlot::RightToes => lod < 1,
        _ => false,
    }
}

fn hand_axes(
    skeleton: &Skeleton,
    bones: &BodyBones,
    settings: &ArmSettings,
    side: Side,
) -> Result<(Vec3, Vec3), ConfigurationError> {
    if let (Some(wrist_to_palm), Some(palm_to_thumb)) = (
        settings.wrist_to_palm_axis.try_normalize(),
        settings.palm_to_thumb_axis.try_normalize(),
    ) {
        return Ok((wrist_to_palm, palm_to_thumb));
    }
    let axes = guess_hand_orientations(skeleton, bones, side)?;
    debug!(
        "Guessed {} hand axes: wrist to palm {}, palm to thumb {}",
        side.name(),
        axes.0,
        axes.1
    );
    Ok(axes)
}

fn warn_plant_feet(settings: &VrIkSettings, layout: &BodyLayout) {
    if layout.has_legs && settings.plant_feet && settings.spine.pelvis_position_weight > 0.0 {
        warn!("Planting the feet while the pelvis is tracked makes the legs fight the pelvis target, consider disabling plant_feet");
    }
}

#[cfg(test)]
mod test {
    use std::f32::consts::FRAC_PI_2;

    use bevy_vr_ik_core::environment::NoCollision;

    use super::*;
    use crate::{
        input::IkTarget,
        locomotion::{AnimatorFeedback, StepPhase},
        settings::TwistSolverSettings,
        test_rig::TestRig,
    };

    const DT: f32 = 1.0 / 60.0;

    fn solver(rig: TestRig, settings: VrIkSettings) -> VrIkSolver {
        VrIkSolver::new(rig.skeleton, rig.bones, settings).unwrap()
    }

    /// Head at rest, hands reaching forward and down, relative to `root`.
    fn reaching_input(rig: &TestRig, root: BoneTransform) -> TrackingInput {
        let poses = rig.rest_slots();
        let target = |position: Vec3, rotation: Quat| {
            IkTarget::new(root.transform_point(position), root.rotation * rotation)
        };
        TrackingInput::three_point(
            target(poses.position(BodySlot::Head), poses.rotation(BodySlot::Head)),
            target(Vec3::new(0.3, 1.2, 0.3), Quat::from_rotation_x(0.4)),
            target(Vec3::new(-0.3, 1.2, 0.3), Quat::from_rotation_x(0.4)),
        )
    }

    fn shift(input: &mut TrackingInput, delta: Vec3) {
        for target in [&mut input.head, &mut input.left_hand, &mut input.right_hand]
            .into_iter()
            .flatten()
        {
            target.position += delta;
        }
    }

    fn run(solver: &mut VrIkSolver, input: &TrackingInput, frames: usize) -> Vec<FootstepEvent> {
        let mut events = vec![];
        for _ in 0..frames {
            solver.update(input, &SolveContext::new(DT, &NoCollision));
            events.extend_from_slice(solver.footstep_events());
        }
        events
    }

    fn bone(solver: &VrIkSolver, slot: BodySlot) -> BoneTransform {
        let index = solver.bones.get(slot).unwrap();
        solver.solved_pose().get(index).copied().unwrap()
    }

    fn assert_reached(solver: &VrIkSolver, slot: BodySlot, target: Option<IkTarget>) {
        let target = target.unwrap();
        let solved = bone(solver, slot);
        assert!(
            solved.translation.distance(target.position) < 1e-3,
            "{slot:?} at {} instead of {}",
            solved.translation,
            target.position
        );
        assert!(solved.rotation.angle_between(target.rotation) < 1e-2);
    }

    #[test]
    fn test_three_point_tracking_reaches_targets() {
        let rig = TestRig::humanoid();
        let input = reaching_input(&rig, BoneTransform::IDENTITY);
        let mut solver = solver(rig, VrIkSettings::default());

        run(&mut solver, &input, 10);

        assert_reached(&solver, BodySlot::Head, input.head);
        assert_reached(&solver, BodySlot::LeftHand, input.left_hand);
        assert_reached(&solver, BodySlot::RightHand, input.right_hand);
        // Feet stay on the ground
        for slot in [BodySlot::LeftToes, BodySlot::RightToes] {
            assert!(bone(&solver, slot).translation.y.abs() < 1e-2);
        }
    }

    #[test]
    fn test_solved_local_pose_matches_world() {
        let rig = TestRig::humanoid();
        let input = reaching_input(&rig, BoneTransform::IDENTITY);
        let mut solver = solver(rig, VrIkSettings::default());
        run(&mut solver, &input, 3);

        let world = solver
            .skeleton()
            .to_world(solver.solved_local_pose(), &solver.root(), solver.settings().scale);
        for (a, b) in world.bones.iter().zip(solver.solved_pose().bones.iter()) {
            assert!(a.translation.abs_diff_eq(b.translation, 1e-4));
            assert!(a.rotation.angle_between(b.rotation) < 1e-3);
        }
    }

    #[test]
    fn test_zero_weight_keeps_animation() {
        let rig = TestRig::humanoid();
        let input = reaching_input(&rig, BoneTransform::IDENTITY);
        let rest = rig
            .skeleton
            .to_world(&rig.skeleton.rest_pose(), &BoneTransform::IDENTITY, 1.0);
        let mut solver = solver(
            rig,
            VrIkSettings {
                ik_position_weight: 0.0,
                ..Default::default()
            },
        );

        run(&mut solver, &input, 5);

        for (solved, animated) in solver.solved_pose().bones.iter().zip(rest.bones.iter()) {
            assert!(solved.translation.abs_diff_eq(animated.translation, 1e-4));
            assert!(solved.rotation.angle_between(animated.rotation) < 1e-3);
        }
    }

    #[test]
    fn test_support_leg_is_stable_when_standing() {
        let rig = TestRig::humanoid();
        let poses = rig.rest_slots();
        let input = TrackingInput::three_point(
            IkTarget::new(poses.position(BodySlot::Head), poses.rotation(BodySlot::Head)),
            IkTarget::new(poses.position(BodySlot::LeftHand), poses.rotation(BodySlot::LeftHand)),
            IkTarget::new(poses.position(BodySlot::RightHand), poses.rotation(BodySlot::RightHand)),
        );
        let mut solver = solver(rig, VrIkSettings::default());

        run(&mut solver, &input, 5);
        let support = solver.support_leg();
        assert!(support.is_some());
        for _ in 0..100 {
            run(&mut solver, &input, 1);
            assert_eq!(solver.support_leg(), support);
        }
    }

    #[test]
    fn test_walking_head_makes_the_feet_step() {
        let rig = TestRig::humanoid();
        let mut input = reaching_input(&rig, BoneTransform::IDENTITY);
        let mut solver = solver(rig, VrIkSettings::default());
        run(&mut solver, &input, 5);

        let mut events = vec![];
        for _ in 0..120 {
            shift(&mut input, Vec3::Z * 0.5 * DT);
            events.extend(run(&mut solver, &input, 1));
        }
        events.extend(run(&mut solver, &input, 60));

        assert!(events.iter().any(|e| e.phase == StepPhase::Lift));
        assert!(events.iter().any(|e| e.phase == StepPhase::Plant));
        // The character followed the head
        assert!(solver.root().translation.z > 0.5);
        assert_reached(&solver, BodySlot::Head, input.head);
    }

    #[test]
    fn test_culled_root_follows_head() {
        let rig = TestRig::humanoid();
        let mut input = reaching_input(&rig, BoneTransform::IDENTITY);
        let mut solver = solver(
            rig,
            VrIkSettings {
                lod: 2,
                ..Default::default()
            },
        );

        let head = input.head.as_mut().unwrap();
        head.position += Vec3::new(1.0, 0.0, 2.0);
        head.rotation = Quat::from_rotation_y(FRAC_PI_2) * head.rotation;
        run(&mut solver, &input, 1);

        let root = solver.root();
        assert!(root.translation.abs_diff_eq(Vec3::new(1.0, 0.0, 2.0), 1e-4));
        assert!((root.rotation * FORWARD).abs_diff_eq(Vec3::X, 1e-4));
        // Nothing solved: the hands stay animated
        let hand = bone(&solver, BodySlot::LeftHand);
        assert!(hand.translation.distance(input.left_hand.unwrap().position) > 0.1);

        // Coming back restarts locomotion at the new place without stepping
        let mut settings = solver.settings().clone();
        settings.lod = 0;
        solver.set_settings(settings).unwrap();
        let head = input.head;
        let rig = TestRig::humanoid();
        let mut input = reaching_input(&rig, root);
        input.head = head;

        let events = run(&mut solver, &input, 1);
        assert!(events.is_empty());
        assert!(solver.root().translation.distance(root.translation) < 0.1);
    }

    #[test]
    fn test_legless_body() {
        let rig = TestRig::legless();
        let input = reaching_input(&rig, BoneTransform::IDENTITY);
        let mut solver = solver(rig, VrIkSettings::default());

        let events = run(&mut solver, &input, 10);

        assert!(events.is_empty());
        assert_eq!(solver.support_leg(), None);
        assert_reached(&solver, BodySlot::Head, input.head);
        assert_reached(&solver, BodySlot::RightHand, input.right_hand);
    }

    /// The humanoid with some of its optional bones left unmapped.
    fn reduced_rig(chest: bool, neck: bool, shoulders: bool, toes: bool) -> TestRig {
        let mut rig = TestRig::humanoid();
        let bones = &mut rig.bones;
        if !chest {
            bones.chest = None;
        }
        if !neck {
            bones.neck = None;
        }
        if !shoulders {
            bones.left_shoulder = None;
            bones.right_shoulder = None;
        }
        if !toes {
            bones.left_toes = None;
            bones.right_toes = None;
        }
        rig
    }

    fn assert_finite(solver: &VrIkSolver) {
        for bone in solver.solved_pose().bones.iter().chain(&solver.solved_local_pose().bones) {
            assert!(bone.translation.is_finite() && bone.rotation.is_finite());
        }
        assert!(solver.root().translation.is_finite());
    }

    #[test]
    fn test_optional_bones_can_be_left_out() {
        for (chest, neck) in [(true, true), (true, false), (false, true), (false, false)] {
            let rig = reduced_rig(chest, neck, false, false);
            let input = reaching_input(&rig, BoneTransform::IDENTITY);
            let mut solver = solver(rig, VrIkSettings::default());

            run(&mut solver, &input, 10);

            assert_finite(&solver);
            assert_reached(&solver, BodySlot::Head, input.head);
            assert_reached(&solver, BodySlot::LeftHand, input.left_hand);
            assert_reached(&solver, BodySlot::RightHand, input.right_hand);
            for slot in [BodySlot::LeftFoot, BodySlot::RightFoot] {
                assert!(bone(&solver, slot).translation.y.abs() < 0.1);
            }
        }
    }

    #[test]
    fn test_tracked_pelvis_with_short_spines() {
        for (chest, neck) in [(true, true), (true, false), (false, true), (false, false)] {
            let rig = reduced_rig(chest, neck, true, true);
            let poses = rig.rest_slots();
            let mut input = reaching_input(&rig, BoneTransform::IDENTITY);
            input.pelvis = Some(IkTarget::new(
                poses.position(BodySlot::Pelvis),
                poses.rotation(BodySlot::Pelvis),
            ));
            let mut settings = VrIkSettings {
                plant_feet: false,
                ..Default::default()
            };
            settings.spine.pelvis_position_weight = 1.0;
            settings.spine.pelvis_rotation_weight = 1.0;
            let mut solver = solver(rig, settings);

            run(&mut solver, &input, 10);

            assert_finite(&solver);
            assert_reached(&solver, BodySlot::Head, input.head);
            assert_reached(&solver, BodySlot::LeftHand, input.left_hand);
        }
    }

    #[test]
    fn test_platform_motion_carries_the_character() {
        let rig = TestRig::humanoid();
        let mut input = reaching_input(&rig, BoneTransform::IDENTITY);
        let mut solver = solver(rig, VrIkSettings::default());
        run(&mut solver, &input, 60);
        let root = solver.root().translation;
        let toes = bone(&solver, BodySlot::LeftToes).translation;

        let delta = Vec3::new(0.0, 0.0, 1.0);
        solver.add_platform_motion(delta, Quat::IDENTITY, Vec3::ZERO);
        shift(&mut input, delta);
        let events = run(&mut solver, &input, 10);

        // Planted feet moved with the platform, so nothing needs to step
        assert!(events.is_empty());
        assert!(solver.root().translation.distance(root + delta) < 0.05);
        assert!(bone(&solver, BodySlot::LeftToes).translation.distance(toes + delta) < 0.01);
    }

    #[test]
    fn test_teleport_and_reset() {
        let rig = TestRig::humanoid();
        let mut input = reaching_input(&rig, BoneTransform::IDENTITY);
        let mut solver = solver(rig, VrIkSettings::default());
        run(&mut solver, &input, 60);

        let jump = Vec3::new(20.0, 0.0, -5.0);
        let root = solver.root();
        solver.set_root(BoneTransform::new(root.translation + jump, root.rotation));
        solver.reset();
        shift(&mut input, jump);

        let events = run(&mut solver, &input, 10);
        assert!(events.is_empty());
        assert!(solver.root().translation.distance(root.translation + jump) < 0.2);
        assert_reached(&solver, BodySlot::Head, input.head);
    }

    #[test]
    fn test_offsets_last_one_frame() {
        let rig = TestRig::humanoid();
        let input = reaching_input(&rig, BoneTransform::IDENTITY);
        let target = input.left_hand.unwrap().position;
        let mut solver = solver(rig, VrIkSettings::default());
        run(&mut solver, &input, 5);

        let offset = Vec3::new(0.0, 0.05, 0.0);
        solver.add_position_offset(PositionOffset::LeftHand, offset);
        run(&mut solver, &input, 1);
        assert!(bone(&solver, BodySlot::LeftHand).translation.distance(target + offset) < 1e-3);

        run(&mut solver, &input, 1);
        assert!(bone(&solver, BodySlot::LeftHand).translation.distance(target) < 1e-3);
    }

    #[test]
    fn test_animated_mode_follows_root_motion() {
        let rig = TestRig::humanoid();
        let input = reaching_input(&rig, BoneTransform::IDENTITY);
        let mut settings = VrIkSettings::default();
        settings.locomotion.mode = LocomotionMode::Animated;
        let mut solver = solver(rig, settings);

        let feedback = AnimatorFeedback {
            delta_position: Vec3::new(0.0, 0.0, 0.01),
            transition_tag: None,
        };
        for _ in 0..10 {
            solver.update(&input, &SolveContext::new(DT, &NoCollision).with_animator(feedback.clone()));
        }

        assert!((solver.root().translation.z - 0.1).abs() < 1e-3);
        assert!(!solver.animator_parameters().is_moving);
        assert!(solver.footstep_events().is_empty());
    }

    #[test]
    fn test_invalid_configuration() {
        let rig = TestRig::humanoid();
        let err = VrIkSolver::new(
            rig.skeleton.clone(),
            rig.bones.clone(),
            VrIkSettings {
                lod: 3,
                ..Default::default()
            },
        )
        .err();
        assert_eq!(err, Some(ConfigurationError::InvalidLod(3)));

        let mut bones = rig.bones.clone();
        bones.left_hand = None;
        let err = VrIkSolver::new(rig.skeleton.clone(), bones, VrIkSettings::default()).err();
        assert_eq!(err, Some(ConfigurationError::MissingBone(BodySlot::LeftHand)));

        let settings = VrIkSettings {
            twist_relaxers: vec![TwistSolverSettings {
                bone: "mixamorig:LeftElbow".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let err = VrIkSolver::new(rig.skeleton, rig.bones, settings).err();
        assert_eq!(
            err,
            Some(ConfigurationError::UnknownBone("mixamorig:LeftElbow".into()))
        );
    }

    #[test]
    fn test_twist_relaxer_keeps_the_hand() {
        let rig = TestRig::humanoid();
        let input = reaching_input(&rig, BoneTransform::IDENTITY);
        let settings = VrIkSettings {
            twist_relaxers: vec![TwistSolverSettings {
                bone: "mixamorig:LeftForeArm".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut solver = solver(rig, settings);
        run(&mut solver, &input, 3);

        // Relaxing only turns the forearm around its own axis
        assert_reached(&solver, BodySlot::LeftHand, input.left_hand);
    }
}
