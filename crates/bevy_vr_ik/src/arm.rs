use bevy_log::warn;
use bevy_math::{Quat, Vec3};
use bevy_reflect::Reflect;
use bevy_vr_ik_core::{
    errors::ConfigurationError,
    math::{
        BACK, DOWN, FORWARD, LEFT, UP, damper_value, from_to_rotation, lerp_clamped, look_rotation,
        quat_lerp, quat_slerp,
    },
    skeleton::{BodyBones, BodySlot, Side, Skeleton},
    virtual_bone::{VirtualBone, stretch_two_bone},
};

use crate::{
    body_part::{BodyPart, ChainRoot, SlotPoses},
    input::IkTarget,
    settings::{ArmSettings, ShoulderRotationMode},
};

/// Optional shoulder, upper arm, forearm and hand.
#[derive(Reflect, Clone, Debug)]
pub struct Arm {
    side: Side,
    has_shoulder: bool,
    pub bones: Vec<VirtualBone>,
    root: ChainRoot,

    ik_position: Vec3,
    ik_rotation: Quat,
    bend_goal: Option<Vec3>,
    missing_target_warned: bool,

    /// Hand target after weights and offsets.
    pub position: Vec3,
    pub rotation: Quat,
    wrist_to_palm_axis: Vec3,
    palm_to_thumb_axis: Vec3,
    chest_forward_axis: Vec3,
    chest_up_axis: Vec3,
    chest_rotation: Quat,
    chest_forward: Vec3,
    chest_up: Vec3,
    forearm_relative_to_upper_arm: Quat,
    /// Length of the whole chain this frame.
    mag: f32,

    pub hand_position_offset: Vec3,
}

impl Arm {
    /// `hand_axes` are the wrist to palm and palm to thumb directions in hand
    /// space.
    pub fn new(side: Side, has_shoulder: bool, poses: &SlotPoses, hand_axes: (Vec3, Vec3)) -> Self {
        let mut bones: Vec<VirtualBone> = Self::slots(side, has_shoulder)
            .iter()
            .map(|&slot| VirtualBone::new(poses.position(slot), poses.rotation(slot)))
            .collect();
        VirtualBone::bind_rest_lengths(&mut bones);

        let root_rotation = poses.rotation(BodySlot::Root);
        let chest_rotation = poses.rotation(BodySlot::Chest);
        let to_chest = chest_rotation.inverse();

        let hand = bones.len() - 1;
        let upper_arm = hand - 2;
        let elbow_offset = (bones[upper_arm + 1].read_position - bones[upper_arm].read_position)
            .cross(bones[hand].read_position - bones[upper_arm + 1].read_position);
        if elbow_offset.length_squared() < 1e-10 {
            warn!(
                "The {} arm is perfectly straight in its bind pose, its elbow direction is guessed from the hand",
                side.name()
            );
        }

        let ik_position = bones[hand].read_position;
        let ik_rotation = bones[hand].read_rotation;
        let mag = VirtualBone::pre_solve(&mut bones);

        Self {
            side,
            has_shoulder,
            root: ChainRoot {
                position: poses.position(BodySlot::Chest),
                rotation: chest_rotation,
            },
            ik_position,
            ik_rotation,
            bend_goal: None,
            missing_target_warned: false,
            position: ik_position,
            rotation: ik_rotation,
            wrist_to_palm_axis: hand_axes.0,
            palm_to_thumb_axis: hand_axes.1,
            chest_forward_axis: to_chest * (root_rotation * FORWARD),
            chest_up_axis: to_chest * (root_rotation * UP),
            chest_rotation,
            chest_forward: root_rotation * FORWARD,
            chest_up: root_rotation * UP,
            forearm_relative_to_upper_arm: Quat::IDENTITY,
            mag,
            hand_position_offset: Vec3::ZERO,
            bones,
        }
    }

    fn slots(side: Side, has_shoulder: bool) -> Vec<BodySlot> {
        let [shoulder, upper_arm, forearm, hand] = BodySlot::arm(side);
        if has_shoulder {
            vec![shoulder, upper_arm, forearm, hand]
        } else {
            vec![upper_arm, forearm, hand]
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    fn upper_arm_index(&self) -> usize {
        self.has_shoulder as usize
    }

    pub fn upper_arm(&self) -> &VirtualBone {
        &self.bones[self.upper_arm_index()]
    }

    pub fn hand(&self) -> &VirtualBone {
        &self.bones[self.bones.len() - 1]
    }

    /// Sets this frame's target. A missing hand target keeps the last known one.
    pub fn set_target(&mut self, target: Option<IkTarget>, bend_goal: Option<Vec3>) {
        match target {
            Some(target) => {
                self.ik_position = target.position;
                self.ik_rotation = target.rotation;
            }
            None if !self.missing_target_warned => {
                warn!(
                    "No {} hand target given, holding on to the last known hand pose",
                    self.side.name()
                );
                self.missing_target_warned = true;
            }
            None => {}
        }
        self.bend_goal = bend_goal;
    }

    pub fn pre_solve(&mut self, settings: &ArmSettings) {
        let (hand_position, hand_rotation) = (self.hand().solver_position, self.hand().solver_rotation);
        self.position = lerp_clamped(hand_position, self.ik_position, settings.position_weight);
        self.rotation = quat_lerp(hand_rotation, self.ik_rotation, settings.rotation_weight);

        self.mag = VirtualBone::pre_solve(&mut self.bones);
        let upper_arm = self.upper_arm_index();
        self.forearm_relative_to_upper_arm =
            self.bones[upper_arm].solver_rotation.inverse() * self.bones[upper_arm + 1].solver_rotation;
    }

    pub fn apply_offsets(&mut self) {
        self.position += self.hand_position_offset;
    }

    /// Re-attaches the arm to a chest that has moved.
    pub fn translate_root(&mut self, chest_position: Vec3, chest_rotation: Quat) {
        self.root.translate(&mut self.bones, chest_position, chest_rotation);
    }

    pub fn solve(&mut self, settings: &ArmSettings, lod: u8) {
        self.chest_rotation = look_rotation(
            self.root.rotation * self.chest_forward_axis,
            self.root.rotation * self.chest_up_axis,
        );
        self.chest_forward = self.chest_rotation * FORWARD;
        self.chest_up = self.chest_rotation * UP;

        let upper_arm = self.upper_arm_index();
        let forearm = upper_arm + 1;
        let hand = upper_arm + 2;

        if self.has_shoulder && settings.shoulder_rotation_weight > 0.0 && lod < 1 {
            match settings.shoulder_rotation_mode {
                ShoulderRotationMode::YawPitch => self.solve_yaw_pitch(settings),
                ShoulderRotationMode::FromTo => self.solve_from_to(settings),
            }
        } else {
            if lod < 1 {
                self.stretch(settings);
            }
            let bend_normal = self.bend_normal(settings, self.position - self.bones[upper_arm].solver_position);
            VirtualBone::solve_trigonometric(
                &mut self.bones,
                upper_arm,
                forearm,
                hand,
                self.position,
                bend_normal,
                settings.position_weight,
            );
        }

        if lod < 1 && settings.position_weight > 0.0 {
            // Forearm twist follows the upper arm
            let fixed = self.bones[upper_arm].solver_rotation * self.forearm_relative_to_upper_arm;
            let swing = from_to_rotation(
                fixed * self.bones[forearm].axis,
                self.bones[hand].solver_position - self.bones[forearm].solver_position,
            );
            VirtualBone::rotate_to(&mut self.bones, forearm, swing * fixed, settings.position_weight);
        }

        self.bones[hand].solver_rotation =
            quat_lerp(self.bones[hand].solver_rotation, self.rotation, settings.rotation_weight);
    }

    /// Outward direction of this arm in chest space.
    fn lateral(&self) -> Vec3 {
        self.chest_rotation * (LEFT * self.side.sign())
    }

    /// Elevation (degrees) of the hand seen from a point inside the chest,
    /// damped into the range the shoulder is allowed to lift.
    fn shoulder_pitch(&self, settings: &ArmSettings) -> f32 {
        let lateral = self.lateral();
        let reference = self.bones[0].solver_position - lateral * self.mag;
        let to_hand = self.position - reference;
        let elevation = to_hand.dot(self.chest_up).atan2(to_hand.dot(lateral)).to_degrees();
        let offset = settings.shoulder_pitch_offset;
        damper_value(elevation, -45.0 - offset, 45.0 - offset, 1.0)
    }

    fn solve_yaw_pitch(&mut self, settings: &ArmSettings) {
        let weight = settings.shoulder_rotation_weight * settings.position_weight;
        let lateral = self.lateral();
        let shoulder = &self.bones[0];

        // Yaw, measured from straight out towards forward
        let dir = (self.position - shoulder.solver_position).normalize_or_zero();
        let angle = dir.dot(self.chest_forward).atan2(dir.dot(lateral)).to_degrees();
        let flatness = 1.0 - dir.dot(self.chest_up).abs();
        let yaw = damper_value((angle - settings.shoulder_yaw_offset) * flatness, -20.0, 50.0, 0.7).to_radians();
        let yaw_target = lateral * yaw.cos() + self.chest_forward * yaw.sin();
        let yaw_rotation = from_to_rotation(shoulder.solver_rotation * shoulder.axis, yaw_target);

        // Pitch, lifting the shoulder as the hand goes up
        let pitch = self.shoulder_pitch(settings);
        let pitch_rotation = Quat::from_axis_angle(lateral.cross(self.chest_up).normalize_or_zero(), pitch.to_radians());

        let rotation = quat_lerp(Quat::IDENTITY, pitch_rotation * yaw_rotation, weight);
        VirtualBone::rotate_by(&mut self.bones, 0, rotation);

        self.stretch(settings);
        let bend_normal = self.bend_normal(settings, self.position - self.bones[1].solver_position);
        VirtualBone::solve_trigonometric(&mut self.bones, 1, 2, 3, self.position, bend_normal, settings.position_weight);

        self.twist_shoulder(settings, pitch);
    }

    fn solve_from_to(&mut self, settings: &ArmSettings) {
        let weight = 0.5 * settings.shoulder_rotation_weight * settings.position_weight;
        let shoulder = self.bones[0].solver_position;

        let rotation = from_to_rotation(
            (self.bones[1].solver_position - shoulder).normalize_or_zero() + self.chest_forward,
            self.position - shoulder,
        );
        VirtualBone::rotate_by(&mut self.bones, 0, quat_slerp(Quat::IDENTITY, rotation, weight));

        self.stretch(settings);
        let shoulder = self.bones[0].solver_position;
        let keep_bend = (self.bones[2].solver_position - shoulder).cross(self.bones[3].solver_position - shoulder);
        VirtualBone::solve_trigonometric(&mut self.bones, 0, 2, 3, self.position, keep_bend, weight);

        let bend_normal = self.bend_normal(settings, self.position - self.bones[1].solver_position);
        VirtualBone::solve_trigonometric(&mut self.bones, 1, 2, 3, self.position, bend_normal, settings.position_weight);

        let pitch = self.shoulder_pitch(settings);
        self.twist_shoulder(settings, pitch);
    }

    /// Rolls the shoulder and upper arm around their own axes when the hand is
    /// raised.
    fn twist_shoulder(&mut self, settings: &ArmSettings, pitch: f32) {
        let twist = (pitch
            * settings.position_weight
            * settings.shoulder_rotation_weight
            * settings.shoulder_twist_weight
            * 2.0)
            .clamp(0.0, 180.0)
            .to_radians();
        if twist <= 0.0 {
            return;
        }
        for bone in self.bones.iter_mut().take(2) {
            let Some(axis) = (bone.solver_rotation * bone.axis * self.side.sign()).try_normalize() else {
                continue;
            };
            bone.solver_rotation = Quat::from_axis_angle(axis, -twist) * bone.solver_rotation;
        }
    }

    fn stretch(&mut self, settings: &ArmSettings) {
        let upper_arm = self.upper_arm_index();
        stretch_two_bone(
            &mut self.bones,
            upper_arm,
            self.position,
            settings.arm_length_mlp,
            &settings.stretch_curve,
            settings.position_weight,
        );
    }

    /// Normal of the plane the elbow bends in for a hand at `dir` from the
    /// upper arm. Elbows point down and out, away from the palm.
    fn bend_normal(&self, settings: &ArmSettings, dir: Vec3) -> Vec3 {
        let arm_dir = self.bones[0].solver_rotation * self.bones[0].axis;
        let to_chest = self.chest_rotation.inverse();

        let swing_target = to_chest * dir.normalize_or_zero() + FORWARD;
        let mut bend = from_to_rotation(DOWN, swing_target) * BACK;
        bend = from_to_rotation(to_chest * arm_dir, to_chest * dir) * bend;
        bend = self.chest_rotation * bend;

        bend += arm_dir;
        bend -= self.rotation * self.wrist_to_palm_axis;
        bend -= self.rotation * self.palm_to_thumb_axis * 0.5;

        if let Some(goal) = self.bend_goal
            && settings.bend_goal_weight > 0.0
        {
            let to_goal = goal - self.bones[self.upper_arm_index() + 1].solver_position;
            bend = slerp_direction(bend, to_goal, settings.bend_goal_weight);
        }

        if settings.swivel_offset != 0.0
            && let Some(axis) = (-dir).try_normalize()
        {
            bend = Quat::from_axis_angle(axis, -settings.swivel_offset.to_radians()) * bend;
        }

        bend.cross(dir)
    }
}

impl BodyPart for Arm {
    fn read(&mut self, poses: &SlotPoses) {
        for (bone, slot) in self.bones.iter_mut().zip(Self::slots(self.side, self.has_shoulder)) {
            bone.read(poses.position(slot), poses.rotation(slot));
        }
        self.root = ChainRoot {
            position: poses.position(BodySlot::Chest),
            rotation: poses.rotation(BodySlot::Chest),
        };
    }

    fn write(&self, poses: &mut SlotPoses) {
        for (bone, slot) in self.bones.iter().zip(Self::slots(self.side, self.has_shoulder)) {
            poses.set(slot, bone.solver_position, bone.solver_rotation);
        }
    }

    fn reset_offsets(&mut self) {
        self.hand_position_offset = Vec3::ZERO;
    }
}

/// Spherical interpolation between two directions, keeping the length of `from`.
fn slerp_direction(from: Vec3, to: Vec3, t: f32) -> Vec3 {
    let rotation = quat_slerp(Quat::IDENTITY, from_to_rotation(from, to), t);
    rotation * from
}

/// Guesses the wrist to palm and palm to thumb axes of a hand from its fingers
/// in the bind pose. The nearest finger is taken for the thumb.
pub fn guess_hand_orientations(
    skeleton: &Skeleton,
    bones: &BodyBones,
    side: Side,
) -> Result<(Vec3, Vec3), ConfigurationError> {
    let [_, _, _, hand_slot] = BodySlot::arm(side);
    let unset = || ConfigurationError::UnsetHandAxes(side.name());

    let hand_bone = bones.get(hand_slot).ok_or(ConfigurationError::MissingBone(hand_slot))?;
    let hand = skeleton.rest_world(hand_bone).ok_or(unset())?;
    let fingers: Vec<Vec3> = skeleton
        .children(hand_bone)
        .iter()
        .filter_map(|&child| skeleton.rest_world(child))
        .map(|finger| finger.translation)
        .collect();
    if fingers.is_empty() {
        return Err(unset());
    }

    let to_local = hand.rotation.inverse();
    let centroid = fingers.iter().sum::<Vec3>() / fingers.len() as f32;
    let wrist_to_palm = (to_local * (centroid - hand.translation))
        .try_normalize()
        .ok_or(unset())?;

    let thumb = fingers
        .iter()
        .copied()
        .min_by(|a, b| a.distance_squared(hand.translation).total_cmp(&b.distance_squared(hand.translation)))
        .ok_or(unset())?;
    let palm_to_thumb = (to_local * (thumb - centroid))
        .reject_from_normalized(wrist_to_palm)
        .try_normalize()
        .or_else(|| {
            // A single finger says nothing about the thumb, assume it points forward
            let root_forward = bones
                .root
                .and_then(|root| skeleton.rest_world(root))
                .map(|root| root.rotation * FORWARD)
                .unwrap_or(FORWARD);
            (to_local * root_forward)
                .reject_from_normalized(wrist_to_palm)
                .try_normalize()
        })
        .ok_or(unset())?;

    Ok((wrist_to_palm, palm_to_thumb))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_rig::TestRig;

    fn arm(side: Side) -> (Arm, SlotPoses) {
        let rig = TestRig::humanoid();
        let axes = guess_hand_orientations(&rig.skeleton, &rig.bones, side).unwrap();
        let poses = rig.rest_slots();
        (Arm::new(side, true, &poses, axes), poses)
    }

    fn solve(arm: &mut Arm, poses: &SlotPoses, settings: &ArmSettings, target: Option<IkTarget>) {
        arm.read(poses);
        arm.set_target(target, None);
        arm.pre_solve(settings);
        arm.apply_offsets();
        arm.solve(settings, 0);
    }

    #[test]
    fn test_guess_hand_orientations() {
        let rig = TestRig::humanoid();
        let (palm, thumb) = guess_hand_orientations(&rig.skeleton, &rig.bones, Side::Left).unwrap();
        assert!(palm.dot(LEFT) > 0.9);
        assert!(thumb.dot(FORWARD) > 0.9);
        let (palm, _) = guess_hand_orientations(&rig.skeleton, &rig.bones, Side::Right).unwrap();
        assert!(palm.dot(LEFT) < -0.9);
    }

    #[test]
    fn test_hand_without_fingers() {
        let mut skeleton = Skeleton::new();
        let hand = skeleton
            .add_bone("hand_l", None, Default::default())
            .unwrap();
        let bones = BodyBones::default().with(BodySlot::LeftHand, hand);
        assert_eq!(
            guess_hand_orientations(&skeleton, &bones, Side::Left),
            Err(ConfigurationError::UnsetHandAxes("left"))
        );
    }

    #[test]
    fn test_hand_reaches_target() {
        for side in Side::BOTH {
            let (mut arm, poses) = arm(side);
            let settings = ArmSettings::default();
            let rest_hand = poses.position(BodySlot::arm(side)[3]);
            let target = IkTarget::new(
                Vec3::new(0.25 * side.sign(), 1.2, 0.35),
                Quat::from_rotation_y(0.5),
            );
            assert!(rest_hand.distance(target.position) > 0.3);

            solve(&mut arm, &poses, &settings, Some(target));

            assert!(arm.hand().solver_position.abs_diff_eq(target.position, 1e-3));
            assert!(arm.hand().solver_rotation.abs_diff_eq(target.rotation, 1e-4));
            for bone in &arm.bones {
                assert!(bone.solver_position.is_finite());
            }
            // Elbow hangs below the shoulder to hand line
            let upper = arm.bones[1].solver_position;
            let elbow = arm.bones[2].solver_position;
            let line = (target.position - upper).normalize();
            assert!((elbow - upper).reject_from(line).y < 0.0);
        }
    }

    #[test]
    fn test_shoulder_follows_forward_reach() {
        let (mut arm, poses) = arm(Side::Left);
        let settings = ArmSettings::default();
        let shoulder_axis = |arm: &Arm| (arm.bones[1].solver_position - arm.bones[0].solver_position).normalize();

        let reach = IkTarget::new(Vec3::new(0.15, 1.45, 0.65), Quat::IDENTITY);
        solve(&mut arm, &poses, &settings, Some(reach));
        let forward_reach = shoulder_axis(&arm).dot(FORWARD);

        let settings_off = ArmSettings {
            shoulder_rotation_weight: 0.0,
            ..Default::default()
        };
        solve(&mut arm, &poses, &settings_off, Some(reach));
        let fixed = shoulder_axis(&arm).dot(FORWARD);

        assert!(fixed.abs() < 1e-4);
        assert!(forward_reach > 0.2);
    }

    #[test]
    fn test_missing_target_keeps_last() {
        let (mut arm, poses) = arm(Side::Right);
        let settings = ArmSettings::default();
        let target = IkTarget::new(Vec3::new(-0.3, 1.1, 0.3), Quat::IDENTITY);
        solve(&mut arm, &poses, &settings, Some(target));
        solve(&mut arm, &poses, &settings, None);
        assert!(arm.hand().solver_position.abs_diff_eq(target.position, 1e-3));
    }

    #[test]
    fn test_hand_offset() {
        let (mut arm, poses) = arm(Side::Left);
        let settings = ArmSettings {
            position_weight: 0.0,
            rotation_weight: 0.0,
            shoulder_rotation_weight: 0.0,
            ..Default::default()
        };
        arm.read(&poses);
        arm.set_target(None, None);
        arm.pre_solve(&settings);
        arm.hand_position_offset = Vec3::new(0.0, 0.1, 0.0);
        arm.apply_offsets();
        assert!(arm.position.abs_diff_eq(poses.position(BodySlot::LeftHand) + Vec3::new(0.0, 0.1, 0.0), 1e-6));
        arm.reset_offsets();
        assert_eq!(arm.hand_position_offset, Vec3::ZERO);
    }
}
