use bevy_log::warn;
use bevy_math::{Quat, Vec3};
use bevy_reflect::Reflect;
use bevy_vr_ik_core::{
    math::{
        BACK, FORWARD, LEFT, UP, clamp_rotation, extract_horizontal, extract_vertical, flatten,
        from_to_rotation, lerp_clamped, quat_lerp, quat_slerp, rotation_delta, yaw_of,
    },
    skeleton::BodySlot,
    virtual_bone::VirtualBone,
};

use crate::{
    body_part::{BodyPart, ChainRoot, SlotPoses},
    input::IkTarget,
    leg::Leg,
    settings::SpineSettings,
};

const PELVIS: usize = 0;
const SPINE: usize = 1;

/// Spine lengths are measured against this reference pelvis to head distance.
const REFERENCE_SPINE_LENGTH: f32 = 0.7;

/// Pelvis, spine, optional chest, optional neck and head.
#[derive(Reflect, Clone, Debug)]
pub struct Spine {
    has_chest: bool,
    has_neck: bool,
    pub bones: Vec<VirtualBone>,
    chest_index: usize,
    neck_index: usize,
    head_index: usize,
    root: ChainRoot,

    ik_position_head: Vec3,
    ik_rotation_head: Quat,
    ik_position_pelvis: Vec3,
    ik_rotation_pelvis: Quat,
    goal_position_chest: Vec3,
    missing_head_warned: bool,

    /// Head target blended by weights and offsets.
    pub head_position: Vec3,
    pub head_rotation: Quat,
    pelvis_rotation: Quat,
    /// Rotation the body is anchored to, derived from the head and pelvis
    /// targets.
    pub anchor_rotation: Quat,
    anchor_relative_to_head: Quat,
    anchor_relative_to_pelvis: Quat,
    pelvis_relative_rotation: Quat,
    chest_relative_rotation: Quat,
    chest_forward: Vec3,
    head_delta_position: Vec3,
    pelvis_delta_rotation: Quat,
    chest_target_rotation: Quat,
    head_height: f32,
    size_mlp: f32,
    /// Horizontal direction the body faces.
    pub face_direction: Vec3,

    pub pelvis_position_offset: Vec3,
    pub chest_position_offset: Vec3,
    pub head_position_offset: Vec3,
    pub pelvis_rotation_offset: Quat,
    pub chest_rotation_offset: Quat,
    pub head_rotation_offset: Quat,
}

/// What the spine needs from the rest of the body while solving.
pub struct SpineSolveContext<'a> {
    pub root_bone: &'a mut VirtualBone,
    pub legs: &'a mut [Leg],
    /// Hand targets after offsets, left then right.
    pub hand_positions: [Vec3; 2],
    pub max_root_angle: f32,
    pub lod: u8,
    pub scale: f32,
}

impl Spine {
    pub fn new(has_chest: bool, has_neck: bool, poses: &SlotPoses) -> Self {
        let chest_index = if has_chest { 2 } else { 1 };
        let neck_index = 1 + has_chest as usize + has_neck as usize;
        let head_index = neck_index + 1;

        let mut bones: Vec<VirtualBone> = Self::slots(has_chest, has_neck)
            .iter()
            .map(|&slot| VirtualBone::new(poses.position(slot), poses.rotation(slot)))
            .collect();
        VirtualBone::bind_rest_lengths(&mut bones);

        let root_position = poses.position(BodySlot::Root);
        let root_rotation = poses.rotation(BodySlot::Root);
        let head_position = poses.position(BodySlot::Head);
        let head_rotation = poses.rotation(BodySlot::Head);
        let pelvis_position = poses.position(BodySlot::Pelvis);
        let pelvis_rotation = poses.rotation(BodySlot::Pelvis);
        let chest_position = bones[chest_index].read_position;

        let mut spine = Self {
            has_chest,
            has_neck,
            bones,
            chest_index,
            neck_index,
            head_index,
            root: ChainRoot {
                position: root_position,
                rotation: root_rotation,
            },
            ik_position_head: head_position,
            ik_rotation_head: head_rotation,
            ik_position_pelvis: pelvis_position,
            ik_rotation_pelvis: pelvis_rotation,
            goal_position_chest: chest_position + root_rotation * FORWARD,
            missing_head_warned: false,
            head_position,
            head_rotation,
            pelvis_rotation,
            anchor_rotation: root_rotation,
            anchor_relative_to_head: head_rotation.inverse() * root_rotation,
            anchor_relative_to_pelvis: pelvis_rotation.inverse() * root_rotation,
            pelvis_relative_rotation: Quat::IDENTITY,
            chest_relative_rotation: Quat::IDENTITY,
            chest_forward: FORWARD,
            head_delta_position: Vec3::ZERO,
            pelvis_delta_rotation: Quat::IDENTITY,
            chest_target_rotation: Quat::IDENTITY,
            head_height: extract_vertical(head_position - root_position, root_rotation * UP, 1.0)
                .length(),
            size_mlp: 1.0,
            face_direction: root_rotation * FORWARD,
            pelvis_position_offset: Vec3::ZERO,
            chest_position_offset: Vec3::ZERO,
            head_position_offset: Vec3::ZERO,
            pelvis_rotation_offset: Quat::IDENTITY,
            chest_rotation_offset: Quat::IDENTITY,
            head_rotation_offset: Quat::IDENTITY,
        };
        spine.read(poses);
        spine
    }

    fn slots(has_chest: bool, has_neck: bool) -> Vec<BodySlot> {
        let mut slots = vec![BodySlot::Pelvis, BodySlot::Spine];
        if has_chest {
            slots.push(BodySlot::Chest);
        }
        if has_neck {
            slots.push(BodySlot::Neck);
        }
        slots.push(BodySlot::Head);
        slots
    }

    pub fn pelvis(&self) -> &VirtualBone {
        &self.bones[PELVIS]
    }

    pub fn chest(&self) -> &VirtualBone {
        &self.bones[self.chest_index]
    }

    pub fn head(&self) -> &VirtualBone {
        &self.bones[self.head_index]
    }

    /// Body anchor relative to the head, fixed at bind time.
    pub fn anchor_relative_to_head(&self) -> Quat {
        self.anchor_relative_to_head
    }

    /// The head target, before weights and offsets.
    pub fn head_target(&self) -> IkTarget {
        IkTarget::new(self.ik_position_head, self.ik_rotation_head)
    }

    /// Sets this frame's targets. A missing head target keeps the last known
    /// one, a missing pelvis target leaves the pelvis where it was animated.
    pub fn set_targets(&mut self, head: Option<IkTarget>, pelvis: Option<IkTarget>, chest_goal: Option<Vec3>) {
        match head {
            Some(head) => {
                self.ik_position_head = head.position;
                self.ik_rotation_head = head.rotation;
            }
            None if !self.missing_head_warned => {
                warn!("No head target given, holding on to the last known head pose");
                self.missing_head_warned = true;
            }
            None => {}
        }

        let pelvis = pelvis.unwrap_or(IkTarget::new(
            self.pelvis().read_position,
            self.pelvis().read_rotation,
        ));
        self.ik_position_pelvis = pelvis.position;
        self.ik_rotation_pelvis = pelvis.rotation;

        self.goal_position_chest =
            chest_goal.unwrap_or(self.chest().read_position + self.root.rotation * FORWARD);
    }

    pub fn pre_solve(&mut self, settings: &SpineSettings) {
        let (head_position, head_rotation) = (self.head().solver_position, self.head().solver_rotation);
        let pelvis_rotation = self.pelvis().solver_rotation;
        self.head_position = lerp_clamped(head_position, self.ik_position_head, settings.position_weight);
        self.head_rotation = quat_lerp(head_rotation, self.ik_rotation_head, settings.rotation_weight);
        self.pelvis_rotation = quat_lerp(
            pelvis_rotation,
            self.ik_rotation_pelvis,
            settings.rotation_weight,
        );
    }

    pub fn apply_offsets(&mut self, settings: &SpineSettings, scale: f32) {
        self.head_position += self.head_position_offset;

        // Keep the head above the minimum height
        let min_head_height = settings.min_head_height * scale;
        let root_up = self.root.rotation * UP;
        let to_head = self.head_position - self.root.position;
        let horizontal = extract_horizontal(to_head, root_up, 1.0);
        let height = to_head.dot(root_up).max(min_head_height);
        self.head_position = self.root.position + horizontal + root_up * height;

        self.head_rotation = self.head_rotation_offset * self.head_rotation;
        self.head_delta_position = self.head_position - self.head().solver_position;
        self.pelvis_delta_rotation = rotation_delta(
            self.pelvis().solver_rotation,
            self.head_rotation * self.pelvis_relative_rotation,
        );

        let from_head = self.head_rotation * self.anchor_relative_to_head;
        let from_pelvis = self.pelvis_rotation * self.anchor_relative_to_pelvis;
        self.anchor_rotation = quat_lerp(from_head, from_pelvis, settings.pelvis_rotation_weight);
    }

    pub fn solve(&mut self, settings: &SpineSettings, ctx: SpineSolveContext) {
        let SpineSolveContext {
            root_bone,
            legs,
            hand_positions,
            max_root_angle,
            lod,
            scale,
        } = ctx;

        self.calculate_chest_target_rotation(settings, root_bone, hand_positions, lod);

        // Turn the root when the body faces too far away from it
        if max_root_angle < 180.0 {
            let root_up = root_bone.read_rotation * UP;
            let mut face = self.face_direction;
            if settings.root_heading_offset != 0.0 {
                face = Quat::from_axis_angle(root_up, -settings.root_heading_offset.to_radians()) * face;
            }
            let angle = yaw_of(root_bone.solver_rotation.inverse() * face).to_degrees();
            let excess = if angle > max_root_angle {
                angle - max_root_angle
            } else if angle < -max_root_angle {
                angle + max_root_angle
            } else {
                0.0
            };
            root_bone.solver_rotation =
                Quat::from_axis_angle(root_up, excess.to_radians()) * root_bone.solver_rotation;
        }

        let animated_pelvis_position = self.pelvis().solver_position;
        let root_rotation = root_bone.solver_rotation;

        self.translate_pelvis(settings, legs, root_rotation, scale);
        self.fabrik_pass(settings, animated_pelvis_position);

        // Bend the spine towards the chest target
        self.bend(
            PELVIS,
            self.chest_index,
            self.chest_target_rotation,
            self.chest_rotation_offset,
            settings.chest_clamp_weight,
            false,
            settings.neck_stiffness * settings.rotation_weight,
        );

        if lod < 1 && settings.chest_goal_weight > 0.0 {
            let chest = self.chest();
            let goal_rotation = from_to_rotation(
                chest.solver_rotation * self.chest_forward,
                self.goal_position_chest - chest.solver_position,
            ) * chest.solver_rotation;
            self.bend(
                PELVIS,
                self.chest_index,
                goal_rotation,
                Quat::IDENTITY,
                settings.chest_clamp_weight,
                false,
                settings.chest_goal_weight * settings.rotation_weight,
            );
        }

        self.inverse_translate_to_head(legs, false, false, Vec3::ZERO, settings.position_weight);

        if lod < 1 {
            self.fabrik_pass(settings, animated_pelvis_position);
        }

        self.bend(
            self.neck_index,
            self.head_index,
            self.head_rotation,
            Quat::IDENTITY,
            settings.head_clamp_weight,
            true,
            settings.rotation_weight,
        );
        let head = self.head_index;
        self.bones[head].solver_rotation = quat_slerp(
            self.bones[head].solver_rotation,
            self.head_rotation,
            settings.rotation_weight,
        );

        self.solve_pelvis(settings);
    }

    fn calculate_chest_target_rotation(
        &mut self,
        settings: &SpineSettings,
        root_bone: &VirtualBone,
        hand_positions: [Vec3; 2],
        lod: u8,
    ) {
        self.chest_target_rotation = self.head_rotation * self.chest_relative_rotation;
        if lod < 1 && settings.rotate_chest_by_hands > 0.0 {
            self.adjust_chest_by_hands(settings, hand_positions);
        }
        let root_up = root_bone.read_rotation * UP;
        self.face_direction =
            (self.anchor_rotation * LEFT).cross(root_up) + self.anchor_rotation * FORWARD;
    }

    /// Yaws the chest towards a hand reaching forward and rolls it towards a
    /// raised hand.
    fn adjust_chest_by_hands(&mut self, settings: &SpineSettings, hand_positions: [Vec3; 2]) {
        let to_anchor = self.anchor_rotation.inverse();
        let left = to_anchor * (hand_positions[0] - self.head_position) / self.size_mlp;
        let right = to_anchor * (hand_positions[1] - self.head_position) / self.size_mlp;
        let signed_square = |v: f32| v * v.abs();

        // Hands further to the right and further forward on the left turn the chest right
        let turn_right = (signed_square(-left.x)
            + signed_square(left.z)
            + signed_square(-right.x)
            - signed_square(right.z))
            * 5.0
            * settings.rotate_chest_by_hands;
        let yaw = turn_right.atan2(1.0);
        let root_up = self.root.rotation * UP;
        self.chest_target_rotation =
            Quat::from_axis_angle(root_up, -yaw) * self.chest_target_rotation;

        let raise = (left.y - right.y) * 0.5 * settings.rotate_chest_by_hands;
        let roll = raise.atan2(1.0);
        let back = self.chest_target_rotation * BACK;
        self.chest_target_rotation = Quat::from_axis_angle(back, -roll) * self.chest_target_rotation;
    }

    /// Moves the pelvis with the head, limited by how far the legs reach.
    fn translate_pelvis(&mut self, settings: &SpineSettings, legs: &mut [Leg], root_rotation: Quat, scale: f32) {
        let head_before = self.head().solver_position;

        let delta_rotation = clamp_rotation(self.pelvis_delta_rotation, settings.chest_clamp_weight, 2);
        let mut rotation = quat_slerp(
            Quat::IDENTITY,
            delta_rotation,
            settings.body_rot_stiffness * settings.rotation_weight,
        );
        rotation = quat_slerp(
            rotation,
            rotation_delta(self.pelvis().solver_rotation, self.ik_rotation_pelvis),
            settings.pelvis_rotation_weight,
        );
        let pelvis_position = self.pelvis().solver_position;
        VirtualBone::rotate_around_point(
            &mut self.bones,
            PELVIS,
            pelvis_position,
            self.pelvis_rotation_offset * rotation,
        );

        let mut delta_position = self.head_delta_position - (self.head().solver_position - head_before);

        // Crouching pushes the body back
        let root_up = root_rotation * UP;
        let forward = flatten(root_rotation * FORWARD, root_up).normalize_or_zero();
        let crouch = (-delta_position.dot(root_up)).max(0.0) / scale.max(f32::EPSILON);
        delta_position -= forward * (crouch * settings.move_body_back_when_crouching * self.head_height);

        let target = self.pelvis().solver_position
            + delta_position * settings.body_pos_stiffness * settings.position_weight;
        let limited = self.limit_pelvis_position(legs, target, false, 2);
        self.move_position(limited);
    }

    /// Keeps each thigh within reach of its foot target.
    fn limit_pelvis_position(
        &self,
        legs: &mut [Leg],
        mut pelvis_position: Vec3,
        use_current_leg_mag: bool,
        iterations: usize,
    ) -> Vec3 {
        if legs.is_empty() {
            return pelvis_position;
        }

        if use_current_leg_mag {
            for leg in legs.iter_mut() {
                let extension = leg.thigh().solver_position.distance(leg.last_bone().solver_position);
                leg.current_mag = leg.current_mag.max(extension);
            }
        }

        for _ in 0..iterations {
            for leg in legs.iter() {
                let delta = pelvis_position - self.pelvis().solver_position;
                let wanted_thigh = leg.thigh().solver_position + delta;
                let max_mag = if use_current_leg_mag { leg.current_mag } else { leg.mag };
                let limited_thigh = leg.position + (wanted_thigh - leg.position).clamp_length_max(max_mag);
                pelvis_position += limited_thigh - wanted_thigh;
            }
        }
        pelvis_position
    }

    fn fabrik_pass(&mut self, settings: &SpineSettings, animated_pelvis_position: Vec3) {
        let start = self
            .pelvis()
            .solver_position
            .lerp(animated_pelvis_position, settings.maintain_pelvis_position)
            + self.pelvis_position_offset;
        let end = self.head_position - self.chest_position_offset;
        let length = self.pelvis().solver_position.distance(self.head().solver_position);
        VirtualBone::solve_fabrik(
            &mut self.bones,
            start,
            end,
            settings.position_weight,
            1.0,
            1,
            length,
            Vec3::ZERO,
        );
    }

    /// Rotates `first..=last` so that `last` turns towards `target_rotation`,
    /// spreading the rotation over the bones.
    #[allow(clippy::too_many_arguments)]
    fn bend(
        &mut self,
        first: usize,
        last: usize,
        target_rotation: Quat,
        rotation_offset: Quat,
        clamp_weight: f32,
        uniform_weight: bool,
        weight: f32,
    ) {
        if weight <= 0.0 || last < first || last >= self.bones.len() {
            return;
        }
        let count = (last + 1 - first) as f32;
        let rotation = clamp_rotation(
            rotation_delta(self.bones[last].solver_rotation, target_rotation),
            clamp_weight,
            2,
        );

        // Linearly growing shares that add up to one
        let ramp_total = count * (count + 1.0) * 0.5;
        for i in first..=last {
            let share = if uniform_weight {
                1.0 / count
            } else {
                (i - first + 1) as f32 / ramp_total
            };
            let q = quat_slerp(Quat::IDENTITY, rotation_offset, share)
                * quat_slerp(Quat::IDENTITY, rotation, share * weight);
            let pivot = self.bones[i].solver_position;
            VirtualBone::rotate_around_point(&mut self.bones, i, pivot, q);
        }
    }

    /// Moves the whole spine so that the head lands on its target.
    pub fn inverse_translate_to_head(
        &mut self,
        legs: &mut [Leg],
        limited: bool,
        use_current_leg_mag: bool,
        offset: Vec3,
        weight: f32,
    ) {
        let target = self.pelvis().solver_position
            + (self.head_position + offset - self.head().solver_position) * weight;
        let target = if limited {
            self.limit_pelvis_position(legs, target, use_current_leg_mag, 2)
        } else {
            target
        };
        self.move_position(target);
    }

    fn move_position(&mut self, pelvis_position: Vec3) {
        let delta = pelvis_position - self.pelvis().solver_position;
        for bone in self.bones.iter_mut() {
            bone.solver_position += delta;
        }
    }

    /// Pins the pelvis to its target and bends the spine back up to the head.
    fn solve_pelvis(&mut self, settings: &SpineSettings) {
        let weight = settings.pelvis_position_weight;
        if weight <= 0.0 {
            return;
        }

        let head_rotation = self.head().solver_rotation;
        let delta = (self.ik_position_pelvis + self.pelvis_position_offset - self.pelvis().solver_position) * weight;
        for bone in self.bones.iter_mut() {
            bone.solver_position += delta;
        }

        let head = self.head_index;
        let back = self.anchor_rotation * BACK;
        let solve = |bones: &mut [VirtualBone], first: usize, second: usize, weight: f32| {
            let normal = back.cross(self.head_position - bones[first].solver_position);
            VirtualBone::solve_trigonometric(bones, first, second, head, self.head_position, normal, weight);
        };
        match (self.has_chest, self.has_neck) {
            (true, true) => {
                solve(&mut self.bones, SPINE, self.chest_index, weight * 0.9);
                solve(&mut self.bones, self.chest_index, self.neck_index, weight);
            }
            (true, false) => solve(&mut self.bones, SPINE, self.chest_index, weight),
            (false, true) => solve(&mut self.bones, SPINE, self.neck_index, weight),
            (false, false) => solve(&mut self.bones, PELVIS, SPINE, weight),
        }

        self.bones[head].solver_rotation = head_rotation;
    }
}

impl BodyPart for Spine {
    fn read(&mut self, poses: &SlotPoses) {
        for (bone, slot) in self.bones.iter_mut().zip(Self::slots(self.has_chest, self.has_neck)) {
            bone.read(poses.position(slot), poses.rotation(slot));
        }
        self.root = ChainRoot {
            position: poses.position(BodySlot::Root),
            rotation: poses.rotation(BodySlot::Root),
        };

        let head_rotation = self.head().read_rotation;
        let to_head = head_rotation.inverse();
        self.pelvis_relative_rotation = to_head * self.pelvis().read_rotation;
        self.chest_relative_rotation = to_head * self.chest().read_rotation;
        self.chest_forward = self.chest().read_rotation.inverse() * (self.root.rotation * FORWARD);

        let spine_length = self.pelvis().read_position.distance(self.head().read_position);
        self.size_mlp = (spine_length / REFERENCE_SPINE_LENGTH).max(f32::EPSILON);
        VirtualBone::pre_solve(&mut self.bones);
    }

    fn write(&self, poses: &mut SlotPoses) {
        for (bone, slot) in self.bones.iter().zip(Self::slots(self.has_chest, self.has_neck)) {
            poses.set(slot, bone.solver_position, bone.solver_rotation);
        }
    }

    fn reset_offsets(&mut self) {
        self.pelvis_position_offset = Vec3::ZERO;
        self.chest_position_offset = Vec3::ZERO;
        self.head_position_offset = Vec3::ZERO;
        self.pelvis_rotation_offset = Quat::IDENTITY;
        self.chest_rotation_offset = Quat::IDENTITY;
        self.head_rotation_offset = Quat::IDENTITY;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_rig::TestRig;

    struct Frame {
        spine: Spine,
        root: VirtualBone,
        poses: SlotPoses,
    }

    fn frame() -> Frame {
        let rig = TestRig::humanoid();
        let poses = rig.rest_slots();
        Frame {
            spine: Spine::new(true, true, &poses),
            root: VirtualBone::new(poses.position(BodySlot::Root), poses.rotation(BodySlot::Root)),
            poses,
        }
    }

    fn solve(frame: &mut Frame, settings: &SpineSettings, head: IkTarget) {
        let hands = [
            frame.poses.position(BodySlot::LeftHand),
            frame.poses.position(BodySlot::RightHand),
        ];
        frame.spine.read(&frame.poses);
        frame.spine.set_targets(Some(head), None, None);
        frame.spine.pre_solve(settings);
        frame.spine.apply_offsets(settings, 1.0);
        frame.spine.solve(
            settings,
            SpineSolveContext {
                root_bone: &mut frame.root,
                legs: &mut [],
                hand_positions: hands,
                max_root_angle: settings.max_root_angle,
                lod: 0,
                scale: 1.0,
            },
        );
        frame.spine.inverse_translate_to_head(&mut [], false, false, Vec3::ZERO, 1.0);
    }

    #[test]
    fn test_head_reaches_target() {
        let mut frame = frame();
        let settings = SpineSettings::default();
        let rest_head = frame.poses.position(BodySlot::Head);
        let target = IkTarget::new(
            rest_head + Vec3::new(0.05, -0.1, 0.15),
            Quat::from_rotation_x(0.3) * frame.poses.rotation(BodySlot::Head),
        );

        solve(&mut frame, &settings, target);

        let head = frame.spine.head();
        assert!(head.solver_position.abs_diff_eq(target.position, 1e-4));
        assert!(head.solver_rotation.abs_diff_eq(target.rotation, 1e-4));
        // Bone lengths are preserved
        for i in 0..frame.spine.bones.len() - 1 {
            let bones = &frame.spine.bones;
            let d = bones[i].solver_position.distance(bones[i + 1].solver_position);
            assert!((d - bones[i].rest_length()).abs() < 1e-3);
        }
    }

    #[test]
    fn test_min_head_height() {
        let mut frame = frame();
        let settings = SpineSettings::default();
        let target = IkTarget::new(Vec3::new(0.0, 0.2, 0.0), frame.poses.rotation(BodySlot::Head));

        solve(&mut frame, &settings, target);

        let root = frame.poses.position(BodySlot::Root);
        let height = frame.spine.head().solver_position.y - root.y;
        assert!((height - settings.min_head_height).abs() < 1e-4);
    }

    #[test]
    fn test_missing_head_target_keeps_last() {
        let mut frame = frame();
        let target = IkTarget::new(Vec3::new(0.1, 1.5, 0.1), Quat::IDENTITY);
        frame.spine.set_targets(Some(target), None, None);
        frame.spine.set_targets(None, None, None);
        assert_eq!(frame.spine.head_target(), target);
    }

    #[test]
    fn test_root_turns_with_head() {
        let mut frame = frame();
        let settings = SpineSettings::default();
        let rest_head = frame.poses.position(BodySlot::Head);
        let turn = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let target = IkTarget::new(rest_head, turn * frame.poses.rotation(BodySlot::Head));

        solve(&mut frame, &settings, target);

        let heading = yaw_of(frame.root.solver_rotation * FORWARD).to_degrees();
        // The root follows until the head is within the allowed angle
        assert!((heading - (90.0 - settings.max_root_angle)).abs() < 1.0);
    }

    #[test]
    fn test_offsets_reset() {
        let mut frame = frame();
        frame.spine.head_position_offset = Vec3::ONE;
        frame.spine.chest_rotation_offset = Quat::from_rotation_x(1.0);
        frame.spine.reset_offsets();
        assert_eq!(frame.spine.head_position_offset, Vec3::ZERO);
        assert_eq!(frame.spine.chest_rotation_offset, Quat::IDENTITY);
    }
}
