use bevy_log::warn;
use bevy_math::{Quat, Vec3};
use bevy_reflect::Reflect;
use bevy_vr_ik_core::{
    math::{FORWARD, from_to_rotation, quat_lerp, quat_slerp, rotation_delta},
    skeleton::{BodySlot, Side},
    virtual_bone::{VirtualBone, stretch_two_bone},
};

use crate::{
    body_part::{BodyPart, ChainRoot, SlotPoses},
    input::IkTarget,
    settings::LegSettings,
};

const THIGH: usize = 0;
const CALF: usize = 1;
const FOOT: usize = 2;
const TOES: usize = 3;

/// Thigh, calf, foot and optional toes.
///
/// The leg target drives the last bone of the chain. Locomotion and the
/// solver steer the leg through the foot offsets, which are cleared after every
/// solve.
#[derive(Reflect, Clone, Debug)]
pub struct Leg {
    side: Side,
    has_toes: bool,
    pub bones: Vec<VirtualBone>,
    root: ChainRoot,

    ik_position: Vec3,
    ik_rotation: Quat,
    bend_goal: Option<Vec3>,

    /// Target of the last bone after offsets.
    pub position: Vec3,
    pub rotation: Quat,
    foot_position: Vec3,
    foot_rotation: Quat,
    bend_normal: Vec3,
    bind_bend_normal_relative_to_pelvis: Vec3,
    bend_normal_relative_to_target: Vec3,
    /// Thigh position in pelvis space.
    pub thigh_relative_to_pelvis: Vec3,
    calf_relative_to_thigh: Quat,
    thigh_relative_to_last: Quat,
    /// Length of the whole chain this frame.
    pub mag: f32,
    /// Longest extension reached during this frame's passes.
    pub current_mag: f32,

    pub foot_position_offset: Vec3,
    pub foot_rotation_offset: Quat,
    pub heel_position_offset: Vec3,
}

impl Leg {
    pub fn new(side: Side, has_toes: bool, poses: &SlotPoses) -> Self {
        let slots = Self::slots(side, has_toes);
        let mut bones: Vec<VirtualBone> = slots
            .iter()
            .map(|&slot| VirtualBone::new(poses.position(slot), poses.rotation(slot)))
            .collect();
        VirtualBone::bind_rest_lengths(&mut bones);

        let pelvis_rotation = poses.rotation(BodySlot::Pelvis);
        let root_forward = poses.rotation(BodySlot::Root) * FORWARD;
        let thigh = bones[THIGH].read_position;
        let foot = bones[FOOT].read_position;

        let mut bend_normal = animated_bend_normal(&bones);
        if bend_normal == Vec3::ZERO {
            warn!(
                "The {} leg is perfectly straight in its bind pose, its knee will bend towards the character's forward",
                side.name()
            );
            bend_normal = root_forward.cross(foot - thigh).normalize_or_zero();
        }

        let last = bones.len() - 1;
        let ik_position = bones[last].read_position;
        let ik_rotation = bones[last].read_rotation;
        let mag = VirtualBone::pre_solve(&mut bones);

        Self {
            side,
            has_toes,
            root: ChainRoot {
                position: poses.position(BodySlot::Pelvis),
                rotation: pelvis_rotation,
            },
            ik_position,
            ik_rotation,
            bend_goal: None,
            position: ik_position,
            rotation: ik_rotation,
            foot_position: foot,
            foot_rotation: bones[FOOT].read_rotation,
            bend_normal,
            bind_bend_normal_relative_to_pelvis: pelvis_rotation.inverse() * bend_normal,
            bend_normal_relative_to_target: ik_rotation.inverse() * bend_normal,
            thigh_relative_to_pelvis: pelvis_rotation.inverse() * (thigh - poses.position(BodySlot::Pelvis)),
            calf_relative_to_thigh: Quat::IDENTITY,
            thigh_relative_to_last: Quat::IDENTITY,
            mag,
            current_mag: 0.0,
            foot_position_offset: Vec3::ZERO,
            foot_rotation_offset: Quat::IDENTITY,
            heel_position_offset: Vec3::ZERO,
            bones,
        }
    }

    fn slots(side: Side, has_toes: bool) -> Vec<BodySlot> {
        let [thigh, calf, foot, toes] = BodySlot::leg(side);
        if has_toes {
            vec![thigh, calf, foot, toes]
        } else {
            vec![thigh, calf, foot]
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn thigh(&self) -> &VirtualBone {
        &self.bones[THIGH]
    }

    pub fn last_bone(&self) -> &VirtualBone {
        &self.bones[self.bones.len() - 1]
    }

    /// Sets this frame's target. Without one the leg targets its animated pose.
    pub fn set_target(&mut self, target: Option<IkTarget>, bend_goal: Option<Vec3>) {
        let last = self.last_bone();
        let target = target.unwrap_or(IkTarget::new(last.read_position, last.read_rotation));
        self.ik_position = target.position;
        self.ik_rotation = target.rotation;
        self.bend_goal = bend_goal;
    }

    pub fn pre_solve(&mut self, settings: &LegSettings) {
        self.foot_position = self.bones[FOOT].solver_position;
        self.foot_rotation = self.bones[FOOT].solver_rotation;
        self.position = self.last_bone().solver_position;
        self.rotation = self.last_bone().solver_rotation;

        let mut bend_normal = animated_bend_normal(&self.bones);
        if bend_normal == Vec3::ZERO {
            bend_normal = self.root.rotation * self.bind_bend_normal_relative_to_pelvis;
        }
        self.bend_normal = bend_normal;

        if settings.rotation_weight > 0.0 {
            self.apply_rotation_offset(
                rotation_delta(self.rotation, self.ik_rotation),
                settings.rotation_weight,
            );
        }
        if settings.position_weight > 0.0 {
            self.apply_position_offset(self.ik_position - self.position, settings.position_weight);
        }

        // Knees follow the foot target as it turns
        let to_target = self.rotation * self.bend_normal_relative_to_target;
        self.bend_normal = self
            .bend_normal
            .lerp(to_target, settings.bend_to_target_weight * settings.rotation_weight)
            .try_normalize()
            .unwrap_or(self.bend_normal);

        let pelvis = self.root;
        self.thigh_relative_to_pelvis =
            pelvis.rotation.inverse() * (self.bones[THIGH].solver_position - pelvis.position);
        self.calf_relative_to_thigh =
            self.bones[THIGH].solver_rotation.inverse() * self.bones[CALF].solver_rotation;
        self.thigh_relative_to_last =
            self.last_bone().solver_rotation.inverse() * self.bones[THIGH].solver_rotation;
        self.mag = VirtualBone::pre_solve(&mut self.bones);
        self.current_mag = 0.0;
    }

    pub fn apply_offsets(&mut self, settings: &LegSettings) {
        self.apply_position_offset(self.foot_position_offset, 1.0);
        self.apply_rotation_offset(self.foot_rotation_offset, 1.0);

        // The heel lifts around the toes
        let heel_rotation = from_to_rotation(
            self.foot_position - self.position,
            self.foot_position + self.heel_position_offset - self.position,
        );
        self.foot_position = self.position + heel_rotation * (self.foot_position - self.position);
        self.foot_rotation = heel_rotation * self.foot_rotation;

        let axis = (self.bones[THIGH].solver_position - self.last_bone().solver_position)
            .try_normalize()
            .unwrap_or(Vec3::Y);

        let mut swivel = settings.swivel_offset.to_radians();
        if let Some(goal) = self.bend_goal
            && settings.bend_goal_weight > 0.0
        {
            let thigh = self.bones[THIGH].solver_position;
            let goal_normal = (goal - thigh).cross(self.position - thigh);
            swivel += signed_angle_around(self.bend_normal, goal_normal, axis) * settings.bend_goal_weight;
        }

        if swivel != 0.0 {
            self.bend_normal = Quat::from_axis_angle(axis, swivel) * self.bend_normal;
            let thigh = &mut self.bones[THIGH];
            if let Some(thigh_axis) = (thigh.solver_rotation * thigh.axis).try_normalize() {
                thigh.solver_rotation = Quat::from_axis_angle(thigh_axis, -swivel) * thigh.solver_rotation;
            }
        }
    }

    fn apply_position_offset(&mut self, offset: Vec3, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        let offset = offset * weight;
        self.foot_position += offset;
        self.position += offset;
    }

    fn apply_rotation_offset(&mut self, offset: Quat, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        let offset = if weight < 1.0 {
            quat_lerp(Quat::IDENTITY, offset, weight)
        } else {
            offset
        };
        self.foot_rotation = offset * self.foot_rotation;
        self.rotation = offset * self.rotation;
        self.bend_normal = offset * self.bend_normal;
        self.foot_position = self.position + offset * (self.foot_position - self.position);
    }

    /// Re-attaches the thigh to a pelvis that has moved.
    pub fn translate_root(&mut self, pelvis_position: Vec3, pelvis_rotation: Quat) {
        self.root.translate(&mut self.bones, pelvis_position, pelvis_rotation);
    }

    pub fn solve(&mut self, settings: &LegSettings, stretch: bool, lod: u8) {
        if stretch && lod < 1 {
            stretch_two_bone(
                &mut self.bones,
                THIGH,
                self.foot_position,
                settings.leg_length_mlp,
                &settings.stretch_curve,
                settings.position_weight,
            );
        }

        // Foot pass
        VirtualBone::solve_trigonometric(
            &mut self.bones,
            THIGH,
            CALF,
            FOOT,
            self.foot_position,
            self.bend_normal,
            1.0,
        );
        VirtualBone::rotate_to(&mut self.bones, FOOT, self.foot_rotation, 1.0);

        if !self.has_toes {
            self.fix_twist_rotations(settings, lod);
            return;
        }

        // Toes pass
        let thigh = self.bones[THIGH].solver_position;
        let foot = self.bones[FOOT].solver_position;
        let toes = self.bones[TOES].solver_position;
        let toes_normal = (foot - thigh).cross(toes - foot);
        VirtualBone::solve_trigonometric(&mut self.bones, THIGH, FOOT, TOES, self.position, toes_normal, 1.0);

        self.fix_twist_rotations(settings, lod);
        self.bones[TOES].solver_rotation = self.rotation;
    }

    fn fix_twist_rotations(&mut self, settings: &LegSettings, lod: u8) {
        if lod >= 1 {
            return;
        }

        if settings.bend_to_target_weight > 0.0 {
            let thigh_rotation = self.rotation * self.thigh_relative_to_last;
            let thigh = &self.bones[THIGH];
            let swing = from_to_rotation(
                thigh_rotation * thigh.axis,
                self.bones[CALF].solver_position - thigh.solver_position,
            );
            self.bones[THIGH].solver_rotation = quat_slerp(
                self.bones[THIGH].solver_rotation,
                swing * thigh_rotation,
                settings.bend_to_target_weight,
            );
        }

        let calf_rotation = self.bones[THIGH].solver_rotation * self.calf_relative_to_thigh;
        let calf = &self.bones[CALF];
        let swing = from_to_rotation(
            calf_rotation * calf.axis,
            self.bones[FOOT].solver_position - calf.solver_position,
        );
        self.bones[CALF].solver_rotation = swing * calf_rotation;
    }
}

impl BodyPart for Leg {
    fn read(&mut self, poses: &SlotPoses) {
        for (bone, slot) in self.bones.iter_mut().zip(Self::slots(self.side, self.has_toes)) {
            bone.read(poses.position(slot), poses.rotation(slot));
        }
        self.root = ChainRoot {
            position: poses.position(BodySlot::Pelvis),
            rotation: poses.rotation(BodySlot::Pelvis),
        };
    }

    fn write(&self, poses: &mut SlotPoses) {
        for (bone, slot) in self.bones.iter().zip(Self::slots(self.side, self.has_toes)) {
            poses.set(slot, bone.solver_position, bone.solver_rotation);
        }
    }

    fn reset_offsets(&mut self) {
        self.foot_position_offset = Vec3::ZERO;
        self.foot_rotation_offset = Quat::IDENTITY;
        self.heel_position_offset = Vec3::ZERO;
    }
}

/// Normal of the plane the leg bends in, from its current pose. Zero when the
/// leg is straight.
fn animated_bend_normal(bones: &[VirtualBone]) -> Vec3 {
    let thigh = bones[THIGH].solver_position;
    let calf = bones[CALF].solver_position;
    let foot = bones[FOOT].solver_position;
    let normal = (calf - thigh).cross(foot - calf);
    if normal.length_squared() < 1e-10 {
        Vec3::ZERO
    } else {
        normal.normalize()
    }
}

/// Angle (radians) that turns `from` onto `to` around `axis`, both projected
/// on the plane of `axis`.
fn signed_angle_around(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    let from = from.reject_from_normalized(axis);
    let to = to.reject_from_normalized(axis);
    if from.length_squared() < 1e-10 || to.length_squared() < 1e-10 {
        return 0.0;
    }
    axis.dot(from.cross(to)).atan2(from.dot(to))
}
