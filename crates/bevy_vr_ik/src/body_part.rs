use bevy_math::{Quat, Vec3};
use bevy_reflect::{Reflect, std_traits::ReflectDefault};
use bevy_vr_ik_core::{
    math::rotation_delta,
    skeleton::{BodyBones, BodySlot, Pose, Side},
    virtual_bone::VirtualBone,
};

/// World poses of the body, one entry per [`BodySlot`]. Optional slots that are
/// not mapped hold the pose of their fallback bone.
#[derive(Reflect, Clone, Debug, PartialEq)]
#[reflect(Default)]
pub struct SlotPoses {
    pub positions: [Vec3; BodySlot::COUNT],
    pub rotations: [Quat; BodySlot::COUNT],
}

impl Default for SlotPoses {
    fn default() -> Self {
        Self {
            positions: [Vec3::ZERO; BodySlot::COUNT],
            rotations: [Quat::IDENTITY; BodySlot::COUNT],
        }
    }
}

impl SlotPoses {
    /// Gathers the mapped bones of a world space pose. Unmapped optional slots
    /// take their fallback's pose, unmapped legs stay at the origin.
    pub fn from_pose(pose: &Pose, bones: &BodyBones) -> Self {
        let mut slots = Self::default();
        for slot in BodySlot::ALL {
            if let Some(bone) = bones.resolve(slot) {
                slots.set(slot, pose.position(bone), pose.rotation(bone));
            }
        }
        slots
    }

    pub fn position(&self, slot: BodySlot) -> Vec3 {
        self.positions[slot.index()]
    }

    pub fn rotation(&self, slot: BodySlot) -> Quat {
        self.rotations[slot.index()]
    }

    pub fn set(&mut self, slot: BodySlot, position: Vec3, rotation: Quat) {
        self.positions[slot.index()] = position;
        self.rotations[slot.index()] = rotation;
    }
}

/// Which optional parts of the body exist. Fixed when the solver is built.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[reflect(Default)]
pub struct BodyLayout {
    pub has_chest: bool,
    pub has_neck: bool,
    pub has_shoulders: [bool; 2],
    pub has_legs: bool,
    pub has_toes: bool,
}

impl BodyLayout {
    pub fn from_bones(bones: &BodyBones) -> Self {
        Self {
            has_chest: bones.chest.is_some(),
            has_neck: bones.neck.is_some(),
            has_shoulders: [
                bones.left_shoulder.is_some(),
                bones.right_shoulder.is_some(),
            ],
            has_legs: bones.has_legs(),
            has_toes: bones.has_toes(),
        }
    }

    pub fn has_shoulder(&self, side: Side) -> bool {
        self.has_shoulders[side.index()]
    }
}

/// A solver chain that is read from, and written back to, the slot layout.
pub trait BodyPart {
    /// Samples this frame's pose. The solver pose restarts from it.
    fn read(&mut self, poses: &SlotPoses);

    /// Writes the solver pose of every bone this part owns.
    fn write(&self, poses: &mut SlotPoses);

    /// Clears the offsets accumulated during the frame.
    fn reset_offsets(&mut self);
}

/// The bone a limb hangs from: the chest for arms, the pelvis for legs.
#[derive(Reflect, Clone, Copy, Debug, PartialEq)]
#[reflect(Default)]
pub struct ChainRoot {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for ChainRoot {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl ChainRoot {
    /// Moves a limb rigidly with its root when the root was solved elsewhere.
    pub fn translate(&mut self, bones: &mut [VirtualBone], position: Vec3, rotation: Quat) {
        let delta_position = position - self.position;
        self.position = position;
        for bone in bones.iter_mut() {
            bone.solver_position += delta_position;
        }

        let delta_rotation = rotation_delta(self.rotation, rotation);
        self.rotation = rotation;
        VirtualBone::rotate_around_point(bones, 0, position, delta_rotation);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_translate_root_is_rigid() {
        let mut bones = vec![
            VirtualBone::new(Vec3::new(0.1, 1.0, 0.0), Quat::IDENTITY),
            VirtualBone::new(Vec3::new(0.1, 0.5, 0.0), Quat::IDENTITY),
            VirtualBone::new(Vec3::new(0.1, 0.0, 0.0), Quat::IDENTITY),
        ];
        let mut root = ChainRoot {
            position: Vec3::new(0.0, 1.05, 0.0),
            rotation: Quat::IDENTITY,
        };

        let turn = Quat::from_rotation_y(1.0);
        root.translate(&mut bones, Vec3::new(1.0, 1.05, 0.0), turn);

        let expected_thigh = Vec3::new(1.0, 1.05, 0.0) + turn * Vec3::new(0.1, -0.05, 0.0);
        assert!(bones[0].solver_position.abs_diff_eq(expected_thigh, 1e-5));
        assert!((bones[0].solver_position.distance(bones[2].solver_position) - 1.0).abs() < 1e-5);
        assert!(bones[2].solver_rotation.abs_diff_eq(turn, 1e-5));
    }
}
