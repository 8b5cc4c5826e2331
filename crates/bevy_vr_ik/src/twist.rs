//! Spreads the twist of a limb over a middle bone, so that forearms and shins
//! do not candy-wrap when the hand or foot rolls.

use bevy_log::debug;
use bevy_math::{Quat, Vec3};
use bevy_reflect::Reflect;
use bevy_vr_ik_core::{
    errors::ConfigurationError,
    math::{flatten, from_to_rotation, quat_slerp},
    skeleton::{Pose, Skeleton},
};

use crate::settings::TwistSolverSettings;

/// Relaxes the twist of one bone between its parent and its first child.
#[derive(Reflect, Clone, Debug)]
pub struct TwistSolver {
    bone: usize,
    parent: usize,
    child: usize,
    pub weight: f32,
    /// 0 follows the parent, 1 follows the child.
    pub parent_child_crossfade: f32,
    /// Degrees added around the twist axis.
    pub twist_angle_offset: f32,
    /// Towards the child, in bone space.
    twist_axis: Vec3,
    /// Perpendicular to the twist axis, in bone space.
    axis: Vec3,
    axis_relative_to_parent: Vec3,
    axis_relative_to_child: Vec3,
}

impl TwistSolver {
    pub fn new(skeleton: &Skeleton, settings: &TwistSolverSettings) -> Result<Self, ConfigurationError> {
        let name = &settings.bone;
        let bone = skeleton
            .find(name)
            .ok_or_else(|| ConfigurationError::UnknownBone(name.clone()))?;
        let not_in_chain = || ConfigurationError::TwistBoneNotInChain(name.clone());
        let parent = skeleton.parent(bone).ok_or_else(not_in_chain)?;
        let child = *skeleton.children(bone).first().ok_or_else(not_in_chain)?;

        let bone_rest = skeleton.rest_world(bone).ok_or_else(not_in_chain)?;
        let parent_rest = skeleton.rest_world(parent).ok_or_else(not_in_chain)?;
        let child_rest = skeleton.rest_world(child).ok_or_else(not_in_chain)?;

        let twist_axis = (bone_rest.rotation.inverse() * (child_rest.translation - bone_rest.translation))
            .try_normalize()
            .ok_or_else(not_in_chain)?;
        let axis = flatten(Vec3::new(twist_axis.y, twist_axis.z, twist_axis.x), twist_axis)
            .try_normalize()
            .ok_or_else(not_in_chain)?;
        let world_axis = bone_rest.rotation * axis;

        Ok(Self {
            bone,
            parent,
            child,
            weight: settings.weight,
            parent_child_crossfade: settings.parent_child_crossfade,
            twist_angle_offset: settings.twist_angle_offset,
            twist_axis,
            axis,
            axis_relative_to_parent: parent_rest.rotation.inverse() * world_axis,
            axis_relative_to_child: child_rest.rotation.inverse() * world_axis,
        })
    }

    pub fn bone(&self) -> usize {
        self.bone
    }

    /// Twists the bone in a world space pose. Its children keep their world
    /// rotations.
    pub fn relax(&self, pose: &mut Pose) {
        if self.weight <= 0.0 {
            return;
        }

        let rotation = pose.rotation(self.bone);
        let twist_axis = rotation * self.twist_axis;
        let offset = Quat::from_axis_angle(twist_axis, self.twist_angle_offset.to_radians());
        let rotation = offset * rotation;

        let relaxed_parent = offset * pose.rotation(self.parent) * self.axis_relative_to_parent;
        let relaxed_child = offset * pose.rotation(self.child) * self.axis_relative_to_child;
        let relaxed = quat_slerp(
            Quat::IDENTITY,
            from_to_rotation(relaxed_parent, relaxed_child),
            self.parent_child_crossfade,
        ) * relaxed_parent;

        let current = rotation * self.axis;
        let relaxed = flatten(relaxed, twist_axis);
        let angle = twist_axis.dot(current.cross(relaxed)).atan2(current.dot(relaxed));

        if let Some(bone) = pose.get_mut(self.bone) {
            bone.rotation = Quat::from_axis_angle(twist_axis, angle * self.weight.min(1.0)) * rotation;
        }
    }
}

/// The twist solvers of a body, run in order after the body solve.
#[derive(Reflect, Clone, Debug, Default)]
pub struct TwistRelaxer {
    solvers: Vec<TwistSolver>,
}

impl TwistRelaxer {
    pub fn new(skeleton: &Skeleton, settings: &[TwistSolverSettings]) -> Result<Self, ConfigurationError> {
        let solvers = settings
            .iter()
            .map(|settings| TwistSolver::new(skeleton, settings))
            .collect::<Result<Vec<_>, _>>()?;
        if !solvers.is_empty() {
            debug!("Relaxing twist on {} bones", solvers.len());
        }
        Ok(Self { solvers })
    }

    pub fn is_empty(&self) -> bool {
        self.solvers.is_empty()
    }

    pub fn solvers(&self) -> &[TwistSolver] {
        &self.solvers
    }

    pub fn relax(&self, pose: &mut Pose) {
        for solver in &self.solvers {
            solver.relax(pose);
        }
    }
}

#[cfg(test)]
mod test {
    use std::f32::consts::FRAC_PI_2;

    use bevy_vr_ik_core::skeleton::BoneTransform;

    use super::*;

    fn arm() -> Skeleton {
        let mut s = Skeleton::new();
        let root = s.add_bone("root", None, BoneTransform::IDENTITY).unwrap();
        let upper = s
            .add_bone("upper", Some(root), BoneTransform::from_translation(Vec3::new(0.1, 1.4, 0.0)))
            .unwrap();
        let fore = s
            .add_bone("fore", Some(upper), BoneTransform::from_translation(Vec3::new(0.3, 0.0, 0.0)))
            .unwrap();
        s.add_bone("hand", Some(fore), BoneTransform::from_translation(Vec3::new(0.25, 0.0, 0.0)))
            .unwrap();
        s
    }

    fn settings(bone: &str) -> TwistSolverSettings {
        TwistSolverSettings {
            bone: bone.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_twist_is_shared_with_the_hand() {
        let skeleton = arm();
        let solver = TwistSolver::new(&skeleton, &settings("fore")).unwrap();
        let mut pose = skeleton.to_world(&skeleton.rest_pose(), &BoneTransform::IDENTITY, 1.0);

        let hand = skeleton.find("hand").unwrap();
        let fore = skeleton.find("fore").unwrap();
        pose.get_mut(hand).unwrap().rotation = Quat::from_rotation_x(FRAC_PI_2);
        let hand_before = pose.get(hand).copied().unwrap();
        let fore_position = pose.position(fore);

        solver.relax(&mut pose);

        // Half way between the upper arm and the hand
        assert!(pose.rotation(fore).abs_diff_eq(Quat::from_rotation_x(FRAC_PI_2 * 0.5), 1e-5));
        assert_eq!(pose.get(hand).copied().unwrap(), hand_before);
        assert_eq!(pose.position(fore), fore_position);
    }

    #[test]
    fn test_crossfade_and_weight() {
        let skeleton = arm();
        let hand = skeleton.find("hand").unwrap();
        let fore = skeleton.find("fore").unwrap();
        let mut rest = skeleton.to_world(&skeleton.rest_pose(), &BoneTransform::IDENTITY, 1.0);
        rest.get_mut(hand).unwrap().rotation = Quat::from_rotation_x(FRAC_PI_2);

        let mut pose = rest.clone();
        let follow_child = TwistSolver::new(
            &skeleton,
            &TwistSolverSettings {
                parent_child_crossfade: 1.0,
                ..settings("fore")
            },
        )
        .unwrap();
        follow_child.relax(&mut pose);
        assert!(pose.rotation(fore).abs_diff_eq(Quat::from_rotation_x(FRAC_PI_2), 1e-5));

        let mut pose = rest.clone();
        let disabled = TwistSolver::new(
            &skeleton,
            &TwistSolverSettings {
                weight: 0.0,
                ..settings("fore")
            },
        )
        .unwrap();
        disabled.relax(&mut pose);
        assert_eq!(pose, rest);
    }

    #[test]
    fn test_untwisted_limb_is_left_alone() {
        let skeleton = arm();
        let solver = TwistSolver::new(&skeleton, &settings("fore")).unwrap();
        let rest = skeleton.to_world(&skeleton.rest_pose(), &BoneTransform::IDENTITY, 1.0);
        let mut pose = rest.clone();
        solver.relax(&mut pose);
        let fore = skeleton.find("fore").unwrap();
        assert!(pose.rotation(fore).abs_diff_eq(rest.rotation(fore), 1e-6));
    }

    #[test]
    fn test_bad_twist_bones() {
        let skeleton = arm();
        assert_eq!(
            TwistSolver::new(&skeleton, &settings("elbow")).unwrap_err(),
            ConfigurationError::UnknownBone("elbow".into())
        );
        assert_eq!(
            TwistSolver::new(&skeleton, &settings("root")).unwrap_err(),
            ConfigurationError::TwistBoneNotInChain("root".into())
        );
        assert_eq!(
            TwistSolver::new(&skeleton, &settings("hand")).unwrap_err(),
            ConfigurationError::TwistBoneNotInChain("hand".into())
        );
        assert!(TwistRelaxer::new(&skeleton, &[settings("fore"), settings("nope")]).is_err());
    }
}
