//! A small humanoid used by the solver tests.

use bevy_math::Vec3;
use bevy_vr_ik_core::skeleton::{BodyBones, BoneTransform, Skeleton};

use crate::body_part::SlotPoses;

pub struct TestRig {
    pub skeleton: Skeleton,
    pub bones: BodyBones,
}

impl TestRig {
    /// Mixamo style names, standing at the origin facing `+Z`. Hips at 1.0,
    /// head at 1.6, toes on the ground. Knees and elbows are slightly bent.
    pub fn humanoid() -> Self {
        let skeleton = Self::humanoid_skeleton(true);
        let bones = BodyBones::auto_detect(&skeleton).unwrap();
        Self { skeleton, bones }
    }

    /// The same body without legs.
    pub fn legless() -> Self {
        let skeleton = Self::humanoid_skeleton(false);
        let bones = BodyBones::auto_detect(&skeleton).unwrap();
        Self { skeleton, bones }
    }

    fn humanoid_skeleton(with_legs: bool) -> Skeleton {
        let mut s = Skeleton::new();
        let mut add = |name: &str, parent: Option<usize>, offset: Vec3| {
            s.add_bone(name, parent, BoneTransform::from_translation(offset))
                .unwrap()
        };

        let root = add("Armature", None, Vec3::ZERO);
        let hips = add("mixamorig:Hips", Some(root), Vec3::new(0.0, 1.0, 0.0));
        let spine = add("mixamorig:Spine", Some(hips), Vec3::new(0.0, 0.1, 0.0));
        let chest = add("mixamorig:Spine2", Some(spine), Vec3::new(0.0, 0.2, 0.0));
        let neck = add("mixamorig:Neck", Some(chest), Vec3::new(0.0, 0.2, 0.0));
        add("mixamorig:Head", Some(neck), Vec3::new(0.0, 0.1, 0.0));

        for (side, x) in [("Left", 1.0), ("Right", -1.0)] {
            let shoulder = add(
                &format!("mixamorig:{side}Shoulder"),
                Some(chest),
                Vec3::new(0.05 * x, 0.15, 0.0),
            );
            let arm = add(&format!("mixamorig:{side}Arm"), Some(shoulder), Vec3::new(0.1 * x, 0.0, 0.0));
            let forearm = add(
                &format!("mixamorig:{side}ForeArm"),
                Some(arm),
                Vec3::new(0.25 * x, 0.0, -0.02),
            );
            let hand = add(
                &format!("mixamorig:{side}Hand"),
                Some(forearm),
                Vec3::new(0.25 * x, 0.0, 0.02),
            );
            add(
                &format!("mixamorig:{side}HandThumb1"),
                Some(hand),
                Vec3::new(0.02 * x, 0.0, 0.03),
            );
            add(
                &format!("mixamorig:{side}HandMiddle1"),
                Some(hand),
                Vec3::new(0.09 * x, 0.0, 0.0),
            );

            if with_legs {
                let thigh = add(&format!("mixamorig:{side}UpLeg"), Some(hips), Vec3::new(0.1 * x, -0.05, 0.0));
                let calf = add(&format!("mixamorig:{side}Leg"), Some(thigh), Vec3::new(0.0, -0.45, 0.02));
                let foot = add(&format!("mixamorig:{side}Foot"), Some(calf), Vec3::new(0.0, -0.45, -0.02));
                add(&format!("mixamorig:{side}ToeBase"), Some(foot), Vec3::new(0.0, -0.05, 0.12));
            }
        }
        s
    }

    pub fn rest_slots(&self) -> SlotPoses {
        let world = self
            .skeleton
            .to_world(&self.skeleton.rest_pose(), &BoneTransform::IDENTITY, 1.0);
        SlotPoses::from_pose(&world, &self.bones)
    }
}
