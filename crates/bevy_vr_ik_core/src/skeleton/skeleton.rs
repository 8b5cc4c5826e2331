use std::fmt::Debug;

use bevy_reflect::{Reflect, std_traits::ReflectDefault};

use super::{BoneTransform, Pose};
use crate::errors::ConfigurationError;

#[derive(Reflect, Clone, Debug, Default)]
#[reflect(Default)]
pub struct SkeletonBone {
    pub name: String,
    pub parent: Option<usize>,
    /// Bind transform relative to the parent bone.
    pub rest: BoneTransform,
}

/// Bind pose hierarchy. Parents always precede their children, so a single
/// forward pass over the bones is enough for forward kinematics.
#[derive(Reflect, Clone, Default)]
#[reflect(Default)]
pub struct Skeleton {
    bones: Vec<SkeletonBone>,
    children: Vec<Vec<usize>>,
    rest_world: Vec<BoneTransform>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<usize>,
        rest: BoneTransform,
    ) -> Result<usize, ConfigurationError> {
        let name = name.into();
        let index = self.bones.len();

        if let Some(parent) = parent
            && parent >= index
        {
            return Err(ConfigurationError::ParentOutOfOrder { bone: name, parent });
        }
        if self.find(&name).is_some() {
            return Err(ConfigurationError::DuplicateBoneName(name));
        }

        let world = match parent {
            Some(parent) => self.rest_world[parent].mul_scaled(&rest, 1.0),
            None => rest,
        };
        if let Some(parent) = parent {
            self.children[parent].push(index);
        }

        self.bones.push(SkeletonBone { name, parent, rest });
        self.children.push(vec![]);
        self.rest_world.push(world);

        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[SkeletonBone] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> Option<&SkeletonBone> {
        self.bones.get(index)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.bones.get(index).map(|b| b.name.as_str())
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.bones.get(index).and_then(|b| b.parent)
    }

    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// Bind transform in skeleton space.
    pub fn rest_world(&self, index: usize) -> Option<BoneTransform> {
        self.rest_world.get(index).copied()
    }

    /// Number of ancestors above `index`.
    pub fn depth(&self, index: usize) -> usize {
        let mut depth = 0;
        let mut current = self.parent(index);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }

    /// Whether `ancestor` is a strict ancestor of `bone`.
    pub fn is_descendant(&self, bone: usize, ancestor: usize) -> bool {
        let mut current = self.parent(bone);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Bind pose relative to parents.
    pub fn rest_pose(&self) -> Pose {
        Pose::new(self.bones.iter().map(|b| b.rest).collect())
    }

    /// Forward kinematics: parent-relative `local` pose to world space, with the
    /// skeleton placed at `placement` and uniformly scaled by `scale`. Bones
    /// missing from `local` use their bind transform.
    pub fn to_world(&self, local: &Pose, placement: &BoneTransform, scale: f32) -> Pose {
        let mut world: Vec<BoneTransform> = Vec::with_capacity(self.bones.len());
        for (index, bone) in self.bones.iter().enumerate() {
            let local = local.get(index).unwrap_or(&bone.rest);
            let parent = match bone.parent {
                Some(parent) => world[parent],
                None => *placement,
            };
            world.push(parent.mul_scaled(local, scale));
        }
        Pose::new(world)
    }

    /// Inverse of [`Skeleton::to_world`].
    pub fn to_local(&self, world: &Pose, placement: &BoneTransform, scale: f32) -> Pose {
        let mut local = Vec::with_capacity(self.bones.len());
        for (index, bone) in self.bones.iter().enumerate() {
            let Some(transform) = world.get(index) else {
                local.push(bone.rest);
                continue;
            };
            let parent = match bone.parent {
                Some(parent) => world.get(parent).unwrap_or(placement),
                None => placement,
            };
            local.push(parent.relative_scaled(transform, scale));
        }
        Pose::new(local)
    }

    fn indent(f: &mut std::fmt::Formatter<'_>, level: u32) -> std::fmt::Result {
        if level == 0 {
            return Ok(());
        }
        for _ in 0..(level - 1) {
            write!(f, "┃ ")?;
        }
        write!(f, "┣━")?;
        Ok(())
    }

    fn fmt_level(&self, f: &mut std::fmt::Formatter<'_>, level: u32, bones: &[usize]) -> std::fmt::Result {
        for &bone in bones {
            Self::indent(f, level)?;
            writeln!(f, "🦴 {:?} [#{}]", self.bones[bone].name, bone)?;
            self.fmt_level(f, level + 1, self.children(bone))?;
        }
        Ok(())
    }
}

impl Debug for Skeleton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Skeleton hierarchy:")?;
        let roots: Vec<usize> = (0..self.bones.len())
            .filter(|&i| self.bones[i].parent.is_none())
            .collect();
        self.fmt_level(f, 0, &roots)
    }
}

#[cfg(test)]
mod test {
    use bevy_math::{Quat, Vec3};

    use super::*;

    fn chain() -> Skeleton {
        let mut skeleton = Skeleton::new();
        let root = skeleton
            .add_bone("root", None, BoneTransform::IDENTITY)
            .unwrap();
        let a = skeleton
            .add_bone(
                "a",
                Some(root),
                BoneTransform::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_z(0.5)),
            )
            .unwrap();
        skeleton
            .add_bone("b", Some(a), BoneTransform::from_translation(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();
        skeleton
    }

    #[test]
    fn test_parents_must_come_first() {
        let mut skeleton = Skeleton::new();
        let err = skeleton
            .add_bone("orphan", Some(0), BoneTransform::IDENTITY)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::ParentOutOfOrder { .. }));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut skeleton = chain();
        let err = skeleton.add_bone("a", Some(0), BoneTransform::IDENTITY).unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateBoneName("a".into()));
    }

    #[test]
    fn test_hierarchy_queries() {
        let skeleton = chain();
        assert_eq!(skeleton.children(0), &[1]);
        assert_eq!(skeleton.depth(2), 2);
        assert!(skeleton.is_descendant(2, 0));
        assert!(!skeleton.is_descendant(0, 2));
        assert!(!skeleton.is_descendant(1, 1));
    }

    #[test]
    fn test_rest_world_matches_fk() {
        let skeleton = chain();
        let world = skeleton.to_world(&skeleton.rest_pose(), &BoneTransform::IDENTITY, 1.0);
        for i in 0..skeleton.len() {
            let rest = skeleton.rest_world(i).unwrap();
            assert!(world.bones[i].translation.abs_diff_eq(rest.translation, 1e-5));
        }
    }

    #[test]
    fn test_world_local_round_trip_with_scale() {
        let skeleton = chain();
        let placement = BoneTransform::new(Vec3::new(3.0, 0.0, -1.0), Quat::from_rotation_y(1.0));
        let world = skeleton.to_world(&skeleton.rest_pose(), &placement, 1.5);

        let b = world.position(2);
        let a = world.position(1);
        assert!((a.distance(b) - 1.5).abs() < 1e-5);

        let local = skeleton.to_local(&world, &placement, 1.5);
        for (l, r) in local.bones.iter().zip(skeleton.rest_pose().bones.iter()) {
            assert!(l.translation.abs_diff_eq(r.translation, 1e-5));
            assert!(l.rotation.abs_diff_eq(r.rotation, 1e-5));
        }
    }
}
