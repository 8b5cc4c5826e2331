use bevy_math::{Quat, Vec3};
use bevy_reflect::{Reflect, std_traits::ReflectDefault};
use serde::{Deserialize, Serialize};

/// Rigid transform of a single bone. Whether it is relative to the parent bone
/// or to the world depends on the [`Pose`] it lives in.
#[derive(Reflect, Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
pub struct BoneTransform {
    #[serde(default)]
    pub translation: Vec3,
    #[serde(default)]
    pub rotation: Quat,
}

impl BoneTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quat::IDENTITY)
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self::new(Vec3::ZERO, rotation)
    }

    /// Places `local` under `self`, with the local translation scaled uniformly.
    pub fn mul_scaled(&self, local: &BoneTransform, scale: f32) -> BoneTransform {
        BoneTransform {
            translation: self.translation + self.rotation * (local.translation * scale),
            rotation: (self.rotation * local.rotation).normalize(),
        }
    }

    /// Inverse of [`BoneTransform::mul_scaled`]: expresses `world` relative to `self`.
    pub fn relative_scaled(&self, world: &BoneTransform, scale: f32) -> BoneTransform {
        let inverse = self.rotation.inverse();
        let scale = if scale.abs() > f32::EPSILON { scale } else { 1.0 };
        BoneTransform {
            translation: inverse * (world.translation - self.translation) / scale,
            rotation: (inverse * world.rotation).normalize(),
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * point
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.translation)
    }
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One transform per skeleton bone, indexed like the skeleton.
#[derive(Reflect, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
pub struct Pose {
    pub bones: Vec<BoneTransform>,
}

impl Pose {
    pub fn new(bones: Vec<BoneTransform>) -> Self {
        Self { bones }
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BoneTransform> {
        self.bones.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut BoneTransform> {
        self.bones.get_mut(index)
    }

    pub fn position(&self, index: usize) -> Vec3 {
        self.bones
            .get(index)
            .map(|b| b.translation)
            .unwrap_or_default()
    }

    pub fn rotation(&self, index: usize) -> Quat {
        self.bones
            .get(index)
            .map(|b| b.rotation)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scaled_composition_round_trips() {
        let parent = BoneTransform::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.5));
        let local = BoneTransform::new(Vec3::new(0.0, 0.3, 0.1), Quat::from_rotation_x(0.2));

        let world = parent.mul_scaled(&local, 2.0);
        let offset = (world.translation - parent.translation).length();
        assert!((offset - 2.0 * local.translation.length()).abs() < 1e-5);

        let back = parent.relative_scaled(&world, 2.0);
        assert!(back.translation.abs_diff_eq(local.translation, 1e-5));
        assert!(back.rotation.abs_diff_eq(local.rotation, 1e-5));
    }
}
