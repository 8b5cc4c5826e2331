use bevy_math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{BoneTransform, Skeleton};
use crate::errors::ConfigurationError;

/// Name-based description of a bind pose, the form skeletons take on disk.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SkeletonSerial {
    pub bones: Vec<BoneSerial>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BoneSerial {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub translation: Vec3,
    #[serde(default = "default_rotation")]
    pub rotation: Quat,
}

fn default_rotation() -> Quat {
    Quat::IDENTITY
}

impl TryFrom<&SkeletonSerial> for Skeleton {
    type Error = ConfigurationError;

    fn try_from(serial: &SkeletonSerial) -> Result<Self, Self::Error> {
        if serial.bones.is_empty() {
            return Err(ConfigurationError::EmptySkeleton);
        }
        let mut skeleton = Skeleton::new();
        for bone in &serial.bones {
            let parent = match &bone.parent {
                Some(name) => Some(
                    skeleton
                        .find(name)
                        .ok_or_else(|| ConfigurationError::UnknownBone(name.clone()))?,
                ),
                None => None,
            };
            skeleton.add_bone(
                bone.name.clone(),
                parent,
                BoneTransform::new(bone.translation, bone.rotation),
            )?;
        }
        Ok(skeleton)
    }
}

impl From<&Skeleton> for SkeletonSerial {
    fn from(skeleton: &Skeleton) -> Self {
        Self {
            bones: skeleton
                .bones()
                .iter()
                .map(|bone| BoneSerial {
                    name: bone.name.clone(),
                    parent: bone
                        .parent
                        .and_then(|p| skeleton.name(p))
                        .map(str::to_string),
                    translation: bone.rest.translation,
                    rotation: bone.rest.rotation,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parents_are_resolved_by_name() {
        let serial = SkeletonSerial {
            bones: vec![
                BoneSerial {
                    name: "hips".into(),
                    parent: None,
                    translation: Vec3::Y,
                    rotation: Quat::IDENTITY,
                },
                BoneSerial {
                    name: "spine".into(),
                    parent: Some("hips".into()),
                    translation: Vec3::Y * 0.1,
                    rotation: Quat::IDENTITY,
                },
            ],
        };
        let skeleton = Skeleton::try_from(&serial).unwrap();
        assert_eq!(skeleton.parent(1), Some(0));
        assert_eq!(SkeletonSerial::from(&skeleton), serial);
    }

    #[test]
    fn test_unknown_parent() {
        let serial = SkeletonSerial {
            bones: vec![BoneSerial {
                name: "spine".into(),
                parent: Some("hips".into()),
                translation: Vec3::ZERO,
                rotation: Quat::IDENTITY,
            }],
        };
        assert_eq!(
            Skeleton::try_from(&serial).unwrap_err(),
            ConfigurationError::UnknownBone("hips".into())
        );
    }
}
