use thiserror::Error;

use crate::skeleton::BodySlot;

/// Problems with a rig or its settings that prevent the solver from being built.
///
/// These are reported once, when the solver is created. Nothing that happens
/// while solving produces one of these.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("skeleton has no bones")]
    EmptySkeleton,
    #[error("bone {bone:?} names parent #{parent}, which does not precede it")]
    ParentOutOfOrder { bone: String, parent: usize },
    #[error("bone name {0:?} is used more than once")]
    DuplicateBoneName(String),
    #[error("no bone named {0:?} in skeleton")]
    UnknownBone(String),
    #[error("required bone {0:?} is not assigned")]
    MissingBone(BodySlot),
    #[error("{slot:?} points at bone #{index}, but the skeleton only has {len} bones")]
    BoneIndexOutOfRange {
        slot: BodySlot,
        index: usize,
        len: usize,
    },
    #[error("{first:?} and {second:?} both point at bone #{index}")]
    DuplicateBoneReference {
        first: BodySlot,
        second: BodySlot,
        index: usize,
    },
    #[error("{slot:?} is not a descendant of {ancestor:?}")]
    BrokenHierarchy { slot: BodySlot, ancestor: BodySlot },
    #[error("legs must be assigned completely (thigh, calf and foot on both sides) or not at all")]
    IncompleteLegs,
    #[error("toes must be assigned on both legs or on neither")]
    IncompleteToes,
    #[error("scale must be positive, got {0}")]
    InvalidScale(f32),
    #[error("setting {name} = {value} is outside {min}..={max}")]
    SettingOutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("curve {0} has keys out of time order")]
    UnsortedCurve(&'static str),
    #[error("LOD must be 0, 1 or 2, got {0}")]
    InvalidLod(u8),
    #[error("hand orientation axes of the {0} arm are unset and could not be guessed")]
    UnsetHandAxes(&'static str),
    #[error("could not detect the {0:?} bone by name")]
    DetectionFailed(BodySlot),
    #[error("twist bone {0:?} needs both a parent and a child")]
    TwistBoneNotInChain(String),
}
