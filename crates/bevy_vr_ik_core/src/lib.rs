//! Building blocks of the `bevy_vr_ik` body solver: math helpers, curves, the
//! [`VirtualBone`](virtual_bone::VirtualBone) chain, skeleton bind poses and
//! the body bone mapping.

pub mod curve;
pub mod environment;
pub mod errors;
pub mod math;
pub mod skeleton;
pub mod virtual_bone;

pub mod prelude {
    pub use crate::{
        curve::{CurveKey, FloatCurve},
        environment::{GroundPlane, LayerMask, NoCollision, RaycastHit, RaycastProvider},
        errors::ConfigurationError,
        math::Interpolation,
        skeleton::{BodyBones, BodySlot, BoneTransform, Pose, Side, Skeleton, SkeletonSerial},
        virtual_bone::VirtualBone,
    };
}
