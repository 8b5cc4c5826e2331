//! # Bevy VR IK
//!
//! Full body inverse kinematics for characters driven by VR tracking. Only the
//! head and both hands need to be tracked; pelvis, feet, chest, elbow and knee
//! goals can be added when available.
//!
//! The [`VrIkSolver`](solver::VrIkSolver) owns one character. It is built once
//! from a [`Skeleton`](bevy_vr_ik_core::skeleton::Skeleton), the
//! [`BodyBones`](bevy_vr_ik_core::skeleton::BodyBones) mapping of that skeleton
//! and a set of [`VrIkSettings`](settings::VrIkSettings), which can be loaded
//! from `*.vrik.ron` files with the [`loader`] module:
//!
//! ```ron
//! (
//!     scale: 1.0,
//!     plant_feet: true,
//!     spine: (
//!         neck_stiffness: 0.2,
//!         max_root_angle: 25.0,
//!     ),
//!     locomotion: (
//!         mode: Procedural,
//!         procedural: (
//!             foot_distance: 0.3,
//!             step_threshold: 0.4,
//!         ),
//!     ),
//! )
//! ```
//!
//! Every frame the host sets the animated pose, calls
//! [`update`](solver::VrIkSolver::update) with the tracked targets and reads
//! back the solved pose:
//!
//! ```ignore
//! solver.set_animated_pose(animated_local_pose);
//! let input = TrackingInput::three_point(head, left_hand, right_hand);
//! let pose = solver.update(&input, &SolveContext::new(delta_time, &physics));
//! ```
//!
//! ## Locomotion
//!
//! With procedural locomotion the solver steps the feet itself and moves the
//! character [`root`](solver::VrIkSolver::root) to stay under the body. With
//! animated locomotion it produces
//! [`AnimatorParameters`](locomotion::AnimatorParameters) for a blend tree
//! instead, and follows the root motion that tree reports back.

pub mod arm;
pub mod body_part;
pub mod errors;
pub mod input;
pub mod leg;
pub mod loader;
pub mod locomotion;
pub mod settings;
pub mod solver;
pub mod spine;
pub mod twist;

#[cfg(test)]
mod test_rig;

pub mod prelude {
    pub use super::errors::*;
    pub use super::input::*;
    pub use super::locomotion::{
        AnimatedLocomotionState, AnimatorFeedback, AnimatorParameters, FootstepEvent, StepPhase,
    };
    pub use super::settings::*;
    pub use super::solver::*;
    pub use bevy_vr_ik_core::prelude::*;
}
