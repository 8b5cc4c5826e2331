use bevy_math::{Quat, Vec3};
use bevy_reflect::{Reflect, std_traits::ReflectDefault};
use bevy_vr_ik_core::{environment::RaycastProvider, skeleton::Side};

use crate::locomotion::AnimatorFeedback;

/// A tracked pose in world space.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq)]
#[reflect(Default)]
pub struct IkTarget {
    pub position: Vec3,
    pub rotation: Quat,
}

impl IkTarget {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

/// Everything tracked this frame. Absent head or hand targets keep their last
/// known pose, absent pelvis and foot targets leave those bones to the solver.
///
/// Foot targets drive the last bone of each leg (the toes when they are mapped).
#[derive(Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Default)]
pub struct TrackingInput {
    pub head: Option<IkTarget>,
    pub pelvis: Option<IkTarget>,
    pub left_hand: Option<IkTarget>,
    pub right_hand: Option<IkTarget>,
    pub left_foot: Option<IkTarget>,
    pub right_foot: Option<IkTarget>,
    pub chest_goal: Option<Vec3>,
    pub left_elbow_goal: Option<Vec3>,
    pub right_elbow_goal: Option<Vec3>,
    pub left_knee_goal: Option<Vec3>,
    pub right_knee_goal: Option<Vec3>,
}

impl TrackingInput {
    /// Three point tracking.
    pub fn three_point(head: IkTarget, left_hand: IkTarget, right_hand: IkTarget) -> Self {
        Self {
            head: Some(head),
            left_hand: Some(left_hand),
            right_hand: Some(right_hand),
            ..Default::default()
        }
    }

    pub fn hand(&self, side: Side) -> Option<IkTarget> {
        match side {
            Side::Left => self.left_hand,
            Side::Right => self.right_hand,
        }
    }

    pub fn foot(&self, side: Side) -> Option<IkTarget> {
        match side {
            Side::Left => self.left_foot,
            Side::Right => self.right_foot,
        }
    }

    pub fn elbow_goal(&self, side: Side) -> Option<Vec3> {
        match side {
            Side::Left => self.left_elbow_goal,
            Side::Right => self.right_elbow_goal,
        }
    }

    pub fn knee_goal(&self, side: Side) -> Option<Vec3> {
        match side {
            Side::Left => self.left_knee_goal,
            Side::Right => self.right_knee_goal,
        }
    }
}

/// Per-frame collaborators of a solve.
pub struct SolveContext<'a> {
    /// Seconds since the previous update.
    pub delta_time: f32,
    pub raycaster: &'a dyn RaycastProvider,
    /// What the external animation system did since the last update. Only read
    /// in animated locomotion mode.
    pub animator: AnimatorFeedback,
}

impl<'a> SolveContext<'a> {
    pub fn new(delta_time: f32, raycaster: &'a dyn RaycastProvider) -> Self {
        Self {
            delta_time,
            raycaster,
            animator: AnimatorFeedback::default(),
        }
    }

    pub fn with_animator(mut self, animator: AnimatorFeedback) -> Self {
        self.animator = animator;
        self
    }
}
