//! Keeping the feet and the root under a body that is only tracked at the head
//! and hands, either by stepping procedurally or by driving an external
//! animation blend tree.

mod animated;
mod footstep;
mod procedural;

pub use animated::*;
pub use footstep::*;
pub use procedural::*;

use bevy_math::Vec3;
use bevy_reflect::{Reflect, std_traits::ReflectDefault};
use bevy_vr_ik_core::{
    environment::RaycastProvider,
    math::{flatten, lerp_clamped},
    skeleton::Side,
    virtual_bone::VirtualBone,
};
use serde::{Deserialize, Serialize};

use crate::settings::ProceduralLocomotionSettings;

/// Blend tree parameters produced in animated mode.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[reflect(Default)]
pub struct AnimatorParameters {
    /// Sideways speed in root space, positive to the right, divided by scale.
    pub horizontal: f32,
    /// Forward speed in root space, divided by scale.
    pub vertical: f32,
    /// Turn in place, positive to the right.
    pub turn: f32,
    pub is_moving: bool,
    /// Playback speed multiplier for the locomotion clips.
    pub speed: f32,
}

/// What the animation system reports back after playing the last parameters.
#[derive(Reflect, Clone, Debug, Default, PartialEq)]
#[reflect(Default)]
pub struct AnimatorFeedback {
    /// Root motion of the last played frame, in world space.
    pub delta_position: Vec3,
    /// User tag of the transition the state machine is currently in.
    pub transition_tag: Option<String>,
}

#[derive(Reflect, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepPhase {
    /// The foot left the ground.
    Lift,
    /// The foot landed.
    Plant,
}

#[derive(Reflect, Clone, Copy, Debug, PartialEq)]
pub struct FootstepEvent {
    pub side: Side,
    pub phase: StepPhase,
    /// Where the foot is, or where it will land for [`StepPhase::Lift`].
    pub position: Vec3,
}

/// Picks the leg the body pivots around.
///
/// The support leg is the planted foot that moved least since the previous
/// frame. On a tie the current support leg is kept.
#[derive(Reflect, Clone, Debug, Default)]
#[reflect(Default)]
pub struct SupportLegTracker {
    current: Option<Side>,
    last_positions: Option<[Vec3; 2]>,
}

impl SupportLegTracker {
    const TIE: f32 = 1e-5;

    pub fn current(&self) -> Option<Side> {
        self.current
    }

    pub fn reset(&mut self) {
        self.last_positions = None;
    }

    /// `positions` and `planted` are indexed by [`Side::index`].
    pub fn update(&mut self, positions: [Vec3; 2], planted: [bool; 2]) -> Option<Side> {
        let last = self.last_positions.unwrap_or(positions);
        self.last_positions = Some(positions);

        let moved = |side: Side| positions[side.index()].distance(last[side.index()]);
        let (left, right) = if planted.contains(&true) {
            let planted_moved = |side: Side| {
                if planted[side.index()] {
                    moved(side)
                } else {
                    f32::INFINITY
                }
            };
            (planted_moved(Side::Left), planted_moved(Side::Right))
        } else {
            // Both feet in the air, the foot that moved least still carries the body
            (moved(Side::Left), moved(Side::Right))
        };

        let best = Self::pick(left, right, self.current);
        self.current = Some(best);
        Some(best)
    }

    fn pick(left: f32, right: f32, current: Option<Side>) -> Side {
        if (left - right).abs() <= Self::TIE {
            current.unwrap_or(Side::Left)
        } else if left < right {
            Side::Left
        } else {
            Side::Right
        }
    }
}

/// Keeps the pelvis out of obstacles on the blocking layers by sweeping from
/// where the pelvis was towards where it wants to go.
#[derive(Reflect, Clone, Debug, Default)]
#[reflect(Default)]
pub struct PelvisBlocking {
    pub raycast_origin: Vec3,
    last_offset: Vec3,
}

impl PelvisBlocking {
    const MAX_OFFSET: f32 = 0.75;

    pub fn reset(&mut self, origin: Vec3) {
        self.raycast_origin = origin;
        self.last_offset = Vec3::ZERO;
    }

    pub fn add_delta_position(&mut self, delta: Vec3) {
        self.raycast_origin += delta;
    }

    /// Offset to push the pelvis by on the next frame.
    pub fn offset(
        &mut self,
        settings: &ProceduralLocomotionSettings,
        pelvis: &VirtualBone,
        up: Vec3,
        delta_time: f32,
        raycaster: &dyn RaycastProvider,
    ) -> Vec3 {
        if !settings.blocking_enabled || settings.blocking_layers.is_empty() {
            return Vec3::ZERO;
        }

        let level = |p: Vec3| p - up * (p - pelvis.solver_position).dot(up);
        let sampled_origin = level(self.raycast_origin);
        let mut origin = level(pelvis.read_position);

        // From last frame's pelvis to the animated one
        let direction = origin - sampled_origin;
        if let Some(hit) = sweep(raycaster, settings, sampled_origin, direction, 1.1) {
            origin = sampled_origin + direction.normalize_or_zero() * hit;
        }

        // From there to the solved one
        let mut position = pelvis.solver_position;
        let direction = position - origin;
        if let Some(hit) = sweep(raycaster, settings, origin, direction, 1.0) {
            position = origin + direction.normalize_or_zero() * hit;
        }

        self.last_offset = lerp_clamped(self.last_offset, Vec3::ZERO, delta_time * 3.0);
        position += self.last_offset.clamp_length_max(Self::MAX_OFFSET);
        position = level(position);
        self.last_offset = lerp_clamped(
            self.last_offset,
            flatten(position - pelvis.solver_position, up),
            delta_time * 15.0,
        )
        .clamp_length_max(Self::MAX_OFFSET);

        self.raycast_origin = pelvis.solver_position + self.last_offset;
        self.last_offset
    }
}

/// Distance to the first blocking hit along `direction`, scaled back by
/// `reach` so that the body stops short of the obstacle.
fn sweep(
    raycaster: &dyn RaycastProvider,
    settings: &ProceduralLocomotionSettings,
    origin: Vec3,
    direction: Vec3,
    reach: f32,
) -> Option<f32> {
    let length = direction.length();
    if length <= f32::EPSILON {
        return None;
    }
    let hit = if settings.raycast_radius <= 0.0 {
        raycaster.raycast(origin, direction, length * reach, settings.blocking_layers)
    } else {
        raycaster.sphere_cast(
            origin,
            settings.raycast_radius * reach,
            direction,
            length,
            settings.blocking_layers,
        )
    }?;
    Some(hit.distance / reach)
}

#[cfg(test)]
mod test {
    use bevy_math::Quat;
    use bevy_vr_ik_core::environment::{GroundPlane, LayerMask, NoCollision};

    use super::*;

    #[test]
    fn test_support_leg_is_stable_when_standing() {
        let mut tracker = SupportLegTracker::default();
        let feet = [Vec3::new(0.1, 0.0, 0.0), Vec3::new(-0.1, 0.0, 0.0)];
        let first = tracker.update(feet, [true, true]);
        for _ in 0..100 {
            assert_eq!(tracker.update(feet, [true, true]), first);
        }
    }

    #[test]
    fn test_support_leg_follows_the_planted_foot() {
        let mut tracker = SupportLegTracker::default();
        let mut feet = [Vec3::new(0.1, 0.0, 0.0), Vec3::new(-0.1, 0.0, 0.0)];
        tracker.update(feet, [true, true]);
        assert_eq!(tracker.current(), Some(Side::Left));

        // Left foot steps, right carries the body
        feet[0].z += 0.05;
        assert_eq!(tracker.update(feet, [false, true]), Some(Side::Right));
        // Both planted again and still: keep the right leg
        assert_eq!(tracker.update(feet, [true, true]), Some(Side::Right));
        assert_eq!(tracker.update(feet, [true, true]), Some(Side::Right));
    }

    #[test]
    fn test_pelvis_blocking_disabled() {
        let mut blocking = PelvisBlocking::default();
        let pelvis = VirtualBone::new(Vec3::new(0.0, 1.0, 2.0), Quat::IDENTITY);
        let offset = blocking.offset(
            &ProceduralLocomotionSettings::default(),
            &pelvis,
            Vec3::Y,
            0.016,
            &NoCollision,
        );
        assert_eq!(offset, Vec3::ZERO);
    }

    #[test]
    fn test_pelvis_stops_at_wall() {
        let settings = ProceduralLocomotionSettings {
            blocking_enabled: true,
            blocking_layers: LayerMask::layer(1),
            raycast_radius: 0.0,
            ..Default::default()
        };
        // Wall at z = 0.5 facing the character
        let wall = GroundPlane {
            point: Vec3::new(0.0, 0.0, 0.5),
            normal: Vec3::NEG_Z,
            layers: LayerMask::layer(1),
        };
        let mut blocking = PelvisBlocking::default();
        blocking.reset(Vec3::new(0.0, 1.0, 0.0));
        let pelvis = VirtualBone::new(Vec3::new(0.0, 1.0, 1.0), Quat::IDENTITY);

        let mut offset = Vec3::ZERO;
        for _ in 0..200 {
            blocking.raycast_origin = Vec3::new(0.0, 1.0, 0.0);
            offset = blocking.offset(&settings, &pelvis, Vec3::Y, 0.02, &wall);
        }
        // Pushed back towards the wall, never further than the limit
        assert!(offset.z < -0.3);
        assert!(offset.length() <= 0.75 + 1e-4);
        assert!(offset.y.abs() < 1e-5);
    }
}
