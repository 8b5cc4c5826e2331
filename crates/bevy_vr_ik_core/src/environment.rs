//! Scene queries the solver needs but does not own.
//!
//! Ground detection and step blocking only ever go through [`RaycastProvider`],
//! which the host implements on top of whatever physics it runs.

use bevy_math::Vec3;
use bevy_reflect::{Reflect, std_traits::ReflectDefault};
use serde::{Deserialize, Serialize};

/// Bit set of collision layers a query is allowed to hit.
#[derive(Reflect, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[reflect(Default)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const ALL: Self = Self(u32::MAX);
    pub const NONE: Self = Self(0);

    pub fn layer(layer: u32) -> Self {
        Self(1u32.checked_shl(layer).unwrap_or(0))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, layer: u32) -> bool {
        1u32.checked_shl(layer).is_some_and(|bit| self.0 & bit != 0)
    }

    pub fn intersects(&self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::NONE
    }
}

#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq)]
#[reflect(Default)]
pub struct RaycastHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

pub trait RaycastProvider {
    /// First hit along a ray. `direction` does not need to be normalized.
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RaycastHit>;

    /// First hit of a swept sphere. Hosts without shape casts get a plain ray.
    fn sphere_cast(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RaycastHit> {
        let _ = radius;
        self.raycast(origin, direction, max_distance, mask)
    }
}

/// Empty world.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCollision;

impl RaycastProvider for NoCollision {
    fn raycast(&self, _: Vec3, _: Vec3, _: f32, _: LayerMask) -> Option<RaycastHit> {
        None
    }
}

/// Infinite one-sided plane living on a set of layers.
#[derive(Reflect, Clone, Copy, Debug, PartialEq)]
#[reflect(Default)]
pub struct GroundPlane {
    pub point: Vec3,
    pub normal: Vec3,
    pub layers: LayerMask,
}

impl GroundPlane {
    pub fn horizontal(height: f32) -> Self {
        Self {
            point: Vec3::new(0.0, height, 0.0),
            normal: Vec3::Y,
            layers: LayerMask::ALL,
        }
    }

    pub fn with_layers(mut self, layers: LayerMask) -> Self {
        self.layers = layers;
        self
    }
}

impl Default for GroundPlane {
    fn default() -> Self {
        Self::horizontal(0.0)
    }
}

impl RaycastProvider for GroundPlane {
    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RaycastHit> {
        if !self.layers.intersects(mask) {
            return None;
        }
        let direction = direction.try_normalize()?;
        let normal = self.normal.try_normalize()?;
        let denom = direction.dot(normal);
        if denom >= -f32::EPSILON {
            return None;
        }
        let distance = (self.point - origin).dot(normal) / denom;
        if !(0.0..=max_distance).contains(&distance) {
            return None;
        }
        Some(RaycastHit {
            point: origin + direction * distance,
            normal,
            distance,
        })
    }

    fn sphere_cast(
        &self,
        origin: Vec3,
        radius: f32,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RaycastHit> {
        let normal = self.normal.try_normalize()?;
        // Already touching the plane and moving into it
        let height = (origin - self.point).dot(normal);
        if height.abs() < radius && direction.dot(normal) < 0.0 {
            if !self.layers.intersects(mask) {
                return None;
            }
            return Some(RaycastHit {
                point: origin - normal * height,
                normal,
                distance: 0.0,
            });
        }
        // The sphere touches the plane when its centre crosses the plane lifted by the radius
        let lifted = GroundPlane {
            point: self.point + normal * radius,
            normal,
            layers: self.layers,
        };
        let hit = lifted.raycast(origin, direction, max_distance, mask)?;
        Some(RaycastHit {
            point: hit.point - normal * radius,
            ..hit
        })
    }
}
