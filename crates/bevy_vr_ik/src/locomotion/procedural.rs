use bevy_math::{Quat, Vec3};
use bevy_reflect::Reflect;
use bevy_vr_ik_core::{
    environment::RaycastProvider,
    math::{
        LEFT, UP, extract_vertical, flatten, lerp_clamped, lerp_f32, look_rotation, point_to_plane,
        quat_lerp, rotation_delta,
    },
    skeleton::{BodySlot, Side},
    virtual_bone::VirtualBone,
};

use super::{Footstep, FootstepEvent, StepPhase};
use crate::{
    body_part::SlotPoses,
    leg::Leg,
    settings::{LegSettings, ProceduralLocomotionSettings},
    spine::Spine,
};

/// Feet closer than this (times scale) are checked for crossing each other.
const FOOT_RADIUS: f32 = 0.25;

/// Where locomotion wants one foot this frame.
#[derive(Reflect, Clone, Copy, Debug, PartialEq)]
pub struct FootPlacement {
    pub position: Vec3,
    pub rotation: Quat,
    /// Lift of the foot along the root up axis.
    pub step_height: f32,
    /// Lift of the heel around the toes.
    pub heel_height: f32,
}

impl Default for FootPlacement {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            step_height: 0.0,
            heel_height: 0.0,
        }
    }
}

/// The body as the procedural locomotion sees it, plus the parts it steers.
pub struct ProceduralContext<'a> {
    pub root_bone: &'a mut VirtualBone,
    pub spine: &'a Spine,
    /// Left then right.
    pub legs: &'a mut [Leg],
    pub leg_settings: [&'a LegSettings; 2],
    /// Hand targets after offsets, left then right.
    pub hand_positions: [Vec3; 2],
    pub support_leg: Option<Side>,
    pub ik_position_weight: f32,
    pub weight: f32,
    pub scale: f32,
    pub delta_time: f32,
    pub raycaster: &'a dyn RaycastProvider,
}

/// Stationary foot shuffling: steps the feet under the centre of mass and
/// keeps the root between them.
#[derive(Reflect, Clone, Debug)]
pub struct ProceduralLocomotion {
    footsteps: [Footstep; 2],
    placements: [FootPlacement; 2],
    last_com_position: Vec3,
    com_velocity: Vec3,
    root_velocity: Vec3,
    body_offset: Vec3,
    events: Vec<FootstepEvent>,
}

impl ProceduralLocomotion {
    pub fn new(poses: &SlotPoses, has_toes: bool) -> Self {
        let root_rotation = poses.rotation(BodySlot::Root);
        let footstep = |side: Side| {
            let slot = last_leg_slot(side, has_toes);
            Footstep::new(root_rotation, poses.position(slot), poses.rotation(slot), Vec3::ZERO)
        };
        let mut locomotion = Self {
            footsteps: [footstep(Side::Left), footstep(Side::Right)],
            placements: [FootPlacement::default(); 2],
            last_com_position: Vec3::ZERO,
            com_velocity: Vec3::ZERO,
            root_velocity: Vec3::ZERO,
            body_offset: Vec3::ZERO,
            events: vec![],
        };
        locomotion.reset(poses, has_toes);
        locomotion
    }

    /// Plants both feet where they are animated and forgets all velocities.
    pub fn reset(&mut self, poses: &SlotPoses, has_toes: bool) {
        let root_rotation = poses.rotation(BodySlot::Root);
        for side in Side::BOTH {
            let slot = last_leg_slot(side, has_toes);
            let (position, rotation) = (poses.position(slot), poses.rotation(slot));
            self.footsteps[side.index()].reset(root_rotation, position, rotation);
            self.placements[side.index()] = FootPlacement {
                position,
                rotation,
                ..Default::default()
            };
        }
        self.last_com_position = center_of_mass(
            poses.position(BodySlot::Pelvis),
            poses.position(BodySlot::Head),
            [poses.position(BodySlot::LeftHand), poses.position(BodySlot::RightHand)],
        );
        self.com_velocity = Vec3::ZERO;
        self.root_velocity = Vec3::ZERO;
        self.body_offset = Vec3::ZERO;
        self.events.clear();
    }

    pub fn footstep(&self, side: Side) -> &Footstep {
        &self.footsteps[side.index()]
    }

    pub fn foot_placement(&self, side: Side) -> &FootPlacement {
        &self.placements[side.index()]
    }

    pub fn is_planted(&self, side: Side) -> bool {
        !self.footsteps[side.index()].is_stepping()
    }

    /// Steps started and finished during the last solve.
    pub fn events(&self) -> &[FootstepEvent] {
        &self.events
    }

    pub fn add_delta_position(&mut self, delta: Vec3) {
        for footstep in self.footsteps.iter_mut() {
            footstep.add_delta_position(delta);
        }
        self.last_com_position += delta;
    }

    pub fn add_delta_rotation(&mut self, delta: Quat, pivot: Vec3) {
        for footstep in self.footsteps.iter_mut() {
            footstep.add_delta_rotation(delta, pivot);
        }
        self.last_com_position = pivot + delta * (self.last_com_position - pivot);
        self.root_velocity = delta * self.root_velocity;
        self.body_offset = delta * self.body_offset;
    }

    /// Advances the footsteps, writes the foot offsets into the legs and moves
    /// the root towards the feet. Returns the vertical body offset the spine
    /// should add when it translates to the head.
    pub fn solve(&mut self, settings: &ProceduralLocomotionSettings, ctx: ProceduralContext) -> Vec3 {
        let ProceduralContext {
            root_bone,
            spine,
            legs,
            leg_settings,
            hand_positions,
            support_leg,
            ik_position_weight,
            weight,
            scale,
            delta_time,
            raycaster,
        } = ctx;

        self.events.clear();
        if legs.len() < 2 || delta_time <= 0.0 {
            return self.body_offset;
        }

        let up = root_bone.read_rotation * UP;
        let root_position = root_bone.solver_position;
        let face = flatten(spine.face_direction, up);
        let rotation = if face.length_squared() > f32::EPSILON {
            look_rotation(face, up)
        } else {
            root_bone.solver_rotation
        };

        let com = center_of_mass(
            spine.pelvis().solver_position,
            spine.head().solver_position,
            hand_positions,
        ) + rotation * settings.offset * scale;
        self.com_velocity = ((com - self.last_com_position) / delta_time)
            .clamp_length_max(settings.max_velocity * scale)
            * settings.velocity_factor;
        self.last_com_position = com;
        let predicted_com = com + self.com_velocity;

        for side in Side::BOTH {
            let footstep = &mut self.footsteps[side.index()];
            footstep.character_space_offset = LEFT * side.sign() * settings.foot_distance * 0.5 * scale;
            let target = point_to_plane(
                predicted_com + rotation * footstep.character_space_offset,
                root_position,
                up,
            );

            if !footstep.is_stepping() {
                footstep.update_standing(
                    rotation,
                    settings.relax_leg_twist_min_angle,
                    settings.relax_leg_twist_speed,
                    delta_time,
                );
            } else if !step_blocked(settings, raycaster, footstep.step_from, target, root_position, up, scale) {
                footstep.update_stepping(target, rotation, 10.0, delta_time);
            }
        }

        if self.can_step() {
            self.start_best_step(settings, legs, spine, rotation, predicted_com, root_position, up, scale, raycaster);
        }

        for side in Side::BOTH {
            let footstep = &mut self.footsteps[side.index()];
            footstep.set_support_leg(support_leg == Some(side));
            if let Some(phase) = footstep.update(settings.step_interpolation, delta_time) {
                self.events.push(FootstepEvent {
                    side,
                    phase,
                    position: footstep.position,
                });
            }
        }

        for side in Side::BOTH {
            let footstep = &self.footsteps[side.index()];
            let leg = &legs[side.index()];
            let progress = footstep.step_progress();
            self.placements[side.index()] = FootPlacement {
                position: point_to_plane(footstep.position, leg.last_bone().read_position, up)
                    + up * footstep.ground_offset,
                rotation: footstep.rotation,
                step_height: settings.step_height.evaluate(progress) * scale,
                heel_height: settings.heel_height.evaluate(progress) * scale,
            };
        }

        self.apply(settings, legs, leg_settings, root_bone, up, ik_position_weight, weight, scale, delta_time)
    }

    fn can_step(&self) -> bool {
        self.footsteps
            .iter()
            .all(|footstep| !footstep.is_stepping() || footstep.step_progress() >= 0.8)
    }

    #[allow(clippy::too_many_arguments)]
    fn start_best_step(
        &mut self,
        settings: &ProceduralLocomotionSettings,
        legs: &[Leg],
        spine: &Spine,
        rotation: Quat,
        predicted_com: Vec3,
        root_position: Vec3,
        up: Vec3,
        scale: f32,
        raycaster: &dyn RaycastProvider,
    ) {
        // How far the body leans out of its base of support
        let feet_centre = self.footsteps[0].position.lerp(self.footsteps[1].position, 0.5);
        let com_angle = (predicted_com - feet_centre).angle_between(up).to_degrees() * settings.com_angle_mlp;

        let mut best: Option<(Side, Vec3, f32)> = None;
        for side in Side::BOTH {
            let footstep = &self.footsteps[side.index()];
            if footstep.is_stepping() {
                continue;
            }
            let leg = &legs[side.index()];
            let other = &self.footsteps[1 - side.index()];

            // An over-stretched leg steps back under the pelvis
            let length_step = footstep.position.distance(leg.thigh().solver_position)
                >= leg.mag * settings.max_leg_stretch;
            let from = if length_step {
                spine.pelvis().solver_position
            } else {
                predicted_com
            };
            let target = point_to_plane(from + rotation * footstep.character_space_offset, root_position, up);

            let collision = !length_step
                && feet_collide(footstep.position, other.position, target, FOOT_RADIUS * scale);
            let angle = rotation.angle_between(footstep.step_to_root_rotation).to_degrees();
            if collision && angle <= settings.angle_threshold {
                continue;
            }

            let distance = footstep.position.distance(target);
            let mut threshold = lerp_f32(
                settings.step_threshold,
                settings.step_threshold * 0.1,
                com_angle * 0.015,
            );
            if length_step {
                threshold *= 0.5;
            }
            if side == Side::Left {
                threshold *= 0.9;
            }

            if step_blocked(settings, raycaster, footstep.position, target, root_position, up, scale) {
                continue;
            }
            if (distance > threshold * scale || angle > settings.angle_threshold)
                && best.is_none_or(|(_, _, best_distance)| distance < best_distance)
            {
                best = Some((side, target, distance));
            }
        }

        let Some((side, target, _)) = best else {
            return;
        };
        let ground = ground_height(settings, raycaster, target, root_position, up, scale);
        let footstep = &mut self.footsteps[side.index()];
        footstep.step_speed = settings.step_speed;
        footstep.step_to(target, rotation);
        if let Some(height) = ground {
            footstep.set_ground(height);
        }
        self.events.push(FootstepEvent {
            side,
            phase: StepPhase::Lift,
            position: target,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &mut self,
        settings: &ProceduralLocomotionSettings,
        legs: &mut [Leg],
        leg_settings: [&LegSettings; 2],
        root_bone: &mut VirtualBone,
        up: Vec3,
        ik_position_weight: f32,
        weight: f32,
        scale: f32,
        delta_time: f32,
    ) -> Vec3 {
        for side in Side::BOTH {
            let placement = self.placements[side.index()];
            let settings = leg_settings[side.index()];
            let leg = &mut legs[side.index()];

            let foot = placement.position + up * placement.step_height;
            let position_weight = ik_position_weight * (1.0 - settings.position_weight) * weight;
            leg.foot_position_offset += (foot - leg.last_bone().solver_position) * position_weight;
            leg.heel_position_offset += up * placement.heel_height * weight;

            let rotation_weight = ik_position_weight * (1.0 - settings.rotation_weight) * weight;
            let delta = rotation_delta(leg.last_bone().solver_rotation, placement.rotation);
            leg.foot_rotation_offset = quat_lerp(Quat::IDENTITY, delta, rotation_weight) * leg.foot_rotation_offset;
        }

        // Root follows the centre of the feet
        let centre = (legs[0].position + legs[0].foot_position_offset)
            .lerp(legs[1].position + legs[1].foot_position_offset, 0.5);
        let centre = point_to_plane(centre, root_bone.solver_position, up);
        let mut position = root_bone.solver_position + self.root_velocity * delta_time * 2.0 * weight;
        position = lerp_clamped(position, centre, delta_time * settings.root_speed * weight);
        root_bone.solver_position = position;
        self.root_velocity += (centre - position) * delta_time * 10.0;
        self.root_velocity -= extract_vertical(self.root_velocity, up, 1.0);

        let lift = self.placements[0].step_height + self.placements[1].step_height;
        let body_y = lift.min(settings.max_body_y_offset * scale);
        self.body_offset = lerp_clamped(self.body_offset, up * body_y, delta_time * 3.0) * weight.clamp(0.0, 1.0);
        self.body_offset
    }
}

fn last_leg_slot(side: Side, has_toes: bool) -> BodySlot {
    let [_, _, foot, toes] = BodySlot::leg(side);
    if has_toes { toes } else { foot }
}

/// Pelvis and head carry most of the weight, the hands a little.
fn center_of_mass(pelvis: Vec3, head: Vec3, hands: [Vec3; 2]) -> Vec3 {
    (pelvis + head + (hands[0] + hands[1]) * 0.2) / 2.4
}

/// Whether moving `foot` to `target` would cross the `other` foot.
fn feet_collide(foot: Vec3, other: Vec3, target: Vec3, radius: f32) -> bool {
    // Feet side by side: the one closer to the target goes first
    if foot.distance(other) < radius && foot.distance_squared(target) < other.distance_squared(target) {
        return false;
    }
    line_sphere_collision(foot, target, other, radius)
}

fn line_sphere_collision(start: Vec3, end: Vec3, center: Vec3, radius: f32) -> bool {
    let line = end - start;
    let to_sphere = center - start;
    let distance = to_sphere.length();
    if distance - radius > line.length() {
        return false;
    }
    let Some(direction) = line.try_normalize() else {
        return distance < radius;
    };
    let along = to_sphere.dot(direction);
    if along < 0.0 {
        return distance < radius;
    }
    (to_sphere - direction * along).length() < radius
}

/// Casts at knee height from `from` towards `to` against the blocking layers.
fn step_blocked(
    settings: &ProceduralLocomotionSettings,
    raycaster: &dyn RaycastProvider,
    from: Vec3,
    to: Vec3,
    root_position: Vec3,
    up: Vec3,
    scale: f32,
) -> bool {
    if !settings.blocking_enabled || settings.blocking_layers.is_empty() {
        return false;
    }
    let height = (settings.raycast_height + settings.raycast_radius) * scale;
    let origin = point_to_plane(from, root_position, up) + up * height;
    let direction = flatten(to - origin, up);
    let radius = settings.raycast_radius.max(0.0) * scale;
    let length = direction.length() * 1.3 + radius;
    if length <= radius + f32::EPSILON {
        return false;
    }
    // Start behind the foot so that a wall it already stands against is found
    let origin = origin - direction.normalize_or_zero() * radius;
    let hit = if settings.raycast_radius <= 0.0 {
        raycaster.raycast(origin, direction, length, settings.blocking_layers)
    } else {
        raycaster.sphere_cast(origin, radius, direction, length, settings.blocking_layers)
    };
    hit.is_some()
}

/// Height of the ground under `position` above the root plane, if any ground
/// is found within the probe range.
fn ground_height(
    settings: &ProceduralLocomotionSettings,
    raycaster: &dyn RaycastProvider,
    position: Vec3,
    root_position: Vec3,
    up: Vec3,
    scale: f32,
) -> Option<f32> {
    if settings.ground_layers.is_empty() {
        return None;
    }
    let probe = settings.ground_probe_height * scale;
    let hit = raycaster.raycast(position + up * probe, -up, probe * 2.0, settings.ground_layers)?;
    Some((hit.point - root_position).dot(up))
}
