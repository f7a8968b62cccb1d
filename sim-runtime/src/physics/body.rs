// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Physics body component
//!
//! Describes the rigid body the [`PhysicsSystem`](super::PhysicsSystem)
//! creates for an entity. Force, impulse and velocity requests are queued
//! here and flushed to the solver at the next sub-step, so scripts never
//! need a handle on the solver itself.

use crate::config::PhysicsConfig;
use crate::ecs::{Capability, Component, EntityId};
use crate::error::SerializationError;
use crate::math::{from_array, to_array, DVec3, Pose};
use crate::physics::backend::{BodyDesc, BodyHandle, BodyKind, Shape};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Queued request for the solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BodyCommand {
    Force { force: DVec3, point: Option<DVec3> },
    Impulse { impulse: DVec3, point: Option<DVec3> },
    SetVelocity(DVec3),
}

/// Rigid body attached to an entity
#[derive(Debug, Clone)]
pub struct PhysicsBody {
    shape: Shape,
    kind: BodyKind,
    mass: f64,
    friction: Option<f64>,
    restitution: Option<f64>,
    linear_damping: f64,
    angular_damping: f64,
    trigger: bool,
    group: u32,
    mask: u32,
    initial_velocity: DVec3,
    handle: Option<BodyHandle>,
    colliding: BTreeSet<EntityId>,
    commands: Vec<BodyCommand>,
    linear_velocity: DVec3,
    angular_velocity: DVec3,
}

impl Capability for PhysicsBody {
    const KEY: &'static str = "PhysicsBody";
}

impl Default for PhysicsBody {
    fn default() -> Self {
        Self::dynamic(
            Shape::Box {
                half_extents: DVec3::splat(0.5),
            },
            1.0,
        )
    }
}

impl PhysicsBody {
    /// Body of the given shape and kind with unit mass
    pub fn new(shape: Shape, kind: BodyKind) -> Self {
        PhysicsBody {
            shape,
            kind,
            mass: 1.0,
            friction: None,
            restitution: None,
            linear_damping: 0.01,
            angular_damping: 0.01,
            trigger: false,
            group: 1,
            mask: u32::MAX,
            initial_velocity: DVec3::ZERO,
            handle: None,
            colliding: BTreeSet::new(),
            commands: Vec::new(),
            linear_velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
        }
    }

    /// Dynamic body of `mass` kilograms
    pub fn dynamic(shape: Shape, mass: f64) -> Self {
        Self::new(shape, BodyKind::Dynamic).with_mass(mass)
    }

    /// Static body
    pub fn fixed(shape: Shape) -> Self {
        Self::new(shape, BodyKind::Static)
    }

    /// Kinematic body, posed from the entity transform every step
    pub fn kinematic(shape: Shape) -> Self {
        Self::new(shape, BodyKind::Kinematic)
    }

    /// Set the mass
    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    /// Override the configured default friction
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.friction = Some(friction);
        self
    }

    /// Override the configured default restitution
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.restitution = Some(restitution);
        self
    }

    /// Set linear and angular damping
    pub fn with_damping(mut self, linear: f64, angular: f64) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Report contacts without contact response
    pub fn as_trigger(mut self) -> Self {
        self.trigger = true;
        self
    }

    /// Set collision group and mask bits
    pub fn with_collision_filter(mut self, group: u32, mask: u32) -> Self {
        self.group = group;
        self.mask = mask;
        self
    }

    /// Initial linear velocity
    pub fn with_velocity(mut self, velocity: DVec3) -> Self {
        self.initial_velocity = velocity;
        self
    }

    /// Collision shape
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Participation mode
    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    /// Mass in kilograms
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Whether this is a trigger volume
    pub fn is_trigger(&self) -> bool {
        self.trigger
    }

    /// Collision group bits
    pub fn group(&self) -> u32 {
        self.group
    }

    /// Collision mask bits
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Solver handle while registered
    pub fn handle(&self) -> Option<BodyHandle> {
        self.handle
    }

    /// Whether the body currently exists in the solver
    pub fn is_registered(&self) -> bool {
        self.handle.is_some()
    }

    /// Linear velocity as of the last step
    pub fn linear_velocity(&self) -> DVec3 {
        self.linear_velocity
    }

    /// Angular velocity as of the last step
    pub fn angular_velocity(&self) -> DVec3 {
        self.angular_velocity
    }

    /// Entities this body is touching
    pub fn colliding_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.colliding.iter().copied()
    }

    /// Whether this body is touching `other`'s body
    pub fn is_colliding_with(&self, other: EntityId) -> bool {
        self.colliding.contains(&other)
    }

    /// Number of entities being touched
    pub fn collision_count(&self) -> usize {
        self.colliding.len()
    }

    /// Apply a force over the next step, at a world point or the center of mass
    pub fn apply_force(&mut self, force: DVec3, point: Option<DVec3>) {
        self.commands.push(BodyCommand::Force { force, point });
    }

    /// Apply an impulse at the next step
    pub fn apply_impulse(&mut self, impulse: DVec3, point: Option<DVec3>) {
        self.commands.push(BodyCommand::Impulse { impulse, point });
    }

    /// Replace the linear velocity at the next step
    pub fn set_linear_velocity(&mut self, velocity: DVec3) {
        self.commands.push(BodyCommand::SetVelocity(velocity));
    }

    pub(crate) fn desc(&self, pose: Pose, config: &PhysicsConfig) -> BodyDesc {
        BodyDesc {
            shape: self.shape,
            kind: self.kind,
            mass: self.mass,
            pose,
            linear_velocity: self.initial_velocity,
            friction: self.friction.unwrap_or(config.default_friction),
            restitution: self.restitution.unwrap_or(config.default_restitution),
            linear_damping: self.linear_damping,
            angular_damping: self.angular_damping,
            trigger: self.trigger,
            group: self.group,
            mask: self.mask,
        }
    }

    pub(crate) fn set_handle(&mut self, handle: Option<BodyHandle>) {
        self.handle = handle;
        if handle.is_none() {
            self.colliding.clear();
            self.commands.clear();
        }
    }

    pub(crate) fn take_commands(&mut self) -> Vec<BodyCommand> {
        std::mem::take(&mut self.commands)
    }

    pub(crate) fn sync_velocity(&mut self, linear: DVec3, angular: DVec3) {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
    }

    /// Record a new contact. Returns false if it was already recorded.
    pub(crate) fn begin_contact(&mut self, other: EntityId) -> bool {
        self.colliding.insert(other)
    }

    /// Record the end of a contact. Returns false if none was recorded.
    pub(crate) fn end_contact(&mut self, other: EntityId) -> bool {
        self.colliding.remove(&other)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ShapeRecord {
    Sphere { radius: f64 },
    Box { half_extents: [f64; 3] },
    Cylinder { radius: f64, half_height: f64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KindRecord {
    Dynamic,
    Static,
    Kinematic,
}

#[derive(Debug, Serialize, Deserialize)]
struct BodyRecord {
    shape: ShapeRecord,
    kind: KindRecord,
    mass: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    friction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    restitution: Option<f64>,
    linear_damping: f64,
    angular_damping: f64,
    #[serde(default)]
    trigger: bool,
    group: u32,
    mask: u32,
    #[serde(default)]
    velocity: [f64; 3],
}

impl Component for PhysicsBody {
    fn save(&self) -> Value {
        let record = BodyRecord {
            shape: match self.shape {
                Shape::Sphere { radius } => ShapeRecord::Sphere { radius },
                Shape::Box { half_extents } => ShapeRecord::Box {
                    half_extents: to_array(half_extents),
                },
                Shape::Cylinder { radius, half_height } => ShapeRecord::Cylinder { radius, half_height },
            },
            kind: match self.kind {
                BodyKind::Dynamic => KindRecord::Dynamic,
                BodyKind::Static => KindRecord::Static,
                BodyKind::Kinematic => KindRecord::Kinematic,
            },
            mass: self.mass,
            friction: self.friction,
            restitution: self.restitution,
            linear_damping: self.linear_damping,
            angular_damping: self.angular_damping,
            trigger: self.trigger,
            group: self.group,
            mask: self.mask,
            velocity: to_array(self.initial_velocity),
        };
        serde_json::to_value(record).unwrap_or(Value::Null)
    }

    fn load(&mut self, payload: &Value) -> Result<(), SerializationError> {
        let record: BodyRecord = serde_json::from_value(payload.clone())?;
        let shape = match record.shape {
            ShapeRecord::Sphere { radius } => Shape::Sphere { radius },
            ShapeRecord::Box { half_extents } => Shape::Box {
                half_extents: from_array(half_extents),
            },
            ShapeRecord::Cylinder { radius, half_height } => Shape::Cylinder { radius, half_height },
        };
        if !shape.is_valid() {
            return Err(SerializationError::Malformed {
                what: "PhysicsBody",
                reason: format!("degenerate shape {:?}", shape),
            });
        }
        self.shape = shape;
        self.kind = match record.kind {
            KindRecord::Dynamic => BodyKind::Dynamic,
            KindRecord::Static => BodyKind::Static,
            KindRecord::Kinematic => BodyKind::Kinematic,
        };
        self.mass = record.mass;
        self.friction = record.friction;
        self.restitution = record.restitution;
        self.linear_damping = record.linear_damping;
        self.angular_damping = record.angular_damping;
        self.trigger = record.trigger;
        self.group = record.group;
        self.mask = record.mask;
        self.initial_velocity = from_array(record.velocity);
        Ok(())
    }

    fn clone_box(&self) -> Option<Box<dyn Component>> {
        let mut copy = self.clone();
        copy.set_handle(None);
        copy.linear_velocity = DVec3::ZERO;
        copy.angular_velocity = DVec3::ZERO;
        Some(Box::new(copy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::CapabilityObject;

    #[test]
    fn test_payload_round_trip() {
        let body = PhysicsBody::dynamic(
            Shape::Cylinder {
                radius: 0.4,
                half_height: 0.1,
            },
            150.0,
        )
        .with_friction(0.8)
        .with_collision_filter(2, 0b101)
        .as_trigger();

        let mut restored = PhysicsBody::default();
        restored.load(&body.save()).unwrap();
        assert_eq!(restored.shape(), body.shape());
        assert_eq!(restored.mass(), 150.0);
        assert!(restored.is_trigger());
        assert_eq!((restored.group(), restored.mask()), (2, 0b101));
        assert_eq!(restored.save(), body.save());
    }

    #[test]
    fn test_degenerate_shape_rejected() {
        let mut body = PhysicsBody::default();
        let payload = serde_json::json!({
            "shape": { "type": "sphere", "radius": -1.0 },
            "kind": "static",
            "mass": 0.0,
            "linear_damping": 0.0,
            "angular_damping": 0.0,
            "group": 1,
            "mask": 1
        });
        assert!(matches!(
            body.load(&payload),
            Err(SerializationError::Malformed { what: "PhysicsBody", .. })
        ));
    }

    #[test]
    fn test_clone_drops_runtime_state() {
        let mut body = PhysicsBody::default();
        body.set_handle(Some(BodyHandle(7)));
        body.begin_contact(EntityId::new(3));
        let copy = body.clone_box().unwrap();
        let copy = copy.as_any().downcast_ref::<PhysicsBody>().unwrap();
        assert!(!copy.is_registered());
        assert_eq!(copy.collision_count(), 0);
    }

    #[test]
    fn test_contact_set_guards_duplicates() {
        let mut body = PhysicsBody::default();
        let other = EntityId::new(9);
        assert!(body.begin_contact(other));
        assert!(!body.begin_contact(other));
        assert!(body.end_contact(other));
        assert!(!body.end_contact(other));
    }

    #[test]
    fn test_desc_uses_config_defaults() {
        let config = PhysicsConfig::default();
        let desc = PhysicsBody::default().desc(Pose::IDENTITY, &config);
        assert_eq!(desc.friction, config.default_friction);
        let desc = PhysicsBody::default()
            .with_restitution(0.9)
            .desc(Pose::IDENTITY, &config);
        assert_eq!(desc.restitution, 0.9);
    }
}
