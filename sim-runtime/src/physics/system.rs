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
//! Physics system
//!
//! Owns the physics backend, mirrors every [`PhysicsBody`] into it, steps it at a
//! fixed rate and turns its contact output into collision notifications
//! for the owning entities' scripts.
//!
//! One sub-step runs, in order: pending exits from removed bodies, body
//! suspension for inactive entities, kinematic poses and queued body
//! commands, vehicle suspension updates, the solver step, pose and velocity
//! write-back, wheel poses, then enter/stay/exit dispatch.
//!
//! Bodies of inactive entities stay in the solver but are suspended: they
//! neither move nor collide until their entity is reactivated.

use crate::config::{PhysicsConfig, SteppingMode};
use crate::ecs::{
    CollisionPhase, Entity, EntityId, EntityPair, EntityStore, System, SystemContext, SystemPriority,
};
use crate::events::EventBus;
use crate::input::InputState;
use crate::math::{from_array, DVec3, Pose};
use crate::physics::backend::{BodyDesc, BodyHandle, BodyKind, PhysicsBackend, Ray, RayFilter, VehicleHandle};
use crate::physics::body::BodyCommand;
use crate::physics::contacts::{CollisionNotice, ContactTracker};
use crate::physics::{PhysicsBody, RapierWorld, VehicleSimulation};
use std::any::Any;
use std::collections::{HashMap, HashSet};

const LOG_TARGET: &str = "sim_runtime::physics";

/// One raycast result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// Entity owning the body, if any
    pub entity: Option<EntityId>,
    /// Body that was hit
    pub body: BodyHandle,
    /// World hit point
    pub point: DVec3,
    /// Surface normal at the hit
    pub normal: DVec3,
    /// Distance from the ray origin
    pub distance: f64,
}

/// Rigid-body simulation for every entity with a [`PhysicsBody`]
pub struct PhysicsSystem {
    config: PhysicsConfig,
    backend: Box<dyn PhysicsBackend>,
    bodies: HashMap<EntityId, BodyHandle>,
    owners: HashMap<BodyHandle, EntityId>,
    vehicles: HashMap<EntityId, VehicleHandle>,
    suspended: HashSet<EntityId>,
    tracker: ContactTracker,
    pending_exits: Vec<EntityPair>,
    accumulator: f64,
    steps: u64,
}

impl Default for PhysicsSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsSystem {
    /// System with default configuration on a [`RapierWorld`]
    pub fn new() -> Self {
        Self::with_config(PhysicsConfig::default())
    }

    /// System on a [`RapierWorld`]
    pub fn with_config(config: PhysicsConfig) -> Self {
        Self::with_backend(config, Box::new(RapierWorld::default()))
    }

    /// System driving a caller-supplied solver. The configured gravity is
    /// applied to it.
    pub fn with_backend(config: PhysicsConfig, mut backend: Box<dyn PhysicsBackend>) -> Self {
        backend.set_gravity(from_array(config.gravity));
        PhysicsSystem {
            config,
            backend,
            bodies: HashMap::new(),
            owners: HashMap::new(),
            vehicles: HashMap::new(),
            suspended: HashSet::new(),
            tracker: ContactTracker::new(),
            pending_exits: Vec::new(),
            accumulator: 0.0,
            steps: 0,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// The underlying solver
    pub fn backend(&self) -> &dyn PhysicsBackend {
        self.backend.as_ref()
    }

    /// Total sub-steps run since creation
    pub fn steps_taken(&self) -> u64 {
        self.steps
    }

    /// Unconsumed frame time
    pub fn accumulated_time(&self) -> f64 {
        self.accumulator
    }

    /// Set gravity
    pub fn set_gravity(&mut self, gravity: DVec3) {
        self.config.gravity = [gravity.x, gravity.y, gravity.z];
        self.backend.set_gravity(gravity);
    }

    /// Current gravity
    pub fn gravity(&self) -> DVec3 {
        self.backend.gravity()
    }

    /// Number of bodies in the solver, owned or not
    pub fn body_count(&self) -> usize {
        self.backend.body_count()
    }

    /// Body registered for `entity`
    pub fn body_of(&self, entity: EntityId) -> Option<BodyHandle> {
        self.bodies.get(&entity).copied()
    }

    /// Entity owning `body`
    pub fn entity_of(&self, body: BodyHandle) -> Option<EntityId> {
        self.owners.get(&body).copied()
    }

    /// Whether `entity`'s body is suspended because the entity is inactive
    pub fn is_suspended(&self, entity: EntityId) -> bool {
        self.suspended.contains(&entity)
    }

    /// Pairs in contact as of the last sub-step
    pub fn active_contacts(&self) -> impl Iterator<Item = EntityPair> + '_ {
        self.tracker.active_pairs()
    }

    /// Add a body that no entity owns, such as level geometry
    pub fn add_body(&mut self, desc: &BodyDesc) -> BodyHandle {
        let handle = self.backend.add_body(desc);
        if self.config.debug {
            log::debug!(target: LOG_TARGET, "added unowned body {} ({:?})", handle, desc.shape);
        }
        handle
    }

    /// Remove a body added with [`add_body`](Self::add_body). Bodies owned by
    /// an entity are left alone; remove their [`PhysicsBody`] instead.
    pub fn remove_body(&mut self, handle: BodyHandle) -> bool {
        if let Some(owner) = self.owners.get(&handle) {
            log::warn!(
                target: LOG_TARGET,
                "body {} belongs to entity {}; remove its PhysicsBody instead",
                handle,
                owner
            );
            return false;
        }
        self.backend.remove_body(handle)
    }

    /// Closest hit between `from` and `to`. Solver failures are logged and
    /// reported as a miss.
    pub fn raycast(&self, from: DVec3, to: DVec3, filter: &RayFilter) -> Option<RaycastHit> {
        if self.config.debug {
            log::debug!(target: LOG_TARGET, "raycast {:?} -> {:?}", from, to);
        }
        match self.backend.raycast_closest(&Ray::new(from, to), filter) {
            Ok(hit) => hit.map(|h| self.to_hit(h)),
            Err(err) => {
                log::error!(target: LOG_TARGET, "raycast failed: {}", err);
                None
            }
        }
    }

    /// Closest hit with the default filter. An empty world is a miss
    /// without consulting the solver.
    pub fn raycast_first(&self, from: DVec3, to: DVec3) -> Option<RaycastHit> {
        if self.backend.body_count() == 0 {
            if self.config.debug {
                log::debug!(target: LOG_TARGET, "no bodies in physics world, raycast misses");
            }
            return None;
        }
        self.raycast(from, to, &RayFilter::default())
    }

    /// Every hit between `from` and `to`, nearest first. Solver failures are
    /// logged and reported as no hits.
    pub fn raycast_all(&self, from: DVec3, to: DVec3, filter: &RayFilter) -> Vec<RaycastHit> {
        match self.backend.raycast_all(&Ray::new(from, to), filter) {
            Ok(hits) => {
                let mut hits: Vec<RaycastHit> = hits.into_iter().map(|h| self.to_hit(h)).collect();
                hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                hits
            }
            Err(err) => {
                log::error!(target: LOG_TARGET, "raycast_all failed: {}", err);
                Vec::new()
            }
        }
    }

    fn to_hit(&self, hit: crate::physics::backend::RayHit) -> RaycastHit {
        RaycastHit {
            entity: self.entity_of(hit.body),
            body: hit.body,
            point: hit.point,
            normal: hit.normal,
            distance: hit.distance,
        }
    }

    fn register(&mut self, entity: &mut Entity) {
        let id = entity.id();
        if self.bodies.contains_key(&id) {
            self.unregister(entity);
        }
        let pose = entity.transform().pose();
        let Some(body) = entity.component_mut::<PhysicsBody>() else {
            return;
        };
        if !body.shape().is_valid() {
            log::warn!(
                target: LOG_TARGET,
                "entity {} has a degenerate {:?}; body not created",
                id,
                body.shape()
            );
            return;
        }
        let handle = self.backend.add_body(&body.desc(pose, &self.config));
        body.set_handle(Some(handle));
        self.bodies.insert(id, handle);
        self.owners.insert(handle, id);
        self.sync_activity(id, handle, entity.is_active());
        if self.config.debug {
            log::debug!(
                target: LOG_TARGET,
                "registered body {} for entity '{}' ({:?})",
                handle,
                entity.name(),
                body_kind(entity)
            );
        }
    }

    fn unregister(&mut self, entity: &mut Entity) {
        let id = entity.id();
        let Some(handle) = self.bodies.remove(&id) else {
            return;
        };
        self.dismount(id);
        self.suspended.remove(&id);
        self.owners.remove(&handle);
        self.backend.remove_body(handle);
        self.pending_exits.extend(self.tracker.forget(id));
        if let Some(body) = entity.component_mut::<PhysicsBody>() {
            body.set_handle(None);
        }
        if self.config.debug {
            log::debug!(target: LOG_TARGET, "removed body {} of entity '{}'", handle, entity.name());
        }
    }

    fn sub_step(
        &mut self,
        entities: &mut EntityStore,
        members: &[EntityId],
        input: &InputState,
        events: &mut EventBus,
        dt: f64,
    ) {
        for pair in std::mem::take(&mut self.pending_exits) {
            for (me, other) in [(pair.first(), pair.second()), (pair.second(), pair.first())] {
                deliver(entities, me, other, CollisionPhase::Exit, input, events);
            }
        }

        for &id in members {
            let Some(&handle) = self.bodies.get(&id) else {
                continue;
            };
            let Some(entity) = entities.get_mut(id) else {
                continue;
            };
            if self.sync_activity(id, handle, entity.is_active()) {
                self.prepare(entity, handle, dt);
            }
        }

        let step = self.backend.step(dt);
        self.steps += 1;

        let mut visuals: Vec<(EntityId, Pose)> = Vec::new();
        for &id in members {
            let Some(&handle) = self.bodies.get(&id) else {
                continue;
            };
            if self.suspended.contains(&id) {
                continue;
            }
            let Some(entity) = entities.get_mut(id) else {
                continue;
            };
            self.write_back(entity, handle, dt, &mut visuals);
        }
        for (id, pose) in visuals {
            if let Some(wheel) = entities.get_mut(id) {
                wheel.transform_mut().set_pose(pose);
            }
        }

        let pairs = |list: &[(BodyHandle, BodyHandle)]| -> Vec<EntityPair> {
            list.iter().filter_map(|&(a, b)| self.pair_of(a, b)).collect()
        };
        let begun = pairs(&step.begun);
        let ended = pairs(&step.ended);
        let current: Vec<EntityPair> = self
            .backend
            .contacts()
            .iter()
            .filter_map(|c| self.pair_of(c.a, c.b))
            .collect();

        for CollisionNotice { phase, pair } in self.tracker.correlate(begun, ended, current) {
            deliver(entities, pair.first(), pair.second(), phase, input, events);
            deliver(entities, pair.second(), pair.first(), phase, input, events);
        }
    }

    fn pair_of(&self, a: BodyHandle, b: BodyHandle) -> Option<EntityPair> {
        Some(EntityPair::new(self.entity_of(a)?, self.entity_of(b)?))
    }

    /// Suspend or resume `id`'s body to match its entity. Returns whether
    /// the body takes part in the coming step.
    fn sync_activity(&mut self, id: EntityId, handle: BodyHandle, active: bool) -> bool {
        let changed = if active {
            self.suspended.remove(&id)
        } else {
            self.suspended.insert(id)
        };
        if changed {
            if let Err(err) = self.backend.set_enabled(handle, active) {
                log::warn!(target: LOG_TARGET, "could not toggle body {}: {}", handle, err);
            }
            if self.config.debug {
                let verb = if active { "resumed" } else { "suspended" };
                log::debug!(target: LOG_TARGET, "{} body {} of entity {}", verb, handle, id);
            }
        }
        active
    }

    fn prepare(&mut self, entity: &mut Entity, handle: BodyHandle, dt: f64) {
        let pose = entity.transform().pose();
        let Some(body) = entity.component_mut::<PhysicsBody>() else {
            return;
        };
        if body.kind() == BodyKind::Kinematic {
            if let Err(err) = self.backend.set_pose(handle, pose) {
                log::warn!(target: LOG_TARGET, "kinematic pose rejected: {}", err);
            }
        }
        for command in body.take_commands() {
            let result = match command {
                BodyCommand::Force { force, point } => self.backend.apply_force(handle, force, point),
                BodyCommand::Impulse { impulse, point } => self.backend.apply_impulse(handle, impulse, point),
                BodyCommand::SetVelocity(velocity) => self.backend.set_linear_velocity(handle, velocity),
            };
            if let Err(err) = result {
                log::warn!(target: LOG_TARGET, "body command {:?} rejected: {}", command, err);
            }
        }
        let id = entity.id();
        match entity.component_mut::<VehicleSimulation>() {
            Some(vehicle) => self.drive_vehicle(id, handle, vehicle, dt),
            None => self.dismount(id),
        }
    }

    /// Mount `vehicle` on its chassis if needed, then run the backend's
    /// suspension update with the current driver inputs
    fn drive_vehicle(&mut self, id: EntityId, chassis: BodyHandle, vehicle: &mut VehicleSimulation, dt: f64) {
        if vehicle.take_layout_change() {
            self.dismount(id);
        }
        if vehicle.wheel_count() == 0 {
            return;
        }
        let mounted = match self.vehicles.get(&id) {
            Some(&mounted) => mounted,
            None => match self.backend.add_vehicle(chassis, &vehicle.wheel_configs()) {
                Ok(mounted) => {
                    self.vehicles.insert(id, mounted);
                    mounted
                }
                Err(err) => {
                    log::warn!(target: LOG_TARGET, "vehicle on entity {} not mounted: {}", id, err);
                    return;
                }
            },
        };
        match self.backend.update_vehicle(mounted, &vehicle.controls(), dt) {
            Ok(contacts) => vehicle.apply_contacts(&contacts),
            Err(err) => log::warn!(target: LOG_TARGET, "vehicle update for entity {} failed: {}", id, err),
        }
    }

    fn dismount(&mut self, id: EntityId) {
        if let Some(mounted) = self.vehicles.remove(&id) {
            self.backend.remove_vehicle(mounted);
        }
    }

    fn write_back(&self, entity: &mut Entity, handle: BodyHandle, dt: f64, visuals: &mut Vec<(EntityId, Pose)>) {
        let (Some(pose), Some(linear), Some(angular)) = (
            self.backend.pose(handle),
            self.backend.linear_velocity(handle),
            self.backend.angular_velocity(handle),
        ) else {
            return;
        };
        let Some(body) = entity.component_mut::<PhysicsBody>() else {
            return;
        };
        body.sync_velocity(linear, angular);
        if body.kind() == BodyKind::Dynamic {
            entity.transform_mut().set_pose(pose);
        }
        if let Some(vehicle) = entity.component_mut::<VehicleSimulation>() {
            vehicle.update_wheel_transforms(pose, linear, angular, dt);
            visuals.extend(vehicle.wheel_visuals());
        }
    }

    fn advance_frame(&mut self, ctx: &mut SystemContext<'_>, members: &[EntityId], dt: f64) {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.config.max_frame_delta)
        } else {
            0.0
        };
        let fixed = self.config.fixed_time_step;
        self.accumulator += dt;
        let mut taken = 0;
        while self.accumulator >= fixed && taken < self.config.max_sub_steps {
            self.sub_step(ctx.entities, members, ctx.input, ctx.events, fixed);
            self.accumulator -= fixed;
            taken += 1;
        }
        if self.accumulator >= fixed {
            log::debug!(
                target: LOG_TARGET,
                "sub-step cap {} reached, dropping {:.4}s",
                self.config.max_sub_steps,
                self.accumulator
            );
            self.accumulator = 0.0;
        }
    }
}

fn body_kind(entity: &Entity) -> Option<BodyKind> {
    entity.component::<PhysicsBody>().map(|b| b.kind())
}

/// Record the transition on `me`'s body and, if it is new and `me` is
/// active, tell its scripts
fn deliver(
    entities: &mut EntityStore,
    me: EntityId,
    other: EntityId,
    phase: CollisionPhase,
    input: &InputState,
    events: &mut EventBus,
) {
    let Some(entity) = entities.get_mut(me) else {
        return;
    };
    let Some(body) = entity.component_mut::<PhysicsBody>() else {
        return;
    };
    let fresh = match phase {
        CollisionPhase::Enter => body.begin_contact(other),
        CollisionPhase::Stay => body.is_colliding_with(other),
        CollisionPhase::Exit => body.end_contact(other),
    };
    if fresh && entity.is_active() {
        log::trace!(target: LOG_TARGET, "{:?} {} <-> {}", phase, me, other);
        entity.dispatch_collision(phase, other, input, events);
    }
}

impl System for PhysicsSystem {
    fn name(&self) -> &str {
        "PhysicsSystem"
    }

    fn priority(&self) -> SystemPriority {
        SystemPriority::HIGH
    }

    fn check_entity_compatibility(&self, entity: &Entity) -> bool {
        entity.has_component::<PhysicsBody>()
    }

    fn on_entity_added(&mut self, entity: &mut Entity) {
        self.register(entity);
    }

    fn on_entity_removed(&mut self, entity: &mut Entity) {
        self.unregister(entity);
    }

    fn on_destroy(&mut self) {
        for (_, mounted) in self.vehicles.drain() {
            self.backend.remove_vehicle(mounted);
        }
        for (_, handle) in self.bodies.drain() {
            self.backend.remove_body(handle);
        }
        self.owners.clear();
        self.suspended.clear();
        self.tracker.clear();
        self.pending_exits.clear();
        self.accumulator = 0.0;
    }

    fn before_update(&mut self, ctx: &mut SystemContext<'_>, members: &[EntityId], dt: f64) {
        if self.config.stepping == SteppingMode::Frame {
            self.advance_frame(ctx, members, dt);
        }
    }

    fn before_fixed_update(&mut self, ctx: &mut SystemContext<'_>, members: &[EntityId], dt: f64) {
        if self.config.stepping == SteppingMode::Fixed {
            let dt = if dt > 0.0 && dt.is_finite() {
                dt
            } else {
                self.config.fixed_time_step
            };
            self.sub_step(ctx.entities, members, ctx.input, ctx.events, dt);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
