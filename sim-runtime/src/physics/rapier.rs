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
//! rapier3d backend
//!
//! [`RapierWorld`] owns one rapier pipeline with its body, collider and
//! joint sets and exposes them through [`PhysicsBackend`]:
//!
//! - every body is one rigid body with exactly one collider; both rapier
//!   handles hide behind a single [`BodyHandle`]
//! - begin/end events come from rapier's `CollisionEvent`s, reconciled
//!   against the touching set of the previous step
//! - the contact list is read from the narrow phase after each step, one
//!   deepest point per pair with the lower handle first, and extracted in
//!   parallel when the `parallel` feature is enabled
//! - ray casts go through the query pipeline, which is refreshed by every
//!   step and by every body insertion or removal
//! - vehicles are rapier `DynamicRayCastVehicleController`s
//!
//! Kinematic bodies are position-based and [`set_pose`](PhysicsBackend::set_pose)
//! teleports them, so a pose set before a step is the pose that step's
//! narrow phase sees.

use crate::error::SolverError;
use crate::math::{DQuat, DVec3, Pose};
use crate::physics::backend::{
    BodyDesc, BodyHandle, BodyKind, Contact, PhysicsBackend, Ray, RayFilter, RayHit, Shape, StepEvents,
    VehicleHandle, WheelContact, WheelControl,
};
use crate::physics::vehicle::WheelConfig;
use rapier3d_f64::control::{DynamicRayCastVehicleController, WheelTuning};
use rapier3d_f64::na::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use rapier3d_f64::parry::query::{Ray as QueryRay, RayIntersection};
use rapier3d_f64::prelude::{
    ActiveCollisionTypes, ActiveEvents, CCDSolver, Collider, ColliderBuilder, ColliderHandle, ColliderSet,
    CollisionEvent, ContactPair, DefaultBroadPhase, EventHandler, Group, ImpulseJointSet, IntegrationParameters,
    InteractionGroups, IslandManager, MultibodyJointSet, NarrowPhase, PhysicsPipeline, QueryFilter, QueryPipeline,
    Real, RigidBody, RigidBodyBuilder, RigidBodyHandle, RigidBodySet,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const LOG_TARGET: &str = "sim_runtime::physics";

type Pair = (BodyHandle, BodyHandle);

/// Collision events raised while the pipeline steps
#[derive(Default)]
struct EventQueue {
    events: Mutex<Vec<CollisionEvent>>,
}

impl EventQueue {
    fn drain(&mut self) -> Vec<CollisionEvent> {
        match self.events.get_mut() {
            Ok(events) => std::mem::take(events),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        }
    }
}

impl EventHandler for EventQueue {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

struct MountedVehicle {
    chassis: BodyHandle,
    controller: DynamicRayCastVehicleController,
}

/// Default [`PhysicsBackend`] implementation over rapier3d
pub struct RapierWorld {
    gravity: Vector3<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    queries: QueryPipeline,
    events: EventQueue,
    handles: HashMap<BodyHandle, (RigidBodyHandle, ColliderHandle)>,
    owners: HashMap<ColliderHandle, BodyHandle>,
    vehicles: HashMap<VehicleHandle, MountedVehicle>,
    next_body: u64,
    next_vehicle: u64,
    contacts: Vec<Contact>,
    touching: BTreeSet<Pair>,
    forced: Vec<RigidBodyHandle>,
}

impl RapierWorld {
    /// Empty world with the given gravity
    pub fn new(gravity: DVec3) -> Self {
        RapierWorld {
            gravity: to_vector(gravity),
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            queries: QueryPipeline::new(),
            events: EventQueue::default(),
            handles: HashMap::new(),
            owners: HashMap::new(),
            vehicles: HashMap::new(),
            next_body: 1,
            next_vehicle: 1,
            contacts: Vec::new(),
            touching: BTreeSet::new(),
            forced: Vec::new(),
        }
    }

    /// Number of mounted vehicles
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    fn slot(&self, handle: BodyHandle) -> Result<(RigidBodyHandle, ColliderHandle), SolverError> {
        self.handles
            .get(&handle)
            .copied()
            .ok_or(SolverError::UnknownBody(handle.raw()))
    }

    fn rigid(&self, handle: BodyHandle) -> Option<&RigidBody> {
        let &(rigid, _) = self.handles.get(&handle)?;
        self.rigid_bodies.get(rigid)
    }

    fn rigid_mut(&mut self, handle: BodyHandle) -> Result<(RigidBodyHandle, &mut RigidBody), SolverError> {
        let (rigid, _) = self.slot(handle)?;
        self.rigid_bodies
            .get_mut(rigid)
            .map(|body| (rigid, body))
            .ok_or(SolverError::UnknownBody(handle.raw()))
    }

    fn pair_of(&self, c1: ColliderHandle, c2: ColliderHandle) -> Option<Pair> {
        Some(ordered(*self.owners.get(&c1)?, *self.owners.get(&c2)?))
    }

    fn collect_contacts(&self) -> Vec<Contact> {
        let pairs: Vec<&ContactPair> = self
            .narrow_phase
            .contact_pairs()
            .filter(|pair| pair.has_any_active_contact)
            .collect();

        #[cfg(feature = "parallel")]
        let mut contacts: Vec<Contact> = pairs
            .par_iter()
            .filter_map(|pair| contact_of(pair, &self.colliders, &self.owners))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let mut contacts: Vec<Contact> = pairs
            .iter()
            .filter_map(|pair| contact_of(pair, &self.colliders, &self.owners))
            .collect();

        contacts.extend(
            self.narrow_phase
                .intersection_pairs()
                .filter(|&(_, _, intersecting)| intersecting)
                .filter_map(|(c1, c2, _)| self.sensor_contact(c1, c2)),
        );
        contacts
    }

    fn sensor_contact(&self, c1: ColliderHandle, c2: ColliderHandle) -> Option<Contact> {
        let (a, b) = (*self.owners.get(&c1)?, *self.owners.get(&c2)?);
        let p1 = from_vector(self.colliders.get(c1)?.translation());
        let p2 = from_vector(self.colliders.get(c2)?.translation());
        Some(oriented(Contact {
            a,
            b,
            point: (p1 + p2) * 0.5,
            normal: (p2 - p1).normalize_or_zero(),
            depth: 0.0,
        }))
    }

    fn diff_touching(&mut self, events: Vec<CollisionEvent>) -> StepEvents {
        let current: BTreeSet<Pair> = self.contacts.iter().map(|c| (c.a, c.b)).collect();
        let mut begun: BTreeSet<Pair> = current.difference(&self.touching).copied().collect();
        let mut ended: BTreeSet<Pair> = self.touching.difference(&current).copied().collect();
        for event in events {
            match event {
                CollisionEvent::Started(c1, c2, _) => begun.extend(self.pair_of(c1, c2)),
                CollisionEvent::Stopped(c1, c2, _) => ended.extend(self.pair_of(c1, c2)),
            }
        }
        // a pair whose event disagrees with the final narrow phase state
        // follows the narrow phase
        begun.retain(|pair| current.contains(pair));
        ended.retain(|pair| !current.contains(pair) && self.touching.contains(pair));

        self.touching = current;
        StepEvents {
            begun: begun.into_iter().collect(),
            ended: ended.into_iter().collect(),
        }
    }

    fn query_filter(&self, filter: &RayFilter) -> QueryFilter<'_> {
        let mut query = QueryFilter::new().groups(InteractionGroups::new(
            Group::ALL,
            Group::from_bits_truncate(filter.mask),
        ));
        if filter.skip_triggers {
            query = query.exclude_sensors();
        }
        if let Some(&(rigid, _)) = filter.exclude.and_then(|handle| self.handles.get(&handle)) {
            query = query.exclude_rigid_body(rigid);
        }
        query
    }

    fn ray_hit(&self, ray: &QueryRay, collider: ColliderHandle, hit: RayIntersection) -> Option<RayHit> {
        Some(RayHit {
            body: *self.owners.get(&collider)?,
            point: from_point(&ray.point_at(hit.time_of_impact)),
            normal: from_vector(&hit.normal),
            distance: hit.time_of_impact,
        })
    }

    fn refresh_queries(&mut self) {
        self.queries.update(&self.colliders);
    }
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new(DVec3::new(0.0, -9.82, 0.0))
    }
}

impl PhysicsBackend for RapierWorld {
    fn add_body(&mut self, desc: &BodyDesc) -> BodyHandle {
        if !desc.shape.is_valid() {
            log::warn!(target: LOG_TARGET, "body created with degenerate shape {:?}", desc.shape);
        }
        let rigid = self.rigid_bodies.insert(rigid_body_for(desc));
        let collider = self
            .colliders
            .insert_with_parent(collider_for(desc), rigid, &mut self.rigid_bodies);
        if let Some(body) = self.rigid_bodies.get_mut(rigid) {
            body.recompute_mass_properties_from_colliders(&self.colliders);
        }

        let handle = BodyHandle(self.next_body);
        self.next_body += 1;
        self.handles.insert(handle, (rigid, collider));
        self.owners.insert(collider, handle);
        self.refresh_queries();
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) -> bool {
        let Some((rigid, collider)) = self.handles.remove(&handle) else {
            return false;
        };
        self.owners.remove(&collider);
        self.vehicles.retain(|_, vehicle| vehicle.chassis != handle);
        self.rigid_bodies.remove(
            rigid,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.forced.retain(|&forced| forced != rigid);
        self.touching.retain(|&(a, b)| a != handle && b != handle);
        self.contacts.retain(|c| c.a != handle && c.b != handle);
        self.refresh_queries();
        true
    }

    fn set_enabled(&mut self, handle: BodyHandle, enabled: bool) -> Result<(), SolverError> {
        let (rigid, collider) = self.slot(handle)?;
        if let Some(body) = self.rigid_bodies.get_mut(rigid) {
            body.set_enabled(enabled);
            if enabled {
                body.wake_up(true);
            }
        }
        if let Some(collider) = self.colliders.get_mut(collider) {
            collider.set_enabled(enabled);
        }
        self.refresh_queries();
        Ok(())
    }

    fn contains(&self, handle: BodyHandle) -> bool {
        self.handles.contains_key(&handle)
    }

    fn body_count(&self) -> usize {
        self.handles.len()
    }

    fn gravity(&self) -> DVec3 {
        from_vector(&self.gravity)
    }

    fn set_gravity(&mut self, gravity: DVec3) {
        self.gravity = to_vector(gravity);
    }

    fn mass(&self, handle: BodyHandle) -> Option<f64> {
        let body = self.rigid(handle)?;
        Some(if body.is_dynamic() { body.mass() } else { 0.0 })
    }

    fn pose(&self, handle: BodyHandle) -> Option<Pose> {
        self.rigid(handle).map(|body| from_isometry(body.position()))
    }

    fn set_pose(&mut self, handle: BodyHandle, pose: Pose) -> Result<(), SolverError> {
        let (_, body) = self.rigid_mut(handle)?;
        body.set_position(to_isometry(&pose), true);
        Ok(())
    }

    fn linear_velocity(&self, handle: BodyHandle) -> Option<DVec3> {
        self.rigid(handle).map(|body| from_vector(body.linvel()))
    }

    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: DVec3) -> Result<(), SolverError> {
        let (_, body) = self.rigid_mut(handle)?;
        if !body.is_fixed() {
            body.set_linvel(to_vector(velocity), true);
        }
        Ok(())
    }

    fn angular_velocity(&self, handle: BodyHandle) -> Option<DVec3> {
        self.rigid(handle).map(|body| from_vector(body.angvel()))
    }

    fn apply_force(&mut self, handle: BodyHandle, force: DVec3, point: Option<DVec3>) -> Result<(), SolverError> {
        let (rigid, body) = self.rigid_mut(handle)?;
        if !body.is_dynamic() {
            return Ok(());
        }
        match point {
            Some(point) => body.add_force_at_point(to_vector(force), to_point(point), true),
            None => body.add_force(to_vector(force), true),
        }
        self.forced.push(rigid);
        Ok(())
    }

    fn apply_impulse(&mut self, handle: BodyHandle, impulse: DVec3, point: Option<DVec3>) -> Result<(), SolverError> {
        let (_, body) = self.rigid_mut(handle)?;
        if !body.is_dynamic() {
            return Ok(());
        }
        match point {
            Some(point) => body.apply_impulse_at_point(to_vector(impulse), to_point(point), true),
            None => body.apply_impulse(to_vector(impulse), true),
        }
        Ok(())
    }

    fn step(&mut self, dt: f64) -> StepEvents {
        if !(dt > 0.0 && dt.is_finite()) {
            log::warn!(target: LOG_TARGET, "ignoring step with invalid dt {}", dt);
            return StepEvents::default();
        }
        self.params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.queries),
            &(),
            &self.events,
        );
        // rapier keeps user forces until they are reset
        for rigid in self.forced.drain(..) {
            if let Some(body) = self.rigid_bodies.get_mut(rigid) {
                body.reset_forces(false);
            }
        }
        self.contacts = self.collect_contacts();
        let events = self.events.drain();
        self.diff_touching(events)
    }

    fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    fn raycast_closest(&self, ray: &Ray, filter: &RayFilter) -> Result<Option<RayHit>, SolverError> {
        let (direction, length) = ray.direction_and_length()?;
        let query = QueryRay::new(to_point(ray.from), to_vector(direction));
        let hit = self.queries.cast_ray_and_get_normal(
            &self.rigid_bodies,
            &self.colliders,
            &query,
            length,
            true,
            self.query_filter(filter),
        );
        Ok(hit.and_then(|(collider, intersection)| self.ray_hit(&query, collider, intersection)))
    }

    fn raycast_all(&self, ray: &Ray, filter: &RayFilter) -> Result<Vec<RayHit>, SolverError> {
        let (direction, length) = ray.direction_and_length()?;
        let query = QueryRay::new(to_point(ray.from), to_vector(direction));
        let mut hits = Vec::new();
        self.queries.intersections_with_ray(
            &self.rigid_bodies,
            &self.colliders,
            &query,
            length,
            true,
            self.query_filter(filter),
            |collider, intersection| {
                hits.extend(self.ray_hit(&query, collider, intersection));
                true
            },
        );
        Ok(hits)
    }

    fn add_vehicle(&mut self, chassis: BodyHandle, wheels: &[WheelConfig]) -> Result<VehicleHandle, SolverError> {
        let (rigid, _) = self.slot(chassis)?;
        let mut controller = DynamicRayCastVehicleController::new(rigid);
        controller.index_up_axis = 1;
        controller.index_forward_axis = 2;
        for wheel in wheels {
            let tuning = WheelTuning {
                suspension_stiffness: wheel.suspension_stiffness,
                suspension_compression: wheel.damping_compression,
                suspension_damping: wheel.damping_relaxation,
                max_suspension_travel: wheel.max_suspension_travel,
                side_friction_stiffness: wheel.side_friction_stiffness,
                friction_slip: wheel.friction_slip,
                max_suspension_force: wheel.max_suspension_force,
                ..WheelTuning::default()
            };
            controller.add_wheel(
                to_point(wheel.connection_point),
                Vector3::new(0.0, -1.0, 0.0),
                Vector3::new(-1.0, 0.0, 0.0),
                wheel.suspension_rest_length,
                wheel.radius,
                &tuning,
            );
        }

        let handle = VehicleHandle(self.next_vehicle);
        self.next_vehicle += 1;
        self.vehicles.insert(handle, MountedVehicle { chassis, controller });
        log::debug!(
            target: LOG_TARGET,
            "mounted {} with {} wheels on {}",
            handle,
            wheels.len(),
            chassis
        );
        Ok(handle)
    }

    fn remove_vehicle(&mut self, handle: VehicleHandle) -> bool {
        self.vehicles.remove(&handle).is_some()
    }

    fn update_vehicle(
        &mut self,
        handle: VehicleHandle,
        controls: &[WheelControl],
        dt: f64,
    ) -> Result<Vec<WheelContact>, SolverError> {
        let vehicle = self
            .vehicles
            .get_mut(&handle)
            .ok_or(SolverError::UnknownVehicle(handle.0))?;
        let mut driven = false;
        for (i, wheel) in vehicle.controller.wheels_mut().iter_mut().enumerate() {
            let control = controls.get(i).copied().unwrap_or_default();
            wheel.engine_force = control.engine_force;
            wheel.brake = control.brake;
            wheel.steering = control.steering;
            driven |= control.engine_force != 0.0;
        }

        let chassis = vehicle.controller.chassis;
        if driven {
            if let Some(body) = self.rigid_bodies.get_mut(chassis) {
                body.wake_up(true);
            }
        }
        let filter = QueryFilter::new().exclude_rigid_body(chassis).exclude_sensors();
        vehicle
            .controller
            .update_vehicle(dt, &mut self.rigid_bodies, &self.colliders, &self.queries, filter);

        let owners = &self.owners;
        Ok(vehicle
            .controller
            .wheels()
            .iter()
            .map(|wheel| {
                let info = wheel.raycast_info();
                WheelContact {
                    in_contact: info.is_in_contact,
                    ground: info.ground_object.and_then(|c| owners.get(&c).copied()),
                    point: from_point(&info.contact_point_ws),
                    normal: from_vector(&info.contact_normal_ws),
                    suspension_length: info.suspension_length,
                }
            })
            .collect())
    }
}

fn ordered(a: BodyHandle, b: BodyHandle) -> Pair {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Deepest point of a touching pair, in world space
fn contact_of(
    pair: &ContactPair,
    colliders: &ColliderSet,
    owners: &HashMap<ColliderHandle, BodyHandle>,
) -> Option<Contact> {
    let a = *owners.get(&pair.collider1)?;
    let b = *owners.get(&pair.collider2)?;
    let frame = colliders.get(pair.collider1)?.position();

    let mut deepest: Option<(Real, Point3<Real>, Vector3<Real>)> = None;
    for manifold in &pair.manifolds {
        let normal = frame.rotation * manifold.local_n1;
        for point in &manifold.points {
            if deepest.map_or(true, |(dist, _, _)| point.dist < dist) {
                deepest = Some((point.dist, frame * point.local_p1, normal));
            }
        }
    }
    let (dist, point, normal) = deepest?;
    Some(oriented(Contact {
        a,
        b,
        point: from_point(&point),
        normal: from_vector(&normal),
        depth: (-dist).max(0.0),
    }))
}

/// Contact with the lower handle first and the normal flipped to match
fn oriented(contact: Contact) -> Contact {
    if contact.a <= contact.b {
        contact
    } else {
        Contact {
            a: contact.b,
            b: contact.a,
            normal: -contact.normal,
            ..contact
        }
    }
}

fn rigid_body_for(desc: &BodyDesc) -> RigidBody {
    let builder = match desc.kind {
        BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
        BodyKind::Static => RigidBodyBuilder::fixed(),
        BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
    };
    builder
        .position(to_isometry(&desc.pose))
        .linvel(to_vector(desc.linear_velocity))
        .linear_damping(desc.linear_damping)
        .angular_damping(desc.angular_damping)
        .build()
}

fn collider_for(desc: &BodyDesc) -> Collider {
    let builder = match desc.shape {
        Shape::Sphere { radius } => ColliderBuilder::ball(radius),
        Shape::Box { half_extents: e } => ColliderBuilder::cuboid(e.x, e.y, e.z),
        Shape::Cylinder { radius, half_height } => ColliderBuilder::cylinder(half_height, radius),
    };
    let mut builder = builder
        .friction(desc.friction)
        .restitution(desc.restitution)
        .sensor(desc.trigger)
        .collision_groups(InteractionGroups::new(
            Group::from_bits_truncate(desc.group),
            Group::from_bits_truncate(desc.mask),
        ))
        .active_events(ActiveEvents::COLLISION_EVENTS)
        .active_collision_types(ActiveCollisionTypes::all());
    if desc.kind == BodyKind::Dynamic && desc.mass > 0.0 {
        builder = builder.mass(desc.mass);
    }
    builder.build()
}

fn to_vector(v: DVec3) -> Vector3<Real> {
    Vector3::new(v.x, v.y, v.z)
}

fn to_point(v: DVec3) -> Point3<Real> {
    Point3::new(v.x, v.y, v.z)
}

fn from_vector(v: &Vector3<Real>) -> DVec3 {
    DVec3::new(v.x, v.y, v.z)
}

fn from_point(p: &Point3<Real>) -> DVec3 {
    DVec3::new(p.x, p.y, p.z)
}

fn to_isometry(pose: &Pose) -> Isometry3<Real> {
    let q = pose.rotation.normalize();
    Isometry3::from_parts(
        Translation3::new(pose.position.x, pose.position.y, pose.position.z),
        UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z)),
    )
}

fn from_isometry(iso: &Isometry3<Real>) -> Pose {
    let t = iso.translation.vector;
    let r = iso.rotation;
    Pose::new(DVec3::new(t.x, t.y, t.z), DQuat::from_xyzw(r.i, r.j, r.k, r.w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f64 = 1.0 / 60.0;

    fn ground(world: &mut RapierWorld) -> BodyHandle {
        let mut desc = BodyDesc::new(
            Shape::Box {
                half_extents: DVec3::new(50.0, 0.5, 50.0),
            },
            BodyKind::Static,
        );
        desc.pose = Pose::new(DVec3::new(0.0, -0.5, 0.0), DQuat::IDENTITY);
        desc.restitution = 0.0;
        world.add_body(&desc)
    }

    fn ball(world: &mut RapierWorld, at: DVec3, kind: BodyKind) -> BodyHandle {
        let mut desc = BodyDesc::new(Shape::Sphere { radius: 0.5 }, kind);
        desc.pose = Pose::new(at, DQuat::IDENTITY);
        world.add_body(&desc)
    }

    fn chassis(world: &mut RapierWorld, height: f64) -> BodyHandle {
        let mut desc = BodyDesc::new(
            Shape::Box {
                half_extents: DVec3::new(1.0, 0.3, 2.0),
            },
            BodyKind::Dynamic,
        );
        desc.mass = 150.0;
        desc.pose = Pose::new(DVec3::new(0.0, height, 0.0), DQuat::IDENTITY);
        world.add_body(&desc)
    }

    fn four_wheels() -> Vec<WheelConfig> {
        [(1.0, 1.5), (-1.0, 1.5), (1.0, -1.5), (-1.0, -1.5)]
            .into_iter()
            .map(|(x, z)| WheelConfig::new(DVec3::new(x, 0.0, z), z > 0.0))
            .collect()
    }

    #[test]
    fn test_ball_comes_to_rest_on_ground() {
        let mut world = RapierWorld::default();
        let g = ground(&mut world);
        let mut desc = BodyDesc::new(Shape::Sphere { radius: 0.5 }, BodyKind::Dynamic);
        desc.pose = Pose::new(DVec3::new(0.0, 2.0, 0.0), DQuat::IDENTITY);
        desc.restitution = 0.0;
        let b = world.add_body(&desc);

        let mut begun = Vec::new();
        for _ in 0..240 {
            begun.extend(world.step(DT).begun);
        }
        let pose = world.pose(b).unwrap();
        assert_relative_eq!(pose.position.y, 0.5, epsilon = 0.05);
        assert!(world.linear_velocity(b).unwrap().length() < 0.2);
        assert!(!begun.is_empty());
        assert!(begun.iter().all(|&pair| pair == (g, b)));

        let contact = world.contacts()[0];
        assert_eq!((contact.a, contact.b), (g, b));
        assert!(contact.normal.y > 0.9);
        assert!(contact.depth >= 0.0);
    }

    #[test]
    fn test_begin_and_end_events() {
        let mut world = RapierWorld::new(DVec3::ZERO);
        let a = ball(&mut world, DVec3::ZERO, BodyKind::Kinematic);
        let b = ball(&mut world, DVec3::new(0.8, 0.0, 0.0), BodyKind::Kinematic);

        let first = world.step(0.1);
        assert_eq!(first.begun, vec![(a, b)]);
        let second = world.step(0.1);
        assert!(second.begun.is_empty() && second.ended.is_empty());
        assert_eq!(world.contacts().len(), 1);

        world.set_pose(b, Pose::new(DVec3::new(3.0, 0.0, 0.0), DQuat::IDENTITY)).unwrap();
        let third = world.step(0.1);
        assert_eq!(third.ended, vec![(a, b)]);
        assert!(world.contacts().is_empty());
    }

    #[test]
    fn test_removed_body_drops_its_pairs() {
        let mut world = RapierWorld::new(DVec3::ZERO);
        let a = ball(&mut world, DVec3::ZERO, BodyKind::Kinematic);
        let b = ball(&mut world, DVec3::new(0.5, 0.0, 0.0), BodyKind::Kinematic);
        world.step(0.1);
        assert!(world.remove_body(b));
        assert!(!world.remove_body(b));
        let events = world.step(0.1);
        assert!(events.ended.is_empty());
        assert!(world.contains(a));
        assert_eq!(world.body_count(), 1);
    }

    #[test]
    fn test_sensor_overlap_reported_without_response() {
        let mut world = RapierWorld::default();
        let mut zone = BodyDesc::new(Shape::Sphere { radius: 2.0 }, BodyKind::Static);
        zone.trigger = true;
        let zone = world.add_body(&zone);
        let falling = ball(&mut world, DVec3::new(0.0, 1.0, 0.0), BodyKind::Dynamic);

        let first = world.step(DT);
        assert_eq!(first.begun, vec![(zone, falling)]);
        assert_eq!(world.contacts()[0].depth, 0.0);
        for _ in 0..30 {
            world.step(DT);
        }
        // passes straight through the trigger
        assert!(world.pose(falling).unwrap().position.y < 0.0);
    }

    #[test]
    fn test_filtered_pairs_never_touch() {
        let mut world = RapierWorld::new(DVec3::ZERO);
        let mut desc = BodyDesc::new(Shape::Sphere { radius: 1.0 }, BodyKind::Kinematic);
        desc.group = 0b01;
        desc.mask = 0b01;
        world.add_body(&desc);
        desc.group = 0b10;
        desc.mask = 0b10;
        world.add_body(&desc);
        assert!(world.step(0.1).begun.is_empty());
        assert!(world.contacts().is_empty());
    }

    #[test]
    fn test_impulse_before_first_step() {
        let mut world = RapierWorld::new(DVec3::ZERO);
        let mut desc = BodyDesc::new(Shape::Sphere { radius: 0.2 }, BodyKind::Dynamic);
        desc.mass = 4.0;
        desc.linear_damping = 0.0;
        let puck = world.add_body(&desc);
        assert_relative_eq!(world.mass(puck).unwrap(), 4.0, epsilon = 1e-9);

        world.apply_impulse(puck, DVec3::new(8.0, 0.0, 0.0), None).unwrap();
        world.step(DT);
        assert_relative_eq!(world.linear_velocity(puck).unwrap().x, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_forces_last_one_step() {
        let mut world = RapierWorld::new(DVec3::ZERO);
        let mut desc = BodyDesc::new(Shape::Sphere { radius: 0.2 }, BodyKind::Dynamic);
        desc.linear_damping = 0.0;
        let puck = world.add_body(&desc);
        world.apply_force(puck, DVec3::new(60.0, 0.0, 0.0), None).unwrap();
        world.step(DT);
        let after_push = world.linear_velocity(puck).unwrap().x;
        assert_relative_eq!(after_push, 1.0, epsilon = 1e-9);
        world.step(DT);
        assert_relative_eq!(world.linear_velocity(puck).unwrap().x, after_push, epsilon = 1e-9);
    }

    #[test]
    fn test_static_bodies_report_zero_mass() {
        let mut world = RapierWorld::default();
        let g = ground(&mut world);
        assert_eq!(world.mass(g), Some(0.0));
        assert_eq!(world.mass(BodyHandle(999)), None);
        assert!(matches!(
            world.set_pose(BodyHandle(999), Pose::IDENTITY),
            Err(SolverError::UnknownBody(999))
        ));
    }

    #[test]
    fn test_disabled_body_is_frozen() {
        let mut world = RapierWorld::default();
        let b = ball(&mut world, DVec3::new(0.0, 10.0, 0.0), BodyKind::Dynamic);
        world.set_enabled(b, false).unwrap();
        for _ in 0..60 {
            world.step(DT);
        }
        assert_relative_eq!(world.pose(b).unwrap().position.y, 10.0, epsilon = 1e-12);
        let down = Ray::new(DVec3::new(0.0, 20.0, 0.0), DVec3::ZERO);
        assert!(world.raycast_closest(&down, &RayFilter::default()).unwrap().is_none());

        world.set_enabled(b, true).unwrap();
        for _ in 0..10 {
            world.step(DT);
        }
        assert!(world.pose(b).unwrap().position.y < 10.0);
    }

    #[test]
    fn test_raycast_shapes() {
        let mut world = RapierWorld::new(DVec3::ZERO);
        let sphere = ball(&mut world, DVec3::new(0.0, 0.0, 5.0), BodyKind::Static);
        let mut cyl = BodyDesc::new(
            Shape::Cylinder {
                radius: 1.0,
                half_height: 0.5,
            },
            BodyKind::Static,
        );
        cyl.pose = Pose::new(DVec3::new(0.0, -3.0, 0.0), DQuat::IDENTITY);
        let cylinder = world.add_body(&cyl);

        let forward = Ray::new(DVec3::ZERO, DVec3::new(0.0, 0.0, 10.0));
        let hit = world.raycast_closest(&forward, &RayFilter::default()).unwrap().unwrap();
        assert_eq!(hit.body, sphere);
        assert_relative_eq!(hit.distance, 4.5, epsilon = 1e-9);
        assert_relative_eq!(hit.normal.z, -1.0, epsilon = 1e-9);

        let down = Ray::new(DVec3::ZERO, DVec3::new(0.0, -10.0, 0.0));
        let hit = world.raycast_closest(&down, &RayFilter::default()).unwrap().unwrap();
        assert_eq!(hit.body, cylinder);
        assert_relative_eq!(hit.distance, 2.5, epsilon = 1e-9);
        assert_relative_eq!(hit.normal.y, 1.0, epsilon = 1e-9);

        let excluded = RayFilter {
            exclude: Some(cylinder),
            ..RayFilter::default()
        };
        assert!(world.raycast_closest(&down, &excluded).unwrap().is_none());
    }

    #[test]
    fn test_raycast_rotated_box() {
        let mut world = RapierWorld::new(DVec3::ZERO);
        let mut desc = BodyDesc::new(
            Shape::Box {
                half_extents: DVec3::new(1.0, 1.0, 1.0),
            },
            BodyKind::Static,
        );
        desc.pose = Pose::new(
            DVec3::new(5.0, 0.0, 0.0),
            DQuat::from_rotation_y(std::f64::consts::FRAC_PI_4),
        );
        world.add_body(&desc);

        let ray = Ray::new(DVec3::ZERO, DVec3::new(10.0, 0.0, 0.0));
        let hit = world.raycast_closest(&ray, &RayFilter::default()).unwrap().unwrap();
        // corner of the rotated cube points at the ray
        assert_relative_eq!(hit.distance, 5.0 - 2f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_raycast_all_respects_mask() {
        let mut world = RapierWorld::new(DVec3::ZERO);
        let near = ball(&mut world, DVec3::new(0.0, 0.0, 2.0), BodyKind::Static);
        let mut far = BodyDesc::new(Shape::Sphere { radius: 0.5 }, BodyKind::Static);
        far.pose.position = DVec3::new(0.0, 0.0, 6.0);
        far.group = 0b100;
        let far = world.add_body(&far);

        let ray = Ray::new(DVec3::ZERO, DVec3::new(0.0, 0.0, 10.0));
        let mut all: Vec<BodyHandle> = world
            .raycast_all(&ray, &RayFilter::default())
            .unwrap()
            .into_iter()
            .map(|hit| hit.body)
            .collect();
        all.sort();
        assert_eq!(all, vec![near, far]);

        let only_far = RayFilter {
            mask: 0b100,
            ..RayFilter::default()
        };
        let hits = world.raycast_all(&ray, &only_far).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].body, far);
    }

    #[test]
    fn test_invalid_ray_is_an_error() {
        let world = RapierWorld::default();
        let ray = Ray::new(DVec3::ZERO, DVec3::ZERO);
        assert!(world.raycast_all(&ray, &RayFilter::default()).is_err());
    }

    #[test]
    fn test_parked_vehicle_has_no_residual_velocity() {
        let mut world = RapierWorld::default();
        let g = ground(&mut world);
        let body = chassis(&mut world, 0.75);
        let vehicle = world.add_vehicle(body, &four_wheels()).unwrap();

        let mut contacts = Vec::new();
        for _ in 0..600 {
            contacts = world.update_vehicle(vehicle, &[], DT).unwrap();
            world.step(DT);
        }
        assert_eq!(contacts.len(), 4);
        for contact in &contacts {
            assert!(contact.in_contact);
            assert_eq!(contact.ground, Some(g));
            assert!(contact.suspension_length > 0.0 && contact.suspension_length < 0.3);
            assert_relative_eq!(contact.normal.y, 1.0, epsilon = 1e-6);
        }
        let velocity = world.linear_velocity(body).unwrap();
        assert!(velocity.length() < 1e-2, "residual velocity {:?}", velocity);
        assert!(world.pose(body).unwrap().position.y > 0.3);
    }

    #[test]
    fn test_vehicle_unknown_and_removed() {
        let mut world = RapierWorld::default();
        ground(&mut world);
        let body = chassis(&mut world, 0.75);
        let vehicle = world.add_vehicle(body, &four_wheels()).unwrap();
        assert_eq!(world.vehicle_count(), 1);

        assert!(world.remove_body(body));
        assert_eq!(world.vehicle_count(), 0);
        assert!(matches!(
            world.update_vehicle(vehicle, &[], DT),
            Err(SolverError::UnknownVehicle(_))
        ));
        assert!(!world.remove_vehicle(vehicle));
        assert!(world.add_vehicle(body, &four_wheels()).is_err());
    }
}
