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
//! Raycast vehicle
//!
//! A vehicle is one chassis rigid body plus wheels that are not bodies at
//! all. The backend mounts the wheel layout on the chassis, casts each
//! wheel's suspension ray every step and pushes the chassis with suspension,
//! side friction and drive impulses ([`RapierWorld`](super::RapierWorld)
//! uses rapier's raycast vehicle controller). [`VehicleSimulation`] holds
//! the layout and driver inputs, receives the per-wheel contact results and
//! derives wheel spin and poses from the chassis motion.
//!
//! Chassis-local axes: right is index 0 (X), up is +Y, forward is +Z. The
//! suspension points along -Y and wheels spin about -X. Wheels with
//! `connection_point.x < 0` sit on the right side and their visual pose is
//! mirrored 180° about the up axis, so one wheel model serves both sides.

use crate::ecs::{Capability, Component, Entity, EntityId, Script, ScriptContext};
use crate::error::SerializationError;
use crate::math::{to_array, DQuat, DVec3, Pose};
use crate::physics::backend::{BodyHandle, WheelContact, WheelControl};
use crate::physics::PhysicsBody;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::f64::consts::PI;

const LOG_TARGET: &str = "sim_runtime::vehicle";

const LOCAL_UP: DVec3 = DVec3::Y;
const LOCAL_DIRECTION: DVec3 = DVec3::NEG_Y;
const LOCAL_AXLE: DVec3 = DVec3::NEG_X;

/// Per-step spin decay for wheels off the ground
const AIRBORNE_SPIN_DECAY: f64 = 0.99;

/// Static description of one wheel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Hardpoint in chassis space
    #[serde(with = "vec3")]
    pub connection_point: DVec3,
    /// Wheel radius
    pub radius: f64,
    /// Suspension length with no load
    pub suspension_rest_length: f64,
    /// Maximum deviation from the rest length
    pub max_suspension_travel: f64,
    /// Spring constant, scaled by chassis mass
    pub suspension_stiffness: f64,
    /// Damping while extending
    pub damping_relaxation: f64,
    /// Damping while compressing
    pub damping_compression: f64,
    /// Upper bound on the suspension force
    pub max_suspension_force: f64,
    /// Grip budget multiplier
    pub friction_slip: f64,
    /// Scale of the lateral grip impulse
    pub side_friction_stiffness: f64,
    /// How much side impulses roll the chassis, 0 to 1. Saved with the
    /// layout; rapier's controller has no roll term and ignores it.
    pub roll_influence: f64,
    /// Steerable front wheel; non-front wheels are driven
    pub front: bool,
}

impl Default for WheelConfig {
    fn default() -> Self {
        WheelConfig {
            connection_point: DVec3::ZERO,
            radius: 0.5,
            suspension_rest_length: 0.3,
            max_suspension_travel: 0.3,
            suspension_stiffness: 25.0,
            damping_relaxation: 2.5,
            damping_compression: 4.4,
            max_suspension_force: 100_000.0,
            friction_slip: 10.0,
            side_friction_stiffness: 1.0,
            roll_influence: 0.001,
            front: false,
        }
    }
}

impl WheelConfig {
    /// Wheel with default suspension at `connection_point`
    pub fn new(connection_point: DVec3, front: bool) -> Self {
        WheelConfig {
            connection_point,
            front,
            ..Default::default()
        }
    }

    /// Set the radius
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    /// Set rest length and maximum travel
    pub fn with_suspension(mut self, rest_length: f64, max_travel: f64) -> Self {
        self.suspension_rest_length = rest_length;
        self.max_suspension_travel = max_travel;
        self
    }

    /// Set spring stiffness and damping
    pub fn with_spring(mut self, stiffness: f64, relaxation: f64, compression: f64) -> Self {
        self.suspension_stiffness = stiffness;
        self.damping_relaxation = relaxation;
        self.damping_compression = compression;
        self
    }

    /// Set the friction slip
    pub fn with_friction_slip(mut self, friction_slip: f64) -> Self {
        self.friction_slip = friction_slip;
        self
    }

    /// Set the lateral grip scale
    pub fn with_side_friction_stiffness(mut self, stiffness: f64) -> Self {
        self.side_friction_stiffness = stiffness;
        self
    }

    /// Set the roll influence
    pub fn with_roll_influence(mut self, roll_influence: f64) -> Self {
        self.roll_influence = roll_influence;
        self
    }

    /// Whether the wheel is on the chassis' right side
    pub fn is_right_side(&self) -> bool {
        self.connection_point.x < 0.0
    }

    /// Fixed rotation applied on top of the simulated wheel pose
    pub fn visual_correction(&self) -> DQuat {
        if self.is_right_side() {
            DQuat::from_rotation_y(PI)
        } else {
            DQuat::IDENTITY
        }
    }
}

/// Per-step results for one wheel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelState {
    /// Whether the suspension ray found ground
    pub in_contact: bool,
    /// Body under the wheel
    pub ground: Option<BodyHandle>,
    /// Ground contact point
    pub contact_point: DVec3,
    /// Ground normal at the contact
    pub contact_normal: DVec3,
    /// Current suspension length
    pub suspension_length: f64,
    /// Accumulated spin in radians
    pub rotation: f64,
    /// Spin of the last step
    pub delta_rotation: f64,
    /// Steering angle
    pub steering: f64,
    /// Drive force
    pub engine_force: f64,
    /// Brake force
    pub brake: f64,
    /// Simulated wheel pose
    pub world_transform: Pose,
    /// World pose with the per-side visual correction
    pub visual_transform: Pose,
}

impl WheelState {
    fn resting(config: &WheelConfig) -> Self {
        WheelState {
            in_contact: false,
            ground: None,
            contact_point: DVec3::ZERO,
            contact_normal: DVec3::Y,
            suspension_length: config.suspension_rest_length,
            rotation: 0.0,
            delta_rotation: 0.0,
            steering: 0.0,
            engine_force: 0.0,
            brake: 0.0,
            world_transform: Pose::IDENTITY,
            visual_transform: Pose::IDENTITY,
        }
    }
}

#[derive(Debug, Clone)]
struct Wheel {
    config: WheelConfig,
    state: WheelState,
    visual: Option<EntityId>,
}

/// Raycast vehicle attached to a chassis entity that also has a
/// [`PhysicsBody`]
#[derive(Debug, Clone, Default)]
pub struct VehicleSimulation {
    wheels: Vec<Wheel>,
    speed: f64,
    layout_changed: bool,
}

impl Capability for VehicleSimulation {
    const KEY: &'static str = "VehicleSimulation";
}

impl VehicleSimulation {
    /// Vehicle with no wheels
    pub fn new() -> Self {
        Self::default()
    }

    /// Four wheels at `(±half_track, height, ±half_base)`, front pair first.
    /// `template` supplies everything but the hardpoint and front flag.
    pub fn four_wheel(half_track: f64, height: f64, half_base: f64, template: WheelConfig) -> Self {
        let mut vehicle = Self::new();
        for (x, z, front) in [
            (half_track, half_base, true),
            (-half_track, half_base, true),
            (half_track, -half_base, false),
            (-half_track, -half_base, false),
        ] {
            vehicle.add_wheel(WheelConfig {
                connection_point: DVec3::new(x, height, z),
                front,
                ..template
            });
        }
        vehicle
    }

    /// Add a wheel and return its index
    pub fn add_wheel(&mut self, config: WheelConfig) -> usize {
        self.wheels.push(Wheel {
            config,
            state: WheelState::resting(&config),
            visual: None,
        });
        self.layout_changed = true;
        self.wheels.len() - 1
    }

    /// Number of wheels
    pub fn wheel_count(&self) -> usize {
        self.wheels.len()
    }

    /// Configuration of wheel `index`
    pub fn wheel_config(&self, index: usize) -> Option<&WheelConfig> {
        self.wheels.get(index).map(|w| &w.config)
    }

    /// Latest state of wheel `index`
    pub fn wheel_state(&self, index: usize) -> Option<&WheelState> {
        self.wheels.get(index).map(|w| &w.state)
    }

    /// Number of wheels touching ground
    pub fn wheels_in_contact(&self) -> usize {
        self.wheels.iter().filter(|w| w.state.in_contact).count()
    }

    /// Have the physics system copy wheel `index`'s visual pose into
    /// `entity`'s transform every step. Returns false for a bad index.
    pub fn bind_wheel_visual(&mut self, index: usize, entity: EntityId) -> bool {
        match self.wheels.get_mut(index) {
            Some(wheel) => {
                wheel.visual = Some(entity);
                true
            }
            None => false,
        }
    }

    pub(crate) fn wheel_visuals(&self) -> impl Iterator<Item = (EntityId, Pose)> + '_ {
        self.wheels
            .iter()
            .filter_map(|w| w.visual.map(|id| (id, w.state.visual_transform)))
    }

    /// Set the drive force on every rear wheel
    pub fn apply_engine_force(&mut self, force: f64) {
        for wheel in &mut self.wheels {
            wheel.state.engine_force = if wheel.config.front { 0.0 } else { force };
        }
    }

    /// Set the brake force on every wheel
    pub fn set_brake(&mut self, brake: f64) {
        for wheel in &mut self.wheels {
            wheel.state.brake = brake;
        }
    }

    /// Set the steering angle of every front wheel
    pub fn set_steering_value(&mut self, angle: f64) {
        for wheel in self.wheels.iter_mut().filter(|w| w.config.front) {
            wheel.state.steering = angle;
        }
    }

    /// Steering angle of the first front wheel
    pub fn steering_value(&self) -> f64 {
        self.wheels
            .iter()
            .find(|w| w.config.front)
            .map(|w| w.state.steering)
            .unwrap_or(0.0)
    }

    /// Chassis speed in m/s as of the last step
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Chassis speed in km/h
    pub fn speed_kmh(&self) -> f64 {
        self.speed * 3.6
    }

    /// Wheel layout in mounting order
    pub(crate) fn wheel_configs(&self) -> Vec<WheelConfig> {
        self.wheels.iter().map(|w| w.config).collect()
    }

    /// Driver inputs for the backend, one per wheel
    pub(crate) fn controls(&self) -> Vec<WheelControl> {
        self.wheels
            .iter()
            .map(|w| WheelControl {
                engine_force: w.state.engine_force,
                brake: w.state.brake,
                steering: w.state.steering,
            })
            .collect()
    }

    /// Whether wheels were added or replaced since the last call
    pub(crate) fn take_layout_change(&mut self) -> bool {
        std::mem::take(&mut self.layout_changed)
    }

    /// Store the suspension results of the backend's last vehicle update
    pub(crate) fn apply_contacts(&mut self, contacts: &[WheelContact]) {
        for (wheel, contact) in self.wheels.iter_mut().zip(contacts) {
            let state = &mut wheel.state;
            state.in_contact = contact.in_contact;
            state.ground = contact.ground;
            state.contact_normal = contact.normal;
            if contact.in_contact {
                state.contact_point = contact.point;
                state.suspension_length = contact.suspension_length;
            } else {
                state.suspension_length = wheel.config.suspension_rest_length;
            }
        }
    }

    /// Advance wheel spin and recompute wheel poses from the chassis pose
    /// after the solver step
    pub(crate) fn update_wheel_transforms(&mut self, pose: Pose, linear: DVec3, angular: DVec3, dt: f64) {
        self.speed = linear.length();
        for wheel in &mut self.wheels {
            let config = &wheel.config;
            let state = &mut wheel.state;
            let steer = DQuat::from_axis_angle(LOCAL_UP, state.steering);

            if state.in_contact {
                let hardpoint = pose.transform_point(config.connection_point);
                let forward = pose.transform_vector(steer * DVec3::Z);
                let velocity = linear + angular.cross(hardpoint - pose.position);
                state.delta_rotation = velocity.dot(forward) * dt / config.radius;
            } else {
                state.delta_rotation *= AIRBORNE_SPIN_DECAY;
            }
            state.rotation = (state.rotation + state.delta_rotation).rem_euclid(2.0 * PI);

            let spin = DQuat::from_axis_angle(LOCAL_AXLE, state.rotation);
            let hub = config.connection_point + LOCAL_DIRECTION * state.suspension_length;
            state.world_transform = pose.mul_pose(&Pose::new(hub, steer * spin));
            state.visual_transform = Pose::new(
                state.world_transform.position,
                (state.world_transform.rotation * config.visual_correction()).normalize(),
            );
        }
    }
}

mod vec3 {
    use crate::math::{from_array, to_array, DVec3};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &DVec3, s: S) -> Result<S::Ok, S::Error> {
        to_array(*v).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DVec3, D::Error> {
        <[f64; 3]>::deserialize(d).map(from_array)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VehicleRecord {
    wheels: Vec<WheelConfig>,
    #[serde(default)]
    steering: f64,
    #[serde(default)]
    engine_force: f64,
    #[serde(default)]
    brake: f64,
}

impl Component for VehicleSimulation {
    fn on_init(&mut self, entity: &mut Entity) {
        if !entity.has_component::<PhysicsBody>() {
            log::warn!(
                target: LOG_TARGET,
                "vehicle on '{}' has no PhysicsBody chassis; it will not be simulated",
                entity.name()
            );
        }
        let pose = entity.transform().pose();
        self.update_wheel_transforms(pose, DVec3::ZERO, DVec3::ZERO, 0.0);
    }

    fn save(&self) -> Value {
        let engine_force = self
            .wheels
            .iter()
            .find(|w| !w.config.front)
            .map(|w| w.state.engine_force)
            .unwrap_or(0.0);
        let record = VehicleRecord {
            wheels: self.wheels.iter().map(|w| w.config).collect(),
            steering: self.steering_value(),
            engine_force,
            brake: self.wheels.first().map(|w| w.state.brake).unwrap_or(0.0),
        };
        serde_json::to_value(record).unwrap_or(Value::Null)
    }

    fn load(&mut self, payload: &Value) -> Result<(), SerializationError> {
        let record: VehicleRecord = serde_json::from_value(payload.clone())?;
        if let Some(bad) = record.wheels.iter().find(|w| !(w.radius > 0.0)) {
            return Err(SerializationError::Malformed {
                what: "VehicleSimulation",
                reason: format!("wheel radius {} at {:?}", bad.radius, to_array(bad.connection_point)),
            });
        }
        self.wheels.clear();
        self.layout_changed = true;
        for config in record.wheels {
            self.add_wheel(config);
        }
        self.set_steering_value(record.steering);
        self.apply_engine_force(record.engine_force);
        self.set_brake(record.brake);
        Ok(())
    }

    fn clone_box(&self) -> Option<Box<dyn Component>> {
        let mut copy = VehicleSimulation::new();
        for wheel in &self.wheels {
            let index = copy.add_wheel(wheel.config);
            copy.wheels[index].state.steering = wheel.state.steering;
            copy.wheels[index].state.engine_force = wheel.state.engine_force;
            copy.wheels[index].state.brake = wheel.state.brake;
        }
        Some(Box::new(copy))
    }
}

/// Keyboard driver for a [`VehicleSimulation`] on the same entity
///
/// W and S drive forward and back, A and D steer left and right. Steering
/// ramps by `steering_increment` per update up to `steering_clamp` and
/// recenters at half that rate when released. With no throttle the idle
/// brake holds the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleController {
    /// Drive force while a throttle key is held
    pub max_engine_force: f64,
    /// Steering change per update
    pub steering_increment: f64,
    /// Steering limit in radians
    pub steering_clamp: f64,
    /// Brake applied with no throttle
    pub idle_brake: f64,
    /// Key that drives forward
    pub forward_key: String,
    /// Key that drives backward
    pub backward_key: String,
    /// Key that steers left
    pub left_key: String,
    /// Key that steers right
    pub right_key: String,
    #[serde(skip)]
    steering: f64,
}

impl Capability for VehicleController {
    const KEY: &'static str = "VehicleController";
}

impl Default for VehicleController {
    fn default() -> Self {
        VehicleController {
            max_engine_force: 5000.0,
            steering_increment: 0.04,
            steering_clamp: 0.3,
            idle_brake: 10.0,
            forward_key: "KeyW".to_string(),
            backward_key: "KeyS".to_string(),
            left_key: "KeyA".to_string(),
            right_key: "KeyD".to_string(),
            steering: 0.0,
        }
    }
}

impl VehicleController {
    /// Set the drive force applied while a throttle key is held
    pub fn with_max_engine_force(mut self, force: f64) -> Self {
        self.max_engine_force = force;
        self
    }

    /// Set the brake applied with no throttle
    pub fn with_idle_brake(mut self, brake: f64) -> Self {
        self.idle_brake = brake;
        self
    }

    /// Current steering command
    pub fn steering(&self) -> f64 {
        self.steering
    }

    fn next_steering(&self, left: bool, right: bool) -> f64 {
        let step = self.steering_increment;
        let mut steering = self.steering;
        if left {
            steering += step;
        } else if right {
            steering -= step;
        } else {
            steering -= steering.signum() * step / 2.0;
            if steering.abs() <= step {
                steering = 0.0;
            }
        }
        steering.clamp(-self.steering_clamp, self.steering_clamp)
    }
}

impl Script for VehicleController {
    fn on_update(&mut self, ctx: &mut ScriptContext<'_>, _dt: f64) {
        let forward = ctx.input.is_key_down(&self.forward_key);
        let backward = ctx.input.is_key_down(&self.backward_key);
        let engine_force = match (forward, backward) {
            (true, _) => self.max_engine_force,
            (false, true) => -self.max_engine_force,
            _ => 0.0,
        };
        self.steering = self.next_steering(
            ctx.input.is_key_down(&self.left_key),
            ctx.input.is_key_down(&self.right_key),
        );

        let Some(vehicle) = ctx.entity.component_mut::<VehicleSimulation>() else {
            return;
        };
        vehicle.apply_engine_force(engine_force);
        vehicle.set_brake(if engine_force == 0.0 { self.idle_brake } else { 0.0 });
        vehicle.set_steering_value(self.steering);
    }

    fn save(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn load(&mut self, payload: &Value) -> Result<(), SerializationError> {
        *self = serde_json::from_value(payload.clone())?;
        Ok(())
    }

    fn clone_box(&self) -> Option<Box<dyn Script>> {
        Some(Box::new(VehicleController {
            steering: 0.0,
            ..self.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Entity;
    use crate::events::EventBus;
    use crate::input::InputState;
    use crate::physics::backend::{BodyDesc, BodyKind, PhysicsBackend, Shape};
    use crate::physics::RapierWorld;
    use approx::assert_relative_eq;

    fn ground_and_chassis(height: f64) -> (RapierWorld, BodyHandle) {
        let mut world = RapierWorld::new(DVec3::new(0.0, -9.82, 0.0));
        let mut ground = BodyDesc::new(
            Shape::Box {
                half_extents: DVec3::new(50.0, 0.5, 50.0),
            },
            BodyKind::Static,
        );
        ground.pose = Pose::new(DVec3::new(0.0, -0.5, 0.0), DQuat::IDENTITY);
        world.add_body(&ground);

        let mut chassis = BodyDesc::new(
            Shape::Box {
                half_extents: DVec3::new(1.0, 0.3, 2.0),
            },
            BodyKind::Dynamic,
        );
        chassis.mass = 150.0;
        chassis.pose = Pose::new(DVec3::new(0.0, height, 0.0), DQuat::IDENTITY);
        let handle = world.add_body(&chassis);
        (world, handle)
    }

    #[test]
    fn test_right_side_wheels_are_mirrored() {
        let vehicle = VehicleSimulation::four_wheel(1.0, 0.0, 1.5, WheelConfig::default());
        let right: Vec<bool> = (0..4)
            .map(|i| vehicle.wheel_config(i).unwrap().is_right_side())
            .collect();
        assert_eq!(right, vec![false, true, false, true]);
        let correction = vehicle.wheel_config(1).unwrap().visual_correction();
        assert_relative_eq!((correction * DVec3::Z).z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inputs_reach_the_right_wheels() {
        let mut vehicle = VehicleSimulation::four_wheel(1.0, 0.0, 1.5, WheelConfig::default());
        vehicle.apply_engine_force(800.0);
        vehicle.set_steering_value(0.2);
        let engine: Vec<f64> = (0..4).map(|i| vehicle.wheel_state(i).unwrap().engine_force).collect();
        let steer: Vec<f64> = (0..4).map(|i| vehicle.wheel_state(i).unwrap().steering).collect();
        assert_eq!(engine, vec![0.0, 0.0, 800.0, 800.0]);
        assert_eq!(steer, vec![0.2, 0.2, 0.0, 0.0]);
    }

    /// Mount `vehicle` on the chassis and run one suspension update
    fn cast_once(world: &mut RapierWorld, chassis: BodyHandle, vehicle: &mut VehicleSimulation) {
        let handle = world.add_vehicle(chassis, &vehicle.wheel_configs()).unwrap();
        let contacts = world
            .update_vehicle(handle, &vehicle.controls(), 1.0 / 60.0)
            .unwrap();
        vehicle.apply_contacts(&contacts);
    }

    #[test]
    fn test_suspension_finds_ground() {
        let (mut world, chassis) = ground_and_chassis(0.7);
        let mut vehicle = VehicleSimulation::four_wheel(1.0, 0.0, 1.5, WheelConfig::default());
        cast_once(&mut world, chassis, &mut vehicle);
        assert_eq!(vehicle.wheels_in_contact(), 4);
        let state = vehicle.wheel_state(0).unwrap();
        // hardpoint at 0.7, ground at 0, radius 0.5
        assert_relative_eq!(state.suspension_length, 0.2, epsilon = 1e-6);
        assert!(state.ground.is_some());
        assert_relative_eq!(state.contact_point.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_airborne_wheels_hang_at_rest_length() {
        let (mut world, chassis) = ground_and_chassis(5.0);
        let mut vehicle = VehicleSimulation::four_wheel(1.0, 0.0, 1.5, WheelConfig::default());
        cast_once(&mut world, chassis, &mut vehicle);
        assert_eq!(vehicle.wheels_in_contact(), 0);
        let pose = world.pose(chassis).unwrap();
        vehicle.update_wheel_transforms(pose, DVec3::ZERO, DVec3::ZERO, 1.0 / 60.0);
        let hub = vehicle.wheel_state(2).unwrap().world_transform.position;
        assert_relative_eq!(hub.y, 5.0 - 0.3, epsilon = 1e-9);
        assert_relative_eq!(hub.x, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_layout_change_is_reported_once() {
        let mut vehicle = VehicleSimulation::new();
        assert!(!vehicle.take_layout_change());
        vehicle.add_wheel(WheelConfig::default());
        assert!(vehicle.take_layout_change());
        assert!(!vehicle.take_layout_change());

        vehicle.set_brake(5.0);
        assert!(!vehicle.take_layout_change());
        let payload = vehicle.save();
        vehicle.load(&payload).unwrap();
        assert!(vehicle.take_layout_change());
    }

    #[test]
    fn test_controls_follow_inputs() {
        let mut vehicle = VehicleSimulation::four_wheel(1.0, 0.0, 1.5, WheelConfig::default());
        vehicle.apply_engine_force(300.0);
        vehicle.set_brake(2.0);
        vehicle.set_steering_value(-0.1);
        let controls = vehicle.controls();
        assert_eq!(controls.len(), 4);
        assert_eq!(
            controls[0],
            WheelControl {
                engine_force: 0.0,
                brake: 2.0,
                steering: -0.1
            }
        );
        assert_eq!(
            controls[3],
            WheelControl {
                engine_force: 300.0,
                brake: 2.0,
                steering: 0.0
            }
        );
    }

    #[test]
    fn test_wheel_spins_with_forward_speed() {
        let mut vehicle = VehicleSimulation::four_wheel(1.0, 0.0, 1.5, WheelConfig::default());
        for wheel in &mut vehicle.wheels {
            wheel.state.in_contact = true;
        }
        vehicle.update_wheel_transforms(Pose::IDENTITY, DVec3::new(0.0, 0.0, 2.0), DVec3::ZERO, 0.1);
        let state = vehicle.wheel_state(0).unwrap();
        assert_relative_eq!(state.delta_rotation, 2.0 * 0.1 / 0.5);
        assert_relative_eq!(vehicle.speed_kmh(), 7.2);
    }

    #[test]
    fn test_controller_builders() {
        let controller = VehicleController::default()
            .with_max_engine_force(600.0)
            .with_idle_brake(3.0);
        assert_eq!(controller.max_engine_force, 600.0);
        assert_eq!(controller.idle_brake, 3.0);
        assert_eq!(controller.steering(), 0.0);
        assert_eq!(controller.forward_key, "KeyW");
    }

    #[test]
    fn test_controller_steering_ramp() {
        let mut controller = VehicleController::default();
        for _ in 0..20 {
            controller.steering = controller.next_steering(true, false);
        }
        assert_relative_eq!(controller.steering, 0.3, epsilon = 1e-12);

        controller.steering = controller.next_steering(false, false);
        assert_relative_eq!(controller.steering, 0.28, epsilon = 1e-12);

        controller.steering = 0.05;
        controller.steering = controller.next_steering(false, false);
        assert_eq!(controller.steering, 0.0);
    }

    #[test]
    fn test_controller_drives_vehicle() {
        let mut entity = Entity::new("car");
        entity
            .add_component(VehicleSimulation::four_wheel(1.0, 0.0, 1.5, WheelConfig::default()))
            .unwrap();
        let mut input = InputState::new();
        input.press("KeyW");
        input.press("KeyA");
        let mut events = EventBus::new();

        let mut controller = VehicleController::default();
        let mut ctx = ScriptContext {
            entity: &mut entity,
            input: &input,
            events: &mut events,
        };
        controller.on_update(&mut ctx, 1.0 / 60.0);

        let vehicle = entity.component::<VehicleSimulation>().unwrap();
        assert_eq!(vehicle.wheel_state(3).unwrap().engine_force, 5000.0);
        assert_eq!(vehicle.wheel_state(3).unwrap().brake, 0.0);
        assert_relative_eq!(vehicle.steering_value(), 0.04);
    }

    #[test]
    fn test_payload_round_trip() {
        let mut vehicle = VehicleSimulation::four_wheel(0.9, -0.1, 1.4, WheelConfig::default().with_radius(0.4));
        vehicle.set_steering_value(0.1);
        let mut restored = VehicleSimulation::new();
        restored.load(&vehicle.save()).unwrap();
        assert_eq!(restored.wheel_count(), 4);
        assert_eq!(restored.wheel_config(1), vehicle.wheel_config(1));
        assert_eq!(restored.save(), vehicle.save());
    }
}
