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
//! Solver boundary
//!
//! The physics system depends on six solver capabilities:
//!
//! 1. rigid-body creation, removal and suspension
//! 2. a fixed-step integrator
//! 3. discrete contact begin/end events per step
//! 4. the persistent contact list of the current step
//! 5. closest-hit and all-hits ray casts
//! 6. raycast vehicles riding on a chassis body
//!
//! [`PhysicsBackend`] names them. [`RapierWorld`](super::RapierWorld) is the
//! default implementation; any other solver can be plugged in by
//! implementing the trait.

use crate::error::SolverError;
use crate::math::{DVec3, Pose};
use crate::physics::vehicle::WheelConfig;
use std::fmt;

/// Opaque rigid-body handle issued by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub(crate) u64);

impl BodyHandle {
    /// Raw handle value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// Collision shape in body-local space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Sphere centered on the body origin
    Sphere {
        /// Radius
        radius: f64,
    },
    /// Box centered on the body origin
    Box {
        /// Half size along each local axis
        half_extents: DVec3,
    },
    /// Cylinder along the local Y axis
    Cylinder {
        /// Radius
        radius: f64,
        /// Half of the height
        half_height: f64,
    },
}

impl Shape {
    /// Whether every dimension is positive and finite
    pub fn is_valid(&self) -> bool {
        let positive = |v: f64| v > 0.0 && v.is_finite();
        match *self {
            Shape::Sphere { radius } => positive(radius),
            Shape::Box { half_extents } => {
                positive(half_extents.x) && positive(half_extents.y) && positive(half_extents.z)
            }
            Shape::Cylinder { radius, half_height } => positive(radius) && positive(half_height),
        }
    }
}

/// How a body participates in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BodyKind {
    /// Moved by forces and contacts
    #[default]
    Dynamic,
    /// Never moves
    Static,
    /// Moved by its owner; pushes dynamic bodies but is not pushed back
    Kinematic,
}

/// Everything a backend needs to create a body
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    /// Collision shape
    pub shape: Shape,
    /// Participation mode
    pub kind: BodyKind,
    /// Mass in kilograms; ignored unless dynamic
    pub mass: f64,
    /// Initial world pose
    pub pose: Pose,
    /// Initial linear velocity
    pub linear_velocity: DVec3,
    /// Coulomb friction coefficient
    pub friction: f64,
    /// Bounciness in `[0, 1]`
    pub restitution: f64,
    /// Fraction of linear velocity lost per second
    pub linear_damping: f64,
    /// Fraction of angular velocity lost per second
    pub angular_damping: f64,
    /// Triggers report contacts but get no contact response
    pub trigger: bool,
    /// Collision group bits
    pub group: u32,
    /// Groups this body collides with
    pub mask: u32,
}

impl BodyDesc {
    /// Dynamic body with default material at the origin
    pub fn new(shape: Shape, kind: BodyKind) -> Self {
        BodyDesc {
            shape,
            kind,
            mass: 1.0,
            pose: Pose::IDENTITY,
            linear_velocity: DVec3::ZERO,
            friction: 0.3,
            restitution: 0.3,
            linear_damping: 0.01,
            angular_damping: 0.01,
            trigger: false,
            group: 1,
            mask: u32::MAX,
        }
    }
}

/// One contact between two bodies in the current step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// First body
    pub a: BodyHandle,
    /// Second body
    pub b: BodyHandle,
    /// Contact point in world space
    pub point: DVec3,
    /// Unit normal pointing from `a` towards `b`
    pub normal: DVec3,
    /// Penetration depth
    pub depth: f64,
}

/// Discrete contact events produced by one step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepEvents {
    /// Pairs touching now that were not touching before the step
    pub begun: Vec<(BodyHandle, BodyHandle)>,
    /// Pairs touching before the step that no longer touch
    pub ended: Vec<(BodyHandle, BodyHandle)>,
}

/// Ray segment from `from` to `to`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point
    pub from: DVec3,
    /// End point
    pub to: DVec3,
}

impl Ray {
    /// Segment between two points
    pub fn new(from: DVec3, to: DVec3) -> Self {
        Ray { from, to }
    }

    /// Unit direction and length, or an error for degenerate segments
    pub fn direction_and_length(&self) -> Result<(DVec3, f64), SolverError> {
        if !self.from.is_finite() || !self.to.is_finite() {
            return Err(SolverError::InvalidRay(format!(
                "non-finite endpoints {:?} -> {:?}",
                self.from, self.to
            )));
        }
        let delta = self.to - self.from;
        let length = delta.length();
        if length <= f64::EPSILON {
            return Err(SolverError::InvalidRay("zero-length ray".to_string()));
        }
        Ok((delta / length, length))
    }
}

/// Which bodies a ray may hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayFilter {
    /// Groups the ray collides with
    pub mask: u32,
    /// Ignore trigger bodies
    pub skip_triggers: bool,
    /// Ignore this body, typically the caster's own
    pub exclude: Option<BodyHandle>,
}

impl Default for RayFilter {
    fn default() -> Self {
        RayFilter {
            mask: u32::MAX,
            skip_triggers: false,
            exclude: None,
        }
    }
}

/// A ray intersection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Body that was hit
    pub body: BodyHandle,
    /// Hit point in world space
    pub point: DVec3,
    /// Surface normal at the hit point
    pub normal: DVec3,
    /// Distance from the ray start
    pub distance: f64,
}

/// Opaque raycast-vehicle handle issued by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleHandle(pub(crate) u64);

impl fmt::Display for VehicleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vehicle#{}", self.0)
    }
}

/// Driver inputs for one wheel during one step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelControl {
    /// Drive force along the wheel's rolling direction
    pub engine_force: f64,
    /// Brake force
    pub brake: f64,
    /// Steering angle in radians about the chassis up axis
    pub steering: f64,
}

/// Suspension ray result for one wheel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelContact {
    /// Whether the suspension ray found ground
    pub in_contact: bool,
    /// Body under the wheel
    pub ground: Option<BodyHandle>,
    /// Ground contact point in world space
    pub point: DVec3,
    /// Ground normal at the contact
    pub normal: DVec3,
    /// Current suspension length
    pub suspension_length: f64,
}

/// The solver capabilities the physics system relies on
pub trait PhysicsBackend: Send {
    /// Create a body and return its handle
    fn add_body(&mut self, desc: &BodyDesc) -> BodyHandle;

    /// Remove a body. Returns false for unknown handles.
    fn remove_body(&mut self, handle: BodyHandle) -> bool;

    /// Suspend or resume a body. Suspended bodies are neither integrated
    /// nor reported in contacts and ray casts.
    fn set_enabled(&mut self, handle: BodyHandle, enabled: bool) -> Result<(), SolverError>;

    /// Whether `handle` is a live body
    fn contains(&self, handle: BodyHandle) -> bool;

    /// Number of live bodies
    fn body_count(&self) -> usize;

    /// Global gravity
    fn gravity(&self) -> DVec3;

    /// Replace global gravity
    fn set_gravity(&mut self, gravity: DVec3);

    /// Mass of a body; zero for static and kinematic bodies
    fn mass(&self, handle: BodyHandle) -> Option<f64>;

    /// World pose of a body
    fn pose(&self, handle: BodyHandle) -> Option<Pose>;

    /// Teleport a body
    fn set_pose(&mut self, handle: BodyHandle, pose: Pose) -> Result<(), SolverError>;

    /// Linear velocity of a body
    fn linear_velocity(&self, handle: BodyHandle) -> Option<DVec3>;

    /// Replace a body's linear velocity
    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: DVec3) -> Result<(), SolverError>;

    /// Angular velocity of a body
    fn angular_velocity(&self, handle: BodyHandle) -> Option<DVec3>;

    /// Accumulate a force for the next step, at a world point or the center of mass
    fn apply_force(&mut self, handle: BodyHandle, force: DVec3, point: Option<DVec3>) -> Result<(), SolverError>;

    /// Apply an instantaneous impulse, at a world point or the center of mass
    fn apply_impulse(&mut self, handle: BodyHandle, impulse: DVec3, point: Option<DVec3>) -> Result<(), SolverError>;

    /// Advance the simulation by `dt` and report contact begin/end events
    fn step(&mut self, dt: f64) -> StepEvents;

    /// Contacts found by the last step
    fn contacts(&self) -> &[Contact];

    /// Closest hit along `ray`
    fn raycast_closest(&self, ray: &Ray, filter: &RayFilter) -> Result<Option<RayHit>, SolverError>;

    /// Every hit along `ray`, in no particular order
    fn raycast_all(&self, ray: &Ray, filter: &RayFilter) -> Result<Vec<RayHit>, SolverError>;

    /// Mount raycast wheels on a dynamic chassis body
    fn add_vehicle(&mut self, chassis: BodyHandle, wheels: &[WheelConfig]) -> Result<VehicleHandle, SolverError>;

    /// Dismount a vehicle. Returns false for unknown handles.
    fn remove_vehicle(&mut self, handle: VehicleHandle) -> bool;

    /// Cast every wheel's suspension ray and push the chassis for a step of
    /// `dt`. `controls` is indexed like the wheels given to
    /// [`add_vehicle`](Self::add_vehicle); missing entries mean no input.
    fn update_vehicle(
        &mut self,
        handle: VehicleHandle,
        controls: &[WheelControl],
        dt: f64,
    ) -> Result<Vec<WheelContact>, SolverError>;
}
