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
//! Rigid-body physics and raycast vehicles
//!
//! [`PhysicsSystem`] is the bridge between the world and a
//! [`PhysicsBackend`], by default the rapier3d-backed [`RapierWorld`].
//! Entities opt in by carrying a [`PhysicsBody`]; a [`VehicleSimulation`]
//! on the same entity turns its body into a chassis.

pub mod backend;
pub mod body;
pub mod contacts;
pub mod rapier;
pub mod system;
pub mod vehicle;

pub use backend::{
    BodyDesc, BodyHandle, BodyKind, Contact, PhysicsBackend, Ray, RayFilter, RayHit, Shape, StepEvents,
    VehicleHandle, WheelContact, WheelControl,
};
pub use body::PhysicsBody;
pub use contacts::{CollisionNotice, ContactTracker};
pub use rapier::RapierWorld;
pub use system::{PhysicsSystem, RaycastHit};
pub use vehicle::{VehicleController, VehicleSimulation, WheelConfig, WheelState};
