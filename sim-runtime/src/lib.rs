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
//! # sim-runtime
//!
//! Runtime core of a real-time simulation: an entity/component/system world
//! that owns game objects and drives their per-frame and fixed-step updates,
//! a rigid-body physics system with collision lifecycle notifications, and
//! raycast vehicle simulation on top of it.
//!
//! ## Features
//!
//! - **ECS world**: entities with keyed components and scripts, systems with
//!   live compatible subsets kept in sync on every capability change
//! - **Event bus**: priority-ordered publish/subscribe with replay history
//!   and delayed delivery
//! - **Physics**: rapier3d rigid bodies with fixed sub-stepping,
//!   enter/stay/exit collision callbacks, closest and all-hits raycasts
//! - **Vehicles**: rapier's raycast vehicle controller driving a chassis body
//! - **Snapshots**: JSON save and two-phase load of entities and worlds
//! - **Parallelization**: optional Rayon integration for per-step contact
//!   extraction
//!
//! ## Example
//!
//! ```rust
//! use sim_runtime::ecs::World;
//! use sim_runtime::physics::{PhysicsBody, PhysicsSystem, Shape};
//!
//! let mut world = World::new("demo");
//! world.add_system(PhysicsSystem::new()).unwrap();
//!
//! let ball = world.create_entity("ball");
//! world
//!     .entity_mut(ball)
//!     .unwrap()
//!     .add_component(PhysicsBody::dynamic(Shape::Sphere { radius: 0.5 }, 1.0))
//!     .unwrap();
//!
//! world.initialize();
//! world.update(1.0 / 60.0);
//! assert!(world.get_entity(ball).unwrap().transform().position.y < 0.0);
//! ```

#![warn(missing_docs)]

/// Engine, world, event bus and physics settings
pub mod config;

/// Error types
pub mod error;

/// Transforms and poses
pub mod math;

/// Publish/subscribe event bus
pub mod events;

/// Polled keyboard and mouse state
pub mod input;

/// Entity Component System implementation
pub mod ecs;

/// Rigid-body physics and vehicles
pub mod physics;

/// Entity and world snapshots
pub mod serialization;

pub use config::EngineConfig;
pub use ecs::{Component, Entity, EntityId, Script, System, World};
pub use events::EventBus;
pub use physics::{PhysicsBody, PhysicsSystem, VehicleController, VehicleSimulation};
pub use serialization::WorldSnapshot;
