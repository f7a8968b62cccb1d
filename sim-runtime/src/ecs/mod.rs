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
//! Entity Component System (ECS) core implementation
//!
//! This module provides the runtime's object model:
//! - Entities: named scene-graph nodes with a transform and tags
//! - Components and scripts: keyed capabilities with lifecycle hooks
//! - Systems: priority-ordered processors over a live entity subset
//! - World: the container that drives updates and keeps subsets in sync

mod capability;
mod component;
mod entity;
mod id;
mod registry;
mod scheduler;
mod script;
mod store;
mod system;
mod world;

pub use capability::{Capability, CapabilityObject};
pub use component::Component;
pub use entity::{CollisionPhase, Entity};
pub use id::{EntityId, EntityPair};
pub use registry::CapabilityRegistry;
pub use scheduler::Scheduler;
pub use script::{Script, ScriptContext};
pub use store::EntityStore;
pub use system::{System, SystemContext, SystemPriority};
pub use world::{EntityMut, World};
