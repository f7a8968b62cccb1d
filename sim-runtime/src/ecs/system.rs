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
//! System trait
//!
//! A system processes the subset of entities it is compatible with. The
//! compatibility predicate is the only source of truth for membership; the
//! [`Scheduler`](crate::ecs::Scheduler) keeps the live subset in sync by
//! re-running it whenever an entity's capability set changes, and calls the
//! membership hooks exactly once per transition.
//!
//! Systems are run in ascending [`SystemPriority`] order.

use crate::ecs::{Entity, EntityId, EntityStore};
use crate::events::EventBus;
use crate::input::InputState;
use std::any::Any;

/// Execution priority; lower values run first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemPriority(pub i32);

impl SystemPriority {
    /// Runs before everything else
    pub const HIGHEST: SystemPriority = SystemPriority(0);
    /// Physics and other simulation producers
    pub const HIGH: SystemPriority = SystemPriority(1);
    /// Default
    pub const NORMAL: SystemPriority = SystemPriority(2);
    /// Consumers of simulation results
    pub const LOW: SystemPriority = SystemPriority(3);
    /// Runs after everything else
    pub const LOWEST: SystemPriority = SystemPriority(4);
}

impl Default for SystemPriority {
    fn default() -> Self {
        SystemPriority::NORMAL
    }
}

/// World state visible to a system outside per-entity processing
pub struct SystemContext<'a> {
    /// Every entity in the world
    pub entities: &'a mut EntityStore,
    /// Input snapshot for this frame
    pub input: &'a InputState,
    /// The world's event bus
    pub events: &'a mut EventBus,
}

/// Trait for systems that operate on a live subset of entities
///
/// Only [`name`](Self::name), [`check_entity_compatibility`](Self::check_entity_compatibility)
/// and the `as_any` pair are required.
pub trait System: Any + Send {
    /// Unique name within a world
    fn name(&self) -> &str;

    /// Execution priority
    fn priority(&self) -> SystemPriority {
        SystemPriority::NORMAL
    }

    /// Whether `entity` belongs in this system's subset right now
    fn check_entity_compatibility(&self, entity: &Entity) -> bool;

    /// Component keys that receive `pre_render`/`post_render` from this system
    fn compatible_capabilities(&self) -> &[&'static str] {
        &[]
    }

    /// Called once when the owning world initializes, or when the system is
    /// added to an already initialized world
    fn on_initialize(&mut self, _ctx: &mut SystemContext<'_>) {}

    /// Called when the system is removed or the world is destroyed
    fn on_destroy(&mut self) {}

    /// Called when the system is enabled after being disabled
    fn on_enable(&mut self) {}

    /// Called when the system is disabled
    fn on_disable(&mut self) {}

    /// `entity` just became a member
    fn on_entity_added(&mut self, _entity: &mut Entity) {}

    /// `entity` just stopped being a member
    fn on_entity_removed(&mut self, _entity: &mut Entity) {}

    /// Runs before per-entity processing of a frame update
    fn before_update(&mut self, _ctx: &mut SystemContext<'_>, _members: &[EntityId], _dt: f64) {}

    /// Per-frame processing of one active member
    fn process_entity(&mut self, _entity: &mut Entity, _dt: f64) {}

    /// Runs after per-entity processing of a frame update
    fn after_update(&mut self, _ctx: &mut SystemContext<'_>, _members: &[EntityId], _dt: f64) {}

    /// Runs before per-entity processing of a fixed step
    fn before_fixed_update(&mut self, _ctx: &mut SystemContext<'_>, _members: &[EntityId], _dt: f64) {}

    /// Fixed-step processing of one active member
    fn process_entity_fixed(&mut self, _entity: &mut Entity, _dt: f64) {}

    /// Runs after per-entity processing of a fixed step
    fn after_fixed_update(&mut self, _ctx: &mut SystemContext<'_>, _members: &[EntityId], _dt: f64) {}

    /// Upcast for typed lookup
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed lookup
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let mut priorities = vec![
            SystemPriority::LOWEST,
            SystemPriority::HIGH,
            SystemPriority(-5),
            SystemPriority::NORMAL,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                SystemPriority(-5),
                SystemPriority::HIGH,
                SystemPriority::NORMAL,
                SystemPriority::LOWEST
            ]
        );
        assert_eq!(SystemPriority::default(), SystemPriority::NORMAL);
    }
}
