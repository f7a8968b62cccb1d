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
//! Priority scheduler
//!
//! Holds a world's systems sorted by ascending priority, together with each
//! system's live entity subset and enabled flag. Systems with equal priority
//! keep their registration order, so execution order is deterministic.
//!
//! Membership is maintained incrementally: the world reports every entity
//! add/remove and every capability change, and the scheduler re-evaluates
//! each system's compatibility predicate for that one entity.

use crate::ecs::system::SystemContext;
use crate::ecs::{Entity, EntityId, EntityStore, System, SystemPriority};
use crate::error::WorldError;
use crate::events::EventBus;
use crate::input::InputState;
use std::collections::HashSet;

/// Which update a pass belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pass {
    Frame,
    Fixed,
}

/// A system with its scheduling state
struct ScheduledSystem {
    system: Box<dyn System>,
    priority: SystemPriority,
    members: Vec<EntityId>,
    member_set: HashSet<EntityId>,
    enabled: bool,
    initialized: bool,
}

impl ScheduledSystem {
    fn admit(&mut self, entity: &mut Entity) {
        if self.member_set.insert(entity.id()) {
            self.members.push(entity.id());
            log::debug!(
                target: "sim_runtime::world",
                "entity '{}' joined system '{}'",
                entity.name(),
                self.system.name()
            );
            self.system.on_entity_added(entity);
        }
    }

    fn evict(&mut self, entity: &mut Entity) {
        if self.member_set.remove(&entity.id()) {
            let id = entity.id();
            self.members.retain(|m| *m != id);
            log::debug!(
                target: "sim_runtime::world",
                "entity '{}' left system '{}'",
                entity.name(),
                self.system.name()
            );
            self.system.on_entity_removed(entity);
        }
    }

    fn sync(&mut self, entity: &mut Entity) {
        if self.system.check_entity_compatibility(entity) {
            self.admit(entity);
        } else {
            self.evict(entity);
        }
    }
}

/// Priority-ordered system list with live entity subsets
#[derive(Default)]
pub struct Scheduler {
    systems: Vec<ScheduledSystem>,
}

impl Scheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of registered systems
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// System names in execution order
    pub fn names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.system.name()).collect()
    }

    /// Insert a system at its priority position. Returns its index.
    pub(crate) fn add_system(&mut self, system: Box<dyn System>) -> Result<usize, WorldError> {
        if self.index_of(system.name()).is_some() {
            return Err(WorldError::DuplicateSystem(system.name().to_string()));
        }
        let priority = system.priority();
        let at = self
            .systems
            .iter()
            .position(|s| s.priority > priority)
            .unwrap_or(self.systems.len());
        self.systems.insert(
            at,
            ScheduledSystem {
                system,
                priority,
                members: Vec::new(),
                member_set: HashSet::new(),
                enabled: true,
                initialized: false,
            },
        );
        Ok(at)
    }

    /// Remove a system, evicting its members and running `on_destroy`
    pub(crate) fn remove_system(&mut self, name: &str, entities: &mut EntityStore) -> Option<Box<dyn System>> {
        let index = self.index_of(name)?;
        let mut scheduled = self.systems.remove(index);
        for id in scheduled.members.clone() {
            if let Some(entity) = entities.get_mut(id) {
                scheduled.evict(entity);
            }
        }
        scheduled.system.on_destroy();
        Some(scheduled.system)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.systems.iter().position(|s| s.system.name() == name)
    }

    /// First system of concrete type `S`
    pub fn get<S: System>(&self) -> Option<&S> {
        self.systems
            .iter()
            .find_map(|s| s.system.as_any().downcast_ref::<S>())
    }

    /// First system of concrete type `S`, mutably
    pub fn get_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems
            .iter_mut()
            .find_map(|s| s.system.as_any_mut().downcast_mut::<S>())
    }

    /// System by name
    pub fn by_name(&self, name: &str) -> Option<&dyn System> {
        self.systems
            .iter()
            .find(|s| s.system.name() == name)
            .map(|s| s.system.as_ref())
    }

    /// Live subset of the named system, in admission order
    pub fn members(&self, name: &str) -> Option<&[EntityId]> {
        self.systems
            .iter()
            .find(|s| s.system.name() == name)
            .map(|s| s.members.as_slice())
    }

    /// Whether `id` is in the named system's subset
    pub fn is_member(&self, name: &str, id: EntityId) -> bool {
        self.systems
            .iter()
            .any(|s| s.system.name() == name && s.member_set.contains(&id))
    }

    /// Whether the named system is enabled
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.index_of(name).map(|i| self.systems[i].enabled)
    }

    /// Enable or disable a system. Returns true if the state changed.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(index) = self.index_of(name) else {
            return false;
        };
        let scheduled = &mut self.systems[index];
        if scheduled.enabled == enabled {
            return false;
        }
        scheduled.enabled = enabled;
        if enabled {
            scheduled.system.on_enable();
        } else {
            scheduled.system.on_disable();
        }
        true
    }

    /// Flip a system's enabled flag, returning the new state
    pub fn toggle(&mut self, name: &str) -> Option<bool> {
        let enabled = self.is_enabled(name)?;
        self.set_enabled(name, !enabled);
        Some(!enabled)
    }

    /// Run `on_initialize` on the system at `index` unless it already ran
    pub(crate) fn initialize_system(
        &mut self,
        index: usize,
        entities: &mut EntityStore,
        input: &InputState,
        events: &mut EventBus,
    ) {
        let Some(scheduled) = self.systems.get_mut(index) else {
            return;
        };
        if scheduled.initialized {
            return;
        }
        scheduled.initialized = true;
        let mut ctx = SystemContext {
            entities,
            input,
            events,
        };
        scheduled.system.on_initialize(&mut ctx);
    }

    /// Evaluate every entity against the system at `index`
    pub(crate) fn backfill(&mut self, index: usize, entities: &mut EntityStore) {
        let Some(scheduled) = self.systems.get_mut(index) else {
            return;
        };
        for id in entities.ids().to_vec() {
            if let Some(entity) = entities.get_mut(id) {
                scheduled.sync(entity);
            }
        }
    }

    /// Re-check every system against a newly added entity
    pub(crate) fn add_entity(&mut self, entity: &mut Entity) {
        for scheduled in &mut self.systems {
            scheduled.sync(entity);
        }
    }

    /// Drop an entity from every subset it is in
    pub(crate) fn remove_entity(&mut self, entity: &mut Entity) {
        for scheduled in &mut self.systems {
            scheduled.evict(entity);
        }
    }

    /// A capability was attached to `entity`
    pub(crate) fn on_component_added(&mut self, entity: &mut Entity, key: &str) {
        log::trace!(target: "sim_runtime::world", "'{}' gained '{}'", entity.name(), key);
        for scheduled in &mut self.systems {
            scheduled.sync(entity);
        }
    }

    /// A capability was detached from `entity`
    pub(crate) fn on_component_removed(&mut self, entity: &mut Entity, key: &str) {
        log::trace!(target: "sim_runtime::world", "'{}' lost '{}'", entity.name(), key);
        for scheduled in &mut self.systems {
            scheduled.sync(entity);
        }
    }

    /// Run one pass of the system at `index`: before hook, every active
    /// member, after hook. Disabled systems are skipped.
    pub(crate) fn run(
        &mut self,
        index: usize,
        pass: Pass,
        entities: &mut EntityStore,
        input: &InputState,
        events: &mut EventBus,
        dt: f64,
    ) {
        let Some(scheduled) = self.systems.get_mut(index) else {
            return;
        };
        if !scheduled.enabled {
            return;
        }
        let members = scheduled.members.clone();
        let system = &mut scheduled.system;

        {
            let mut ctx = SystemContext {
                entities: &mut *entities,
                input,
                events: &mut *events,
            };
            match pass {
                Pass::Frame => system.before_update(&mut ctx, &members, dt),
                Pass::Fixed => system.before_fixed_update(&mut ctx, &members, dt),
            }
        }

        for id in &members {
            let Some(entity) = entities.get_mut(*id) else {
                continue;
            };
            if !entity.is_active() {
                continue;
            }
            match pass {
                Pass::Frame => system.process_entity(entity, dt),
                Pass::Fixed => system.process_entity_fixed(entity, dt),
            }
        }

        let mut ctx = SystemContext {
            entities,
            input,
            events,
        };
        match pass {
            Pass::Frame => system.after_update(&mut ctx, &members, dt),
            Pass::Fixed => system.after_fixed_update(&mut ctx, &members, dt),
        }
    }

    /// Dispatch `pre_render` (or `post_render`) to the listed components of
    /// every enabled system's members
    pub(crate) fn render_pass(&self, entities: &mut EntityStore, before: bool) {
        for scheduled in &self.systems {
            if !scheduled.enabled {
                continue;
            }
            let keys = scheduled.system.compatible_capabilities();
            if keys.is_empty() {
                continue;
            }
            for id in &scheduled.members {
                let Some(entity) = entities.get_mut(*id) else {
                    continue;
                };
                for &key in keys {
                    if before {
                        entity.pre_render_component(key);
                    } else {
                        entity.post_render_component(key);
                    }
                }
            }
        }
    }

    /// Run `on_destroy` on every system and drop them all
    pub(crate) fn clear(&mut self, entities: &mut EntityStore) {
        for mut scheduled in self.systems.drain(..) {
            for id in scheduled.members.clone() {
                if let Some(entity) = entities.get_mut(id) {
                    scheduled.evict(entity);
                }
            }
            scheduled.system.on_destroy();
        }
    }
}
