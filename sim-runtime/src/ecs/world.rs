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
//! World container
//!
//! The world owns the entity registry, the priority-ordered systems, the
//! event bus and the input snapshot, and drives both update kinds:
//!
//! 1. every enabled system in ascending priority (before hook, each active
//!    member, after hook)
//! 2. every active root entity, recursing into children (own components,
//!    own scripts, then children)
//! 3. entities that asked to be destroyed during the pass are destroyed
//!
//! Capability changes made to an entity are reconciled with system subsets
//! before the world hands control back: after each system, after each
//! entity's own update, and when an [`EntityMut`] guard is dropped.
//!
//! # Tick source
//!
//! `initialize` subscribes the world to [`FRAME_TICK`](crate::events::names::FRAME_TICK)
//! and [`PRE_RENDER`](crate::events::names::PRE_RENDER). The subscription
//! only posts to a mailbox; [`World::process_ticks`] drains it on the
//! simulation thread.
//!
//! # Example
//!
//! ```
//! use sim_runtime::ecs::World;
//!
//! let mut world = World::new("Demo");
//! let player = world.create_entity("player");
//! world.initialize();
//! world.run_frame(1.0 / 60.0);
//! assert!(world.get_entity(player).is_some());
//! ```

use crate::config::EngineConfig;
use crate::ecs::entity::CapabilityChange;
use crate::ecs::scheduler::Pass;
use crate::ecs::{CapabilityRegistry, Entity, EntityId, EntityStore, Scheduler, System};
use crate::error::WorldError;
use crate::events::{names, EventBus, EventPriority, SubscriptionHandle, WorldEvent};
use crate::input::InputState;
use serde_json::Value;
use std::ops::{Deref, DerefMut};
use std::sync::mpsc::{self, Receiver, Sender};

/// Signals posted by the host through the event bus
#[derive(Debug, Clone, Copy, PartialEq)]
enum HostSignal {
    Frame(f64),
    PreRender,
}

/// Scene container driving systems and entities
pub struct World {
    name: String,
    entities: EntityStore,
    scheduler: Scheduler,
    events: EventBus,
    input: InputState,
    registry: CapabilityRegistry,
    active: bool,
    paused: bool,
    initialized: bool,
    mailbox: Receiver<HostSignal>,
    mailbox_sender: Sender<HostSignal>,
    subscriptions: Vec<SubscriptionHandle>,
}

impl World {
    /// Create an empty world with default event bus settings
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_bus(name.into(), EventBus::new())
    }

    /// Create an empty world from configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_bus(config.world.name.clone(), EventBus::with_config(&config.events))
    }

    fn with_bus(name: String, events: EventBus) -> Self {
        let (mailbox_sender, mailbox) = mpsc::channel();
        World {
            name,
            entities: EntityStore::new(),
            scheduler: Scheduler::new(),
            events,
            input: InputState::new(),
            registry: CapabilityRegistry::with_builtins(),
            active: true,
            paused: false,
            initialized: false,
            mailbox,
            mailbox_sender,
            subscriptions: Vec::new(),
        }
    }

    /// World name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the world
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Inactive worlds ignore updates
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Activate or deactivate
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Whether updates are suspended by [`pause`](Self::pause)
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether [`initialize`](Self::initialize) has run
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The world's event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The world's event bus, mutably
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Input snapshot
    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Input snapshot, mutably, for pointer state. Keys go through
    /// [`key_down`](Self::key_down) and [`key_up`](Self::key_up).
    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    /// Capability factories used when loading snapshots
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Capability factories, mutably
    pub fn registry_mut(&mut self) -> &mut CapabilityRegistry {
        &mut self.registry
    }

    /// Entity registry
    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// System list
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Number of registered entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Create and register an empty entity
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityId {
        let mut entity = Entity::new(name);
        // random ids are only retried on the unlikely collision
        while self.entities.contains(entity.id()) {
            entity = Entity::new(entity.name().to_string());
        }
        let id = entity.id();
        if let Err(err) = self.add_entity(entity) {
            log::warn!(target: "sim_runtime::world", "{}", err);
        }
        id
    }

    /// Register a detached entity
    ///
    /// Parent and child links carried by `entity` are dropped; use
    /// [`add_child`](Self::add_child) afterwards. Every system's
    /// compatibility is evaluated for the new entity before this returns.
    pub fn add_entity(&mut self, mut entity: Entity) -> Result<EntityId, WorldError> {
        let id = entity.id();
        if self.entities.contains(id) {
            let err = WorldError::DuplicateEntity(id);
            log::warn!(target: "sim_runtime::world", "{}", err);
            return Err(err);
        }
        entity.reset_links();
        self.entities.insert(entity)?;
        if let Some(entity) = self.entities.get_mut(id) {
            if self.initialized {
                entity.initialize();
            }
            entity.take_changes();
            self.scheduler.add_entity(entity);
            log::debug!(target: "sim_runtime::world", "entity '{}' ({}) added", entity.name(), id);
        }
        Ok(id)
    }

    /// Look up an entity
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Borrow an entity for mutation
    ///
    /// Capability changes made through the guard are reconciled with every
    /// system when the guard is dropped.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<EntityMut<'_>> {
        let entity = self.entities.get_mut(id)?;
        Some(EntityMut {
            entity,
            scheduler: &mut self.scheduler,
        })
    }

    /// Unregister an entity and hand it back detached
    ///
    /// The entity leaves every system first, then the registry. Its
    /// descendants are destroyed. Returns `None` for unknown ids.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        if !self.entities.contains(id) {
            log::debug!(target: "sim_runtime::world", "remove_entity: {} is not registered", id);
            return None;
        }
        self.entities.detach(id);
        let children = self
            .entities
            .get(id)
            .map(|e| e.children().to_vec())
            .unwrap_or_default();
        for child in children {
            self.destroy_entity(child);
        }
        if let Some(entity) = self.entities.get_mut(id) {
            self.scheduler.remove_entity(entity);
        }
        let mut entity = self.entities.remove(id)?;
        entity.reset_links();
        entity.mark_uninitialized();
        entity.take_changes();
        log::debug!(target: "sim_runtime::world", "entity '{}' ({}) removed", entity.name(), id);
        Some(entity)
    }

    /// Destroy an entity and its descendants
    ///
    /// Children are destroyed first. Each entity leaves every system, runs
    /// `on_destroy` on its capabilities, detaches from its parent and is
    /// dropped. Destroying an unknown or already destroyed id is a logged
    /// no-op returning false.
    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.get_mut(id) else {
            log::warn!(
                target: "sim_runtime::world",
                "destroy_entity: {} is unknown or already destroyed",
                id
            );
            return false;
        };
        if !entity.begin_destroy() {
            return false;
        }
        let children = entity.children().to_vec();
        for child in children {
            self.destroy_entity(child);
        }
        if let Some(entity) = self.entities.get_mut(id) {
            self.scheduler.remove_entity(entity);
            entity.destroy_capabilities();
        }
        self.entities.detach(id);
        if let Some(entity) = self.entities.remove(id) {
            log::debug!(target: "sim_runtime::world", "entity '{}' ({}) destroyed", entity.name(), id);
        }
        true
    }

    /// Attach `child` under `parent`, detaching it from any previous parent
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) -> Result<(), WorldError> {
        self.entities.attach(parent, child).map_err(|err| {
            log::warn!(target: "sim_runtime::world", "{}", err);
            err
        })
    }

    /// Detach `child` if its parent is `parent`
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> bool {
        if self.entities.get(child).and_then(Entity::parent) != Some(parent) {
            return false;
        }
        self.entities.detach(child)
    }

    /// Re-parent `child`, or make it a root when `parent` is `None`
    pub fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) -> Result<(), WorldError> {
        match parent {
            Some(parent) => self.add_child(parent, child),
            None => {
                if !self.entities.contains(child) {
                    return Err(WorldError::UnknownEntity(child));
                }
                self.entities.detach(child);
                Ok(())
            }
        }
    }

    /// Every entity named `name`, in insertion order
    pub fn find_entities_by_name(&self, name: &str) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|e| e.name() == name)
            .map(Entity::id)
            .collect()
    }

    /// Every entity tagged `tag`, in insertion order
    pub fn find_entities_by_tag(&self, tag: &str) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|e| e.has_tag(tag))
            .map(Entity::id)
            .collect()
    }

    /// First entity named `name` in `root`'s subtree, `root` included
    pub fn find_by_name(&self, root: EntityId, name: &str) -> Option<EntityId> {
        self.entities.find_by_name(root, name)
    }

    /// Every entity tagged `tag` in `root`'s subtree, `root` included
    pub fn find_by_tag(&self, root: EntityId, tag: &str) -> Vec<EntityId> {
        self.entities.find_by_tag(root, tag)
    }

    /// Register a copy of `id`, and of its subtree when `recursive`
    pub fn clone_entity(&mut self, id: EntityId, recursive: bool) -> Option<EntityId> {
        let source = self.entities.get(id)?;
        let copy = source.clone_entity();
        let children = if recursive {
            source.children().to_vec()
        } else {
            Vec::new()
        };
        let copy_id = self.add_entity(copy).ok()?;
        for child in children {
            if let Some(child_copy) = self.clone_entity(child, true) {
                let _ = self.add_child(copy_id, child_copy);
            }
        }
        Some(copy_id)
    }

    fn flush_changes(&mut self) {
        for id in self.entities.ids().to_vec() {
            if let Some(entity) = self.entities.get_mut(id) {
                if entity.has_changes() {
                    reconcile(entity, &mut self.scheduler);
                }
            }
        }
    }

    fn sweep_destroyed(&mut self) {
        let doomed: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|e| e.is_destroy_requested())
            .map(Entity::id)
            .collect();
        for id in doomed {
            if self.entities.contains(id) {
                self.destroy_entity(id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Systems
    // ------------------------------------------------------------------

    /// Register a system at its priority position
    ///
    /// Existing entities are evaluated against it immediately. If the world
    /// is already initialized the system is initialized first.
    pub fn add_system<S: System>(&mut self, system: S) -> Result<(), WorldError> {
        self.add_boxed_system(Box::new(system))
    }

    /// Register a boxed system
    pub fn add_boxed_system(&mut self, system: Box<dyn System>) -> Result<(), WorldError> {
        let name = system.name().to_string();
        let index = self.scheduler.add_system(system).map_err(|err| {
            log::warn!(target: "sim_runtime::world", "{}", err);
            err
        })?;
        if self.initialized {
            self.scheduler
                .initialize_system(index, &mut self.entities, &self.input, &mut self.events);
        }
        self.scheduler.backfill(index, &mut self.entities);
        self.flush_changes();
        log::debug!(target: "sim_runtime::world", "system '{}' added", name);
        Ok(())
    }

    /// Unregister a system by name, evicting its members
    pub fn remove_system(&mut self, name: &str) -> Option<Box<dyn System>> {
        let removed = self.scheduler.remove_system(name, &mut self.entities);
        if removed.is_some() {
            log::debug!(target: "sim_runtime::world", "system '{}' removed", name);
        }
        removed
    }

    /// First system of type `S`
    pub fn system<S: System>(&self) -> Option<&S> {
        self.scheduler.get::<S>()
    }

    /// First system of type `S`, mutably
    pub fn system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.scheduler.get_mut::<S>()
    }

    /// System of type `S` together with a read-only view of the registry
    ///
    /// Entities are mutated through [`entity_mut`](Self::entity_mut), whose
    /// guard keeps system membership current.
    pub fn system_with_entities<S: System>(&mut self) -> Option<(&mut S, &EntityStore)> {
        let system = self.scheduler.get_mut::<S>()?;
        Some((system, &self.entities))
    }

    /// Enable or disable a system by name
    pub fn set_system_enabled(&mut self, name: &str, enabled: bool) -> bool {
        self.scheduler.set_enabled(name, enabled)
    }

    /// Flip a system's enabled flag, returning the new state
    pub fn toggle_system(&mut self, name: &str) -> Option<bool> {
        self.scheduler.toggle(name)
    }

    /// Live subset of the named system
    pub fn system_members(&self, name: &str) -> Option<&[EntityId]> {
        self.scheduler.members(name)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// One-shot initialization
    ///
    /// Initializes systems in priority order, then entities top-down, then
    /// subscribes to the host's tick events. A second call is a no-op.
    pub fn initialize(&mut self) {
        if self.initialized {
            log::debug!(target: "sim_runtime::world", "world '{}' already initialized", self.name);
            return;
        }
        self.initialized = true;

        for index in 0..self.scheduler.system_count() {
            self.scheduler
                .initialize_system(index, &mut self.entities, &self.input, &mut self.events);
        }
        self.flush_changes();
        for root in self.entities.roots() {
            self.initialize_subtree(root);
        }

        // stale frames are not replayed into a fresh world
        self.events.clear_history(Some(names::FRAME_TICK));
        self.events.clear_history(Some(names::PRE_RENDER));
        let frames = self.mailbox_sender.clone();
        self.subscriptions.push(self.events.subscribe(
            names::FRAME_TICK,
            EventPriority::Normal,
            move |dt: &f64| {
                let _ = frames.send(HostSignal::Frame(*dt));
            },
        ));
        let renders = self.mailbox_sender.clone();
        self.subscriptions.push(self.events.subscribe(
            names::PRE_RENDER,
            EventPriority::Normal,
            move |_: &f64| {
                let _ = renders.send(HostSignal::PreRender);
            },
        ));

        log::info!(target: "sim_runtime::world", "world '{}' initialized", self.name);
        self.events.publish(
            names::WORLD_INITIALIZED,
            WorldEvent {
                world: self.name.clone(),
            },
        );
    }

    fn initialize_subtree(&mut self, id: EntityId) {
        let children = match self.entities.get_mut(id) {
            Some(entity) => {
                entity.initialize();
                reconcile(entity, &mut self.scheduler);
                entity.children().to_vec()
            }
            None => return,
        };
        for child in children {
            self.initialize_subtree(child);
        }
    }

    /// Drain host signals posted through the event bus, running one
    /// [`update`](Self::update) per frame tick. Returns the number of frames.
    pub fn process_ticks(&mut self) -> usize {
        let signals: Vec<HostSignal> = self.mailbox.try_iter().collect();
        let mut frames = 0;
        for signal in signals {
            match signal {
                HostSignal::Frame(dt) => {
                    self.update(dt);
                    frames += 1;
                }
                HostSignal::PreRender => self.pre_render(),
            }
        }
        frames
    }

    /// Publish a frame tick on the bus and process it
    pub fn run_frame(&mut self, dt: f64) {
        self.events.publish(names::FRAME_TICK, dt);
        self.process_ticks();
    }

    /// Per-frame update. No-op while paused or inactive.
    pub fn update(&mut self, dt: f64) {
        if !self.active || self.paused {
            return;
        }
        self.run_pass(Pass::Frame, dt);
    }

    /// Fixed-step update. No-op while paused or inactive.
    pub fn fixed_update(&mut self, dt: f64) {
        if !self.active || self.paused {
            return;
        }
        self.run_pass(Pass::Fixed, dt);
    }

    fn run_pass(&mut self, pass: Pass, dt: f64) {
        for index in 0..self.scheduler.system_count() {
            self.scheduler
                .run(index, pass, &mut self.entities, &self.input, &mut self.events, dt);
            self.flush_changes();
        }
        for root in self.entities.roots() {
            self.update_subtree(root, pass, dt);
        }
        self.sweep_destroyed();
    }

    fn update_subtree(&mut self, id: EntityId, pass: Pass, dt: f64) {
        let children = {
            let Some(entity) = self.entities.get_mut(id) else {
                return;
            };
            if !entity.is_active() {
                return;
            }
            match pass {
                Pass::Frame => entity.update(&self.input, &mut self.events, dt),
                Pass::Fixed => entity.fixed_update(&self.input, &mut self.events, dt),
            }
            reconcile(entity, &mut self.scheduler);
            entity.children().to_vec()
        };
        for child in children {
            self.update_subtree(child, pass, dt);
        }
    }

    /// Dispatch `pre_render` through every system's listed capabilities
    pub fn pre_render(&mut self) {
        if !self.active {
            return;
        }
        self.scheduler.render_pass(&mut self.entities, true);
        self.flush_changes();
    }

    /// Dispatch `post_render` through every system's listed capabilities
    pub fn post_render(&mut self) {
        if !self.active {
            return;
        }
        self.scheduler.render_pass(&mut self.entities, false);
        self.flush_changes();
    }

    /// Suspend updates and publish `world.pause`
    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        log::info!(target: "sim_runtime::world", "world '{}' paused", self.name);
        self.events.publish(
            names::WORLD_PAUSE,
            WorldEvent {
                world: self.name.clone(),
            },
        );
    }

    /// Resume updates and publish `world.resume`
    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        log::info!(target: "sim_runtime::world", "world '{}' resumed", self.name);
        self.events.publish(
            names::WORLD_RESUME,
            WorldEvent {
                world: self.name.clone(),
            },
        );
    }

    /// Tear down entities, then systems, and drop the tick subscriptions.
    /// The world is left uninitialized and may be initialized again.
    pub fn destroy(&mut self) {
        log::info!(target: "sim_runtime::world", "destroying world '{}'", self.name);
        for root in self.entities.roots() {
            self.destroy_entity(root);
        }
        self.scheduler.clear(&mut self.entities);
        for handle in self.subscriptions.drain(..) {
            self.events.unsubscribe(&handle);
        }
        while self.mailbox.try_recv().is_ok() {}
        self.initialized = false;
        self.paused = false;
        log::info!(target: "sim_runtime::world", "world '{}' destroyed", self.name);
    }

    // ------------------------------------------------------------------
    // Input and broadcast
    // ------------------------------------------------------------------

    /// Record a key press, publish `onKeyDown` and notify scripts.
    /// Auto-repeat of a held key is ignored.
    pub fn key_down(&mut self, key: &str) {
        if !self.input.press(key) {
            return;
        }
        self.events.publish(names::KEY_DOWN, key.to_string());
        self.each_active_entity(|entity, input, events| entity.dispatch_key(key, true, input, events));
    }

    /// Record a key release, publish `onKeyUp` and notify scripts
    pub fn key_up(&mut self, key: &str) {
        if !self.input.release(key) {
            return;
        }
        self.events.publish(names::KEY_UP, key.to_string());
        self.each_active_entity(|entity, input, events| entity.dispatch_key(key, false, input, events));
    }

    /// Deliver `payload` to `on_event` of every script of every active entity
    pub fn broadcast_event(&mut self, event: &str, payload: &Value) {
        self.each_active_entity(|entity, input, events| entity.dispatch_event(event, payload, input, events));
    }

    fn each_active_entity(&mut self, mut visit: impl FnMut(&mut Entity, &InputState, &mut EventBus)) {
        if !self.active || self.paused {
            return;
        }
        for id in self.entities.ids().to_vec() {
            if let Some(entity) = self.entities.get_mut(id) {
                if entity.is_active() {
                    visit(entity, &self.input, &mut self.events);
                    reconcile(entity, &mut self.scheduler);
                }
            }
        }
        self.sweep_destroyed();
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new("World")
    }
}

/// Report an entity's pending capability changes to the scheduler
fn reconcile(entity: &mut Entity, scheduler: &mut Scheduler) {
    for change in entity.take_changes() {
        match change {
            CapabilityChange::Added(key) => scheduler.on_component_added(entity, key),
            CapabilityChange::Removed(key) => scheduler.on_component_removed(entity, key),
        }
    }
}

/// Mutable access to a registered entity
///
/// Dereferences to [`Entity`]. When dropped, every capability added or
/// removed through it is reconciled with the world's systems, so membership
/// is correct as soon as the guard goes out of scope.
pub struct EntityMut<'w> {
    entity: &'w mut Entity,
    scheduler: &'w mut Scheduler,
}

impl Deref for EntityMut<'_> {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        self.entity
    }
}

impl DerefMut for EntityMut<'_> {
    fn deref_mut(&mut self) -> &mut Entity {
        self.entity
    }
}

impl Drop for EntityMut<'_> {
    fn drop(&mut self) {
        reconcile(self.entity, self.scheduler);
    }
}
