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
//! Entity management
//!
//! An entity is a named scene-graph node holding a transform, a tag set and
//! at most one component and one script per capability key. Parent and
//! child links are ids into the owning world's registry; hierarchy edits go
//! through [`World`](crate::ecs::World) so both ends stay consistent.
//!
//! Capability changes are recorded on the entity and reconciled with the
//! world's systems when the entity is handed back to the world.

use crate::ecs::capability::Slots;
use crate::ecs::script::{Script, ScriptContext};
use crate::ecs::{Capability, Component, EntityId};
use crate::error::EntityError;
use crate::events::EventBus;
use crate::input::InputState;
use crate::math::Transform;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;

/// Capability set change awaiting reconciliation with systems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CapabilityChange {
    Added(&'static str),
    Removed(&'static str),
}

/// Collision lifecycle phase delivered to scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionPhase {
    /// First step with contact
    Enter,
    /// Subsequent step with contact
    Stay,
    /// First step without contact
    Exit,
}

/// A game object
pub struct Entity {
    id: EntityId,
    name: String,
    active: bool,
    tags: BTreeSet<String>,
    transform: Transform,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    components: Slots<dyn Component>,
    scripts: Slots<dyn Script>,
    world_ready: bool,
    destroy_requested: bool,
    destroying: bool,
    changes: Vec<CapabilityChange>,
}

impl Entity {
    /// Create a detached entity with a fresh random id
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(EntityId::random(), name)
    }

    /// Create a detached entity with a given id
    pub fn with_id(id: EntityId, name: impl Into<String>) -> Self {
        Entity {
            id,
            name: name.into(),
            active: true,
            tags: BTreeSet::new(),
            transform: Transform::default(),
            parent: None,
            children: Vec::new(),
            components: Slots::new(),
            scripts: Slots::new(),
            world_ready: false,
            destroy_requested: false,
            destroying: false,
            changes: Vec::new(),
        }
    }

    /// Unique id
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Human-readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Inactive entities skip their own updates and their children's
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Activate or deactivate
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Tags in sorted order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Add a tag. Returns false if it was already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        self.tags.insert(tag.into())
    }

    /// Remove a tag. Returns false if it was not present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    /// Whether the entity carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Local transform
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Mutable local transform
    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    /// Parent id, if attached under another entity
    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Child ids in attachment order
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Whether the owning world has been initialized and `on_init` has run
    pub fn is_initialized(&self) -> bool {
        self.world_ready
    }

    /// Ask the owning world to destroy this entity after the current update
    pub fn destroy(&mut self) {
        self.destroy_requested = true;
    }

    /// Whether [`destroy`](Self::destroy) was requested
    pub fn is_destroy_requested(&self) -> bool {
        self.destroy_requested
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Attach a component
    ///
    /// If a component of the same type is already attached, nothing changes
    /// and the existing instance is returned. A different type registered
    /// under the same key is a configuration error and is rejected.
    pub fn add_component<C: Component + Capability>(&mut self, component: C) -> Result<&mut C, EntityError> {
        let conflict = EntityError::CapabilityConflict {
            entity: self.name.clone(),
            key: C::KEY,
        };
        if self.components.contains(C::KEY) {
            if self.components.get_typed::<C>().is_some() {
                log::debug!(
                    target: "sim_runtime::entity",
                    "entity '{}' already has component '{}', keeping existing",
                    self.name,
                    C::KEY
                );
                return self.components.get_typed_mut::<C>().ok_or(conflict);
            }
            log::warn!(target: "sim_runtime::entity", "{}", conflict);
            return Err(conflict);
        }

        self.attach_component(Box::new(component), true);
        self.components
            .get_typed_mut::<C>()
            .ok_or(EntityError::CapabilityDetached {
                entity: self.name.clone(),
                key: C::KEY,
            })
    }

    /// Attach a boxed component, as produced by a factory or a clone
    pub fn add_boxed_component(&mut self, component: Box<dyn Component>) -> Result<(), EntityError> {
        let key = component.type_key();
        if let Some(existing) = self.components.get(key) {
            if Any::type_id(existing.as_any()) == Any::type_id(component.as_any()) {
                return Ok(());
            }
            let conflict = EntityError::CapabilityConflict {
                entity: self.name.clone(),
                key,
            };
            log::warn!(target: "sim_runtime::entity", "{}", conflict);
            return Err(conflict);
        }
        if self.components.contains(key) {
            return Err(EntityError::CapabilityConflict {
                entity: self.name.clone(),
                key,
            });
        }
        self.attach_component(component, true);
        Ok(())
    }

    fn attach_component(&mut self, component: Box<dyn Component>, enabled: bool) {
        let key = component.type_key();
        self.components.push(component, enabled);
        self.with_component(key, |c, e| c.on_add(e));
        if self.world_ready {
            self.init_component(key);
        }
        self.changes.push(CapabilityChange::Added(key));
    }

    /// Component of type `C`
    pub fn component<C: Component + Capability>(&self) -> Option<&C> {
        self.components.get_typed::<C>()
    }

    /// Mutable component of type `C`
    pub fn component_mut<C: Component + Capability>(&mut self) -> Option<&mut C> {
        self.components.get_typed_mut::<C>()
    }

    /// Component under `key`, whatever its concrete type
    pub fn component_dyn(&self, key: &str) -> Option<&dyn Component> {
        self.components.get(key)
    }

    pub(crate) fn component_dyn_mut(&mut self, key: &str) -> Option<&mut (dyn Component + 'static)> {
        self.components.get_mut(key)
    }

    /// Whether a component is stored under `C`'s key
    pub fn has_component<C: Capability>(&self) -> bool {
        self.components.contains(C::KEY)
    }

    /// Whether a component is stored under `key`
    pub fn has_component_key(&self, key: &str) -> bool {
        self.components.contains(key)
    }

    /// Keys of attached components in attachment order
    pub fn component_keys(&self) -> Vec<&'static str> {
        self.components.keys()
    }

    /// Detach the component stored under `C`'s key
    pub fn remove_component<C: Capability>(&mut self) -> bool {
        self.remove_component_key(C::KEY)
    }

    /// Detach the component stored under `key`, calling its `on_remove`
    pub fn remove_component_key(&mut self, key: &str) -> bool {
        let Some((key, value)) = self.components.remove(key) else {
            return false;
        };
        self.changes.push(CapabilityChange::Removed(key));
        if let Some(mut component) = value {
            component.on_remove(self);
        }
        true
    }

    /// Whether the component under `C`'s key is enabled
    pub fn is_component_enabled<C: Capability>(&self) -> bool {
        self.component_enabled(C::KEY)
    }

    /// Enable the component under `C`'s key. Returns true if the state changed.
    pub fn enable_component<C: Capability>(&mut self) -> bool {
        self.set_component_enabled(C::KEY, true)
    }

    /// Disable the component under `C`'s key. Returns true if the state changed.
    pub fn disable_component<C: Capability>(&mut self) -> bool {
        self.set_component_enabled(C::KEY, false)
    }

    /// Flip the component under `C`'s key, returning the new state
    pub fn toggle_component<C: Capability>(&mut self) -> Option<bool> {
        let enabled = self.components.slot(C::KEY)?.enabled;
        self.set_component_enabled(C::KEY, !enabled);
        Some(!enabled)
    }

    /// Set the enabled flag of the component under `key`, running
    /// `on_enable`/`on_disable` on a change
    pub fn set_component_enabled(&mut self, key: &str, enabled: bool) -> bool {
        let Some(slot) = self.components.slot_mut(key) else {
            return false;
        };
        if slot.enabled == enabled {
            return false;
        }
        slot.enabled = enabled;
        let key = slot.key;
        if enabled {
            self.with_component(key, |c, e| c.on_enable(e));
        } else {
            self.with_component(key, |c, e| c.on_disable(e));
        }
        true
    }

    pub(crate) fn component_enabled(&self, key: &str) -> bool {
        self.components.slot(key).map_or(false, |slot| slot.enabled)
    }

    /// Run `hook` on the component under `key` with the component detached
    fn with_component<R>(
        &mut self,
        key: &'static str,
        hook: impl FnOnce(&mut dyn Component, &mut Entity) -> R,
    ) -> Option<R> {
        let mut value = self.components.take(key)?;
        let result = hook(&mut *value, self);
        if let Some(mut orphan) = self.components.restore(key, value) {
            orphan.on_remove(self);
        }
        Some(result)
    }

    fn init_component(&mut self, key: &'static str) {
        match self.components.slot_mut(key) {
            Some(slot) if !slot.initialized => slot.initialized = true,
            _ => return,
        }
        self.with_component(key, |c, e| c.on_init(e));
    }

    // ------------------------------------------------------------------
    // Scripts
    // ------------------------------------------------------------------

    /// Attach a script, with the same duplicate rules as
    /// [`add_component`](Self::add_component)
    pub fn add_script<S: Script + Capability>(&mut self, script: S) -> Result<&mut S, EntityError> {
        let conflict = EntityError::CapabilityConflict {
            entity: self.name.clone(),
            key: S::KEY,
        };
        if self.scripts.contains(S::KEY) {
            if self.scripts.get_typed::<S>().is_some() {
                log::debug!(
                    target: "sim_runtime::entity",
                    "entity '{}' already has script '{}', keeping existing",
                    self.name,
                    S::KEY
                );
                return self.scripts.get_typed_mut::<S>().ok_or(conflict);
            }
            log::warn!(target: "sim_runtime::entity", "{}", conflict);
            return Err(conflict);
        }

        self.attach_script(Box::new(script), true);
        self.scripts
            .get_typed_mut::<S>()
            .ok_or(EntityError::CapabilityDetached {
                entity: self.name.clone(),
                key: S::KEY,
            })
    }

    /// Attach a boxed script
    pub fn add_boxed_script(&mut self, script: Box<dyn Script>) -> Result<(), EntityError> {
        let key = script.type_key();
        if let Some(existing) = self.scripts.get(key) {
            if Any::type_id(existing.as_any()) == Any::type_id(script.as_any()) {
                return Ok(());
            }
            let conflict = EntityError::CapabilityConflict {
                entity: self.name.clone(),
                key,
            };
            log::warn!(target: "sim_runtime::entity", "{}", conflict);
            return Err(conflict);
        }
        if self.scripts.contains(key) {
            return Err(EntityError::CapabilityConflict {
                entity: self.name.clone(),
                key,
            });
        }
        self.attach_script(script, true);
        Ok(())
    }

    fn attach_script(&mut self, script: Box<dyn Script>, enabled: bool) {
        let key = script.type_key();
        self.scripts.push(script, enabled);
        self.with_script(key, |s, e| s.on_add(e));
        if self.world_ready {
            self.init_script(key);
        }
        self.changes.push(CapabilityChange::Added(key));
    }

    /// Script of type `S`
    pub fn script<S: Script + Capability>(&self) -> Option<&S> {
        self.scripts.get_typed::<S>()
    }

    /// Mutable script of type `S`
    pub fn script_mut<S: Script + Capability>(&mut self) -> Option<&mut S> {
        self.scripts.get_typed_mut::<S>()
    }

    /// Script under `key`, whatever its concrete type
    pub fn script_dyn(&self, key: &str) -> Option<&dyn Script> {
        self.scripts.get(key)
    }

    pub(crate) fn script_dyn_mut(&mut self, key: &str) -> Option<&mut (dyn Script + 'static)> {
        self.scripts.get_mut(key)
    }

    /// Whether a script is stored under `S`'s key
    pub fn has_script<S: Capability>(&self) -> bool {
        self.scripts.contains(S::KEY)
    }

    /// Keys of attached scripts in attachment order
    pub fn script_keys(&self) -> Vec<&'static str> {
        self.scripts.keys()
    }

    /// Detach the script stored under `S`'s key
    pub fn remove_script<S: Capability>(&mut self) -> bool {
        self.remove_script_key(S::KEY)
    }

    /// Detach the script stored under `key`, calling its `on_remove`
    pub fn remove_script_key(&mut self, key: &str) -> bool {
        let Some((key, value)) = self.scripts.remove(key) else {
            return false;
        };
        self.changes.push(CapabilityChange::Removed(key));
        if let Some(mut script) = value {
            script.on_remove(self);
        }
        true
    }

    /// Whether the script under `S`'s key is enabled
    pub fn is_script_enabled<S: Capability>(&self) -> bool {
        self.script_enabled(S::KEY)
    }

    /// Enable the script under `S`'s key
    pub fn enable_script<S: Capability>(&mut self) -> bool {
        self.set_script_enabled(S::KEY, true)
    }

    /// Disable the script under `S`'s key
    pub fn disable_script<S: Capability>(&mut self) -> bool {
        self.set_script_enabled(S::KEY, false)
    }

    /// Flip the script under `S`'s key, returning the new state
    pub fn toggle_script<S: Capability>(&mut self) -> Option<bool> {
        let enabled = self.scripts.slot(S::KEY)?.enabled;
        self.set_script_enabled(S::KEY, !enabled);
        Some(!enabled)
    }

    /// Set the enabled flag of the script under `key`
    pub fn set_script_enabled(&mut self, key: &str, enabled: bool) -> bool {
        let Some(slot) = self.scripts.slot_mut(key) else {
            return false;
        };
        if slot.enabled == enabled {
            return false;
        }
        slot.enabled = enabled;
        let key = slot.key;
        if enabled {
            self.with_script(key, |s, e| s.on_enable(e));
        } else {
            self.with_script(key, |s, e| s.on_disable(e));
        }
        true
    }

    pub(crate) fn script_enabled(&self, key: &str) -> bool {
        self.scripts.slot(key).map_or(false, |slot| slot.enabled)
    }

    fn with_script<R>(
        &mut self,
        key: &'static str,
        hook: impl FnOnce(&mut dyn Script, &mut Entity) -> R,
    ) -> Option<R> {
        let mut value = self.scripts.take(key)?;
        let result = hook(&mut *value, self);
        if let Some(mut orphan) = self.scripts.restore(key, value) {
            orphan.on_remove(self);
        }
        Some(result)
    }

    fn init_script(&mut self, key: &'static str) {
        match self.scripts.slot_mut(key) {
            Some(slot) if !slot.initialized => slot.initialized = true,
            _ => return,
        }
        self.with_script(key, |s, e| s.on_init(e));
    }

    /// Run `hook` on every enabled script, each with a fresh context
    fn each_script(
        &mut self,
        input: &InputState,
        events: &mut EventBus,
        mut hook: impl FnMut(&mut dyn Script, &mut ScriptContext<'_>),
    ) {
        for key in self.scripts.keys() {
            if !self.script_enabled(key) {
                continue;
            }
            self.with_script(key, |script, entity| {
                let mut ctx = ScriptContext {
                    entity,
                    input,
                    events: &mut *events,
                };
                hook(script, &mut ctx);
            });
        }
    }

    // ------------------------------------------------------------------
    // Dispatch, driven by the world
    // ------------------------------------------------------------------

    /// Run `on_init` on every capability that has not seen it yet
    pub(crate) fn initialize(&mut self) {
        self.world_ready = true;
        for key in self.components.keys() {
            self.init_component(key);
        }
        for key in self.scripts.keys() {
            self.init_script(key);
        }
    }

    pub(crate) fn mark_uninitialized(&mut self) {
        self.world_ready = false;
    }

    /// Own components, then own scripts. Children are driven by the world.
    pub(crate) fn update(&mut self, input: &InputState, events: &mut EventBus, dt: f64) {
        if !self.active {
            return;
        }
        for key in self.components.keys() {
            if self.component_enabled(key) {
                self.with_component(key, |c, e| c.update(e, dt));
            }
        }
        self.each_script(input, events, |s, ctx| s.on_update(ctx, dt));
    }

    pub(crate) fn fixed_update(&mut self, input: &InputState, events: &mut EventBus, dt: f64) {
        if !self.active {
            return;
        }
        for key in self.components.keys() {
            if self.component_enabled(key) {
                self.with_component(key, |c, e| c.fixed_update(e, dt));
            }
        }
        self.each_script(input, events, |s, ctx| s.on_fixed_update(ctx, dt));
    }

    pub(crate) fn pre_render_component(&mut self, key: &'static str) {
        if self.component_enabled(key) {
            self.with_component(key, |c, e| c.pre_render(e));
        }
    }

    pub(crate) fn post_render_component(&mut self, key: &'static str) {
        if self.component_enabled(key) {
            self.with_component(key, |c, e| c.post_render(e));
        }
    }

    /// Deliver a collision notification to every enabled script
    pub fn dispatch_collision(
        &mut self,
        phase: CollisionPhase,
        other: EntityId,
        input: &InputState,
        events: &mut EventBus,
    ) {
        self.each_script(input, events, |s, ctx| match phase {
            CollisionPhase::Enter => s.on_collision_enter(ctx, other),
            CollisionPhase::Stay => s.on_collision_stay(ctx, other),
            CollisionPhase::Exit => s.on_collision_exit(ctx, other),
        });
    }

    pub(crate) fn dispatch_key(&mut self, key: &str, down: bool, input: &InputState, events: &mut EventBus) {
        self.each_script(input, events, |s, ctx| {
            if down {
                s.on_key_down(ctx, key)
            } else {
                s.on_key_up(ctx, key)
            }
        });
    }

    pub(crate) fn dispatch_event(&mut self, event: &str, payload: &Value, input: &InputState, events: &mut EventBus) {
        self.each_script(input, events, |s, ctx| s.on_event(ctx, event, payload));
    }

    /// Begin destruction. Returns false if it is already under way.
    pub(crate) fn begin_destroy(&mut self) -> bool {
        if self.destroying {
            return false;
        }
        self.destroying = true;
        true
    }

    /// Run `on_destroy` on every capability and release them
    pub(crate) fn destroy_capabilities(&mut self) {
        for key in self.components.keys() {
            self.with_component(key, |c, e| c.on_destroy(e));
        }
        for key in self.scripts.keys() {
            self.with_script(key, |s, e| s.on_destroy(e));
        }
        self.components.drain();
        self.scripts.drain();
        self.changes.clear();
    }

    pub(crate) fn take_changes(&mut self) -> Vec<CapabilityChange> {
        std::mem::take(&mut self.changes)
    }

    pub(crate) fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub(crate) fn set_parent_link(&mut self, parent: Option<EntityId>) {
        self.parent = parent;
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<EntityId> {
        &mut self.children
    }

    pub(crate) fn reset_links(&mut self) {
        self.parent = None;
        self.children.clear();
    }

    /// Attach a boxed capability with an explicit enabled flag, as read from
    /// a snapshot
    pub(crate) fn restore_component(&mut self, component: Box<dyn Component>, enabled: bool) -> Result<(), EntityError> {
        let key = component.type_key();
        if self.components.contains(key) {
            return Err(EntityError::CapabilityConflict {
                entity: self.name.clone(),
                key,
            });
        }
        self.attach_component(component, enabled);
        Ok(())
    }

    pub(crate) fn restore_script(&mut self, script: Box<dyn Script>, enabled: bool) -> Result<(), EntityError> {
        let key = script.type_key();
        if self.scripts.contains(key) {
            return Err(EntityError::CapabilityConflict {
                entity: self.name.clone(),
                key,
            });
        }
        self.attach_script(script, enabled);
        Ok(())
    }

    /// Copy tags, transform and every cloneable capability into a new
    /// detached entity named `<name>_clone`. Children are not copied here;
    /// see [`World::clone_entity`](crate::ecs::World::clone_entity).
    pub fn clone_entity(&self) -> Entity {
        let mut copy = Entity::new(format!("{}_clone", self.name));
        copy.active = self.active;
        copy.tags = self.tags.clone();
        copy.transform = self.transform;
        for key in self.components.keys() {
            let enabled = self.component_enabled(key);
            if let Some(clone) = self.components.get(key).and_then(|c| c.clone_box()) {
                copy.attach_component(clone, enabled);
            }
        }
        for key in self.scripts.keys() {
            let enabled = self.script_enabled(key);
            if let Some(clone) = self.scripts.get(key).and_then(|s| s.clone_box()) {
                copy.attach_script(clone, enabled);
            }
        }
        copy
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("tags", &self.tags)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("components", &self.components.keys())
            .field("scripts", &self.scripts.keys())
            .finish()
    }
}
