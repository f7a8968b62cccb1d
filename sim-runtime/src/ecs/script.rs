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
//! Script extension point
//!
//! Scripts are behaviors. Unlike components they see the input snapshot and
//! the event bus through a [`ScriptContext`], and they receive collision,
//! key and broadcast notifications.

use crate::ecs::{CapabilityObject, Entity, EntityId};
use crate::error::SerializationError;
use crate::events::EventBus;
use crate::input::InputState;
use serde_json::Value;
use std::any::Any;

/// Everything a script hook may touch besides its own state
pub struct ScriptContext<'a> {
    /// Owning entity, with the running script detached
    pub entity: &'a mut Entity,
    /// Input snapshot for this frame
    pub input: &'a InputState,
    /// Event bus of the owning world
    pub events: &'a mut EventBus,
}

impl ScriptContext<'_> {
    /// Publish an event on the world's bus
    pub fn send_event<T: Any + Send + Sync>(&mut self, event: &str, payload: T) {
        self.events.publish(event, payload);
    }
}

/// Behavioral capability attached to an entity
pub trait Script: CapabilityObject {
    /// Called right after the script is attached
    fn on_add(&mut self, _entity: &mut Entity) {}

    /// Called once, after the owning entity's world is initialized
    fn on_init(&mut self, _entity: &mut Entity) {}

    /// Per-frame update, only while enabled
    fn on_update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f64) {}

    /// Fixed-step update, only while enabled
    fn on_fixed_update(&mut self, _ctx: &mut ScriptContext<'_>, _dt: f64) {}

    /// Another body started touching this entity's body
    fn on_collision_enter(&mut self, _ctx: &mut ScriptContext<'_>, _other: EntityId) {}

    /// Contact with `other` persisted through another step
    fn on_collision_stay(&mut self, _ctx: &mut ScriptContext<'_>, _other: EntityId) {}

    /// Contact with `other` ended
    fn on_collision_exit(&mut self, _ctx: &mut ScriptContext<'_>, _other: EntityId) {}

    /// A key went down
    fn on_key_down(&mut self, _ctx: &mut ScriptContext<'_>, _key: &str) {}

    /// A key went up
    fn on_key_up(&mut self, _ctx: &mut ScriptContext<'_>, _key: &str) {}

    /// A world-wide broadcast
    fn on_event(&mut self, _ctx: &mut ScriptContext<'_>, _event: &str, _payload: &Value) {}

    /// Called when the script goes from disabled to enabled
    fn on_enable(&mut self, _entity: &mut Entity) {}

    /// Called when the script goes from enabled to disabled
    fn on_disable(&mut self, _entity: &mut Entity) {}

    /// Called when the script is detached from a live entity
    fn on_remove(&mut self, _entity: &mut Entity) {}

    /// Called when the owning entity is destroyed
    fn on_destroy(&mut self, _entity: &mut Entity) {}

    /// Serializable state. The `enabled` flag is added by the entity.
    fn save(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Restore state written by [`save`](Self::save)
    fn load(&mut self, _payload: &Value) -> Result<(), SerializationError> {
        Ok(())
    }

    /// Deep copy for entity cloning
    fn clone_box(&self) -> Option<Box<dyn Script>> {
        None
    }
}
