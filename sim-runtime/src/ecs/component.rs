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
//! Component extension point
//!
//! Components carry passive or structural state: geometry, a physics body,
//! a camera rig. Systems find entities by the components they hold.
//!
//! All hooks have no-op defaults. A hook receives the owning entity with the
//! component itself temporarily detached, so it can freely read and mutate
//! the rest of the entity, including adding or removing other capabilities.
//!
//! # Lifecycle
//!
//! ```text
//! on_add -> on_init (once, after the world is initialized)
//!        -> update / fixed_update / pre_render / post_render
//!        -> on_remove (detached)  or  on_destroy (entity destroyed)
//! ```

use crate::ecs::{CapabilityObject, Entity};
use crate::error::SerializationError;
use serde_json::Value;

/// Passive capability attached to an entity
pub trait Component: CapabilityObject {
    /// Called right after the component is attached
    fn on_add(&mut self, _entity: &mut Entity) {}

    /// Called once, after the owning entity's world is initialized
    fn on_init(&mut self, _entity: &mut Entity) {}

    /// Per-frame update, only while enabled
    fn update(&mut self, _entity: &mut Entity, _dt: f64) {}

    /// Fixed-step update, only while enabled
    fn fixed_update(&mut self, _entity: &mut Entity, _dt: f64) {}

    /// Called by systems that list this capability, before the host renders
    fn pre_render(&mut self, _entity: &mut Entity) {}

    /// Called by systems that list this capability, after the host renders
    fn post_render(&mut self, _entity: &mut Entity) {}

    /// Called when the component goes from disabled to enabled
    fn on_enable(&mut self, _entity: &mut Entity) {}

    /// Called when the component goes from enabled to disabled
    fn on_disable(&mut self, _entity: &mut Entity) {}

    /// Called when the component is detached from a live entity
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

    /// Deep copy for entity cloning. Components returning `None` are not
    /// carried over to clones.
    fn clone_box(&self) -> Option<Box<dyn Component>> {
        None
    }
}
