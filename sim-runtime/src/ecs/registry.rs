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
//! Capability registry
//!
//! Maps capability keys to factories so snapshots can be turned back into
//! live components and scripts. Registration happens during setup; a key
//! may be registered once.
//!
//! # Example
//!
//! ```
//! use sim_runtime::ecs::{Capability, CapabilityRegistry, Component};
//!
//! #[derive(Default)]
//! struct Lamp;
//! impl Capability for Lamp {
//!     const KEY: &'static str = "Lamp";
//! }
//! impl Component for Lamp {}
//!
//! let mut registry = CapabilityRegistry::new();
//! registry.register_component::<Lamp>().unwrap();
//! assert!(registry.register_component::<Lamp>().is_err());
//! assert!(registry.create_component("Lamp").is_some());
//! ```

use crate::ecs::{Capability, Component, Script};
use crate::error::WorldError;
use crate::physics::{PhysicsBody, VehicleController, VehicleSimulation};
use std::collections::HashMap;

type ComponentFactory = Box<dyn Fn() -> Box<dyn Component> + Send + Sync>;
type ScriptFactory = Box<dyn Fn() -> Box<dyn Script> + Send + Sync>;

/// Key-to-factory map for components and scripts
#[derive(Default)]
pub struct CapabilityRegistry {
    components: HashMap<&'static str, ComponentFactory>,
    scripts: HashMap<&'static str, ScriptFactory>,
}

impl CapabilityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the runtime's own capabilities
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // keys are distinct constants, so these cannot collide
        let _ = registry.register_component::<PhysicsBody>();
        let _ = registry.register_component::<VehicleSimulation>();
        let _ = registry.register_script::<VehicleController>();
        registry
    }

    /// Register `C` using its `Default` impl
    pub fn register_component<C>(&mut self) -> Result<(), WorldError>
    where
        C: Component + Capability + Default,
    {
        self.register_component_with(C::default)
    }

    /// Register `C` with a custom constructor
    pub fn register_component_with<C, F>(&mut self, factory: F) -> Result<(), WorldError>
    where
        C: Component + Capability,
        F: Fn() -> C + Send + Sync + 'static,
    {
        if self.components.contains_key(C::KEY) {
            return Err(WorldError::DuplicateFactory(C::KEY));
        }
        self.components
            .insert(C::KEY, Box::new(move || Box::new(factory()) as Box<dyn Component>));
        Ok(())
    }

    /// Register `S` using its `Default` impl
    pub fn register_script<S>(&mut self) -> Result<(), WorldError>
    where
        S: Script + Capability + Default,
    {
        self.register_script_with(S::default)
    }

    /// Register `S` with a custom constructor
    pub fn register_script_with<S, F>(&mut self, factory: F) -> Result<(), WorldError>
    where
        S: Script + Capability,
        F: Fn() -> S + Send + Sync + 'static,
    {
        if self.scripts.contains_key(S::KEY) {
            return Err(WorldError::DuplicateFactory(S::KEY));
        }
        self.scripts
            .insert(S::KEY, Box::new(move || Box::new(factory()) as Box<dyn Script>));
        Ok(())
    }

    /// Whether a component factory exists for `key`
    pub fn has_component(&self, key: &str) -> bool {
        self.components.contains_key(key)
    }

    /// Whether a script factory exists for `key`
    pub fn has_script(&self, key: &str) -> bool {
        self.scripts.contains_key(key)
    }

    /// Build a fresh component for `key`
    pub fn create_component(&self, key: &str) -> Option<Box<dyn Component>> {
        self.components.get(key).map(|factory| factory())
    }

    /// Build a fresh script for `key`
    pub fn create_script(&self, key: &str) -> Option<Box<dyn Script>> {
        self.scripts.get(key).map(|factory| factory())
    }
}
