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
//! Entity and world snapshots
//!
//! An entity is stored as
//! `{id, name, active, tags, transform, components, scripts, children}`
//! where `components` and `scripts` map capability keys to the payloads
//! produced by their `save` hooks. A world snapshot wraps the flat list of
//! entity records with a format version, the world name and its active flag.
//!
//! Loading is two-phase: every entity is constructed first, then child
//! links are resolved, so a record may name children that appear later in
//! the list. Ids are kept when free in the target world and remapped
//! otherwise.

use crate::ecs::{CapabilityRegistry, Entity, EntityId, World};
use crate::error::SerializationError;
use crate::math::{from_array, to_array, DQuat, Transform};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Snapshot format written by this build
pub const FORMAT_VERSION: &str = "1.0.0";

/// Serialized transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    /// Position
    pub position: [f64; 3],
    /// Rotation quaternion as `[x, y, z, w]`
    pub rotation: [f64; 4],
    /// Scale
    pub scale: [f64; 3],
}

impl From<&Transform> for TransformRecord {
    fn from(t: &Transform) -> Self {
        TransformRecord {
            position: to_array(t.position),
            rotation: t.rotation.to_array(),
            scale: to_array(t.scale),
        }
    }
}

impl TransformRecord {
    fn to_transform(&self) -> Result<Transform, SerializationError> {
        let rotation = DQuat::from_array(self.rotation);
        if !rotation.is_finite() || rotation.length_squared() < 1e-12 {
            return Err(SerializationError::Malformed {
                what: "transform",
                reason: format!("rotation {:?} is not a usable quaternion", self.rotation),
            });
        }
        Ok(Transform {
            position: from_array(self.position),
            rotation: rotation.normalize(),
            scale: from_array(self.scale),
        })
    }
}

/// Serialized entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity id at save time
    pub id: EntityId,
    /// Name
    pub name: String,
    /// Active flag
    pub active: bool,
    /// Tags, sorted
    #[serde(default)]
    pub tags: Vec<String>,
    /// Local transform
    pub transform: TransformRecord,
    /// Component payloads by key
    #[serde(default)]
    pub components: BTreeMap<String, Value>,
    /// Script payloads by key
    #[serde(default)]
    pub scripts: BTreeMap<String, Value>,
    /// Child ids at save time
    #[serde(default)]
    pub children: Vec<EntityId>,
    /// Keys of components that were disabled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_components: Vec<String>,
    /// Keys of scripts that were disabled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_scripts: Vec<String>,
}

impl EntityRecord {
    /// Capture `entity` without its descendants' records
    pub fn capture(entity: &Entity) -> Self {
        let mut components = BTreeMap::new();
        let mut disabled_components = Vec::new();
        for key in entity.component_keys() {
            if let Some(component) = entity.component_dyn(key) {
                components.insert(key.to_string(), component.save());
            }
            if !entity.component_enabled(key) {
                disabled_components.push(key.to_string());
            }
        }
        let mut scripts = BTreeMap::new();
        let mut disabled_scripts = Vec::new();
        for key in entity.script_keys() {
            if let Some(script) = entity.script_dyn(key) {
                scripts.insert(key.to_string(), script.save());
            }
            if !entity.script_enabled(key) {
                disabled_scripts.push(key.to_string());
            }
        }
        EntityRecord {
            id: entity.id(),
            name: entity.name().to_string(),
            active: entity.is_active(),
            tags: entity.tags().map(str::to_string).collect(),
            transform: TransformRecord::from(entity.transform()),
            components,
            scripts,
            children: entity.children().to_vec(),
            disabled_components,
            disabled_scripts,
        }
    }

    /// Write this record's state into `entity`. Capabilities the entity
    /// already has load the payload in place; missing ones are built through
    /// `registry`. Unknown keys are logged and skipped. Children are not
    /// touched.
    pub fn apply(&self, entity: &mut Entity, registry: &CapabilityRegistry) -> Result<(), SerializationError> {
        let transform = self.transform.to_transform()?;
        entity.set_name(self.name.clone());
        entity.set_active(self.active);
        let stale: Vec<String> = entity
            .tags()
            .filter(|t| !self.tags.iter().any(|k| k.as_str() == *t))
            .map(str::to_string)
            .collect();
        for tag in stale {
            entity.remove_tag(&tag);
        }
        for tag in &self.tags {
            entity.add_tag(tag.clone());
        }
        *entity.transform_mut() = transform;

        for (key, payload) in &self.components {
            let enabled = !self.disabled_components.contains(key);
            if let Some(existing) = entity.component_dyn_mut(key) {
                existing.load(payload)?;
                entity.set_component_enabled(key, enabled);
                continue;
            }
            let Some(mut component) = registry.create_component(key) else {
                log::warn!(
                    target: "sim_runtime::world",
                    "unknown component '{}' on '{}', skipped",
                    key,
                    self.name
                );
                continue;
            };
            component.load(payload)?;
            entity
                .restore_component(component, enabled)
                .map_err(|err| SerializationError::Malformed {
                    what: "entity",
                    reason: err.to_string(),
                })?;
        }

        for (key, payload) in &self.scripts {
            let enabled = !self.disabled_scripts.contains(key);
            if let Some(existing) = entity.script_dyn_mut(key) {
                existing.load(payload)?;
                entity.set_script_enabled(key, enabled);
                continue;
            }
            let Some(mut script) = registry.create_script(key) else {
                log::warn!(
                    target: "sim_runtime::world",
                    "unknown script '{}' on '{}', skipped",
                    key,
                    self.name
                );
                continue;
            };
            script.load(payload)?;
            entity
                .restore_script(script, enabled)
                .map_err(|err| SerializationError::Malformed {
                    what: "entity",
                    reason: err.to_string(),
                })?;
        }
        Ok(())
    }
}

impl Entity {
    /// Serialize to a JSON tree
    pub fn to_json(&self) -> Value {
        serde_json::to_value(EntityRecord::capture(self)).unwrap_or(Value::Null)
    }

    /// Restore state from a tree written by [`to_json`](Self::to_json).
    /// The id is not changed.
    pub fn load_json(&mut self, value: &Value, registry: &CapabilityRegistry) -> Result<(), SerializationError> {
        let record: EntityRecord = serde_json::from_value(value.clone())?;
        record.apply(self, registry)
    }
}

/// Serialized world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Format version, semver
    pub version: String,
    /// World name
    pub name: String,
    /// Active flag
    pub active: bool,
    /// Every entity, flat
    pub entities: Vec<EntityRecord>,
}

impl WorldSnapshot {
    /// Capture every entity in `world`
    pub fn capture(world: &World) -> Self {
        WorldSnapshot {
            version: FORMAT_VERSION.to_string(),
            name: world.name().to_string(),
            active: world.is_active(),
            entities: world.entities().iter().map(EntityRecord::capture).collect(),
        }
    }

    /// Serialize to JSON text
    pub fn to_json_string(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON text and check the format version
    pub fn from_json_str(text: &str) -> Result<Self, SerializationError> {
        let snapshot: WorldSnapshot = serde_json::from_str(text)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    /// Reject snapshots from another major format version
    pub fn check_version(&self) -> Result<(), SerializationError> {
        let incompatible = || SerializationError::IncompatibleVersion {
            found: self.version.clone(),
            expected: FORMAT_VERSION,
        };
        let found = Version::parse(&self.version).map_err(|_| incompatible())?;
        let requirement = VersionReq::parse(&format!("^{}", FORMAT_VERSION)).map_err(|_| incompatible())?;
        if requirement.matches(&found) {
            Ok(())
        } else {
            Err(incompatible())
        }
    }

    /// Add every entity of this snapshot to `world` and relink children.
    ///
    /// Returns the mapping from snapshot ids to the ids used in `world`.
    /// Nothing is added if any record fails to build.
    pub fn restore(&self, world: &mut World) -> Result<HashMap<EntityId, EntityId>, SerializationError> {
        self.check_version()?;

        let mut mapping = HashMap::with_capacity(self.entities.len());
        let mut built = Vec::with_capacity(self.entities.len());
        for record in &self.entities {
            if mapping.contains_key(&record.id) {
                return Err(SerializationError::Malformed {
                    what: "world snapshot",
                    reason: format!("entity id {} appears twice", record.id),
                });
            }
            let taken = |id: &EntityId| world.entities().contains(*id) || mapping.values().any(|v| v == id);
            let mut id = record.id;
            while taken(&id) {
                id = EntityId::random();
            }
            let mut entity = Entity::with_id(id, record.name.clone());
            record.apply(&mut entity, world.registry())?;
            mapping.insert(record.id, id);
            built.push(entity);
        }

        for entity in built {
            world.add_entity(entity).map_err(|err| SerializationError::Malformed {
                what: "world snapshot",
                reason: err.to_string(),
            })?;
        }

        for record in &self.entities {
            let Some(&parent) = mapping.get(&record.id) else {
                continue;
            };
            for child in &record.children {
                match mapping.get(child) {
                    Some(&child) => {
                        // cycles are logged by the world and skipped
                        let _ = world.add_child(parent, child);
                    }
                    None => log::warn!(
                        target: "sim_runtime::world",
                        "entity '{}' names unknown child {}",
                        record.name,
                        child
                    ),
                }
            }
        }

        log::info!(
            target: "sim_runtime::world",
            "restored {} entities into world '{}'",
            mapping.len(),
            world.name()
        );
        Ok(mapping)
    }
}

impl World {
    /// Capture the world as a snapshot
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot::capture(self)
    }

    /// Serialize the world to JSON text
    pub fn to_json_string(&self) -> Result<String, SerializationError> {
        self.snapshot().to_json_string()
    }

    /// Take name and active flag from `snapshot` and add its entities
    pub fn load_snapshot(&mut self, snapshot: &WorldSnapshot) -> Result<HashMap<EntityId, EntityId>, SerializationError> {
        let mapping = snapshot.restore(self)?;
        self.set_name(snapshot.name.clone());
        self.set_active(snapshot.active);
        Ok(mapping)
    }

    /// Parse JSON text and load it with [`load_snapshot`](Self::load_snapshot)
    pub fn load_json_str(&mut self, text: &str) -> Result<HashMap<EntityId, EntityId>, SerializationError> {
        let snapshot = WorldSnapshot::from_json_str(text)?;
        self.load_snapshot(&snapshot)
    }
}
