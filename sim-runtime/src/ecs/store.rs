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
//! Entity registry
//!
//! Owns every entity of a world, keyed by id, and remembers insertion order
//! for deterministic iteration and serialization. The parent/child graph is
//! stored as ids on each entity; every edit here updates both ends.

use crate::ecs::{Entity, EntityId};
use crate::error::WorldError;
use std::collections::HashMap;

/// Id-keyed entity registry with hierarchy bookkeeping
#[derive(Default)]
pub struct EntityStore {
    entities: HashMap<EntityId, Entity>,
    order: Vec<EntityId>,
}

impl EntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Look up an entity
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Look up an entity mutably
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Ids in insertion order
    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Entities in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Ids of entities without a parent, in insertion order
    pub fn roots(&self) -> Vec<EntityId> {
        self.iter()
            .filter(|e| e.parent().is_none())
            .map(Entity::id)
            .collect()
    }

    pub(crate) fn insert(&mut self, entity: Entity) -> Result<EntityId, WorldError> {
        let id = entity.id();
        if self.entities.contains_key(&id) {
            return Err(WorldError::DuplicateEntity(id));
        }
        self.entities.insert(id, entity);
        self.order.push(id);
        Ok(id)
    }

    pub(crate) fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(entity)
    }

    /// Whether `ancestor` is `id` or lies on `id`'s parent chain
    pub fn is_ancestor(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.entities.get(&current).and_then(Entity::parent);
        }
        false
    }

    /// Attach `child` under `parent`, detaching it from any previous parent
    /// first. Re-attaching to the same parent is a no-op.
    pub(crate) fn attach(&mut self, parent: EntityId, child: EntityId) -> Result<(), WorldError> {
        if !self.contains(parent) {
            return Err(WorldError::UnknownEntity(parent));
        }
        if !self.contains(child) {
            return Err(WorldError::UnknownEntity(child));
        }
        if self.is_ancestor(child, parent) {
            return Err(WorldError::HierarchyCycle { parent, child });
        }
        if self.get(child).and_then(Entity::parent) == Some(parent) {
            return Ok(());
        }

        self.detach(child);
        if let Some(p) = self.entities.get_mut(&parent) {
            p.children_mut().push(child);
        }
        if let Some(c) = self.entities.get_mut(&child) {
            c.set_parent_link(Some(parent));
        }
        Ok(())
    }

    /// Detach `child` from its parent. Returns false if it had none.
    pub(crate) fn detach(&mut self, child: EntityId) -> bool {
        let Some(parent) = self.entities.get(&child).and_then(Entity::parent) else {
            return false;
        };
        if let Some(p) = self.entities.get_mut(&parent) {
            p.children_mut().retain(|c| *c != child);
        }
        if let Some(c) = self.entities.get_mut(&child) {
            c.set_parent_link(None);
        }
        true
    }

    /// Every descendant of `root`, depth-first pre-order, excluding `root`
    pub fn descendants(&self, root: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack: Vec<EntityId> = self
            .get(root)
            .map(|e| e.children().iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(e) = self.get(id) {
                stack.extend(e.children().iter().rev().copied());
            }
        }
        out
    }

    /// First entity named `name` in `root`'s subtree, depth-first, `root` included
    pub fn find_by_name(&self, root: EntityId, name: &str) -> Option<EntityId> {
        let root_entity = self.get(root)?;
        if root_entity.name() == name {
            return Some(root);
        }
        self.descendants(root)
            .into_iter()
            .find(|id| self.get(*id).map_or(false, |e| e.name() == name))
    }

    /// Every entity tagged `tag` in `root`'s subtree, `root` included
    pub fn find_by_tag(&self, root: EntityId, tag: &str) -> Vec<EntityId> {
        std::iter::once(root)
            .chain(self.descendants(root))
            .filter(|id| self.get(*id).map_or(false, |e| e.has_tag(tag)))
            .collect()
    }
}
