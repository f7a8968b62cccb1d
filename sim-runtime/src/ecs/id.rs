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
//! Entity identifiers
//!
//! Ids are random 64-bit values so that entities created in different
//! worlds or sessions do not collide when snapshots are merged. They are
//! written to snapshots as 16-digit lowercase hex.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Unique identifier for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EntityId(u64);

impl EntityId {
    /// Create an EntityId from a raw u64 value
    pub fn new(id: u64) -> Self {
        EntityId(id)
    }

    /// Draw a fresh random id
    pub fn random() -> Self {
        EntityId(rand::random())
    }

    /// Get the raw u64 value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(EntityId)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for EntityId {
    type Error = ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Order-independent pair of entity ids
///
/// `EntityPair::new(a, b) == EntityPair::new(b, a)`; the smaller id is
/// always stored first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityPair {
    first: EntityId,
    second: EntityId,
}

impl EntityPair {
    /// Build the canonical pair for `a` and `b`
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            EntityPair { first: a, second: b }
        } else {
            EntityPair { first: b, second: a }
        }
    }

    /// Smaller id
    pub fn first(&self) -> EntityId {
        self.first
    }

    /// Larger id
    pub fn second(&self) -> EntityId {
        self.second
    }

    /// The partner of `id`, or `None` if `id` is not in this pair
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if id == self.first {
            Some(self.second)
        } else if id == self.second {
            Some(self.first)
        } else {
            None
        }
    }
}
