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
//! Error types
//!
//! Nothing in the runtime treats an error as fatal. Configuration mistakes
//! are logged and the offending call becomes a no-op; the `Err` values here
//! exist so callers can observe what happened.

use crate::ecs::EntityId;
use thiserror::Error;

/// Errors raised by capability registration on a single entity
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// The capability key is taken by an instance of a different concrete type
    #[error("entity '{entity}' already has capability '{key}' of a different type")]
    CapabilityConflict {
        /// Entity name
        entity: String,
        /// Capability key
        key: &'static str,
    },
    /// The capability removed itself from its entity while being attached
    #[error("capability '{key}' was detached from entity '{entity}' during on_add")]
    CapabilityDetached {
        /// Entity name
        entity: String,
        /// Capability key
        key: &'static str,
    },
}

/// Errors raised by world-level bookkeeping
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// An entity with this id is already registered
    #[error("entity {0} already exists in world")]
    DuplicateEntity(EntityId),
    /// No entity with this id is registered
    #[error("entity {0} is not registered")]
    UnknownEntity(EntityId),
    /// Attaching would make an entity its own ancestor
    #[error("attaching {child} under {parent} would create a cycle")]
    HierarchyCycle {
        /// Requested parent
        parent: EntityId,
        /// Requested child
        child: EntityId,
    },
    /// A system with the same name is already registered
    #[error("system '{0}' already exists in world")]
    DuplicateSystem(String),
    /// A capability factory is already registered under this key
    #[error("capability factory '{0}' is already registered")]
    DuplicateFactory(&'static str),
}

/// Errors raised while saving or loading snapshots
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The JSON text could not be parsed or produced
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// The snapshot was written by an incompatible format version
    #[error("snapshot format {found} is incompatible with {expected}")]
    IncompatibleVersion {
        /// Version found in the snapshot
        found: String,
        /// Version this build writes
        expected: &'static str,
    },
    /// A record or payload is structurally invalid
    #[error("malformed {what}: {reason}")]
    Malformed {
        /// What was being read
        what: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Errors raised by a physics backend
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// The ray has a non-finite endpoint or zero length
    #[error("invalid ray: {0}")]
    InvalidRay(String),
    /// The handle does not name a live body
    #[error("unknown body handle {0}")]
    UnknownBody(u64),
    /// The handle does not name a mounted vehicle
    #[error("unknown vehicle handle {0}")]
    UnknownVehicle(u64),
}

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration text could not be parsed
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// A field holds a value outside its valid range
    #[error("invalid config value for '{field}': {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}
