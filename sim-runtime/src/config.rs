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
//! Runtime configuration
//!
//! Every section has sensible defaults, so a host can start from
//! `EngineConfig::default()` and override only what it needs, either through
//! the `with_*` builders or by loading a partial JSON document.
//!
//! # Example
//!
//! ```
//! use sim_runtime::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "physics": { "max_sub_steps": 5 } }"#).unwrap();
//! assert_eq!(config.physics.max_sub_steps, 5);
//! assert_eq!(config.events.history_capacity, 50);
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Top-level configuration for a world and its collaborators
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// World settings
    pub world: WorldConfig,
    /// Event bus settings
    pub events: EventBusConfig,
    /// Physics settings
    pub physics: PhysicsConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for out-of-range values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.events.validate()?;
        self.physics.validate()
    }
}

/// World settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Human-readable world name
    pub name: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            name: "World".to_string(),
        }
    }
}

impl WorldConfig {
    /// Set the world name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Event bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Log every subscribe, unsubscribe and publish at debug level
    pub debug: bool,
    /// Keep a per-event history for replay to late subscribers
    pub history_enabled: bool,
    /// Maximum payloads remembered per event name
    pub history_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        EventBusConfig {
            debug: false,
            history_enabled: true,
            history_capacity: 50,
        }
    }
}

impl EventBusConfig {
    /// Enable or disable debug logging
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Enable or disable the replay history
    pub fn with_history(mut self, enabled: bool) -> Self {
        self.history_enabled = enabled;
        self
    }

    /// Set the per-event history capacity
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.history_enabled && self.history_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "events.history_capacity",
                reason: "must be at least 1 when history is enabled".to_string(),
            });
        }
        Ok(())
    }
}

/// Who drives physics sub-steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteppingMode {
    /// Accumulate frame time in `update` and run fixed sub-steps from it
    #[default]
    Frame,
    /// Run exactly one sub-step per `fixed_update` call
    Fixed,
}

/// Physics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity in m/s²
    pub gravity: [f64; 3],
    /// Length of one solver sub-step in seconds
    pub fixed_time_step: f64,
    /// Upper bound on sub-steps run for a single frame
    pub max_sub_steps: u32,
    /// Frame deltas above this are clamped before accumulation
    pub max_frame_delta: f64,
    /// Sub-step driver
    pub stepping: SteppingMode,
    /// Friction used when a body does not set its own
    pub default_friction: f64,
    /// Restitution used when a body does not set its own
    pub default_restitution: f64,
    /// Log body registration
    pub debug: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            gravity: [0.0, -9.82, 0.0],
            fixed_time_step: 1.0 / 60.0,
            max_sub_steps: 3,
            max_frame_delta: 0.1,
            stepping: SteppingMode::Frame,
            default_friction: 0.3,
            default_restitution: 0.3,
            debug: false,
        }
    }
}

impl PhysicsConfig {
    /// Set gravity
    pub fn with_gravity(mut self, gravity: [f64; 3]) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set the sub-step length
    pub fn with_fixed_time_step(mut self, dt: f64) -> Self {
        self.fixed_time_step = dt;
        self
    }

    /// Set the sub-step cap
    pub fn with_max_sub_steps(mut self, steps: u32) -> Self {
        self.max_sub_steps = steps;
        self
    }

    /// Set the stepping mode
    pub fn with_stepping(mut self, stepping: SteppingMode) -> Self {
        self.stepping = stepping;
        self
    }

    /// Enable or disable registration logging
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_time_step > 0.0 && self.fixed_time_step.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "physics.fixed_time_step",
                reason: format!("{} is not positive and finite", self.fixed_time_step),
            });
        }
        if self.max_sub_steps == 0 {
            return Err(ConfigError::Invalid {
                field: "physics.max_sub_steps",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.max_frame_delta > 0.0) {
            return Err(ConfigError::Invalid {
                field: "physics.max_frame_delta",
                reason: format!("{} is not positive", self.max_frame_delta),
            });
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "physics.gravity",
                reason: "components must be finite".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "world": { "name": "Track" }, "physics": { "stepping": "fixed" } }"#,
        )
        .unwrap();
        assert_eq!(config.world.name, "Track");
        assert_eq!(config.physics.stepping, SteppingMode::Fixed);
        assert_eq!(config.physics.max_sub_steps, 3);
        assert!(config.events.history_enabled);
    }

    #[test]
    fn test_rejects_zero_sub_steps() {
        let err = EngineConfig::from_json_str(r#"{ "physics": { "max_sub_steps": 0 } }"#);
        assert!(matches!(err, Err(ConfigError::Invalid { field: "physics.max_sub_steps", .. })));
    }

    #[test]
    fn test_rejects_bad_time_step() {
        let config = PhysicsConfig::default().with_fixed_time_step(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_history() {
        let config = EngineConfig {
            events: EventBusConfig::default().with_history_capacity(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            EngineConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
