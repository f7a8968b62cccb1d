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
//! Event bus
//!
//! Named, typed publish/subscribe with:
//! - priority-ordered synchronous delivery
//! - per-callback panic isolation
//! - bounded per-event history replayed to late subscribers
//! - a cooperative delayed-publish queue drained by the host's clock

mod bus;

pub use bus::{EventBus, SubscriptionHandle};

/// Well-known event names
pub mod names {
    /// Published by the host once per rendered frame, payload `f64` seconds
    pub const FRAME_TICK: &str = "onGameUpdate";
    /// Published once a world finishes `initialize`, payload `WorldEvent`
    pub const WORLD_INITIALIZED: &str = "onWorldInitialized";
    /// Published before the host renders, payload `f64` seconds
    pub const PRE_RENDER: &str = "onGamePreRender";
    /// Published when a key goes down, payload `String`
    pub const KEY_DOWN: &str = "onKeyDown";
    /// Published when a key goes up, payload `String`
    pub const KEY_UP: &str = "onKeyUp";
    /// Published when a world pauses, payload `WorldEvent`
    pub const WORLD_PAUSE: &str = "world.pause";
    /// Published when a world resumes, payload `WorldEvent`
    pub const WORLD_RESUME: &str = "world.resume";
}

/// Delivery priority. Higher priorities are called first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum EventPriority {
    /// Called last
    Low = 0,
    /// Default
    #[default]
    Normal = 1,
    /// Called before normal subscribers
    High = 2,
    /// Called first
    Critical = 3,
}

/// Payload of world lifecycle events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldEvent {
    /// Name of the world that changed state
    pub world: String,
}
