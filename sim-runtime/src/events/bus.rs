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
//! Publish/subscribe hub

use super::EventPriority;
use crate::config::EventBusConfig;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

type Payload = Arc<dyn Any + Send + Sync>;
type Callback = Box<dyn FnMut(&(dyn Any + Send + Sync)) + Send>;

struct Subscriber {
    id: u64,
    priority: EventPriority,
    callback: Callback,
}

struct DelayedEvent {
    event: String,
    payload: Payload,
    delay: Duration,
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    event: String,
    id: u64,
}

impl SubscriptionHandle {
    /// Event name this handle is subscribed to
    pub fn event(&self) -> &str {
        &self.event
    }
}

/// Typed publish/subscribe hub
///
/// Events are identified by name; each subscriber declares the payload type
/// it expects and ignores payloads of other types. Delivery is synchronous
/// and ordered by descending [`EventPriority`], ties in subscription order.
///
/// # Example
///
/// ```
/// use sim_runtime::events::{EventBus, EventPriority};
/// use std::sync::{Arc, Mutex};
///
/// let mut bus = EventBus::new();
/// bus.publish("score", 10u32);
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// bus.subscribe("score", EventPriority::Normal, move |points: &u32| {
///     sink.lock().unwrap().push(*points);
/// });
///
/// // the earlier publish was replayed from history
/// assert_eq!(*seen.lock().unwrap(), vec![10]);
/// ```
pub struct EventBus {
    subscribers: HashMap<String, Vec<Subscriber>>,
    history: HashMap<String, VecDeque<Payload>>,
    delayed: VecDeque<DelayedEvent>,
    head_elapsed: Duration,
    next_id: u64,
    debug: bool,
    history_enabled: bool,
    history_capacity: usize,
}

impl EventBus {
    /// Create a bus with default settings
    pub fn new() -> Self {
        Self::with_config(&EventBusConfig::default())
    }

    /// Create a bus from configuration
    pub fn with_config(config: &EventBusConfig) -> Self {
        if config.debug {
            log::debug!(
                target: "sim_runtime::events",
                "event bus created (history {})",
                if config.history_enabled { "on" } else { "off" }
            );
        }
        EventBus {
            subscribers: HashMap::new(),
            history: HashMap::new(),
            delayed: VecDeque::new(),
            head_elapsed: Duration::ZERO,
            next_id: 0,
            debug: config.debug,
            history_enabled: config.history_enabled,
            history_capacity: config.history_capacity,
        }
    }

    /// Enable or disable debug logging of bus activity
    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    /// Enable or disable history. Disabling drops what was recorded.
    pub fn set_history_enabled(&mut self, enabled: bool) {
        self.history_enabled = enabled;
        if !enabled {
            self.history.clear();
        }
    }

    /// Change the per-event history capacity, trimming oldest entries
    pub fn set_history_capacity(&mut self, capacity: usize) {
        self.history_capacity = capacity;
        for entries in self.history.values_mut() {
            while entries.len() > capacity {
                entries.pop_front();
            }
        }
    }

    /// Drop history for one event, or for all events when `event` is `None`
    pub fn clear_history(&mut self, event: Option<&str>) {
        match event {
            Some(name) => {
                self.history.remove(name);
            }
            None => self.history.clear(),
        }
    }

    /// Number of payloads remembered for `event`
    pub fn history_len(&self, event: &str) -> usize {
        self.history.get(event).map_or(0, VecDeque::len)
    }

    /// Subscribe to `event`
    ///
    /// If history is enabled, every remembered payload of type `T` is
    /// delivered to `callback` in publish order before this returns.
    pub fn subscribe<T, F>(&mut self, event: &str, priority: EventPriority, mut callback: F) -> SubscriptionHandle
    where
        T: Any + Send + Sync,
        F: FnMut(&T) + Send + 'static,
    {
        let mut erased: Callback = Box::new(move |payload| {
            if let Some(typed) = payload.downcast_ref::<T>() {
                callback(typed);
            }
        });

        if self.history_enabled {
            if let Some(past) = self.history.get(event) {
                if self.debug && !past.is_empty() {
                    log::debug!(
                        target: "sim_runtime::events",
                        "replaying {} past '{}' events",
                        past.len(),
                        event
                    );
                }
                for payload in past {
                    invoke(event, &mut erased, payload.as_ref());
                }
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        let list = self.subscribers.entry(event.to_string()).or_default();
        let at = list
            .iter()
            .position(|s| s.priority < priority)
            .unwrap_or(list.len());
        list.insert(at, Subscriber { id, priority, callback: erased });

        if self.debug {
            log::debug!(
                target: "sim_runtime::events",
                "subscribed to '{}' with priority {:?}",
                event,
                priority
            );
        }

        SubscriptionHandle {
            event: event.to_string(),
            id,
        }
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        let Some(list) = self.subscribers.get_mut(&handle.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != handle.id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.subscribers.remove(&handle.event);
        }
        if removed && self.debug {
            log::debug!(target: "sim_runtime::events", "unsubscribed from '{}'", handle.event);
        }
        removed
    }

    /// Number of live subscribers for `event`
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers.get(event).map_or(0, Vec::len)
    }

    /// Publish `payload` to every subscriber of `event`
    ///
    /// A panicking subscriber is logged and skipped; the remaining
    /// subscribers still run and this call returns normally.
    pub fn publish<T: Any + Send + Sync>(&mut self, event: &str, payload: T) {
        let payload: Payload = Arc::new(payload);
        if self.history_enabled && self.history_capacity > 0 {
            let entries = self.history.entry(event.to_string()).or_default();
            entries.push_back(Arc::clone(&payload));
            while entries.len() > self.history_capacity {
                entries.pop_front();
            }
        }
        self.deliver(event, &payload);
    }

    /// Queue `payload` for delivery after `delay`
    ///
    /// The queue is chained: each entry's delay starts counting once the
    /// previous entry has fired. Nothing is delivered until the host calls
    /// [`advance`](Self::advance). Delayed events bypass history.
    pub fn publish_delayed<T: Any + Send + Sync>(&mut self, event: &str, payload: T, delay: Duration) {
        if self.debug {
            log::debug!(
                target: "sim_runtime::events",
                "'{}' scheduled in {:?}",
                event,
                delay
            );
        }
        self.delayed.push_back(DelayedEvent {
            event: event.to_string(),
            payload: Arc::new(payload),
            delay,
        });
    }

    /// Number of delayed events still waiting
    pub fn pending_delayed(&self) -> usize {
        self.delayed.len()
    }

    /// Advance the delayed-event clock by `elapsed`, delivering every entry
    /// whose delay ran out. Returns how many were delivered.
    pub fn advance(&mut self, elapsed: Duration) -> usize {
        let mut budget = elapsed;
        let mut fired = 0;
        while let Some(head) = self.delayed.front() {
            let remaining = head.delay.saturating_sub(self.head_elapsed);
            if budget < remaining {
                self.head_elapsed += budget;
                break;
            }
            budget -= remaining;
            self.head_elapsed = Duration::ZERO;
            if let Some(next) = self.delayed.pop_front() {
                self.deliver(&next.event, &next.payload);
                fired += 1;
            }
        }
        fired
    }

    /// Drop every subscriber and pending delayed event, and optionally history
    pub fn clear(&mut self, clear_history: bool) {
        self.subscribers.clear();
        self.delayed.clear();
        self.head_elapsed = Duration::ZERO;
        if clear_history {
            self.history.clear();
        }
    }

    fn deliver(&mut self, event: &str, payload: &Payload) {
        let Some(list) = self.subscribers.get_mut(event) else {
            if self.debug {
                log::debug!(target: "sim_runtime::events", "'{}' published with no subscribers", event);
            }
            return;
        };
        if self.debug {
            log::debug!(
                target: "sim_runtime::events",
                "publishing '{}' to {} subscribers",
                event,
                list.len()
            );
        }
        for subscriber in list.iter_mut() {
            invoke(event, &mut subscriber.callback, payload.as_ref());
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn invoke(event: &str, callback: &mut Callback, payload: &(dyn Any + Send + Sync)) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(payload)));
    if let Err(cause) = outcome {
        let message = cause
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| cause.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!(
            target: "sim_runtime::events",
            "subscriber for '{}' failed: {}",
            event,
            message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Arc::clone(&log), log)
    }

    #[test]
    fn test_priority_order() {
        let mut bus = EventBus::new();
        let (log, handle) = recorder();
        for (label, priority) in [
            ("low", EventPriority::Low),
            ("critical", EventPriority::Critical),
            ("normal-a", EventPriority::Normal),
            ("normal-b", EventPriority::Normal),
        ] {
            let log = Arc::clone(&log);
            bus.subscribe("tick", priority, move |_: &u8| {
                log.lock().unwrap().push(label.to_string());
            });
        }
        bus.publish("tick", 1u8);
        assert_eq!(
            *handle.lock().unwrap(),
            vec!["critical", "normal-a", "normal-b", "low"]
        );
    }

    #[test]
    fn test_mismatched_payload_is_ignored() {
        let mut bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe("value", EventPriority::Normal, move |_: &f64| {
            *counter.lock().unwrap() += 1;
        });
        bus.publish("value", "text".to_string());
        bus.publish("value", 2.0f64);
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut bus = EventBus::with_config(&EventBusConfig::default().with_history_capacity(3));
        for i in 0..5u32 {
            bus.publish("n", i);
        }
        assert_eq!(bus.history_len("n"), 3);

        let (log, handle) = recorder();
        bus.subscribe("n", EventPriority::Normal, move |v: &u32| {
            log.lock().unwrap().push(v.to_string());
        });
        assert_eq!(*handle.lock().unwrap(), vec!["2", "3", "4"]);
    }

    #[test]
    fn test_disabling_history_clears_it() {
        let mut bus = EventBus::new();
        bus.publish("n", 1u32);
        bus.set_history_enabled(false);
        assert_eq!(bus.history_len("n"), 0);
        bus.publish("n", 2u32);
        assert_eq!(bus.history_len("n"), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new();
        let handle = bus.subscribe("n", EventPriority::Normal, |_: &u32| {});
        assert_eq!(bus.subscriber_count("n"), 1);
        assert!(bus.unsubscribe(&handle));
        assert!(!bus.unsubscribe(&handle));
        assert_eq!(bus.subscriber_count("n"), 0);
    }

    #[test]
    fn test_delayed_queue_is_chained() {
        let mut bus = EventBus::new();
        let (log, handle) = recorder();
        bus.subscribe("later", EventPriority::Normal, move |v: &&'static str| {
            log.lock().unwrap().push(v.to_string());
        });
        bus.publish_delayed("later", "first", Duration::from_millis(100));
        bus.publish_delayed("later", "second", Duration::from_millis(50));

        assert_eq!(bus.advance(Duration::from_millis(99)), 0);
        assert_eq!(bus.advance(Duration::from_millis(1)), 1);
        // second waits 50ms after the first fired
        assert_eq!(bus.advance(Duration::from_millis(49)), 0);
        assert_eq!(bus.advance(Duration::from_millis(1)), 1);
        assert_eq!(*handle.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(bus.history_len("later"), 0);
    }

    #[test]
    fn test_clear_keeps_history_when_asked() {
        let mut bus = EventBus::new();
        bus.subscribe("n", EventPriority::Normal, |_: &u32| {});
        bus.publish("n", 1u32);
        bus.clear(false);
        assert_eq!(bus.subscriber_count("n"), 0);
        assert_eq!(bus.history_len("n"), 1);
        bus.clear(true);
        assert_eq!(bus.history_len("n"), 0);
    }
}
