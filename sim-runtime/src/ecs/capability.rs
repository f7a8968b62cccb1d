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
//! Capability keys and per-entity storage
//!
//! Every component and script type declares a string key. An entity holds at
//! most one instance per key, and typed lookups resolve through the key
//! before downcasting, so a wrapper type that reuses another type's key
//! occupies the same slot.
//!
//! Storage is an ordered list of slots rather than a map: dispatch order is
//! insertion order, and a slot's value can be taken out while its hook runs
//! against the owning entity.

use std::any::Any;

/// Static capability key for a component or script type
///
/// # Example
///
/// ```
/// use sim_runtime::ecs::Capability;
///
/// struct Health(u32);
/// impl Capability for Health {
///     const KEY: &'static str = "Health";
/// }
/// assert_eq!(Health::KEY, "Health");
/// ```
pub trait Capability: Any + Send {
    /// Key under which instances are stored and serialized
    const KEY: &'static str;
}

/// Object-safe view of [`Capability`], implemented automatically
pub trait CapabilityObject: Any + Send {
    /// Capability key of the concrete type
    fn type_key(&self) -> &'static str;

    /// Upcast for downcasting to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to the concrete type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Capability> CapabilityObject for T {
    fn type_key(&self) -> &'static str {
        T::KEY
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub(crate) struct Slot<T: ?Sized> {
    pub(crate) key: &'static str,
    pub(crate) enabled: bool,
    pub(crate) initialized: bool,
    value: Option<Box<T>>,
}

/// Ordered capability slots, one per key
pub(crate) struct Slots<T: ?Sized> {
    slots: Vec<Slot<T>>,
}

impl<T: ?Sized + CapabilityObject> Slots<T> {
    pub(crate) fn new() -> Self {
        Slots { slots: Vec::new() }
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.key == key)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub(crate) fn slot(&self, key: &str) -> Option<&Slot<T>> {
        self.slots.iter().find(|slot| slot.key == key)
    }

    pub(crate) fn slot_mut(&mut self, key: &str) -> Option<&mut Slot<T>> {
        self.slots.iter_mut().find(|slot| slot.key == key)
    }

    pub(crate) fn keys(&self) -> Vec<&'static str> {
        self.slots.iter().map(|slot| slot.key).collect()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&T> {
        self.slot(key)?.value.as_deref()
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.slot_mut(key)?.value.as_deref_mut()
    }

    pub(crate) fn get_typed<C: Capability>(&self) -> Option<&C> {
        self.get(C::KEY)?.as_any().downcast_ref::<C>()
    }

    pub(crate) fn get_typed_mut<C: Capability>(&mut self) -> Option<&mut C> {
        self.get_mut(C::KEY)?.as_any_mut().downcast_mut::<C>()
    }

    /// Append a new slot. The caller has checked the key is free.
    pub(crate) fn push(&mut self, value: Box<T>, enabled: bool) {
        let key = value.type_key();
        self.slots.push(Slot {
            key,
            enabled,
            initialized: false,
            value: Some(value),
        });
    }

    /// Remove a slot, returning its static key and value. A slot whose
    /// value is currently taken is removed and yields `None`; the value is
    /// handed back as an orphan by [`restore`](Self::restore).
    pub(crate) fn remove(&mut self, key: &str) -> Option<(&'static str, Option<Box<T>>)> {
        let index = self.position(key)?;
        let slot = self.slots.remove(index);
        Some((slot.key, slot.value))
    }

    /// Take a value out of its slot for the duration of a hook
    pub(crate) fn take(&mut self, key: &str) -> Option<Box<T>> {
        self.slot_mut(key)?.value.take()
    }

    /// Put a value back after [`take`](Self::take). If the slot was removed
    /// while the value was out, the value is returned to the caller.
    pub(crate) fn restore(&mut self, key: &'static str, value: Box<T>) -> Option<Box<T>> {
        match self.slots.iter_mut().find(|slot| slot.key == key && slot.value.is_none()) {
            Some(slot) => {
                slot.value = Some(value);
                None
            }
            None => Some(value),
        }
    }

    /// Empty the storage, yielding every present value in order
    pub(crate) fn drain(&mut self) -> Vec<Box<T>> {
        self.slots.drain(..).filter_map(|slot| slot.value).collect()
    }
}
