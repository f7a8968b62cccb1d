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
//! World lifecycle tests
//!
//! Exercises system ordering, membership tracking, hierarchy updates,
//! input and event dispatch, and destroy/reinitialize.

use serde_json::Value;
use sim_runtime::ecs::{
    Capability, Component, Entity, EntityId, Script, ScriptContext, System, SystemContext, SystemPriority, World,
};
use sim_runtime::events::{names, EventPriority, WorldEvent};
use std::any::Any;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[derive(Default)]
struct Health(u32);

impl Capability for Health {
    const KEY: &'static str = "Health";
}

impl Component for Health {}

struct LifecycleRecorder {
    log: Log,
}

impl Capability for LifecycleRecorder {
    const KEY: &'static str = "LifecycleRecorder";
}

impl Component for LifecycleRecorder {
    fn update(&mut self, entity: &mut Entity, _dt: f64) {
        self.log.lock().unwrap().push(format!("update {}", entity.name()));
    }
}

struct Recorder {
    log: Log,
}

impl Capability for Recorder {
    const KEY: &'static str = "Recorder";
}

impl Script for Recorder {
    fn on_key_down(&mut self, _ctx: &mut ScriptContext<'_>, key: &str) {
        self.log.lock().unwrap().push(format!("down {}", key));
    }

    fn on_key_up(&mut self, _ctx: &mut ScriptContext<'_>, key: &str) {
        self.log.lock().unwrap().push(format!("up {}", key));
    }

    fn on_event(&mut self, ctx: &mut ScriptContext<'_>, event: &str, payload: &Value) {
        self.log.lock().unwrap().push(format!("{} {}", event, payload));
        ctx.send_event("echo", payload.to_string());
    }
}

/// Tracks entities with a `Health` component and records its calls
struct HealthSystem {
    name: &'static str,
    priority: SystemPriority,
    log: Log,
}

impl HealthSystem {
    fn new(name: &'static str, priority: i32, log: &Log) -> Self {
        HealthSystem {
            name,
            priority: SystemPriority(priority),
            log: Arc::clone(log),
        }
    }
}

impl System for HealthSystem {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> SystemPriority {
        self.priority
    }

    fn check_entity_compatibility(&self, entity: &Entity) -> bool {
        entity.has_component::<Health>()
    }

    fn on_initialize(&mut self, _ctx: &mut SystemContext<'_>) {
        self.log.lock().unwrap().push(format!("{} init", self.name));
    }

    fn on_entity_added(&mut self, entity: &mut Entity) {
        self.log.lock().unwrap().push(format!("{} +{}", self.name, entity.name()));
    }

    fn on_entity_removed(&mut self, entity: &mut Entity) {
        self.log.lock().unwrap().push(format!("{} -{}", self.name, entity.name()));
    }

    fn before_update(&mut self, _ctx: &mut SystemContext<'_>, _members: &[EntityId], _dt: f64) {
        self.log.lock().unwrap().push(format!("{} before", self.name));
    }

    fn process_entity(&mut self, entity: &mut Entity, _dt: f64) {
        self.log.lock().unwrap().push(format!("{} process {}", self.name, entity.name()));
    }

    fn after_update(&mut self, _ctx: &mut SystemContext<'_>, _members: &[EntityId], _dt: f64) {
        self.log.lock().unwrap().push(format!("{} after", self.name));
    }

    fn on_destroy(&mut self) {
        self.log.lock().unwrap().push(format!("{} destroy", self.name));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn entity_with_health(world: &mut World, name: &str) -> EntityId {
    let id = world.create_entity(name);
    world.entity_mut(id).unwrap().add_component(Health(100)).unwrap();
    id
}

#[test]
fn test_systems_run_in_priority_order() {
    let log = new_log();
    let mut world = World::new("order");
    // added out of order on purpose
    world.add_system(HealthSystem::new("T", 1, &log)).unwrap();
    world.add_system(HealthSystem::new("S", 0, &log)).unwrap();
    entity_with_health(&mut world, "e");
    world.initialize();
    log.lock().unwrap().clear();

    world.update(0.016);
    assert_eq!(
        entries(&log),
        vec!["S before", "S process e", "S after", "T before", "T process e", "T after"]
    );
}

#[test]
fn test_membership_follows_components() {
    let log = new_log();
    let mut world = World::new("members");
    world.add_system(HealthSystem::new("S", 0, &log)).unwrap();
    world.initialize();

    let plain = world.create_entity("plain");
    assert!(world.system_members("S").unwrap().is_empty());

    world.entity_mut(plain).unwrap().add_component(Health(1)).unwrap();
    assert_eq!(world.system_members("S").unwrap(), &[plain]);

    world.entity_mut(plain).unwrap().remove_component::<Health>();
    assert!(world.system_members("S").unwrap().is_empty());
    assert_eq!(entries(&log), vec!["S init", "S +plain", "S -plain"]);
}

#[test]
fn test_duplicate_component_keeps_first() {
    let mut world = World::new("dup");
    let id = world.create_entity("e");
    let mut entity = world.entity_mut(id).unwrap();
    entity.add_component(Health(10)).unwrap();
    let again = entity.add_component(Health(99)).unwrap();
    assert_eq!(again.0, 10);
    drop(entity);
    assert_eq!(world.get_entity(id).unwrap().component_keys(), vec!["Health"]);
}

#[test]
fn test_late_system_is_backfilled() {
    let log = new_log();
    let mut world = World::new("late");
    let a = entity_with_health(&mut world, "a");
    world.create_entity("b");
    world.initialize();

    world.add_system(HealthSystem::new("S", 0, &log)).unwrap();
    assert_eq!(world.system_members("S").unwrap(), &[a]);
    assert_eq!(entries(&log), vec!["S init", "S +a"]);
}

#[test]
fn test_children_update_once_per_frame() {
    let log = new_log();
    let mut world = World::new("tree");
    let parent = world.create_entity("parent");
    let child = world.create_entity("child");
    for id in [parent, child] {
        world
            .entity_mut(id)
            .unwrap()
            .add_component(LifecycleRecorder { log: Arc::clone(&log) })
            .unwrap();
    }
    world.add_child(parent, child).unwrap();
    world.initialize();

    world.update(0.016);
    assert_eq!(entries(&log), vec!["update parent", "update child"]);

    world.entity_mut(parent).unwrap().set_active(false);
    world.update(0.016);
    assert_eq!(entries(&log).len(), 2);
}

#[test]
fn test_removed_entity_leaves_every_system() {
    let log = new_log();
    let mut world = World::new("remove");
    world.add_system(HealthSystem::new("S", 0, &log)).unwrap();
    world.add_system(HealthSystem::new("T", 1, &log)).unwrap();
    let id = entity_with_health(&mut world, "e");
    let child = world.create_entity("child");
    world.add_child(id, child).unwrap();

    let removed = world.remove_entity(id).unwrap();
    assert_eq!(removed.name(), "e");
    assert!(world.get_entity(id).is_none());
    assert!(world.get_entity(child).is_none());
    assert!(world.system_members("S").unwrap().is_empty());
    assert!(world.system_members("T").unwrap().is_empty());
}

#[test]
fn test_double_destroy_is_noop() {
    let mut world = World::new("destroy");
    let id = world.create_entity("e");
    assert!(world.destroy_entity(id));
    assert!(!world.destroy_entity(id));
}

#[test]
fn test_tick_event_drives_update() {
    let log = new_log();
    let mut world = World::new("ticks");
    world.add_system(HealthSystem::new("S", 0, &log)).unwrap();
    world.initialize();
    log.lock().unwrap().clear();

    world.events_mut().publish(names::FRAME_TICK, 0.016f64);
    world.events_mut().publish(names::FRAME_TICK, 0.016f64);
    assert_eq!(world.process_ticks(), 2);
    assert_eq!(entries(&log), vec!["S before", "S after", "S before", "S after"]);
}

#[test]
fn test_pause_publishes_and_blocks_updates() {
    let log = new_log();
    let events = new_log();
    let mut world = World::new("pausable");
    world.add_system(HealthSystem::new("S", 0, &log)).unwrap();
    for name in [names::WORLD_PAUSE, names::WORLD_RESUME] {
        let sink = Arc::clone(&events);
        world
            .events_mut()
            .subscribe(name, EventPriority::Normal, move |e: &WorldEvent| {
                sink.lock().unwrap().push(format!("{} {}", name, e.world));
            });
    }
    world.initialize();
    log.lock().unwrap().clear();

    world.pause();
    world.update(0.016);
    assert!(entries(&log).is_empty());
    world.resume();
    world.update(0.016);
    assert_eq!(entries(&log).len(), 2);
    assert_eq!(
        entries(&events),
        vec!["world.pause pausable", "world.resume pausable"]
    );
}

#[test]
fn test_keys_and_broadcast_reach_scripts() {
    let log = new_log();
    let mut world = World::new("input");
    let id = world.create_entity("listener");
    world
        .entity_mut(id)
        .unwrap()
        .add_script(Recorder { log: Arc::clone(&log) })
        .unwrap();
    world.initialize();

    let echoes = new_log();
    let sink = Arc::clone(&echoes);
    world
        .events_mut()
        .subscribe("echo", EventPriority::Normal, move |s: &String| {
            sink.lock().unwrap().push(s.clone());
        });

    world.key_down("KeyW");
    world.key_down("KeyW");
    assert!(world.input().is_key_down("keyw"));
    world.key_up("KeyW");
    world.broadcast_event("door.open", &serde_json::json!({ "id": 4 }));

    assert_eq!(
        entries(&log),
        vec!["down KeyW", "up KeyW", r#"door.open {"id":4}"#]
    );
    assert_eq!(entries(&echoes), vec![r#"{"id":4}"#]);
}

#[test]
fn test_destroy_then_reinitialize() {
    let log = new_log();
    let mut world = World::new("again");
    world.add_system(HealthSystem::new("S", 0, &log)).unwrap();
    entity_with_health(&mut world, "e");
    world.initialize();
    world.destroy();

    assert!(!world.is_initialized());
    assert_eq!(world.entity_count(), 0);
    assert!(entries(&log).contains(&"S destroy".to_string()));

    world.add_system(HealthSystem::new("S", 0, &log)).unwrap();
    world.initialize();
    assert!(world.is_initialized());
    world.run_frame(0.016);
    assert!(entries(&log).ends_with(&["S before".to_string(), "S after".to_string()]));
}
