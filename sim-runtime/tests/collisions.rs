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
//! Collision lifecycle tests
//!
//! Two kinematic spheres are moved through their entity transforms and
//! stepped one fixed sub-step at a time, so each overlap window is exact.

use sim_runtime::config::{PhysicsConfig, SteppingMode};
use sim_runtime::ecs::{Capability, EntityId, Script, ScriptContext, World};
use sim_runtime::math::DVec3;
use sim_runtime::physics::{PhysicsBody, PhysicsSystem, Shape};
use std::sync::{Arc, Mutex};

const DT: f64 = 1.0 / 60.0;

type Log = Arc<Mutex<Vec<String>>>;

struct ContactLog {
    log: Log,
}

impl Capability for ContactLog {
    const KEY: &'static str = "ContactLog";
}

impl Script for ContactLog {
    fn on_collision_enter(&mut self, ctx: &mut ScriptContext<'_>, other: EntityId) {
        self.record(ctx, "enter", other);
    }

    fn on_collision_stay(&mut self, ctx: &mut ScriptContext<'_>, other: EntityId) {
        self.record(ctx, "stay", other);
    }

    fn on_collision_exit(&mut self, ctx: &mut ScriptContext<'_>, other: EntityId) {
        self.record(ctx, "exit", other);
    }
}

impl ContactLog {
    fn record(&self, ctx: &ScriptContext<'_>, phase: &str, other: EntityId) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{} {} {}", ctx.entity.name(), phase, other));
    }
}

fn fixed_world() -> World {
    let mut world = World::new("contacts");
    let config = PhysicsConfig::default()
        .with_gravity([0.0, 0.0, 0.0])
        .with_stepping(SteppingMode::Fixed);
    world.add_system(PhysicsSystem::with_config(config)).unwrap();
    world
}

fn sphere(world: &mut World, name: &str, x: f64, log: &Log) -> EntityId {
    let id = world.create_entity(name);
    let mut entity = world.entity_mut(id).unwrap();
    entity.transform_mut().position = DVec3::new(x, 0.0, 0.0);
    entity
        .add_component(PhysicsBody::kinematic(Shape::Sphere { radius: 0.5 }))
        .unwrap();
    entity.add_script(ContactLog { log: Arc::clone(log) }).unwrap();
    id
}

fn move_to(world: &mut World, id: EntityId, x: f64) {
    world.entity_mut(id).unwrap().transform_mut().position = DVec3::new(x, 0.0, 0.0);
}

fn count(log: &Log, needle: &str) -> usize {
    log.lock().unwrap().iter().filter(|line| line.contains(needle)).count()
}

#[test]
fn test_overlap_window_yields_enter_stays_exit() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut world = fixed_world();
    let a = sphere(&mut world, "a", 0.0, &log);
    let b = sphere(&mut world, "b", 5.0, &log);
    world.initialize();

    world.fixed_update(DT);
    assert!(log.lock().unwrap().is_empty());

    const K: usize = 5;
    move_to(&mut world, b, 0.8);
    for _ in 0..K {
        world.fixed_update(DT);
    }
    move_to(&mut world, b, 5.0);
    world.fixed_update(DT);
    world.fixed_update(DT);

    for name in ["a ", "b "] {
        let own: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.starts_with(name))
            .cloned()
            .collect();
        assert_eq!(own.iter().filter(|l| l.contains(" enter ")).count(), 1);
        assert_eq!(own.iter().filter(|l| l.contains(" stay ")).count(), K - 1);
        assert_eq!(own.iter().filter(|l| l.contains(" exit ")).count(), 1);
        assert!(own[0].contains(" enter "));
        assert!(own[K].contains(" exit "));
    }
    assert!(log.lock().unwrap().contains(&format!("a enter {}", b)));
    assert!(log.lock().unwrap().contains(&format!("b enter {}", a)));
}

#[test]
fn test_colliding_set_tracks_partner() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut world = fixed_world();
    let a = sphere(&mut world, "a", 0.0, &log);
    let b = sphere(&mut world, "b", 0.6, &log);
    world.initialize();
    world.fixed_update(DT);

    let body = world.get_entity(a).unwrap().component::<PhysicsBody>().unwrap();
    assert!(body.is_colliding_with(b));
    assert_eq!(body.collision_count(), 1);
    let contacts: Vec<_> = world.system::<PhysicsSystem>().unwrap().active_contacts().collect();
    assert_eq!(contacts.len(), 1);

    move_to(&mut world, b, 3.0);
    world.fixed_update(DT);
    let body = world.get_entity(a).unwrap().component::<PhysicsBody>().unwrap();
    assert_eq!(body.collision_count(), 0);
}

#[test]
fn test_removed_partner_triggers_exit() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut world = fixed_world();
    sphere(&mut world, "a", 0.0, &log);
    let b = sphere(&mut world, "b", 0.6, &log);
    world.initialize();
    world.fixed_update(DT);
    assert_eq!(count(&log, "a enter"), 1);

    assert!(world.destroy_entity(b));
    world.fixed_update(DT);
    assert_eq!(count(&log, &format!("a exit {}", b)), 1);
    // the destroyed entity hears nothing more
    assert_eq!(count(&log, "b exit"), 0);

    world.fixed_update(DT);
    assert_eq!(count(&log, "a "), 2);
}

#[test]
fn test_removed_body_component_triggers_exit() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut world = fixed_world();
    let a = sphere(&mut world, "a", 0.0, &log);
    let b = sphere(&mut world, "b", 0.6, &log);
    world.initialize();
    world.fixed_update(DT);

    world.entity_mut(b).unwrap().remove_component::<PhysicsBody>();
    world.fixed_update(DT);
    assert_eq!(count(&log, &format!("a exit {}", b)), 1);
    assert_eq!(count(&log, &format!("b exit {}", a)), 0);
    assert_eq!(world.system::<PhysicsSystem>().unwrap().body_count(), 1);
}

#[test]
fn test_filtered_bodies_never_touch() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut world = fixed_world();
    for (name, x, group, mask) in [("a", 0.0, 0b01, 0b01), ("b", 0.5, 0b10, 0b10)] {
        let id = world.create_entity(name);
        let mut entity = world.entity_mut(id).unwrap();
        entity.transform_mut().position = DVec3::new(x, 0.0, 0.0);
        entity
            .add_component(PhysicsBody::kinematic(Shape::Sphere { radius: 0.5 }).with_collision_filter(group, mask))
            .unwrap();
        entity.add_script(ContactLog { log: Arc::clone(&log) }).unwrap();
    }
    world.initialize();
    for _ in 0..3 {
        world.fixed_update(DT);
    }
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_inactive_entity_neither_touches_nor_hears() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut world = fixed_world();
    let a = sphere(&mut world, "a", 0.0, &log);
    let b = sphere(&mut world, "b", 0.6, &log);
    world.entity_mut(a).unwrap().set_active(false);
    world.initialize();
    for _ in 0..3 {
        world.fixed_update(DT);
    }
    assert!(log.lock().unwrap().is_empty());
    assert!(world.system::<PhysicsSystem>().unwrap().is_suspended(a));

    world.entity_mut(a).unwrap().set_active(true);
    world.fixed_update(DT);
    assert_eq!(count(&log, &format!("a enter {}", b)), 1);
    assert_eq!(count(&log, &format!("b enter {}", a)), 1);
}
