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
//! Raycast queries through the physics system

use approx::assert_relative_eq;
use sim_runtime::ecs::{EntityId, World};
use sim_runtime::math::DVec3;
use sim_runtime::physics::{BodyDesc, BodyKind, PhysicsBody, PhysicsSystem, RayFilter, Shape};

fn static_sphere(world: &mut World, name: &str, z: f64) -> EntityId {
    let id = world.create_entity(name);
    let mut entity = world.entity_mut(id).unwrap();
    entity.transform_mut().position = DVec3::new(0.0, 0.0, z);
    entity
        .add_component(PhysicsBody::fixed(Shape::Sphere { radius: 1.0 }))
        .unwrap();
    id
}

fn world_with_physics() -> World {
    let mut world = World::new("rays");
    world.add_system(PhysicsSystem::new()).unwrap();
    world
}

#[test]
fn test_empty_world_misses() {
    let world = world_with_physics();
    let physics = world.system::<PhysicsSystem>().unwrap();
    assert!(physics
        .raycast_first(DVec3::ZERO, DVec3::new(0.0, 0.0, 100.0))
        .is_none());
    assert!(physics
        .raycast_all(DVec3::ZERO, DVec3::new(0.0, 0.0, 100.0), &RayFilter::default())
        .is_empty());
}

#[test]
fn test_closest_hit_maps_to_entity() {
    let mut world = world_with_physics();
    let near = static_sphere(&mut world, "near", 5.0);
    static_sphere(&mut world, "far", 12.0);
    world.initialize();

    let physics = world.system::<PhysicsSystem>().unwrap();
    let hit = physics
        .raycast_first(DVec3::ZERO, DVec3::new(0.0, 0.0, 100.0))
        .unwrap();
    assert_eq!(hit.entity, Some(near));
    assert_eq!(physics.body_of(near), Some(hit.body));
    assert_relative_eq!(hit.distance, 4.0, epsilon = 1e-9);
    assert_relative_eq!(hit.point.z, 4.0, epsilon = 1e-9);
    assert_relative_eq!(hit.normal.z, -1.0, epsilon = 1e-9);
}

#[test]
fn test_all_hits_sorted_by_distance() {
    let mut world = world_with_physics();
    // registered far-to-near
    let far = static_sphere(&mut world, "far", 20.0);
    let mid = static_sphere(&mut world, "mid", 10.0);
    let near = static_sphere(&mut world, "near", 3.0);
    world.initialize();

    let physics = world.system::<PhysicsSystem>().unwrap();
    let hits = physics.raycast_all(DVec3::ZERO, DVec3::new(0.0, 0.0, 50.0), &RayFilter::default());
    let order: Vec<Option<EntityId>> = hits.iter().map(|h| h.entity).collect();
    assert_eq!(order, vec![Some(near), Some(mid), Some(far)]);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[test]
fn test_segment_stops_short() {
    let mut world = world_with_physics();
    static_sphere(&mut world, "target", 10.0);
    world.initialize();
    let physics = world.system::<PhysicsSystem>().unwrap();
    assert!(physics
        .raycast_first(DVec3::ZERO, DVec3::new(0.0, 0.0, 8.0))
        .is_none());
    assert!(physics
        .raycast_first(DVec3::ZERO, DVec3::new(0.0, 0.0, 9.5))
        .is_some());
}

#[test]
fn test_unowned_body_hit_has_no_entity() {
    let mut world = world_with_physics();
    world.initialize();
    let physics = world.system_mut::<PhysicsSystem>().unwrap();
    let mut desc = BodyDesc::new(
        Shape::Box {
            half_extents: DVec3::new(10.0, 0.5, 10.0),
        },
        BodyKind::Static,
    );
    desc.pose.position = DVec3::new(0.0, -0.5, 0.0);
    let ground = physics.add_body(&desc);

    let hit = physics
        .raycast_first(DVec3::new(1.0, 5.0, 1.0), DVec3::new(1.0, -5.0, 1.0))
        .unwrap();
    assert_eq!(hit.body, ground);
    assert_eq!(hit.entity, None);
    assert_relative_eq!(hit.point.y, 0.0, epsilon = 1e-9);
    assert_relative_eq!(hit.normal.y, 1.0, epsilon = 1e-9);
}

#[test]
fn test_filter_excludes_body_and_triggers() {
    let mut world = world_with_physics();
    let near = static_sphere(&mut world, "near", 3.0);
    let far = static_sphere(&mut world, "far", 9.0);
    let sensor = world.create_entity("sensor");
    {
        let mut entity = world.entity_mut(sensor).unwrap();
        entity.transform_mut().position = DVec3::new(0.0, 0.0, 1.5);
        entity
            .add_component(PhysicsBody::fixed(Shape::Sphere { radius: 0.25 }).as_trigger())
            .unwrap();
    }
    world.initialize();

    let physics = world.system::<PhysicsSystem>().unwrap();
    let filter = RayFilter {
        skip_triggers: true,
        exclude: physics.body_of(near),
        ..RayFilter::default()
    };
    let hit = physics
        .raycast(DVec3::ZERO, DVec3::new(0.0, 0.0, 50.0), &filter)
        .unwrap();
    assert_eq!(hit.entity, Some(far));

    let unfiltered = physics.raycast_first(DVec3::ZERO, DVec3::new(0.0, 0.0, 50.0)).unwrap();
    assert_eq!(unfiltered.entity, Some(sensor));
}

#[test]
fn test_degenerate_ray_is_a_miss() {
    let mut world = world_with_physics();
    static_sphere(&mut world, "target", 0.0);
    world.initialize();
    let physics = world.system::<PhysicsSystem>().unwrap();
    let origin = DVec3::new(0.0, 0.0, -5.0);
    assert!(physics.raycast_first(origin, origin).is_none());
    assert!(physics
        .raycast_all(origin, DVec3::new(f64::NAN, 0.0, 0.0), &RayFilter::default())
        .is_empty());
}
