//! Spawn, query and relationship basics.

use archetype_ecs::prelude::*;

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug)]
struct Health(u32);

fn main() {
    let mut world = World::new();

    let entity1 = world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0, y: 0.5 }));
    println!("Spawned entity {:?}", entity1);

    let entity2 = world.spawn((
        Position { x: 10.0, y: 20.0 },
        Velocity { x: -1.0, y: 2.0 },
        Health(100),
    ));
    println!("Spawned entity {:?}", entity2);

    let entity3 = world.spawn((Position { x: 5.0, y: 5.0 },));
    println!("Spawned entity {:?}", entity3);

    let child = world.spawn((ChildOf(entity1), Position { x: 1.0, y: 1.0 }));
    println!(
        "{:?} is a child of {:?}, children set: {:?}",
        child,
        entity1,
        world.get_children(entity1)
    );

    println!("\nEntities with Position, no Velocity:");
    for (entity, position) in world.query::<(Entity, &Position, Without<Velocity>)>().iter() {
        println!("  {:?} -> {:?}", entity, position);
    }

    world.despawn(entity2).unwrap();
    println!("\nDespawned {:?}; alive = {}", entity2, world.is_alive(entity2));

    println!("\nArchetype summary:");
    for (i, archetype) in world.archetypes().iter().enumerate() {
        println!(
            "  archetype {}: {} entities, {} component types",
            i,
            archetype.len(),
            archetype.signature().len()
        );
    }
}
