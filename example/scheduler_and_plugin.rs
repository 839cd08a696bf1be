//! A plugin that registers a phase-scheduled system and an event handler.

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

struct Collided {
    entity: EntityId,
}

struct MovementSystem;
impl System for MovementSystem {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn update(&mut self, world: &mut World) -> Result<()> {
        let moves: Vec<_> = world
            .query::<(Entity, &Position, &Velocity)>()
            .iter()
            .map(|(e, p, v)| (e, Position { x: p.x + v.x, y: p.y + v.y }))
            .collect();
        for (entity, new_position) in moves {
            *world.get_component_mut::<Position>(entity).unwrap() = new_position;
            if new_position.x > 10.0 {
                world.publish_event(Collided { entity });
            }
        }
        Ok(())
    }
}

struct CollisionLogger;
impl EventHandler<Collided> for CollisionLogger {
    fn update(&mut self, args: &Collided, _world: &mut World) -> Result<()> {
        println!("{:?} crossed the boundary", args.entity);
        Ok(())
    }
}

struct MovementPlugin;
impl Plugin for MovementPlugin {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn build(&self, world: &mut World, scheduler: &mut Scheduler) -> bool {
        world.subscribe_event::<Collided, _>(CollisionLogger);
        scheduler.add_system(SchedulePhase::Update, Box::new(MovementSystem));
        true
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let mut world = World::new();
    world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { x: 6.0, y: 0.0 }));

    let mut registry = PluginRegistry::new();
    registry.add(Box::new(MovementPlugin));
    let mut schedulers = registry.build_all(&mut world).expect("plugin build failed");

    for frame in 0..3 {
        println!("frame {frame}");
        for (_name, scheduler) in schedulers.iter_mut() {
            scheduler.run_frame(&mut world, 1.0 / 60.0).unwrap();
        }
        world.process_events().unwrap();
    }
}
