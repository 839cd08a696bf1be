//! End-to-end walkthroughs of the documented runtime behaviors, one test
//! per scenario (spawn/despawn, archetype moves, relationship cascades,
//! command buffer ordering, schedule order, and run-criteria gating).

use std::collections::HashMap;

use archetype_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: i32,
    y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    dx: i32,
}

#[derive(Debug, Clone, Copy)]
struct A;
#[derive(Debug, Clone, Copy)]
struct B;
#[derive(Debug, Clone, Copy)]
struct C;

fn positions(world: &World) -> HashMap<EntityId, Position> {
    world
        .query::<(Entity, &Position)>()
        .iter()
        .map(|(e, p)| (e, *p))
        .collect()
}

#[test]
fn scenario_a_spawn_and_despawn() {
    let mut world = World::new();

    let e1 = world.spawn((Position { x: 1, y: 2 },));
    let e2 = world.spawn((Position { x: 3, y: 4 }, Velocity { dx: 1 }));

    let all = positions(&world);
    assert_eq!(all.len(), 2);
    assert_eq!(all[&e1], Position { x: 1, y: 2 });
    assert_eq!(all[&e2], Position { x: 3, y: 4 });

    let without_velocity: Vec<_> = world
        .query::<(Entity, &Position, Without<Velocity>)>()
        .iter()
        .map(|(e, p, _)| (e, *p))
        .collect();
    assert_eq!(without_velocity, vec![(e1, Position { x: 1, y: 2 })]);

    world.despawn(e1).unwrap();
    world.flush_commands().unwrap();

    assert!(!world.is_alive(e1));
    let remaining = positions(&world);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[&e2], Position { x: 3, y: 4 });
}

#[test]
fn scenario_b_archetype_move_on_add_and_remove() {
    let mut world = World::new();

    let e1 = world.spawn((A,));
    world.add_component(e1, B).unwrap();
    world.add_component(e1, C).unwrap();

    assert_eq!(world.query::<(Entity, &A, &B, &C)>().iter().count(), 1);

    world.remove_component::<B>(e1).unwrap();

    assert_eq!(world.query::<(Entity, &A, &B, &C)>().iter().count(), 0);
    assert_eq!(world.query::<(Entity, &A, &C)>().iter().count(), 1);
}

#[test]
fn scenario_c_relationship_cascade() {
    let mut world = World::new();

    let parent = world.spawn((Position { x: 0, y: 0 },));
    let c1 = world.spawn((ChildOf(parent),));
    let c2 = world.spawn((ChildOf(parent),));

    let children: std::collections::HashSet<_> =
        world.get_children(parent).unwrap().into_iter().collect();
    assert_eq!(children, [c1, c2].into_iter().collect());

    world.despawn(parent).unwrap();

    assert!(!world.is_alive(parent));
    assert!(!world.is_alive(c1));
    assert!(!world.is_alive(c2));
}

#[test]
fn scenario_d_command_buffer_ordering() {
    let mut world = World::new();

    let e3 = world.reserve_entity_id();
    world.commands().spawn(e3, (A,));
    world.commands().add_components(e3, (B,));

    assert!(!world.is_alive(e3));

    world.flush_commands().unwrap();

    assert!(world.is_alive(e3));
    assert!(world.has_component::<A>(e3));
    assert!(world.has_component::<B>(e3));
}

struct LoggingSystem {
    name: &'static str,
    order: i32,
}

impl System for LoggingSystem {
    fn name(&self) -> &'static str {
        self.name
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn update(&mut self, world: &mut World) -> Result<()> {
        world.resource_mut::<Vec<&'static str>>().unwrap().push(self.name);
        Ok(())
    }
}

#[test]
fn scenario_e_schedule_order() {
    let mut world = World::new();
    world.insert_resource::<Vec<&'static str>>(Vec::new());

    let mut scheduler = Scheduler::new().with_fixed_step(1.0);
    scheduler.add_system(SchedulePhase::Update, Box::new(LoggingSystem { name: "S2", order: 0 }));
    scheduler.add_system(SchedulePhase::Update, Box::new(LoggingSystem { name: "S1", order: -1 }));

    scheduler.run_frame(&mut world, 1.0).unwrap();

    assert_eq!(world.resource::<Vec<&'static str>>().unwrap().as_slice(), &["S1", "S2"]);
}

struct Damage {
    amount: u32,
}

struct NeverRuns;
impl EventHandler<Damage> for NeverRuns {
    fn run_criteria(&self, _world: &World) -> bool {
        false
    }
    fn update(&mut self, args: &Damage, world: &mut World) -> Result<()> {
        *world.resource_mut::<u32>().unwrap() += args.amount;
        Ok(())
    }
}

#[test]
fn scenario_f_run_criteria_gates_event_handlers() {
    let mut world = World::new();
    world.insert_resource(0u32);

    world.subscribe_event::<Damage, _>(NeverRuns);
    world.publish_event(Damage { amount: 99 });
    world.publish_event(Damage { amount: 1 });
    world.process_events().unwrap();

    assert_eq!(*world.resource::<u32>().unwrap(), 0);
}
