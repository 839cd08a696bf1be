use std::collections::HashSet;

use archetype_ecs::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
}

#[test]
fn single_parent_child_cascade() {
    let mut world = World::new();

    let parent = world.spawn((Position { x: 0.0 },));
    let child = world.spawn((ChildOf(parent),));

    assert_eq!(world.get_children(parent).unwrap(), vec![child]);
    assert_eq!(world.get_parent(child), Some(parent));

    world.despawn(parent).unwrap();

    assert!(!world.is_alive(parent));
    assert!(!world.is_alive(child));
}

#[test]
fn multiple_children_are_tracked_and_cascade() {
    let mut world = World::new();

    let parent = world.spawn((Position { x: 0.0 },));
    let children: Vec<_> = (0..3)
        .map(|i| world.spawn((ChildOf(parent), Position { x: i as f32 })))
        .collect();

    let tracked: HashSet<_> = world.get_children(parent).unwrap().into_iter().collect();
    assert_eq!(tracked, children.iter().copied().collect());

    world.despawn(parent).unwrap();
    for child in children {
        assert!(!world.is_alive(child));
    }
}

#[test]
fn deep_chain_cascades_from_the_root() {
    let mut world = World::new();

    let root = world.spawn((Position { x: 0.0 },));
    let mut chain = vec![root];
    for _ in 0..9 {
        let parent = *chain.last().unwrap();
        chain.push(world.spawn((ChildOf(parent),)));
    }

    world.despawn(root).unwrap();

    for entity in chain {
        assert!(!world.is_alive(entity));
    }
}

#[test]
fn reparenting_moves_membership_between_children_sets() {
    let mut world = World::new();

    let parent_a = world.spawn((Position { x: 0.0 },));
    let parent_b = world.spawn((Position { x: 10.0 },));
    let child = world.spawn((ChildOf(parent_a),));

    assert_eq!(world.get_children(parent_a).unwrap(), vec![child]);

    world.remove_component::<ChildOf>(child).unwrap();
    world.add_component(child, ChildOf(parent_b)).unwrap();

    assert!(world.get_children(parent_a).unwrap_or_default().is_empty());
    assert_eq!(world.get_children(parent_b).unwrap(), vec![child]);

    world.despawn(parent_a).unwrap();
    assert!(world.is_alive(child), "child follows its current parent, not its former one");

    world.despawn(parent_b).unwrap();
    assert!(!world.is_alive(child));
}

#[test]
fn entity_with_no_parent_has_no_children_reported_on_it() {
    let mut world = World::new();
    let entity = world.spawn((Position { x: 5.0 },));
    assert_eq!(world.get_parent(entity), None);
    assert!(world.get_children(entity).is_none());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AssignedTo(EntityId);

impl Relation for AssignedTo {
    type Target = Assignees;
    const LINKED_SPAWN: bool = false;

    fn target(&self) -> EntityId {
        self.0
    }
}

#[derive(Debug, Default)]
struct Assignees {
    set: HashSet<EntityId>,
}

impl RelationshipTarget for Assignees {
    fn source_entities(&self) -> &HashSet<EntityId> {
        &self.set
    }

    fn source_entities_mut(&mut self) -> &mut HashSet<EntityId> {
        &mut self.set
    }
}

#[test]
fn non_linked_relation_unlinks_instead_of_cascading() {
    let mut world = World::new();
    world.register_relation::<AssignedTo>();

    let team = world.spawn((Position { x: 0.0 },));
    let worker = world.spawn((AssignedTo(team),));

    world.despawn(team).unwrap();

    assert!(world.is_alive(worker), "unlinked relation must not cascade-despawn its source");
    assert!(!world.has_component::<AssignedTo>(worker));
}
