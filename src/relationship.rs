// Copyright 2024 Saptak Santra
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

//! Typed directed relationship edges between entities.
//!
//! A relationship type `R` is a component carried by the *source* entity
//! pointing at a *target* entity. Its paired `Target` component lives on
//! the target and holds the inverse index (`source_entities`). Generalizes
//! the parent/children pattern so any `(source_type, target_type,
//! linked_spawn)` triple can be registered, following the `Relation`/`ChildOf`
//! split used by other archetype ECS crates in this space.

use std::any::TypeId;
use std::collections::HashSet;

use ahash::AHashMap;
use tracing::warn;

use crate::component::Component;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::world::World;

/// A relationship component carried by the source entity.
pub trait Relation: Component {
    /// Paired component living on the target, holding the inverse index.
    type Target: RelationshipTarget;

    /// When `true`, deleting the target cascades deletion to every source.
    /// When `false`, deleting the target only strips the relation component
    /// from each source.
    const LINKED_SPAWN: bool;

    /// The entity this relation points at.
    fn target(&self) -> EntityId;
}

/// The inverse-index component living on a relationship's target entity.
pub trait RelationshipTarget: Component + Default {
    fn source_entities(&self) -> &HashSet<EntityId>;
    fn source_entities_mut(&mut self) -> &mut HashSet<EntityId>;
}

fn on_add<R: Relation>(world: &mut World, source: EntityId) -> Result<()> {
    let target = world
        .get_component::<R>(source)
        .map(|r| r.target())
        .ok_or_else(|| EcsError::RelationshipMismatch("source lost its relation component".into()))?;

    if !world.is_alive(target) {
        return Err(EcsError::RelationshipMismatch(
            "relation target is not alive".into(),
        ));
    }

    if !world.has_component::<R::Target>(target) {
        world.add_component(target, R::Target::default())?;
    }

    world
        .get_component_mut::<R::Target>(target)
        .expect("just ensured presence")
        .source_entities_mut()
        .insert(source);
    Ok(())
}

fn on_remove<R: Relation>(world: &mut World, source: EntityId) -> Result<()> {
    let target = match world.get_component::<R>(source) {
        Some(r) => r.target(),
        None => return Ok(()),
    };
    if let Some(target_component) = world.get_component_mut::<R::Target>(target) {
        target_component.source_entities_mut().remove(&source);
    }
    Ok(())
}

fn take_sources<R: Relation>(world: &mut World, target: EntityId) -> Vec<EntityId> {
    world
        .get_component_mut::<R::Target>(target)
        .map(|t| t.source_entities_mut().drain().collect())
        .unwrap_or_default()
}

fn remove_relation<R: Relation>(world: &mut World, source: EntityId) -> Result<()> {
    world.remove_component::<R>(source)
}

type HookFn = fn(&mut World, EntityId) -> Result<()>;
type TakeSourcesFn = fn(&mut World, EntityId) -> Vec<EntityId>;

struct RelationshipEntry {
    linked_spawn: bool,
    target_type: TypeId,
    on_add: HookFn,
    on_remove: HookFn,
    take_sources: TakeSourcesFn,
    remove_relation: HookFn,
}

/// Outcome of deleting a relationship's target: entities to cascade-delete
/// and entities that should only have the relation stripped.
pub struct CascadeOutcome {
    pub to_despawn: Vec<EntityId>,
    pub to_unlink: Vec<(EntityId, TypeId)>,
}

/// Registry of `{source_type, target_type, linked_spawn}` relationship
/// declarations, keyed by the relation component's `TypeId`.
#[derive(Default)]
pub struct RelationshipRegistry {
    by_relation: AHashMap<TypeId, RelationshipEntry>,
    by_target: AHashMap<TypeId, Vec<TypeId>>,
}

impl RelationshipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register relation type `R`. Registering the same type twice replaces
    /// the prior declaration.
    pub fn register<R: Relation>(&mut self) {
        let relation_type = TypeId::of::<R>();
        let target_type = TypeId::of::<R::Target>();

        self.by_relation.insert(
            relation_type,
            RelationshipEntry {
                linked_spawn: R::LINKED_SPAWN,
                target_type,
                on_add: on_add::<R>,
                on_remove: on_remove::<R>,
                take_sources: take_sources::<R>,
                remove_relation: remove_relation::<R>,
            },
        );
        self.by_target
            .entry(target_type)
            .or_default()
            .push(relation_type);
    }

    pub fn is_relation(&self, type_id: TypeId) -> bool {
        self.by_relation.contains_key(&type_id)
    }

    fn relation_types_targeting(&self, target_type: TypeId) -> &[TypeId] {
        self.by_target
            .get(&target_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Run a relation type's `on_add` hook. Called right after
    /// `component_add` installs a component whose type is registered.
    pub fn run_on_add(world: &mut World, relation_type: TypeId, source: EntityId) -> Result<()> {
        let hook = world
            .relationships()
            .by_relation
            .get(&relation_type)
            .map(|e| e.on_add);
        match hook {
            Some(hook) => hook(world, source),
            None => Ok(()),
        }
    }

    /// Run a relation type's `on_remove` hook. Called right before
    /// `component_remove` (or a despawn) drops a component whose type is
    /// registered, while the component value is still readable.
    pub fn run_on_remove(world: &mut World, relation_type: TypeId, source: EntityId) -> Result<()> {
        let hook = world
            .relationships()
            .by_relation
            .get(&relation_type)
            .map(|e| e.on_remove);
        match hook {
            Some(hook) => hook(world, source),
            None => Ok(()),
        }
    }

    /// For every relation type targeting any component type present on
    /// `target`, drain its `source_entities` and classify each source as
    /// cascade-despawn (`linked_spawn = true`) or unlink-only.
    pub fn collect_cascade(
        world: &mut World,
        target: EntityId,
        target_component_types: &[TypeId],
    ) -> CascadeOutcome {
        let mut to_despawn = Vec::new();
        let mut to_unlink = Vec::new();

        let relation_types: Vec<TypeId> = target_component_types
            .iter()
            .flat_map(|t| {
                world
                    .relationships()
                    .relation_types_targeting(*t)
                    .to_vec()
            })
            .collect();

        for relation_type in relation_types {
            let (linked_spawn, take_sources, remove_relation) = {
                let entry = world
                    .relationships()
                    .by_relation
                    .get(&relation_type)
                    .expect("relation_types_targeting only yields registered types");
                (entry.linked_spawn, entry.take_sources, entry.remove_relation)
            };

            let sources = take_sources(world, target);
            for source in sources {
                if linked_spawn {
                    to_despawn.push(source);
                } else {
                    to_unlink.push((source, relation_type));
                    if let Err(err) = remove_relation(world, source) {
                        warn!(
                            error = %err,
                            ?source,
                            "failed to strip relation component after target despawn"
                        );
                    }
                }
            }
        }

        CascadeOutcome {
            to_despawn,
            to_unlink,
        }
    }
}

/// Built-in `ChildOf` relation: the default hierarchy, `linked_spawn = true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildOf(pub EntityId);

impl Relation for ChildOf {
    type Target = Children;
    const LINKED_SPAWN: bool = true;

    fn target(&self) -> EntityId {
        self.0
    }
}

/// Inverse index of `ChildOf`: the set of entities pointing at this one.
#[derive(Debug, Clone, Default)]
pub struct Children {
    source_entities: HashSet<EntityId>,
}

impl Children {
    pub fn is_empty(&self) -> bool {
        self.source_entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.source_entities.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        self.source_entities.iter()
    }
}

impl RelationshipTarget for Children {
    fn source_entities(&self) -> &HashSet<EntityId> {
        &self.source_entities
    }

    fn source_entities_mut(&mut self) -> &mut HashSet<EntityId> {
        &mut self.source_entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_records_target_mapping() {
        let mut registry = RelationshipRegistry::new();
        registry.register::<ChildOf>();
        assert!(registry.is_relation(TypeId::of::<ChildOf>()));
        assert_eq!(
            registry.relation_types_targeting(TypeId::of::<Children>()),
            &[TypeId::of::<ChildOf>()]
        );
    }
}
