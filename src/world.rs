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

//! World: central entity and archetype storage.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashSet;
use std::ptr::NonNull;

use ahash::AHashMap;
use tracing::info_span;

use crate::archetype::{Archetype, ArchetypeSignature};
use crate::command::CommandBuffer;
use crate::component::{Bundle, Component, ComponentDependency, MAX_BUNDLE_COMPONENTS};
use crate::entity::{EntityId, EntityLocation, IdAllocator};
use crate::error::{EcsError, Result};
use crate::event_bus::{Event, EventBus, EventHandler};
use crate::prefab::{PrefabHandle, PrefabSpawner};
use crate::query::{Query, QueryFetch, QueryFetchMut, QueryFilter, QueryMut};
use crate::relationship::{ChildOf, Children, Relation, RelationshipRegistry};
use crate::resource::ResourceRegistry;

/// Ids pending despawn, flushed at the end of the current tick's wavefront.
#[derive(Debug, Default, Clone)]
pub struct EntitiesDeleted(pub HashSet<EntityId>);

/// For each component type, the set of entities currently carrying it.
/// Kept in sync by `spawn`/`add_components`/`remove_component`/`despawn`.
#[derive(Debug, Default, Clone)]
pub struct ComponentEntities(pub AHashMap<TypeId, HashSet<EntityId>>);

/// For each component type, whether any instance was written this tick.
/// Cleared at the start of every tick by `World::increment_tick`.
#[derive(Debug, Default, Clone)]
pub struct ComponentUpdates(pub HashSet<TypeId>);

/// Monotonic tick counter, mirrored from `World::tick` into the resource
/// registry so systems can read it via `Res<WorldTick>`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorldTick(pub u32);

/// Polled by the scheduler between phases to begin shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopControl {
    pub stop: bool,
}

/// Central ECS world: entity ids, archetype storage, relationships,
/// resources, and the deferred command buffer.
pub struct World {
    entity_locations: AHashMap<EntityId, EntityLocation>,
    id_allocator: IdAllocator,

    archetypes: Vec<Archetype>,
    archetype_index: AHashMap<ArchetypeSignature, usize>,

    tick: u32,

    resources: ResourceRegistry,
    relationships: RelationshipRegistry,
    component_dependencies: AHashMap<TypeId, ComponentDependency>,
    prefab_spawner: Option<Box<dyn PrefabSpawner>>,
    command_buffer: CommandBuffer,

    query_cache: RefCell<AHashMap<crate::query::QuerySignature, crate::query::CachedQueryResult>>,
}

impl World {
    /// Create a new, empty world with the core resources (`EntitiesDeleted`,
    /// `ComponentEntities`, `ComponentUpdates`, `WorldTick`, `LoopControl`)
    /// already inserted, and the built-in `ChildOf`/`Children` relationship
    /// registered.
    pub fn new() -> Self {
        let mut world = Self {
            entity_locations: AHashMap::with_capacity(64),
            id_allocator: IdAllocator::new(),

            archetypes: Vec::with_capacity(64),
            archetype_index: AHashMap::with_capacity(64),

            tick: 1, // tick 0 is reserved so change detection always passes for new things

            resources: ResourceRegistry::new(),
            relationships: RelationshipRegistry::new(),
            component_dependencies: AHashMap::new(),
            prefab_spawner: None,
            command_buffer: CommandBuffer::new(),

            query_cache: RefCell::new(AHashMap::with_capacity(32)),
        };

        world.get_or_create_archetype_with(&ArchetypeSignature::new(), |arch| {
            arch.mark_columns_initialized();
        });

        world.relationships.register::<ChildOf>();

        world.resources.set(EntitiesDeleted::default());
        world.resources.set(ComponentEntities::default());
        world.resources.set(ComponentUpdates::default());
        world.resources.set(WorldTick(world.tick));
        world.resources.set(LoopControl::default());
        world.resources.set(EventBus::new());

        world
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Advance the world tick and clear the per-tick `ComponentUpdates`
    /// dirty set. Panics on overflow, since wraparound would corrupt change
    /// detection comparisons.
    pub fn increment_tick(&mut self) {
        self.tick = self
            .tick
            .checked_add(1)
            .unwrap_or_else(|| panic!("world tick overflow at {}", self.tick));
        self.resources.set(WorldTick(self.tick));
        if let Some(updates) = self.resources.get_mut::<ComponentUpdates>() {
            updates.0.clear();
        }
    }

    fn mark_component_dirty(&mut self, type_id: TypeId, entities: impl IntoIterator<Item = EntityId>) {
        if let Some(updates) = self.resources.get_mut::<ComponentUpdates>() {
            updates.0.insert(type_id);
        }
        if let Some(tracker) = self.resources.get_mut::<ComponentEntities>() {
            let set = tracker.0.entry(type_id).or_default();
            for entity in entities {
                set.insert(entity);
            }
        }
    }

    fn untrack_component(&mut self, type_id: TypeId, entity: EntityId) {
        if let Some(tracker) = self.resources.get_mut::<ComponentEntities>() {
            if let Some(set) = tracker.0.get_mut(&type_id) {
                set.remove(&entity);
            }
        }
    }

    // ========== Entity lifecycle ==========

    /// Reserve the next entity id without spawning anything. Used by the
    /// command buffer and by `PrefabSpawner` callers that need to refer to
    /// an entity before it exists.
    pub fn reserve_entity_id(&mut self) -> EntityId {
        self.id_allocator.next()
    }

    /// Spawn a new entity with the given bundle of components, reserving a
    /// fresh id from the allocator.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> EntityId {
        let id = self.id_allocator.next();
        self.spawn_with_id(id, bundle)
            .expect("freshly allocated id is never a duplicate");
        id
    }

    /// Spawn under a caller-supplied id (typically reserved earlier via
    /// `reserve_entity_id`). Fails with `DuplicateEntity` if `id` is already
    /// assigned.
    pub fn spawn_with_id<B: Bundle>(&mut self, id: EntityId, bundle: B) -> Result<EntityId> {
        if self.entity_locations.contains_key(&id) {
            return Err(EcsError::DuplicateEntity);
        }

        let type_ids = B::type_ids();
        let span = info_span!("world.spawn", bundle_components = type_ids.len());
        let _guard = span.enter();

        let arch_id = self.get_or_create_archetype_with(&type_ids, |archetype| {
            B::register_components(archetype);
            archetype.mark_columns_initialized();
        });
        let archetype = &mut self.archetypes[arch_id];
        let row = archetype.allocate_row(id, self.tick);

        let mut column_indices = [usize::MAX; MAX_BUNDLE_COMPONENTS];
        let mut column_count = 0;
        for &type_id in type_ids.iter() {
            if let Some(idx) = archetype.column_index(type_id) {
                column_indices[column_count] = idx;
                column_count += 1;
            }
        }

        let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
        for (i, &col_idx) in column_indices.iter().take(column_count).enumerate() {
            if let Some(column) = archetype.get_column_mut_by_index(col_idx) {
                ptrs[i] = column.get_ptr_mut(row);
            }
        }

        unsafe {
            bundle.write_components(&ptrs[..column_count]);
        }

        self.entity_locations.insert(
            id,
            EntityLocation {
                archetype_id: arch_id,
                archetype_row: row,
            },
        );

        self.mark_component_dirty_for_bundle(&type_ids, id);
        for &type_id in type_ids.iter() {
            if self.relationships.is_relation(type_id) {
                RelationshipRegistry::run_on_add(self, type_id, id)?;
            }
        }
        Ok(id)
    }

    fn mark_component_dirty_for_bundle(&mut self, type_ids: &[TypeId], entity: EntityId) {
        for &type_id in type_ids {
            self.mark_component_dirty(type_id, [entity]);
        }
    }

    /// Spawn multiple entities with the same bundle type in a batch.
    pub fn spawn_batch<B, I>(&mut self, bundles: I) -> Result<Vec<EntityId>>
    where
        B: Bundle,
        I: IntoIterator<Item = B>,
        I::IntoIter: ExactSizeIterator,
    {
        let bundles = bundles.into_iter();
        let count = bundles.len();

        if count > 10_000_000 {
            return Err(EcsError::BatchTooLarge);
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let type_ids = B::type_ids();
        let archetype_id = self.get_or_create_archetype_with(&type_ids, |archetype| {
            B::register_components(archetype);
            archetype.mark_columns_initialized();
        });

        let archetype = &mut self.archetypes[archetype_id];
        archetype.reserve_rows(count);

        let mut column_indices = [usize::MAX; MAX_BUNDLE_COMPONENTS];
        let mut col_count = 0;
        for &tid in type_ids.iter() {
            if let Some(idx) = archetype.column_index(tid) {
                column_indices[col_count] = idx;
                col_count += 1;
            }
        }

        let mut entity_ids = Vec::with_capacity(count);
        for bundle in bundles {
            let id = self.id_allocator.next();
            let archetype = &mut self.archetypes[archetype_id];
            let row = archetype.allocate_row(id, self.tick);

            let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
            for (i, &col_idx) in column_indices.iter().take(col_count).enumerate() {
                if let Some(column) = archetype.get_column_mut_by_index(col_idx) {
                    ptrs[i] = column.get_ptr_mut(row);
                }
            }
            unsafe {
                bundle.write_components(&ptrs[..col_count]);
            }

            self.entity_locations.insert(
                id,
                EntityLocation {
                    archetype_id,
                    archetype_row: row,
                },
            );
            entity_ids.push(id);
        }

        for &entity in &entity_ids {
            self.mark_component_dirty_for_bundle(&type_ids, entity);
            for &type_id in type_ids.iter() {
                if self.relationships.is_relation(type_id) {
                    RelationshipRegistry::run_on_add(self, type_id, entity)?;
                }
            }
        }

        Ok(entity_ids)
    }

    /// Whether `entity` is currently alive (has not been despawned).
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entity_locations.contains_key(&entity)
    }

    /// Despawn `entity` immediately, cascading through relationships
    /// (`ChildOf`/`Children` and any other registered relation types) per
    /// each relation's `linked_spawn` policy. Each entity in the resulting
    /// delete wavefront is visited at most once, tracked via
    /// `EntitiesDeleted`.
    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        if !self.is_alive(entity) {
            return Err(EcsError::UnknownEntity);
        }

        let mut visited: HashSet<EntityId> = HashSet::new();
        let mut wavefront = vec![entity];

        while let Some(current) = wavefront.pop() {
            if !visited.insert(current) || !self.is_alive(current) {
                continue;
            }

            let location = self.entity_locations[&current];
            if self.archetypes[location.archetype_id].is_iterating() {
                return Err(EcsError::ReentrantStructuralMutation);
            }
            let component_types: Vec<TypeId> = self.archetypes[location.archetype_id]
                .signature()
                .clone();

            for &type_id in &component_types {
                if self.relationships.is_relation(type_id) {
                    let _ = RelationshipRegistry::run_on_remove(self, type_id, current);
                }
            }

            let outcome = RelationshipRegistry::collect_cascade(self, current, &component_types);
            wavefront.extend(outcome.to_despawn);

            for &type_id in &component_types {
                self.untrack_component(type_id, current);
            }
            self.remove_entity_row(current)?;

            if let Some(deleted) = self.resources.get_mut::<EntitiesDeleted>() {
                deleted.0.insert(current);
            }
        }

        Ok(())
    }

    fn remove_entity_row(&mut self, entity: EntityId) -> Result<()> {
        let location = *self
            .entity_locations
            .get(&entity)
            .ok_or(EcsError::UnknownEntity)?;
        if self.archetypes[location.archetype_id].is_iterating() {
            return Err(EcsError::ReentrantStructuralMutation);
        }
        self.entity_locations.remove(&entity);
        let archetype = &mut self.archetypes[location.archetype_id];
        if let Some(swapped_entity) = unsafe { archetype.remove_row(location.archetype_row) } {
            if let Some(swapped_loc) = self.entity_locations.get_mut(&swapped_entity) {
                swapped_loc.archetype_row = location.archetype_row;
            }
        }
        Ok(())
    }

    pub fn get_entity_location(&self, entity: EntityId) -> Option<EntityLocation> {
        self.entity_locations.get(&entity).copied()
    }

    // ========== Component access ==========

    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let location = self.entity_locations.get(&entity)?;
        let archetype = self.archetypes.get(location.archetype_id)?;
        let column = archetype.get_column(TypeId::of::<T>())?;
        column.get::<T>(location.archetype_row)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let location = *self.entity_locations.get(&entity)?;
        let tick = self.tick;
        let archetype = self.archetypes.get_mut(location.archetype_id)?;
        let column = archetype.get_column_mut(TypeId::of::<T>())?;
        let value = column.get_mut::<T>(location.archetype_row, tick);
        if value.is_some() {
            self.mark_component_dirty(TypeId::of::<T>(), [entity]);
        }
        value
    }

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.entity_locations
            .get(&entity)
            .and_then(|loc| self.archetypes.get(loc.archetype_id))
            .map(|archetype| archetype.has_column(TypeId::of::<T>()))
            .unwrap_or(false)
    }

    /// Add a single component to an entity, moving it to a new archetype if
    /// the type is not already present. Overwrites in place if it is
    /// already present — no archetype move, but `ComponentUpdates` is still
    /// marked.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<()> {
        self.add_components(entity, (component,))
    }

    /// Add every component in `bundle` to an entity at once, moving it to
    /// the new archetype shape in a single transition. Types already
    /// present are overwritten in place.
    pub fn add_components<B: Bundle>(&mut self, entity: EntityId, bundle: B) -> Result<()> {
        let location = *self
            .entity_locations
            .get(&entity)
            .ok_or(EcsError::UnknownEntity)?;

        if self.archetypes[location.archetype_id].is_iterating() {
            return Err(EcsError::ReentrantStructuralMutation);
        }

        let type_ids = B::type_ids();
        let old_archetype = &self.archetypes[location.archetype_id];
        let already_present: bool = type_ids
            .iter()
            .all(|tid| old_archetype.has_column(*tid));

        if already_present {
            let archetype = &mut self.archetypes[location.archetype_id];
            let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
            for (i, &tid) in type_ids.iter().enumerate() {
                if let Some(col) = archetype.get_column_mut(tid) {
                    ptrs[i] = col.get_ptr_mut(location.archetype_row);
                }
            }
            unsafe {
                bundle.write_components(&ptrs[..type_ids.len()]);
            }
            self.mark_component_dirty_for_bundle(&type_ids, entity);
            for &type_id in type_ids.iter() {
                if self.relationships.is_relation(type_id) {
                    RelationshipRegistry::run_on_add(self, type_id, entity)?;
                }
            }
            return Ok(());
        }

        let mut new_signature = old_archetype.signature().clone();
        for &tid in type_ids.iter() {
            if !new_signature.contains(&tid) {
                new_signature.push(tid);
            }
        }

        let mut columns_to_add = Vec::with_capacity(new_signature.len());
        for &type_id in old_archetype.signature() {
            if let Some(col) = old_archetype.get_column(type_id) {
                columns_to_add.push((type_id, col.clone_empty()));
            }
        }

        let new_archetype_id = self.get_or_create_archetype_with(&new_signature, |archetype| {
            for (type_id, col) in columns_to_add.drain(..) {
                archetype.add_column_raw(type_id, col);
            }
            B::register_components(archetype);
            archetype.mark_columns_initialized();
        });

        self.move_entity(entity, location, new_archetype_id, |archetype, row| {
            let mut ptrs = [std::ptr::null_mut(); MAX_BUNDLE_COMPONENTS];
            for (i, &tid) in type_ids.iter().enumerate() {
                if let Some(col) = archetype.get_column_mut(tid) {
                    ptrs[i] = col.get_ptr_mut(row);
                }
            }
            unsafe {
                bundle.write_components(&ptrs[..type_ids.len()]);
            }
        })?;

        self.mark_component_dirty_for_bundle(&type_ids, entity);
        for &type_id in type_ids.iter() {
            if self.relationships.is_relation(type_id) {
                RelationshipRegistry::run_on_add(self, type_id, entity)?;
            }
        }
        Ok(())
    }

    /// Remove a component from an entity, moving it to a new archetype.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<()> {
        let old_location = *self
            .entity_locations
            .get(&entity)
            .ok_or(EcsError::UnknownEntity)?;
        let component_type_id = TypeId::of::<T>();

        if self.archetypes[old_location.archetype_id].is_iterating() {
            return Err(EcsError::ReentrantStructuralMutation);
        }

        let old_archetype = &self.archetypes[old_location.archetype_id];
        if !old_archetype.has_column(component_type_id) {
            return Err(EcsError::UnknownComponent);
        }

        if self.relationships.is_relation(component_type_id) {
            RelationshipRegistry::run_on_remove(self, component_type_id, entity)?;
        }

        let mut new_signature = old_archetype.signature().clone();
        new_signature.retain(|tid| *tid != component_type_id);

        let mut columns_to_add = Vec::with_capacity(new_signature.len());
        for &type_id in &new_signature {
            if let Some(col) = old_archetype.get_column(type_id) {
                columns_to_add.push((type_id, col.clone_empty()));
            }
        }

        let new_archetype_id = self.get_or_create_archetype_with(&new_signature, |new_arch| {
            for (type_id, col) in columns_to_add {
                new_arch.add_column_raw(type_id, col);
            }
            new_arch.mark_columns_initialized();
        });

        self.move_entity(entity, old_location, new_archetype_id, |_, _| {})?;
        self.untrack_component(component_type_id, entity);
        if let Some(updates) = self.resources.get_mut::<ComponentUpdates>() {
            updates.0.insert(component_type_id);
        }
        Ok(())
    }

    /// Optional dependency metadata attached to a component type, consulted
    /// by the scheduler before running a system that declares it required.
    pub fn register_component_dependency<T: Component>(&mut self, dependency: ComponentDependency) {
        self.component_dependencies.insert(TypeId::of::<T>(), dependency);
    }

    pub fn component_dependency(&self, type_id: TypeId) -> Option<&ComponentDependency> {
        self.component_dependencies.get(&type_id)
    }

    // ========== Queries ==========

    pub fn get_components<'a, Q>(&'a self, entity: EntityId) -> Option<<Q as QueryFetch<'a>>::Item>
    where
        Q: QueryFetch<'a>,
    {
        let location = self.entity_locations.get(&entity)?;
        let archetype = self.archetypes.get(location.archetype_id)?;
        let state = Q::prepare(archetype, 0)?;
        unsafe { Q::fetch(&state, location.archetype_row) }
    }

    pub fn get_components_mut<'a, Q>(
        &'a mut self,
        entity: EntityId,
    ) -> Option<<Q as QueryFetchMut<'a>>::Item>
    where
        Q: QueryFetchMut<'a>,
    {
        let location = self.entity_locations.get(&entity)?;
        let tick = self.tick;
        let archetype = self.archetypes.get_mut(location.archetype_id)?;
        let mut state = Q::prepare(archetype, 0, tick)?;
        unsafe { Q::fetch(&mut state, location.archetype_row) }
    }

    pub fn query_mut<'w, Q>(&'w mut self) -> QueryMut<'w, Q>
    where
        Q: QueryFilter + QueryFetchMut<'w>,
    {
        QueryMut::new(self)
    }

    pub fn query<'w, Q>(&'w self) -> Query<'w, Q>
    where
        Q: QueryFilter + QueryFetch<'w>,
    {
        Query::new(self)
    }

    fn move_entity<F>(
        &mut self,
        entity: EntityId,
        old_loc: EntityLocation,
        new_archetype_id: usize,
        on_new_location: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Archetype, usize),
    {
        if old_loc.archetype_id == new_archetype_id {
            return Ok(());
        }

        let tick = self.tick;
        let (old_arch, new_arch) = if old_loc.archetype_id < new_archetype_id {
            let (left, right) = self.archetypes.split_at_mut(new_archetype_id);
            (&mut left[old_loc.archetype_id], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(old_loc.archetype_id);
            (&mut right[0], &mut left[new_archetype_id])
        };

        let new_row = new_arch.allocate_row(entity, tick);

        unsafe {
            let new_sig = new_arch.signature().to_vec();
            for &type_id in &new_sig {
                if let Some(old_col) = old_arch.get_column_mut(type_id) {
                    if let Some(new_col) = new_arch.get_column_mut(type_id) {
                        let src = old_col.get_ptr_mut(old_loc.archetype_row);
                        let dst = new_col.get_ptr_mut(new_row);
                        std::ptr::copy_nonoverlapping(src, dst, old_col.get_item_size());
                    }
                }
            }
        }

        on_new_location(new_arch, new_row);

        unsafe {
            if let Some(swapped_entity) = old_arch.remove_row(old_loc.archetype_row) {
                if let Some(swapped_loc) = self.entity_locations.get_mut(&swapped_entity) {
                    swapped_loc.archetype_row = old_loc.archetype_row;
                }
            }
        }

        if let Some(loc) = self.entity_locations.get_mut(&entity) {
            loc.archetype_id = new_archetype_id;
            loc.archetype_row = new_row;
        }

        Ok(())
    }

    pub(crate) fn get_cached_query_indices<Q: QueryFilter>(&self) -> Vec<usize> {
        let sig = Q::signature();
        {
            let mut cache = self.query_cache.borrow_mut();
            if let Some(cached) = cache.get_mut(&sig) {
                cached.update(&self.archetypes);
                return cached.matches.to_vec();
            }
        }
        let cached = crate::query::CachedQueryResult::new(sig.clone(), &self.archetypes);
        let indices = cached.matches.to_vec();
        self.query_cache.borrow_mut().insert(sig, cached);
        indices
    }

    pub fn get_archetype(&self, id: usize) -> Option<&Archetype> {
        self.archetypes.get(id)
    }

    pub fn get_archetype_mut(&mut self, id: usize) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id)
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub(crate) fn archetype_ptr(&self, id: usize) -> Option<NonNull<Archetype>> {
        self.archetypes.get(id).map(NonNull::from)
    }

    /// # Safety
    /// Returned pointer is valid for the lifetime of the world. Caller must
    /// not alias it with another live mutable borrow of the same archetype.
    pub(crate) fn archetype_ptr_mut(&mut self, id: usize) -> Option<NonNull<Archetype>> {
        self.archetypes.get_mut(id).map(NonNull::from)
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entity_locations.len()
    }

    fn get_or_create_archetype_with<F>(&mut self, signature: &[TypeId], on_create: F) -> usize
    where
        F: FnOnce(&mut Archetype),
    {
        if self.archetypes.len() >= 10_000 {
            panic!("archetype limit exceeded (10,000) - possible archetype explosion");
        }

        let mut sorted_signature: ArchetypeSignature = signature.to_vec();
        sorted_signature.sort();

        if let Some(&id) = self.archetype_index.get(&sorted_signature) {
            return id;
        }

        let mut archetype = Archetype::new(sorted_signature.clone());
        on_create(&mut archetype);

        self.archetypes.push(archetype);
        let id = self.archetypes.len() - 1;
        self.archetype_index.insert(sorted_signature, id);
        id
    }

    pub fn memory_stats(&self) -> MemoryStats {
        let archetype_memory: usize = self
            .archetypes
            .iter()
            .map(|_| std::mem::size_of::<Archetype>())
            .sum();
        let entity_index_memory = self.entity_locations.capacity() * std::mem::size_of::<EntityLocation>();

        MemoryStats {
            entity_index_memory,
            archetype_memory,
            total_memory: archetype_memory + entity_index_memory,
        }
    }

    // ========== Resources ==========

    pub fn insert_resource<R: Send + Sync + 'static>(&mut self, resource: R) {
        self.resources.set(resource);
    }

    pub fn resource<R: Send + Sync + 'static>(&self) -> Option<&R> {
        self.resources.get::<R>()
    }

    pub fn resource_mut<R: Send + Sync + 'static>(&mut self) -> Option<&mut R> {
        self.resources.get_mut::<R>()
    }

    pub fn has_resource<R: Send + Sync + 'static>(&self) -> bool {
        self.resources.has::<R>()
    }

    pub fn remove_resource<R: Send + Sync + 'static>(&mut self) -> Option<R> {
        self.resources.delete::<R>()
    }

    // ========== Event bus ==========

    pub fn publish_event<E: Event>(&mut self, event: E) {
        if let Some(bus) = self.resources.get_mut::<EventBus>() {
            bus.publish(event);
        }
    }

    pub fn subscribe_event<E: Event, H: EventHandler<E> + 'static>(&mut self, handler: H) {
        if let Some(bus) = self.resources.get_mut::<EventBus>() {
            bus.subscribe::<E, H>(handler);
        }
    }

    /// Drain every queued event against its handlers. The bus is taken out
    /// of the resource registry for the duration of the call so handlers
    /// can freely borrow `self` by `&mut World`, then put back.
    pub fn process_events(&mut self) -> Result<()> {
        let mut bus = self.resources.delete::<EventBus>().unwrap_or_default();
        let result = bus.process(self);
        self.resources.set(bus);
        result
    }

    // ========== Relationships ==========

    pub(crate) fn relationships(&self) -> &RelationshipRegistry {
        &self.relationships
    }

    /// Register a new relationship type `R`. Call once, typically from a
    /// plugin's `build`.
    pub fn register_relation<R: Relation>(&mut self) {
        self.relationships.register::<R>();
    }

    pub fn get_parent(&self, entity: EntityId) -> Option<EntityId> {
        self.get_component::<ChildOf>(entity).map(|c| c.0)
    }

    pub fn get_children(&self, entity: EntityId) -> Option<Vec<EntityId>> {
        self.get_component::<Children>(entity)
            .map(|c| c.iter().copied().collect())
    }

    // ========== Prefabs ==========

    pub fn register_prefab_spawner(&mut self, spawner: Box<dyn PrefabSpawner>) {
        self.prefab_spawner = Some(spawner);
    }

    /// Instantiate a prefab immediately. Fails with `EcsError::NotImplemented`
    /// if no `PrefabSpawner` is registered.
    pub fn prefab_spawn_direct(
        &mut self,
        id: EntityId,
        handle: PrefabHandle,
        parent: Option<EntityId>,
    ) -> Result<()> {
        match self.prefab_spawner.take() {
            Some(spawner) => {
                let result = spawner.spawn(self, id, handle, parent);
                self.prefab_spawner = Some(spawner);
                result
            }
            None => Err(EcsError::NotImplemented("prefab_spawn_direct")),
        }
    }

    /// Queue a prefab instantiation for the next `flush_commands`, reserving
    /// the instantiated entity's id now.
    pub fn prefab_spawn_defer(&mut self, handle: PrefabHandle, parent: Option<EntityId>) -> EntityId {
        let id = self.id_allocator.next();
        self.command_buffer.prefab_spawn(id, handle, parent);
        id
    }

    // ========== Command buffer ==========

    pub fn commands(&mut self) -> &mut CommandBuffer {
        &mut self.command_buffer
    }

    /// Apply every command queued on the world's own buffer, logging and
    /// skipping failures.
    pub fn flush_commands(&mut self) -> Result<()> {
        let span = info_span!("world.flush_commands", queued = self.command_buffer.len());
        let _guard = span.enter();
        let mut buffer = std::mem::take(&mut self.command_buffer);
        buffer.apply(self);
        Ok(())
    }

    /// Apply an externally-built command buffer (e.g. one a system
    /// accumulated locally before handing it back).
    pub fn flush_external_commands(&mut self, mut buffer: CommandBuffer) -> Result<()> {
        buffer.apply(self);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entity_locations.clear();
        self.archetypes.clear();
        self.archetype_index.clear();
        self.query_cache.borrow_mut().clear();
        self.get_or_create_archetype_with(&ArchetypeSignature::new(), |arch| {
            arch.mark_columns_initialized();
        });
        if let Some(tracker) = self.resources.get_mut::<ComponentEntities>() {
            tracker.0.clear();
        }
        if let Some(deleted) = self.resources.get_mut::<EntitiesDeleted>() {
            deleted.0.clear();
        }
    }

    pub fn query_cache_stats(&self) -> QueryCacheStats {
        let cache = self.query_cache.borrow();
        let total_cached_archetypes: usize = cache.values().map(|cached| cached.matches.len()).sum();
        QueryCacheStats {
            num_cached_queries: cache.len(),
            total_cached_archetypes,
            total_archetypes: self.archetypes.len(),
        }
    }

    pub fn clear_query_cache(&self) {
        self.query_cache.borrow_mut().clear();
    }
}

/// Statistics about the query cache.
#[derive(Debug, Clone, Copy)]
pub struct QueryCacheStats {
    pub num_cached_queries: usize,
    pub total_cached_archetypes: usize,
    pub total_archetypes: usize,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory statistics for the world.
#[derive(Debug, Clone)]
pub struct MemoryStats {
    pub entity_index_memory: usize,
    pub archetype_memory: usize,
    pub total_memory: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_despawn_roundtrip() {
        let mut world = World::new();
        let entity = world.spawn((42i32,));
        assert!(world.is_alive(entity));

        world.despawn(entity).unwrap();
        assert!(!world.is_alive(entity));
    }

    #[test]
    fn despawning_unknown_entity_fails() {
        let mut world = World::new();
        let entity = world.spawn((1i32,));
        world.despawn(entity).unwrap();
        assert!(matches!(world.despawn(entity), Err(EcsError::UnknownEntity)));
    }

    #[test]
    fn archetype_segregation() {
        let mut world = World::new();
        struct A;
        struct B;
        struct C;

        world.spawn((A, B));
        world.spawn((A, C));
        world.spawn((B, C));

        assert!(world.archetype_count() >= 4);
    }

    #[test]
    fn add_and_remove_component_moves_archetype() {
        let mut world = World::new();
        let entity = world.spawn((1i32,));
        assert!(!world.has_component::<f32>(entity));

        world.add_component(entity, 2.0f32).unwrap();
        assert!(world.has_component::<f32>(entity));
        assert_eq!(world.get_component::<f32>(entity), Some(&2.0));

        world.remove_component::<i32>(entity).unwrap();
        assert!(!world.has_component::<i32>(entity));
        assert!(world.has_component::<f32>(entity));
    }

    #[test]
    fn despawn_cascades_to_linked_spawn_children() {
        let mut world = World::new();
        let parent = world.spawn((1i32,));
        let child = world.spawn((ChildOf(parent),));

        assert_eq!(world.get_children(parent).unwrap(), vec![child]);

        world.despawn(parent).unwrap();
        assert!(!world.is_alive(child));
    }

    #[test]
    fn resources_roundtrip() {
        let mut world = World::new();
        assert!(world.has_resource::<WorldTick>());
        world.insert_resource(42u32);
        assert_eq!(world.resource::<u32>(), Some(&42));
        assert_eq!(world.remove_resource::<u32>(), Some(42));
        assert!(!world.has_resource::<u32>());
    }

    #[test]
    fn increment_tick_clears_component_updates() {
        let mut world = World::new();
        let entity = world.spawn((1i32,));
        let _ = world.get_component_mut::<i32>(entity);
        assert!(world.resource::<ComponentUpdates>().unwrap().0.contains(&TypeId::of::<i32>()));

        world.increment_tick();
        assert!(world.resource::<ComponentUpdates>().unwrap().0.is_empty());
    }

    #[test]
    fn reentrant_structural_mutation_is_rejected() {
        let mut world = World::new();
        let entity = world.spawn((1i32,));
        let archetype_id = world.get_entity_location(entity).unwrap().archetype_id;
        world.get_archetype(archetype_id).unwrap().enter_iteration();

        let err = world.add_component(entity, 1.0f32);
        assert!(matches!(err, Err(EcsError::ReentrantStructuralMutation)));

        world.get_archetype(archetype_id).unwrap().exit_iteration();
        world.add_component(entity, 1.0f32).unwrap();
    }
}
