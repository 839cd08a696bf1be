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

//! Archetype storage with row allocation and removal.
//!
//! Each archetype is a structure-of-arrays: one contiguous byte buffer per
//! component type, indexed by row. Row deletion is a swap-remove, so row
//! order is stable within a sequence of operations but not across them.

use std::any::TypeId;
use std::cell::Cell;

use rustc_hash::FxHashMap;

use crate::component::Component;
use crate::entity::EntityId;

/// Component signature, sorted so two equal sets compare equal regardless
/// of declaration order.
pub type ArchetypeSignature = Vec<TypeId>;

/// Archetype: Structure of Arrays storage
pub struct Archetype {
    signature: ArchetypeSignature,
    entities: Vec<EntityId>,
    components: Vec<ComponentColumn>,
    component_indices: FxHashMap<TypeId, usize>,
    columns_initialized: bool,
    iter_depth: Cell<u32>,
}

impl Archetype {
    /// Create new archetype
    pub fn new(signature: ArchetypeSignature) -> Self {
        Self {
            signature,
            entities: Vec::new(),
            components: Vec::new(),
            component_indices: FxHashMap::default(),
            columns_initialized: false,
            iter_depth: Cell::new(0),
        }
    }

    /// Whether a query iterator currently holds a live borrow of this
    /// archetype's columns. Structural mutation must check this first.
    pub fn is_iterating(&self) -> bool {
        self.iter_depth.get() > 0
    }

    /// Record that a query iterator has started borrowing this archetype.
    /// Uses interior mutability since iterators are handed `NonNull`
    /// pointers rather than a borrow the type system can track.
    pub(crate) fn enter_iteration(&self) {
        self.iter_depth.set(self.iter_depth.get() + 1);
    }

    /// Record that a query iterator dropped its borrow of this archetype.
    pub(crate) fn exit_iteration(&self) {
        self.iter_depth.set(self.iter_depth.get().saturating_sub(1));
    }

    /// Get signature
    pub fn signature(&self) -> &ArchetypeSignature {
        &self.signature
    }

    /// Allocate a row for `entity`, reserving one uninitialized slot in
    /// every column stamped with `tick` as both its added and changed tick.
    /// Callers must follow up by writing every column through the pointers
    /// handed back from [`ComponentColumn::push_uninit`] (via
    /// `get_column_mut_by_index`) before the row is observed by a query.
    pub fn allocate_row(&mut self, entity: EntityId, tick: u32) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.components {
            column.push_uninit(tick);
        }
        row
    }

    /// Remove row and return the entity that was swapped into its place, if
    /// any. Drops the removed row's component values and keeps every column
    /// in sync with the entity list via swap-remove.
    ///
    /// # Safety
    /// Caller must ensure `row` is a valid index within this archetype.
    pub unsafe fn remove_row(&mut self, row: usize) -> Option<EntityId> {
        if row >= self.entities.len() {
            return None;
        }

        self.entities.swap_remove(row);
        for column in &mut self.components {
            column.swap_remove(row);
        }

        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Get column immutably
    pub fn get_column(&self, type_id: TypeId) -> Option<&ComponentColumn> {
        let idx = *self.component_indices.get(&type_id)?;
        self.components.get(idx)
    }

    /// Get column by index
    pub fn get_column_by_index(&self, index: usize) -> Option<&ComponentColumn> {
        self.components.get(index)
    }

    /// Get column mutably
    pub fn get_column_mut(&mut self, type_id: TypeId) -> Option<&mut ComponentColumn> {
        let idx = *self.component_indices.get(&type_id)?;
        self.components.get_mut(idx)
    }

    /// Get column index for a component type
    pub fn column_index(&self, type_id: TypeId) -> Option<usize> {
        self.component_indices.get(&type_id).copied()
    }

    /// Get component column by precomputed index
    pub fn get_column_mut_by_index(&mut self, index: usize) -> Option<&mut ComponentColumn> {
        self.components.get_mut(index)
    }

    /// Get mutable slice of component columns
    pub(crate) fn components_mut(&mut self) -> &mut [ComponentColumn] {
        &mut self.components
    }

    /// Reserve space for additional rows
    pub fn reserve_rows(&mut self, additional: usize) {
        if self.entities.capacity() - self.entities.len() < additional {
            self.entities.reserve(additional);
            for column in &mut self.components {
                column.data.reserve(additional * column.item_size);
                column.added_ticks.reserve(additional);
                column.changed_ticks.reserve(additional);
            }
        }
    }

    /// Get all entities
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Register component column
    pub fn register_component<T: Component>(&mut self) {
        let type_id = TypeId::of::<T>();
        if !self.component_indices.contains_key(&type_id) {
            let idx = self.components.len();
            self.components.push(ComponentColumn::new::<T>());
            self.component_indices.insert(type_id, idx);
        }
    }

    /// Whether this archetype has a column for `type_id`.
    pub fn has_column(&self, type_id: TypeId) -> bool {
        self.component_indices.contains_key(&type_id)
    }

    /// Add a column produced by `ComponentColumn::clone_empty` under `type_id`,
    /// used when migrating an entity to an archetype with one extra or one
    /// fewer component type.
    pub fn add_column_raw(&mut self, type_id: TypeId, column: ComponentColumn) {
        if !self.component_indices.contains_key(&type_id) {
            let idx = self.components.len();
            self.components.push(column);
            self.component_indices.insert(type_id, idx);
        }
    }

    /// Check if all component columns have been initialized for this signature
    pub fn columns_initialized(&self) -> bool {
        self.columns_initialized
    }

    /// Mark columns as initialized
    pub fn mark_columns_initialized(&mut self) {
        self.columns_initialized = true;
    }
}

/// Type-erased component column with per-row change tracking.
pub struct ComponentColumn {
    data: Vec<u8>,
    item_size: usize,
    drop_fn: Option<unsafe fn(*mut u8)>,
    added_ticks: Vec<u32>,
    changed_ticks: Vec<u32>,
}

impl ComponentColumn {
    /// Create new column for type T
    pub fn new<T: Component>() -> Self {
        Self {
            data: Vec::new(),
            item_size: std::mem::size_of::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe {
                    std::ptr::drop_in_place(ptr as *mut T);
                })
            } else {
                None
            },
            added_ticks: Vec::new(),
            changed_ticks: Vec::new(),
        }
    }

    /// Append one uninitialized slot stamped with `tick`, returning a
    /// pointer the caller must write a valid value of the column's type
    /// into before the row is read back.
    pub fn push_uninit(&mut self, tick: u32) -> *mut u8 {
        let index = self.len();
        let offset = index * self.item_size;
        self.data.resize(offset + self.item_size, 0);
        self.added_ticks.push(tick);
        self.changed_ticks.push(tick);
        unsafe { self.data.as_mut_ptr().add(offset) }
    }

    /// Raw mutable pointer to an existing row, growing backing storage if
    /// needed. Does not touch change tracking; prefer `get_mut` for writes
    /// systems should be able to observe via `Changed<T>`.
    pub fn get_ptr_mut(&mut self, index: usize) -> *mut u8 {
        let offset = index * self.item_size;
        if offset + self.item_size > self.data.len() {
            self.data.resize(offset + self.item_size, 0);
        }
        unsafe { self.data.as_mut_ptr().add(offset) }
    }

    /// Get component at index
    pub fn get<T: Component>(&self, index: usize) -> Option<&T> {
        let offset = index * self.item_size;
        if offset + self.item_size > self.data.len() {
            return None;
        }
        Some(unsafe { &*(self.data.as_ptr().add(offset) as *const T) })
    }

    /// Get mutable component at index, stamping the row as changed at `tick`.
    pub fn get_mut<T: Component>(&mut self, index: usize, tick: u32) -> Option<&mut T> {
        let offset = index * self.item_size;
        if offset + self.item_size > self.data.len() {
            return None;
        }
        self.set_changed_tick(index, tick);
        Some(unsafe { &mut *(self.data.as_mut_ptr().add(offset) as *mut T) })
    }

    /// Mark a row as changed at `tick` without otherwise touching its value.
    pub fn set_changed_tick(&mut self, index: usize, tick: u32) {
        if index < self.changed_ticks.len() {
            self.changed_ticks[index] = tick;
        }
    }

    /// Whether any row in this column changed after `tick`.
    pub fn changed_since(&self, tick: u32) -> bool {
        self.changed_ticks.iter().any(|&t| t > tick)
    }

    /// Whether any row in this column was added after `tick`.
    pub fn added_since(&self, tick: u32) -> bool {
        self.added_ticks.iter().any(|&t| t > tick)
    }

    pub(crate) fn changed_tick_at(&self, index: usize) -> Option<u32> {
        self.changed_ticks.get(index).copied()
    }

    pub(crate) fn added_tick_at(&self, index: usize) -> Option<u32> {
        self.added_ticks.get(index).copied()
    }

    pub(crate) fn changed_ticks_slice(&self) -> &[u32] {
        &self.changed_ticks
    }

    pub(crate) fn added_ticks_slice(&self) -> &[u32] {
        &self.added_ticks
    }

    /// Drop and swap-remove the row at `index`, mirroring `Vec::swap_remove`
    /// semantics so the column stays aligned with the entity list.
    pub fn swap_remove(&mut self, index: usize) {
        let len = self.len();
        if index >= len {
            return;
        }
        let last = len - 1;
        let offset = index * self.item_size;

        if let Some(drop_fn) = self.drop_fn {
            unsafe { drop_fn(self.data.as_mut_ptr().add(offset)) };
        }

        if index != last {
            unsafe {
                let src = self.data.as_ptr().add(last * self.item_size);
                let dst = self.data.as_mut_ptr().add(offset);
                std::ptr::copy_nonoverlapping(src, dst, self.item_size);
            }
            self.added_ticks[index] = self.added_ticks[last];
            self.changed_ticks[index] = self.changed_ticks[last];
        }

        self.data.truncate(last * self.item_size);
        self.added_ticks.truncate(last);
        self.changed_ticks.truncate(last);
    }

    /// Create an empty column of the same component type, for use when
    /// migrating an entity to a different archetype.
    pub fn clone_empty(&self) -> Self {
        Self {
            data: Vec::new(),
            item_size: self.item_size,
            drop_fn: self.drop_fn,
            added_ticks: Vec::new(),
            changed_ticks: Vec::new(),
        }
    }

    /// Number of components
    pub fn len(&self) -> usize {
        if self.item_size == 0 {
            self.added_ticks.len()
        } else {
            self.data.len() / self.item_size
        }
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Byte size of one element, for raw-copy migrations between archetypes.
    pub fn get_item_size(&self) -> usize {
        self.item_size
    }
}

impl Drop for ComponentColumn {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop_fn {
            let count = self.len();
            for i in 0..count {
                let offset = i * self.item_size;
                unsafe {
                    drop_fn(self.data.as_mut_ptr().add(offset));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archetype_creation() {
        let sig = vec![TypeId::of::<i32>(), TypeId::of::<f32>()];
        let arch = Archetype::new(sig.clone());
        assert_eq!(arch.signature(), &sig);
        assert_eq!(arch.len(), 0);
    }

    #[test]
    fn swap_remove_keeps_columns_aligned_with_entities() {
        let mut arch = Archetype::new(vec![TypeId::of::<i32>()]);
        arch.register_component::<i32>();

        for (i, value) in [10i32, 20, 30].into_iter().enumerate() {
            let row = arch.allocate_row(EntityId::default(), 0);
            assert_eq!(row, i);
            let col = arch.get_column_mut_by_index(0).unwrap();
            unsafe {
                *(col.get_ptr_mut(row) as *mut i32) = value;
            }
        }

        // Remove the middle row (index 1); last row (index 2, value 30) swaps in.
        unsafe {
            arch.remove_row(1);
        }

        let col = arch.get_column_by_index(0).unwrap();
        assert_eq!(arch.len(), 2);
        assert_eq!(col.get::<i32>(0), Some(&10));
        assert_eq!(col.get::<i32>(1), Some(&30));
    }

    #[test]
    fn changed_since_reflects_writes_after_given_tick() {
        let mut arch = Archetype::new(vec![TypeId::of::<i32>()]);
        arch.register_component::<i32>();
        let row = arch.allocate_row(EntityId::default(), 1);
        {
            let col = arch.get_column_mut_by_index(0).unwrap();
            unsafe {
                *(col.get_ptr_mut(row) as *mut i32) = 1;
            }
        }

        let col = arch.get_column_by_index(0).unwrap();
        assert!(col.changed_since(0));
        assert!(!col.changed_since(1));

        let col = arch.get_column_mut_by_index(0).unwrap();
        col.get_mut::<i32>(row, 5);
        assert!(col.changed_since(1));
    }
}
