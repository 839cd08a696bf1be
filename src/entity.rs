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

//! Entity identifiers and location metadata.
//!
//! Ids are monotonic and never reused within a world's lifetime. `NONE` is a
//! reserved sentinel equal to zero, distinct from any allocated id.

use std::num::NonZeroU64;

/// Unique entity identifier. Never reused once issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntityId(Option<NonZeroU64>);

impl EntityId {
    /// Reserved "no entity" sentinel, equal to the zero value.
    pub const NONE: EntityId = EntityId(None);

    fn from_nonzero(n: NonZeroU64) -> Self {
        EntityId(Some(n))
    }

    /// The underlying integer value (`0` for `NONE`).
    pub fn value(self) -> u64 {
        self.0.map_or(0, NonZeroU64::get)
    }

    /// `false` only for the `NONE` sentinel.
    pub fn is_some(self) -> bool {
        self.0.is_some()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.value())
    }
}

/// Entity location in archetype (archetype_id, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: usize,
    pub archetype_row: usize,
}

/// Monotonic id source. Ids reserved for a command-buffer spawn that is
/// later skipped are still never reissued.
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocate the next id, starting at 1.
    pub fn next(&mut self) -> EntityId {
        let value = self.next;
        self.next = self
            .next
            .checked_add(1)
            .expect("entity id space exhausted");
        EntityId::from_nonzero(NonZeroU64::new(value).expect("allocator invariant violated"))
    }

    /// Number of ids issued so far.
    pub fn issued_count(&self) -> u64 {
        self.next - 1
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_starts_at_one_and_is_monotonic() {
        let mut alloc = IdAllocator::new();
        let e1 = alloc.next();
        let e2 = alloc.next();
        let e3 = alloc.next();
        assert_eq!(e1.value(), 1);
        assert_eq!(e2.value(), 2);
        assert_eq!(e3.value(), 3);
    }

    #[test]
    fn none_is_zero_and_distinct_from_allocated_ids() {
        assert_eq!(EntityId::NONE.value(), 0);
        assert!(!EntityId::NONE.is_some());

        let mut alloc = IdAllocator::new();
        let e1 = alloc.next();
        assert_ne!(e1, EntityId::NONE);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut alloc = IdAllocator::new();
        let mut seen: Vec<EntityId> = (0..100).map(|_| alloc.next()).collect();
        let total = seen.len();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), total);
    }
}
