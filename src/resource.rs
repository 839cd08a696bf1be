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

//! Resource registry: a process-wide singleton keyed by type.
//!
//! Backs `World`'s `Res<T>`/`Local<T>` injections and the core resources
//! (`EntitiesDeleted`, `ComponentEntities`, `ComponentUpdates`, `WorldTick`,
//! `LoopControl`, `CommandBuffer`) inserted by `World::new`.

use std::any::{Any, TypeId};

use ahash::AHashMap;

/// Type-keyed singleton store. Insertion order is not observable.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
        }
    }

    /// Insert or overwrite the resource of type `R`.
    pub fn set<R: Send + Sync + 'static>(&mut self, value: R) {
        self.entries.insert(TypeId::of::<R>(), Box::new(value));
    }

    /// Borrow the resource of type `R`, if present.
    pub fn get<R: Send + Sync + 'static>(&self) -> Option<&R> {
        self.entries
            .get(&TypeId::of::<R>())
            .and_then(|b| b.downcast_ref::<R>())
    }

    /// Mutably borrow the resource of type `R`, if present.
    pub fn get_mut<R: Send + Sync + 'static>(&mut self) -> Option<&mut R> {
        self.entries
            .get_mut(&TypeId::of::<R>())
            .and_then(|b| b.downcast_mut::<R>())
    }

    /// Whether a resource of type `R` is present.
    pub fn has<R: Send + Sync + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<R>())
    }

    /// Remove and return the resource of type `R`, if present.
    pub fn delete<R: Send + Sync + 'static>(&mut self) -> Option<R> {
        self.entries
            .remove(&TypeId::of::<R>())
            .and_then(|b| b.downcast::<R>().ok())
            .map(|boxed| *boxed)
    }

    /// Remove every resource.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of distinct resource types currently stored.
    pub fn size(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Score(u32);

    #[test]
    fn set_get_has_delete_roundtrip() {
        let mut registry = ResourceRegistry::new();
        assert!(!registry.has::<Score>());

        registry.set(Score(10));
        assert!(registry.has::<Score>());
        assert_eq!(registry.get::<Score>(), Some(&Score(10)));

        registry.get_mut::<Score>().unwrap().0 += 5;
        assert_eq!(registry.get::<Score>(), Some(&Score(15)));

        let removed = registry.delete::<Score>();
        assert_eq!(removed, Some(Score(15)));
        assert!(!registry.has::<Score>());
    }

    #[test]
    fn clear_removes_everything() {
        let mut registry = ResourceRegistry::new();
        registry.set(Score(1));
        registry.set(1u32);
        assert_eq!(registry.size(), 2);
        registry.clear();
        assert_eq!(registry.size(), 0);
    }
}
