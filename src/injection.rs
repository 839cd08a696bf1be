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

//! Typed system parameters resolved from a `World` reference.
//!
//! `Res`/`ResMut` borrow a resource out of the world's registry; `Local`
//! holds per-system state that a system stores as a plain struct field
//! (systems are long-lived boxed trait objects, so a `Local<T>` field
//! already persists across invocations without any scheduler bookkeeping).
//! Anything beyond these falls to a named `InjectionResolver`, registered
//! with the `Scheduler` and looked up by name at call sites that need it.

use std::any::Any;
use std::ops::{Deref, DerefMut};

use crate::error::{EcsError, Result};
use crate::world::World;

/// Shared borrow of resource `T`. Construct with [`Res::fetch`].
pub struct Res<'w, T> {
    value: &'w T,
}

impl<'w, T: Send + Sync + 'static> Res<'w, T> {
    pub fn fetch(world: &'w World) -> Result<Self> {
        world
            .resource::<T>()
            .map(|value| Self { value })
            .ok_or_else(|| EcsError::UnknownResource(std::any::type_name::<T>().to_string()))
    }
}

impl<'w, T> Deref for Res<'w, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.value
    }
}

/// Exclusive borrow of resource `T`. Construct with [`ResMut::fetch`].
pub struct ResMut<'w, T> {
    value: &'w mut T,
}

impl<'w, T: Send + Sync + 'static> ResMut<'w, T> {
    pub fn fetch(world: &'w mut World) -> Result<Self> {
        world
            .resource_mut::<T>()
            .map(|value| Self { value })
            .ok_or_else(|| EcsError::UnknownResource(std::any::type_name::<T>().to_string()))
    }
}

impl<'w, T> Deref for ResMut<'w, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.value
    }
}

impl<'w, T> DerefMut for ResMut<'w, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

/// Per-system state, meant to live as a field on the system's own struct.
/// `Local::new` just wraps the default; systems read/write it like any
/// other field between `update` calls.
#[derive(Debug, Clone)]
pub struct Local<T>(pub T);

impl<T: Default> Default for Local<T> {
    fn default() -> Self {
        Self(T::default())
    }
}

impl<T> Deref for Local<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Local<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// Named, type-erased injection, for parameters the built-in `Res`/`Local`
/// shapes don't cover. Registered on a `Scheduler` and invoked by name
/// immediately before a system or event handler runs.
pub trait InjectionResolver: Send + Sync {
    fn resolve(&self, world: &mut World) -> Result<Box<dyn Any + Send + Sync>>;
}

impl<F> InjectionResolver for F
where
    F: Fn(&mut World) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync,
{
    fn resolve(&self, world: &mut World) -> Result<Box<dyn Any + Send + Sync>> {
        self(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn res_and_res_mut_roundtrip() {
        let mut world = World::new();
        world.insert_resource(7u32);

        assert_eq!(*Res::<u32>::fetch(&world).unwrap(), 7);

        *ResMut::<u32>::fetch(&mut world).unwrap() += 1;
        assert_eq!(*Res::<u32>::fetch(&world).unwrap(), 8);
    }

    #[test]
    fn missing_resource_fails() {
        let world = World::new();
        assert!(Res::<u32>::fetch(&world).is_err());
    }

    #[test]
    fn local_persists_as_a_plain_field() {
        let mut counter: Local<u32> = Local::default();
        *counter += 1;
        *counter += 1;
        assert_eq!(*counter, 2);
    }

    #[test]
    fn custom_resolver_runs_as_a_closure() {
        let resolver: &dyn InjectionResolver = &(|_world: &mut World| {
            Ok(Box::new(42u32) as Box<dyn Any + Send + Sync>)
        });
        let mut world = World::new();
        let boxed = resolver.resolve(&mut world).unwrap();
        assert_eq!(*boxed.downcast::<u32>().unwrap(), 42);
    }
}
