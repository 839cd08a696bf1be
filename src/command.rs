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

//! Deferred structural mutations, queued during iteration and applied by
//! `World::flush_commands`.
//!
//! Five operation kinds: `SpawnEntity`, `DespawnEntity`, `AddComponents`,
//! `RemoveComponents`, `PrefabSpawn`. A failing command is logged and
//! skipped rather than aborting the rest of the buffer.

use tracing::warn;

use crate::component::{Bundle, ComponentSet};
use crate::entity::EntityId;
use crate::error::Result;
use crate::prefab::PrefabHandle;
pub use crate::world::World;

type WriteFn = Box<dyn FnOnce(&mut World, EntityId) -> Result<()> + Send>;

/// A single deferred world mutation.
pub enum Command {
    SpawnEntity { reserved_id: EntityId, write: WriteFn },
    DespawnEntity { id: EntityId },
    AddComponents { id: EntityId, write: WriteFn },
    RemoveComponents { id: EntityId, remove: WriteFn },
    PrefabSpawn {
        reserved_id: EntityId,
        handle: PrefabHandle,
        parent: Option<EntityId>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::SpawnEntity { reserved_id, .. } => {
                f.debug_struct("SpawnEntity").field("reserved_id", reserved_id).finish()
            }
            Command::DespawnEntity { id } => f.debug_struct("DespawnEntity").field("id", id).finish(),
            Command::AddComponents { id, .. } => {
                f.debug_struct("AddComponents").field("id", id).finish()
            }
            Command::RemoveComponents { id, .. } => {
                f.debug_struct("RemoveComponents").field("id", id).finish()
            }
            Command::PrefabSpawn { reserved_id, parent, .. } => f
                .debug_struct("PrefabSpawn")
                .field("reserved_id", reserved_id)
                .field("parent", parent)
                .finish(),
        }
    }
}

/// Ordered queue of deferred commands. Entities reserved via `spawn`/
/// `prefab_spawn` are visible to `AddComponents`/`RemoveComponents` commands
/// enqueued later in the same buffer, since they share the id up front and
/// flush processes commands in enqueue order.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Queue a spawn under an id reserved up front by the caller.
    pub fn spawn<B: Bundle>(&mut self, reserved_id: EntityId, bundle: B) -> EntityId {
        self.commands.push(Command::SpawnEntity {
            reserved_id,
            write: Box::new(move |world, id| world.spawn_with_id(id, bundle).map(|_| ())),
        });
        reserved_id
    }

    pub fn despawn(&mut self, id: EntityId) {
        self.commands.push(Command::DespawnEntity { id });
    }

    pub fn add_components<B: Bundle>(&mut self, id: EntityId, bundle: B) {
        self.commands.push(Command::AddComponents {
            id,
            write: Box::new(move |world, id| world.add_components(id, bundle)),
        });
    }

    /// Queue removal of a single component type.
    pub fn remove_component<T: crate::component::Component>(&mut self, id: EntityId) {
        self.commands.push(Command::RemoveComponents {
            id,
            remove: Box::new(move |world, id| world.remove_component::<T>(id)),
        });
    }

    /// Queue removal of every type in `R` from `id` at once.
    pub fn remove_components<R: ComponentSet>(&mut self, id: EntityId) {
        self.commands.push(Command::RemoveComponents {
            id,
            remove: Box::new(move |world, id| R::remove_from(world, id)),
        });
    }

    /// Queue a prefab instantiation under a reserved id. Applying the buffer
    /// fails this one command with `EcsError::NotImplemented` if no
    /// `PrefabSpawner` is registered on the world at flush time.
    pub fn prefab_spawn(
        &mut self,
        reserved_id: EntityId,
        handle: PrefabHandle,
        parent: Option<EntityId>,
    ) -> EntityId {
        self.commands.push(Command::PrefabSpawn {
            reserved_id,
            handle,
            parent,
        });
        reserved_id
    }

    /// Apply every queued command in order, logging and skipping failures
    /// rather than aborting the buffer.
    pub fn apply(&mut self, world: &mut World) {
        for command in self.commands.drain(..) {
            let result = match command {
                Command::SpawnEntity { reserved_id, write } => write(world, reserved_id),
                Command::DespawnEntity { id } => world.despawn(id),
                Command::AddComponents { id, write } => write(world, id),
                Command::RemoveComponents { id, remove } => remove(world, id),
                Command::PrefabSpawn {
                    reserved_id,
                    handle,
                    parent,
                } => world.prefab_spawn_direct(reserved_id, handle, parent),
            };
            if let Err(err) = result {
                warn!(error = %err, "deferred command failed, skipping");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn despawn_command_enqueues() {
        let mut buffer = CommandBuffer::new();
        assert!(buffer.is_empty());

        buffer.despawn(EntityId::NONE);

        assert!(!buffer.is_empty());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn clear_empties_queue() {
        let mut buffer = CommandBuffer::new();
        buffer.despawn(EntityId::NONE);
        buffer.clear();
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn failing_command_does_not_abort_later_ones() {
        let mut world = World::new();
        let mut buffer = CommandBuffer::new();
        // Despawning an entity that doesn't exist fails; the next command
        // (a real spawn) must still run.
        buffer.despawn(EntityId::NONE);
        let reserved = world.reserve_entity_id();
        buffer.spawn(reserved, (1i32,));
        buffer.apply(&mut world);
        assert!(world.is_alive(reserved));
    }
}
