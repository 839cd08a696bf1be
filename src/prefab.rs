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

//! `PrefabSpawner`: the narrow hook `world.prefab_spawn_direct` delegates to.
//!
//! No implementation ships here; an asset-loading plugin registers one via
//! `World::register_prefab_spawner`. Calling `prefab_spawn_direct` (or
//! flushing a `PrefabSpawn` command) with none registered fails with
//! `EcsError::NotImplemented` rather than guessing at prefab semantics.

use crate::entity::EntityId;
use crate::error::Result;
use crate::world::World;

/// Opaque identifier for a prefab asset. What it resolves to is entirely up
/// to the registered `PrefabSpawner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrefabHandle(pub u64);

/// Collaborator that knows how to instantiate a prefab under a reserved id.
pub trait PrefabSpawner: Send + Sync {
    fn spawn(
        &self,
        world: &mut World,
        id: EntityId,
        handle: PrefabHandle,
        parent: Option<EntityId>,
    ) -> Result<()>;
}
