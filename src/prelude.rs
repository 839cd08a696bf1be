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

//! Convenient re-exports of commonly used types.
//!
//! ```
//! use archetype_ecs::prelude::*;
//! ```

pub use crate::command::CommandBuffer;
pub use crate::component::{Bundle, Component, ComponentDependency, ComponentSet};
pub use crate::entity::EntityId;
pub use crate::error::{EcsError, Result};
pub use crate::event_bus::{Event, EventBus, EventHandler};
pub use crate::injection::{InjectionResolver, Local, Res, ResMut};
pub use crate::logging::{default_logger, DefaultLogger, NamespacedLogger};
pub use crate::plugin::{Plugin, PluginRegistry};
pub use crate::prefab::{PrefabHandle, PrefabSpawner};
pub use crate::query::{Added, Changed, Entity, Query, QueryMut, With, Without};
pub use crate::relationship::{ChildOf, Children, Relation, RelationshipTarget};
pub use crate::resource::ResourceRegistry;
pub use crate::schedule::{SchedulePhase, Scheduler};
pub use crate::system::{BoxedSystem, System, SystemId};
pub use crate::world::{ComponentEntities, ComponentUpdates, EntitiesDeleted, LoopControl, World, WorldTick};
