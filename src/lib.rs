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

//! A general-purpose, archetype-based Entity Component System runtime.

pub mod archetype;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod event_bus;
pub mod injection;
pub mod logging;
pub mod plugin;
pub mod prefab;
pub mod prelude;
pub mod query;
pub mod relationship;
pub mod resource;
pub mod schedule;
pub mod system;
pub mod world;

// Re-exports for convenience
pub use archetype::Archetype;
pub use command::{Command, CommandBuffer};
pub use component::{Bundle, Component, ComponentDependency, ComponentSet};
pub use entity::EntityId;
pub use error::{EcsError, Result};
pub use event_bus::{Event, EventBus, EventHandler};
pub use injection::{InjectionResolver, Local, Res, ResMut};
pub use logging::{default_logger, DefaultLogger, NamespacedLogger};
pub use plugin::{Plugin, PluginRegistry};
pub use prefab::{PrefabHandle, PrefabSpawner};
pub use query::{Query, QueryFetchMut, QueryFilter, QueryMut, QueryState};
pub use relationship::{ChildOf, Children, Relation, RelationshipTarget};
pub use resource::ResourceRegistry;
pub use schedule::{SchedulePhase, Scheduler};
pub use system::{BoxedSystem, System, SystemId};
pub use world::{ComponentEntities, ComponentUpdates, EntitiesDeleted, LoopControl, World, WorldTick};
