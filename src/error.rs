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

//! Error types

use std::fmt;

/// ECS error type
#[derive(Debug)]
pub enum EcsError {
    /// Operation referenced an entity that is not currently alive.
    UnknownEntity,

    /// Spawn with an id already assigned.
    DuplicateEntity,

    /// Component type not registered.
    UnknownComponent,

    /// Resource type not registered.
    UnknownResource(String),

    /// A component or system dependency was unmet.
    MissingDependency(String),

    /// Structural change attempted during a live iteration of the same archetype.
    ReentrantStructuralMutation,

    /// Source/target of a relationship edge are inconsistent.
    RelationshipMismatch(String),

    /// Propagated from user code (a system, handler, or injection resolver).
    HandlerFailed(Box<dyn std::error::Error + Send + Sync>),

    /// Batch size too large (possible DoS attack)
    BatchTooLarge,

    /// Plugin dependency graph has a cycle, or names an unknown dependency.
    PluginDependencyError(String),

    /// A hook has no registered implementation (e.g. `prefab_spawn_direct`
    /// with no `PrefabSpawner` registered).
    NotImplemented(&'static str),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::UnknownEntity => write!(f, "entity not alive"),
            EcsError::DuplicateEntity => write!(f, "entity id already assigned"),
            EcsError::UnknownComponent => write!(f, "component type not registered"),
            EcsError::UnknownResource(name) => write!(f, "resource not registered: {name}"),
            EcsError::MissingDependency(msg) => write!(f, "missing dependency: {msg}"),
            EcsError::ReentrantStructuralMutation => write!(
                f,
                "structural mutation of an archetype with a live iteration on the call stack"
            ),
            EcsError::RelationshipMismatch(msg) => write!(f, "relationship mismatch: {msg}"),
            EcsError::HandlerFailed(cause) => write!(f, "handler failed: {cause}"),
            EcsError::BatchTooLarge => write!(f, "batch size too large (max 10,000,000)"),
            EcsError::PluginDependencyError(msg) => write!(f, "plugin dependency error: {msg}"),
            EcsError::NotImplemented(what) => write!(f, "not implemented: {what}"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
