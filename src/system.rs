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

//! System trait: a record `{order, run_criteria?, initialize?, cleanup?,
//! update}` run once per schedule phase by the `Scheduler`.

use crate::error::Result;
use crate::world::World;

/// Identifies a system within a `Scheduler`, assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(pub u32);

pub trait System: Send + Sync {
    /// Name used for `MissingDependency` diagnostics and dependency lookup.
    fn name(&self) -> &'static str;

    /// Lower runs earlier within a phase; default 0, ties broken by
    /// registration order.
    fn order(&self) -> i32 {
        0
    }

    /// Component types this system requires to be present somewhere in the
    /// world before it runs; an unmet requirement skips the system.
    fn required_components(&self) -> &[std::any::TypeId] {
        &[]
    }

    /// Evaluated right before `update`; returning `false` skips this run
    /// without touching `initialize`/`cleanup`.
    fn run_criteria(&self, _world: &World) -> bool {
        true
    }

    /// Called once, the first time this system runs.
    fn initialize(&mut self, _world: &mut World) {}

    /// Called once, when the system is removed from its schedule.
    fn cleanup(&mut self, _world: &mut World) {}

    fn update(&mut self, world: &mut World) -> Result<()>;
}

pub type BoxedSystem = Box<dyn System>;

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSystem {
        runs: u32,
    }

    impl System for CountingSystem {
        fn name(&self) -> &'static str {
            "CountingSystem"
        }

        fn update(&mut self, _world: &mut World) -> Result<()> {
            self.runs += 1;
            Ok(())
        }
    }

    #[test]
    fn default_order_is_zero() {
        let system = CountingSystem { runs: 0 };
        assert_eq!(system.order(), 0);
    }

    #[test]
    fn update_runs_against_a_world() {
        let mut system = CountingSystem { runs: 0 };
        let mut world = World::new();
        system.update(&mut world).unwrap();
        assert_eq!(system.runs, 1);
    }
}
