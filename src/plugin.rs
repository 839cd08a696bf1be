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

//! Plugin lifecycle: `build` once in dependency order, `remove` once in
//! reverse, each plugin owning its own `Scheduler` instance. The topological
//! sort is the teacher's `SystemGraph::topological_sort` (Kahn's algorithm)
//! reused over plugin dependency names instead of system access conflicts.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::error::{EcsError, Result};
use crate::schedule::Scheduler;
use crate::world::World;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Names of plugins that must build before this one.
    fn dependencies(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Register systems/resources into the freshly-created scheduler.
    /// Returning `false` aborts world construction.
    fn build(&self, world: &mut World, scheduler: &mut Scheduler) -> bool;

    /// Run once at teardown, in reverse dependency order.
    fn remove(&self, _world: &mut World) {}
}

/// Ordered collection of plugins plus the per-plugin scheduler each one
/// populates in `build`.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    pub fn add(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    fn topological_order(&self) -> Result<Vec<usize>> {
        let name_to_index: FxHashMap<&str, usize> = self
            .plugins
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name(), i))
            .collect();

        let mut in_degree = vec![0usize; self.plugins.len()];
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); self.plugins.len()];

        for (i, plugin) in self.plugins.iter().enumerate() {
            for dep_name in plugin.dependencies() {
                let &dep_index = name_to_index.get(dep_name).ok_or_else(|| {
                    EcsError::PluginDependencyError(format!(
                        "plugin '{}' depends on unknown plugin '{dep_name}'",
                        plugin.name()
                    ))
                })?;
                edges[dep_index].push(i);
                in_degree[i] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..self.plugins.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.plugins.len());

        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &next in &edges[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != self.plugins.len() {
            return Err(EcsError::PluginDependencyError(
                "plugin dependency graph has a cycle".into(),
            ));
        }
        Ok(order)
    }

    /// Build every plugin in dependency order, each into its own fresh
    /// `Scheduler`. Aborts (without rolling back earlier plugins) the first
    /// time a plugin's `build` returns `false`.
    pub fn build_all(&self, world: &mut World) -> Result<Vec<(String, Scheduler)>> {
        let order = self.topological_order()?;
        let mut schedulers = Vec::with_capacity(self.plugins.len());

        for index in order {
            let plugin = &self.plugins[index];
            let mut scheduler = Scheduler::new();
            if !plugin.build(world, &mut scheduler) {
                return Err(EcsError::PluginDependencyError(format!(
                    "plugin '{}' aborted world construction",
                    plugin.name()
                )));
            }
            schedulers.push((plugin.name().to_string(), scheduler));
        }
        Ok(schedulers)
    }

    /// Tear down every plugin in reverse dependency order.
    pub fn remove_all(&self, world: &mut World) -> Result<()> {
        let mut order = self.topological_order()?;
        order.reverse();
        for index in order {
            self.plugins[index].remove(world);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base;
    impl Plugin for Base {
        fn name(&self) -> &'static str {
            "base"
        }
        fn build(&self, world: &mut World, _scheduler: &mut Scheduler) -> bool {
            world.insert_resource(Vec::<&'static str>::new());
            world
                .resource_mut::<Vec<&'static str>>()
                .unwrap()
                .push("base");
            true
        }
    }

    struct Dependent;
    impl Plugin for Dependent {
        fn name(&self) -> &'static str {
            "dependent"
        }
        fn dependencies(&self) -> Vec<&'static str> {
            vec!["base"]
        }
        fn build(&self, world: &mut World, _scheduler: &mut Scheduler) -> bool {
            world
                .resource_mut::<Vec<&'static str>>()
                .unwrap()
                .push("dependent");
            true
        }
    }

    #[test]
    fn builds_in_dependency_order() {
        let mut registry = PluginRegistry::new();
        registry.add(Box::new(Dependent));
        registry.add(Box::new(Base));

        let mut world = World::new();
        let schedulers = registry.build_all(&mut world).unwrap();
        assert_eq!(schedulers.len(), 2);
        assert_eq!(
            world.resource::<Vec<&'static str>>().unwrap().as_slice(),
            &["base", "dependent"]
        );
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        struct Lonely;
        impl Plugin for Lonely {
            fn name(&self) -> &'static str {
                "lonely"
            }
            fn dependencies(&self) -> Vec<&'static str> {
                vec!["missing"]
            }
            fn build(&self, _world: &mut World, _scheduler: &mut Scheduler) -> bool {
                true
            }
        }

        let mut registry = PluginRegistry::new();
        registry.add(Box::new(Lonely));
        let mut world = World::new();
        assert!(registry.build_all(&mut world).is_err());
    }

    #[test]
    fn a_plugin_that_returns_false_aborts() {
        struct Refuses;
        impl Plugin for Refuses {
            fn name(&self) -> &'static str {
                "refuses"
            }
            fn build(&self, _world: &mut World, _scheduler: &mut Scheduler) -> bool {
                false
            }
        }

        let mut registry = PluginRegistry::new();
        registry.add(Box::new(Refuses));
        let mut world = World::new();
        assert!(registry.build_all(&mut world).is_err());
    }
}
