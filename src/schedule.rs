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

//! Single-threaded phase scheduler.
//!
//! Replaces the teacher's conflict-based parallel `SystemGraph`/`Schedule`,
//! built for multi-threaded staging that is out of scope here, with systems
//! grouped by `SchedulePhase` and run in declared order within each phase.

use tracing::warn;

use crate::error::Result;
use crate::system::{BoxedSystem, SystemId};
use crate::world::World;

/// A point in the per-frame / per-fixed-step / lifecycle sequence a system
/// can be registered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulePhase {
    FirstStartup,
    PreStartup,
    Startup,
    PostStartup,
    LastStartup,
    FixedFirst,
    FixedPreUpdate,
    FixedUpdate,
    FixedPostUpdate,
    FixedFlush,
    First,
    PreUpdate,
    Update,
    PostUpdate,
    Last,
    Cleanup,
}

impl SchedulePhase {
    const STARTUP: [SchedulePhase; 5] = [
        SchedulePhase::FirstStartup,
        SchedulePhase::PreStartup,
        SchedulePhase::Startup,
        SchedulePhase::PostStartup,
        SchedulePhase::LastStartup,
    ];

    const FIXED: [SchedulePhase; 5] = [
        SchedulePhase::FixedFirst,
        SchedulePhase::FixedPreUpdate,
        SchedulePhase::FixedUpdate,
        SchedulePhase::FixedPostUpdate,
        SchedulePhase::FixedFlush,
    ];

    const FRAME: [SchedulePhase; 5] = [
        SchedulePhase::First,
        SchedulePhase::PreUpdate,
        SchedulePhase::Update,
        SchedulePhase::PostUpdate,
        SchedulePhase::Last,
    ];
}

struct SystemEntry {
    id: SystemId,
    order: i32,
    registration_index: u32,
    initialized: bool,
    system: BoxedSystem,
}

/// Fixed-step timing, generalizing the teacher's `time.rs` into the
/// accumulator `World::run_fixed_steps` drains each frame.
#[derive(Debug, Clone, Copy)]
pub struct FixedTime {
    pub step: f32,
    accumulator: f32,
}

impl FixedTime {
    pub fn new(step: f32) -> Self {
        Self {
            step,
            accumulator: 0.0,
        }
    }

    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta;
    }
}

impl Default for FixedTime {
    fn default() -> Self {
        Self::new(1.0 / 60.0)
    }
}

/// Owns every registered system, grouped by phase, and drives them through
/// the fixed sequence from the world's perspective.
#[derive(Default)]
pub struct Scheduler {
    phases: ahash::AHashMap<PhaseKey, Vec<SystemEntry>>,
    next_id: u32,
    next_registration_index: u32,
    fixed_time: FixedTime,
    startup_ran: bool,
}

type PhaseKey = SchedulePhase;

impl Scheduler {
    pub fn new() -> Self {
        Self {
            phases: ahash::AHashMap::default(),
            next_id: 0,
            next_registration_index: 0,
            fixed_time: FixedTime::default(),
            startup_ran: false,
        }
    }

    pub fn with_fixed_step(mut self, step: f32) -> Self {
        self.fixed_time = FixedTime::new(step);
        self
    }

    /// Register a system into `phase`, returning its `SystemId`.
    pub fn add_system(&mut self, phase: SchedulePhase, system: BoxedSystem) -> SystemId {
        let id = SystemId(self.next_id);
        self.next_id += 1;
        let order = system.order();
        let entry = SystemEntry {
            id,
            order,
            registration_index: self.next_registration_index,
            initialized: false,
            system,
        };
        self.next_registration_index += 1;

        let bucket = self.phases.entry(phase).or_default();
        bucket.push(entry);
        bucket.sort_by_key(|e| (e.order, e.registration_index));
        id
    }

    /// Remove a system from every phase, calling its `cleanup` hook first.
    pub fn remove_system(&mut self, id: SystemId, world: &mut World) {
        for bucket in self.phases.values_mut() {
            if let Some(idx) = bucket.iter().position(|e| e.id == id) {
                let mut entry = bucket.remove(idx);
                entry.system.cleanup(world);
            }
        }
    }

    pub fn system_count(&self, phase: SchedulePhase) -> usize {
        self.phases.get(&phase).map_or(0, Vec::len)
    }

    fn run_phase(&mut self, phase: SchedulePhase, world: &mut World) -> Result<()> {
        let Some(bucket) = self.phases.get_mut(&phase) else {
            return Ok(());
        };

        for entry in bucket.iter_mut() {
            let missing = entry
                .system
                .required_components()
                .iter()
                .find(|&&required| !world_has_any_component(world, required));
            if let Some(&required) = missing {
                warn!(
                    system = entry.system.name(),
                    ?phase,
                    ?required,
                    "skipping system: required component not present anywhere in the world"
                );
                continue;
            }

            if !entry.system.run_criteria(world) {
                continue;
            }

            if !entry.initialized {
                entry.system.initialize(world);
                entry.initialized = true;
            }

            entry.system.update(world)?;
        }

        Ok(())
    }

    /// Run `FirstStartup..LastStartup` once. Calling this more than once is
    /// a no-op.
    pub fn run_startup(&mut self, world: &mut World) -> Result<()> {
        if self.startup_ran {
            return Ok(());
        }
        for phase in SchedulePhase::STARTUP {
            self.run_phase(phase, world)?;
        }
        self.startup_ran = true;
        Ok(())
    }

    /// Run one fixed step (`FixedFirst..FixedFlush`), flushing the command
    /// buffer and advancing `WorldTick` after `FixedFlush`.
    fn run_fixed_step(&mut self, world: &mut World) -> Result<()> {
        for phase in SchedulePhase::FIXED {
            self.run_phase(phase, world)?;
        }
        world.flush_commands()?;
        world.increment_tick();
        Ok(())
    }

    /// Run `First..Last`, flushing commands after each frame phase, then
    /// drain the fixed-step accumulator. This is the sequence `World::tick`
    /// drives every frame, per the scheduler's documented contract.
    pub fn run_frame(&mut self, world: &mut World, delta_seconds: f32) -> Result<()> {
        for phase in SchedulePhase::FRAME {
            self.run_phase(phase, world)?;
            world.flush_commands()?;
            if world.resource::<crate::world::LoopControl>().is_some_and(|c| c.stop) {
                return Ok(());
            }
        }

        self.fixed_time.accumulate(delta_seconds);
        while self.fixed_time.accumulator >= self.fixed_time.step {
            self.fixed_time.accumulator -= self.fixed_time.step;
            self.run_fixed_step(world)?;
            if world.resource::<crate::world::LoopControl>().is_some_and(|c| c.stop) {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Run the `Cleanup` phase, for use at teardown.
    pub fn run_cleanup(&mut self, world: &mut World) -> Result<()> {
        self.run_phase(SchedulePhase::Cleanup, world)
    }
}

fn world_has_any_component(world: &World, type_id: std::any::TypeId) -> bool {
    world
        .archetypes()
        .iter()
        .any(|archetype| archetype.has_column(type_id))
}
