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

//! Typed publish/subscribe event bus.
//!
//! Supersedes the teacher's overlapping `event.rs` (`EntityEvent`/
//! `EventQueue`) and `observer.rs` (`ObserverRegistry`): entity lifecycle
//! notifications become ordinary typed events published on this one bus
//! instead of a separate mechanism, so there is exactly one dispatch path.
//! Handlers extend `{run_criteria?, initialize?, cleanup?, update}`,
//! generalizing the teacher's bare `EventSubscriber::on_event`.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::error::Result;
use crate::world::World;

pub trait Event: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Event for T {}

/// A handler for event type `E`. Dispatch runs `update` for every handler
/// whose `run_criteria` is absent or returns `true`, in registration order.
pub trait EventHandler<E: Event>: Send + Sync {
    fn run_criteria(&self, _world: &World) -> bool {
        true
    }
    fn initialize(&mut self, _world: &mut World) {}
    fn cleanup(&mut self, _world: &mut World) {}
    fn update(&mut self, args: &E, world: &mut World) -> Result<()>;
}

trait ErasedHandler: Send + Sync {
    fn run_criteria(&self, world: &World) -> bool;
    fn initialize(&mut self, world: &mut World);
    fn cleanup(&mut self, world: &mut World);
    fn update(&mut self, args: &dyn Any, world: &mut World) -> Result<()>;
}

struct HandlerSlot<E, H> {
    handler: H,
    initialized: bool,
    _marker: std::marker::PhantomData<fn(&E)>,
}

impl<E: Event, H: EventHandler<E>> ErasedHandler for HandlerSlot<E, H> {
    fn run_criteria(&self, world: &World) -> bool {
        self.handler.run_criteria(world)
    }

    fn initialize(&mut self, world: &mut World) {
        if !self.initialized {
            self.handler.initialize(world);
            self.initialized = true;
        }
    }

    fn cleanup(&mut self, world: &mut World) {
        self.handler.cleanup(world);
    }

    fn update(&mut self, args: &dyn Any, world: &mut World) -> Result<()> {
        let args = args
            .downcast_ref::<E>()
            .expect("event bus dispatched the wrong concrete type for this handler slot");
        self.handler.update(args, world)
    }
}

/// Central typed pub/sub bus. Each event type gets its own queue and
/// handler list; `process` drains every queue against its handlers.
#[derive(Default)]
pub struct EventBus {
    queues: HashMap<TypeId, Vec<Box<dyn Any + Send + Sync>>>,
    handlers: HashMap<TypeId, Vec<Box<dyn ErasedHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn subscribe<E: Event, H: EventHandler<E> + 'static>(&mut self, handler: H) {
        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Box::new(HandlerSlot {
                handler,
                initialized: false,
                _marker: std::marker::PhantomData,
            }));
    }

    pub fn publish<E: Event>(&mut self, event: E) {
        self.queues
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Box::new(event));
    }

    pub fn queue_len<E: Event>(&self) -> usize {
        self.queues
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Drain every queued event against its handlers, in registration
    /// order, skipping handlers whose `run_criteria` returns `false`.
    pub fn process(&mut self, world: &mut World) -> Result<()> {
        for (type_id, queue) in self.queues.iter_mut() {
            let Some(handlers) = self.handlers.get_mut(type_id) else {
                queue.clear();
                continue;
            };
            for event in queue.drain(..) {
                for handler in handlers.iter_mut() {
                    if !handler.run_criteria(world) {
                        continue;
                    }
                    handler.initialize(world);
                    handler.update(event.as_ref(), world)?;
                }
            }
        }
        Ok(())
    }

    pub fn clear_queues(&mut self) {
        for queue in self.queues.values_mut() {
            queue.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Damage {
        amount: u32,
    }

    struct TallyHandler;
    impl EventHandler<Damage> for TallyHandler {
        fn update(&mut self, args: &Damage, world: &mut World) -> Result<()> {
            *world.resource_mut::<u32>().unwrap() += args.amount;
            Ok(())
        }
    }

    #[test]
    fn published_events_reach_subscribed_handlers() {
        let mut world = World::new();
        world.insert_resource(0u32);

        let mut bus = EventBus::new();
        bus.subscribe::<Damage, _>(TallyHandler);
        bus.publish(Damage { amount: 5 });
        bus.publish(Damage { amount: 3 });

        assert_eq!(bus.queue_len::<Damage>(), 2);
        bus.process(&mut world).unwrap();
        assert_eq!(*world.resource::<u32>().unwrap(), 8);
        assert_eq!(bus.queue_len::<Damage>(), 0);
    }

    #[test]
    fn run_criteria_false_skips_the_handler() {
        struct NeverRuns;
        impl EventHandler<Damage> for NeverRuns {
            fn run_criteria(&self, _world: &World) -> bool {
                false
            }
            fn update(&mut self, args: &Damage, world: &mut World) -> Result<()> {
                *world.resource_mut::<u32>().unwrap() += args.amount;
                Ok(())
            }
        }

        let mut world = World::new();
        world.insert_resource(0u32);
        let mut bus = EventBus::new();
        bus.subscribe::<Damage, _>(NeverRuns);
        bus.publish(Damage { amount: 99 });
        bus.process(&mut world).unwrap();
        assert_eq!(*world.resource::<u32>().unwrap(), 0);
    }
}
