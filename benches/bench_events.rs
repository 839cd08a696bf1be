use archetype_ecs::{EventBus, EventHandler, Result, World};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[derive(Clone, Debug)]
struct TestEvent(u32);

struct NoOpHandler;
impl EventHandler<TestEvent> for NoOpHandler {
    fn update(&mut self, _event: &TestEvent, _world: &mut World) -> Result<()> {
        Ok(())
    }
}

fn bench_publish_1000_events(c: &mut Criterion) {
    c.bench_function("publish_1000_events", |b| {
        b.iter(|| {
            let mut bus = EventBus::new();
            for i in 0..1000 {
                bus.publish(TestEvent(i));
                black_box(());
            }
        })
    });
}

fn bench_process_1000_events_no_handlers(c: &mut Criterion) {
    c.bench_function("process_1000_events_no_handlers", |b| {
        let mut world = World::new();
        b.iter(|| {
            let mut bus = EventBus::new();
            for i in 0..1000 {
                bus.publish(TestEvent(i));
            }
            bus.process(&mut world).unwrap();
        })
    });
}

fn bench_process_1000_events_10_handlers(c: &mut Criterion) {
    c.bench_function("process_1000_events_10_handlers", |b| {
        let mut world = World::new();
        b.iter(|| {
            let mut bus = EventBus::new();
            for _ in 0..10 {
                bus.subscribe::<TestEvent, _>(NoOpHandler);
            }
            for i in 0..1000 {
                bus.publish(TestEvent(i));
            }
            bus.process(&mut world).unwrap();
        })
    });
}

fn bench_process_1000_events_100_handlers(c: &mut Criterion) {
    c.bench_function("process_1000_events_100_handlers", |b| {
        let mut world = World::new();
        b.iter(|| {
            let mut bus = EventBus::new();
            for _ in 0..100 {
                bus.subscribe::<TestEvent, _>(NoOpHandler);
            }
            for i in 0..1000 {
                bus.publish(TestEvent(i));
            }
            bus.process(&mut world).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_publish_1000_events,
    bench_process_1000_events_no_handlers,
    bench_process_1000_events_10_handlers,
    bench_process_1000_events_100_handlers
);
criterion_main!(benches);
