//! Performance benchmarks for meridian-events
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use meridian_events::{ConsumerGroups, EventBus, EventEnvelope, EventStore, NoopHandler};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn sample_event() -> EventEnvelope {
    EventEnvelope::new("order.created", "orders", "bench", HashMap::new())
        .with_field("symbol", json!("AAPL"))
        .with_field("quantity", json!(100))
        .with_field("price", json!(187.44))
}

fn bench_envelope_creation(c: &mut Criterion) {
    c.bench_function("EventEnvelope::new", |b| {
        b.iter(|| EventEnvelope::new("order.created", "orders", "bench", HashMap::new()));
    });

    c.bench_function("EventEnvelope builder chain", |b| {
        b.iter(sample_event);
    });
}

fn bench_envelope_serialization(c: &mut Criterion) {
    let event = sample_event().with_correlation("req-1").with_metadata("env", "bench");

    c.bench_function("EventEnvelope serialize", |b| {
        b.iter(|| serde_json::to_vec(&event).unwrap());
    });

    let bytes = serde_json::to_vec(&event).unwrap();
    c.bench_function("EventEnvelope deserialize", |b| {
        b.iter(|| serde_json::from_slice::<EventEnvelope>(&bytes).unwrap());
    });
}

fn bench_store_append(c: &mut Criterion) {
    c.bench_function("EventStore append", |b| {
        let store = EventStore::new();
        b.iter(|| store.append(sample_event()).unwrap());
    });

    c.bench_function("EventStore append_for_aggregate", |b| {
        let store = EventStore::new();
        b.iter(|| {
            store
                .append_for_aggregate(sample_event(), "ord-1", "order")
                .unwrap()
        });
    });
}

fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fan_out");
    for subscribers in [1, 10, 100] {
        let bus = EventBus::new();
        for i in 0..subscribers {
            bus.subscribe(&format!("sub-{}", i), "orders.*", Arc::new(NoopHandler))
                .unwrap();
        }
        let event = sample_event();
        group.bench_function(format!("{} subscribers", subscribers), |b| {
            b.iter(|| bus.publish("orders.created", &event).unwrap());
        });
    }
    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let store = Arc::new(EventStore::new());
    for i in 0..1000 {
        let event_type = if i % 2 == 0 { "order.created" } else { "order.filled" };
        let event = EventEnvelope::new(event_type, "orders", "bench", HashMap::new());
        store.append(event).unwrap();
    }

    c.bench_function("replay (window of 100)", |b| {
        b.iter(|| store.replay(450, Some(549), None).unwrap());
    });

    c.bench_function("replay (filtered, full log)", |b| {
        b.iter(|| store.replay(1, None, Some("order.filled")).unwrap());
    });

    let groups = ConsumerGroups::new(store);
    let group = groups.create_sink_group("bench", "orders").unwrap();
    c.bench_function("consume batch of 100", |b| {
        b.iter_batched(
            || groups.reset_checkpoint(&group.group_id, 0).unwrap(),
            |_| groups.consume(&group.group_id, Some(100)).unwrap(),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_envelope_creation,
    bench_envelope_serialization,
    bench_store_append,
    bench_publish_fan_out,
    bench_replay,
);
criterion_main!(benches);
