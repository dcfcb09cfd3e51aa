//! Benchmarks for event bus fan-out and subscription churn.
//!
//! Run with: cargo bench -p ctxsel-core -- bus

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use ctxsel_core::{EventBus, Topic};

// ---------------------------------------------------------------------------
// 1. Emit fan-out
// ---------------------------------------------------------------------------

fn bench_emit_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus/emit");

    for count in [1u64, 16, 256, 4_096] {
        group.throughput(Throughput::Elements(count));

        let bus: EventBus<u64> = EventBus::new();
        let topic = Topic::mint();
        let sink = Rc::new(Cell::new(0u64));
        let _subs: Vec<_> = (0..count)
            .map(|_| {
                let sink = Rc::clone(&sink);
                bus.subscribe(topic, move |v| sink.set(sink.get().wrapping_add(*v)))
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("isolated", count), &(), |b, _| {
            let mut v = 0u64;
            b.iter(|| {
                v += 1;
                black_box(bus.emit(topic, black_box(&v)));
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. Emit on a crowded bus (many unrelated topics)
// ---------------------------------------------------------------------------

fn bench_emit_crowded(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus/crowded");

    for topics in [10usize, 1_000] {
        let bus: EventBus<u64> = EventBus::new();
        let all: Vec<Topic> = (0..topics).map(|_| Topic::mint()).collect();
        let _subs: Vec<_> = all
            .iter()
            .flat_map(|&t| (0..4).map(move |_| t))
            .map(|t| {
                bus.subscribe(t, |v| {
                    black_box(*v);
                })
            })
            .collect();
        let target = all[topics / 2];

        group.bench_with_input(BenchmarkId::new("single_topic", topics), &(), |b, _| {
            b.iter(|| black_box(bus.emit(target, &1)));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 3. Subscribe/unsubscribe churn (consumer mount/unmount)
// ---------------------------------------------------------------------------

fn bench_subscription_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus/churn");

    for resident in [0usize, 64, 1_024] {
        let bus: EventBus<u64> = EventBus::new();
        let topic = Topic::mint();
        let _resident: Vec<_> = (0..resident)
            .map(|_| bus.subscribe(topic, |_| {}))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("mount_unmount", resident),
            &(),
            |b, _| {
                b.iter(|| {
                    let sub = bus.subscribe(topic, |_| {});
                    drop(black_box(sub));
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_emit_fanout,
    bench_emit_crowded,
    bench_subscription_churn
);
criterion_main!(benches);
