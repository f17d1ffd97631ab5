#![allow(unused)]
extern crate dotprobe;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use dotprobe::{
    coverage::{CoverageNode, CoverageTracker, ExpectedPath},
    memory::{ContextId, ContextRegistry, FixedContext, SlotStore},
    token::Token,
};
use std::hint::black_box;

const METHOD: Token = Token::new(0x0600_0001);

/// Benchmark the slot operations probes issue on nearly every instrumented instruction
fn bench_slot_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_store");
    group.throughput(Throughput::Elements(64));

    group.bench_function("mem_unmem_i4", |b| {
        b.iter_batched_ref(
            SlotStore::new,
            |store| {
                for i in 0..64 {
                    let index = store.mem_i4(black_box(i));
                    black_box(store.unmem_i4(index).unwrap());
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("update_f8", |b| {
        let mut store = SlotStore::new();
        let index = store.mem_f8(0.0);
        b.iter(|| {
            for i in 0..64 {
                store
                    .update_f8(black_box(f64::from(i).to_bits() as i64), index)
                    .unwrap();
            }
        });
    });
    group.finish();
}

/// Benchmark the cached current-stack lookup when the context does not change
fn bench_current_stack(c: &mut Criterion) {
    let mut registry = ContextRegistry::new(FixedContext(ContextId(1)));
    registry.current_stack();

    c.bench_function("current_stack_cache_hit", |b| {
        b.iter(|| black_box(registry.current_stack().frames_count()));
    });
}

/// Benchmark recording steps with and without an expected path to compare against
fn bench_record_step(c: &mut Criterion) {
    let nodes: Vec<CoverageNode> = (0..1024)
        .map(|offset| CoverageNode::new(1, METHOD, offset, 0))
        .collect();

    let mut group = c.benchmark_group("record_step");
    group.throughput(Throughput::Elements(nodes.len() as u64));

    group.bench_function("unguided", |b| {
        b.iter_batched_ref(
            CoverageTracker::new,
            |tracker| {
                for node in &nodes {
                    black_box(tracker.record_step(*node));
                }
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("guided", |b| {
        b.iter_batched_ref(
            || {
                let mut tracker = CoverageTracker::new();
                tracker.set_expected_coverage(Some(ExpectedPath::new(nodes.clone())));
                tracker
            },
            |tracker| {
                for node in &nodes {
                    black_box(tracker.record_step(*node));
                }
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_slot_store, bench_current_stack, bench_record_step);
criterion_main!(benches);
