//! Visibility resolution benchmarks
//!
//! Measures the read path for the three places a version can be found: the
//! newer slot, the older slot and the version chain.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use twinslot::{AccessMethod, Engine, EngineConfig, RowDescriptor, WaitPolicy};

fn bench_fetch_by_origin(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch_by_origin");

    let engine = Engine::open(EngineConfig::default()).unwrap();
    let rel = engine.create_relation(RowDescriptor::Flat).unwrap();

    let setup = engine.begin().unwrap();
    let row = rel.insert(&setup.snapshot(), b"k", &[0u8; 128]).unwrap();
    setup.commit();

    let chain_reader = engine.begin().unwrap();
    let update = |n: u8| {
        let txn = engine.begin().unwrap();
        rel.update(&txn.snapshot(), &row, &[n; 128], WaitPolicy::Block)
            .unwrap();
        txn.commit();
    };
    update(1);
    let older_reader = engine.begin().unwrap();
    update(2);
    update(3);
    let newer_reader = engine.begin().unwrap();

    for (name, txn) in [
        ("newer_slot", &newer_reader),
        ("older_slot", &older_reader),
        ("chain", &chain_reader),
    ] {
        let snapshot = txn.snapshot();
        group.bench_with_input(BenchmarkId::new("fetch", name), &row, |b, row| {
            b.iter(|| black_box(rel.fetch(&snapshot, black_box(row)).unwrap()));
        });
    }

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");

    for len in [64usize, 1024, 8192] {
        let engine = Engine::open(EngineConfig::default()).unwrap();
        let rel = engine.create_relation(RowDescriptor::Flat).unwrap();
        let setup = engine.begin().unwrap();
        let row = rel.insert(&setup.snapshot(), b"k", &vec![0u8; len]).unwrap();
        setup.commit();
        let payload = vec![1u8; len];

        group.bench_with_input(BenchmarkId::new("in_place", len), &payload, |b, payload| {
            b.iter(|| {
                let txn = engine.begin().unwrap();
                let out = rel
                    .update(&txn.snapshot(), &row, payload, WaitPolicy::Block)
                    .unwrap();
                txn.commit();
                black_box(out)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fetch_by_origin, bench_update);
criterion_main!(benches);
