//! # Entity Store Benchmark
//!
//! Measures the operations the server tick leans on:
//! - spawn / despawn churn through the free list
//! - two-component view iteration with writes
//! - dirty marking and draining
//!
//! Run with: `cargo bench --package slipstream_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use slipstream_core::{Component, DirtyTracker, EntityId, World};

/// Entity count for the steady-state benchmarks.
const ENTITY_COUNT: usize = 100_000;

#[derive(Clone, Copy, Default)]
struct Position([f32; 3]);
impl Component for Position {}

#[derive(Clone, Copy, Default)]
struct Velocity([f32; 3]);
impl Component for Velocity {}

fn populated_world(count: usize) -> (World, Vec<EntityId>) {
    let mut world = World::with_capacity(count);
    let ids: Vec<_> = (0..count)
        .map(|i| {
            let id = world.spawn();
            world.insert(id, Position([i as f32, 0.0, 0.0]));
            // Every other entity moves.
            if i % 2 == 0 {
                world.insert(id, Velocity([0.1, 0.2, 0.3]));
            }
            id
        })
        .collect();
    (world, ids)
}

/// Benchmark: Spawn N entities into an empty world.
fn bench_spawn_entities(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_entities");

    for count in [1_000, 10_000, ENTITY_COUNT] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut world = World::with_capacity(count);
                for _ in 0..count {
                    black_box(world.spawn());
                }
                world.alive_count()
            });
        });
    }

    group.finish();
}

/// Benchmark: Integrate positions over a (Position, Velocity) view.
fn bench_view_update(c: &mut Criterion) {
    let (mut world, _) = populated_world(ENTITY_COUNT);

    c.bench_function("view_integrate_positions", |b| {
        b.iter(|| {
            let moving: Vec<_> = world.view::<(Position, Velocity)>().iter().collect();
            for id in moving {
                let v = world.get::<Velocity>(id).0;
                let p = &mut world.get_mut::<Position>(id).0;
                p[0] += v[0] * 0.016;
                p[1] += v[1] * 0.016;
                p[2] += v[2] * 0.016;
            }
            black_box(world.alive_count())
        });
    });
}

/// Benchmark: Mark every moving entity dirty, then drain.
fn bench_dirty_cycle(c: &mut Criterion) {
    let (world, _) = populated_world(ENTITY_COUNT);
    let moving: Vec<_> = world.view::<(Velocity,)>().iter().collect();
    let mut tracker = DirtyTracker::with_capacity(ENTITY_COUNT);

    c.bench_function("dirty_mark_and_drain", |b| {
        b.iter(|| {
            for &id in &moving {
                tracker.mark_dirty(id);
            }
            black_box(tracker.drain_dirty().len())
        });
    });
}

/// Benchmark: Entity spawn/despawn cycle.
fn bench_spawn_despawn_cycle(c: &mut Criterion) {
    let (mut world, mut ids) = populated_world(ENTITY_COUNT);

    c.bench_function("spawn_despawn_cycle_10K", |b| {
        b.iter(|| {
            for id in ids.iter().take(10_000) {
                world.despawn(*id);
            }
            for id in ids.iter_mut().take(10_000) {
                *id = world.spawn();
                world.insert(*id, Position::default());
            }
            black_box(world.alive_count())
        });
    });
}

criterion_group!(
    benches,
    bench_spawn_entities,
    bench_view_update,
    bench_dirty_cycle,
    bench_spawn_despawn_cycle,
);

criterion_main!(benches);
