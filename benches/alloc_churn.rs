//! Benchmarks for the CPU-side hot paths: allocator churn, the reference
//! step rules, and shader generation.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use cinder::sim;
use cinder::{EmitterConfig, Slot, SlotAllocator, SpawnRequest, Vec2};

fn bench_allocator_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator_churn");

    for capacity in [4_096u32, 65_536, 200_000] {
        group.bench_with_input(
            BenchmarkId::new("alloc_free", capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let mut allocator = SlotAllocator::new(capacity);
                    let mut rng = SmallRng::seed_from_u64(11);
                    let mut handles = Vec::new();
                    for _ in 0..512 {
                        if handles.is_empty() || rng.gen_bool(0.6) {
                            if let Some(h) = allocator.allocate(rng.gen_range(1..=256)) {
                                handles.push(h);
                            }
                        } else {
                            let i = rng.gen_range(0..handles.len());
                            allocator.free(handles.swap_remove(i));
                        }
                    }
                    black_box(allocator.stats())
                })
            },
        );
    }

    group.finish();
}

fn bench_reference_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_step");

    let config = EmitterConfig::new(2000.0, 1.0).speed(1.0, 0.5);
    for slots in [1_024usize, 16_384] {
        group.bench_with_input(BenchmarkId::new("step", slots), &slots, |b, &slots| {
            let mut allocator = SlotAllocator::new(slots as u32);
            let handle = allocator.allocate(slots as u32 / 2).unwrap();
            let request = SpawnRequest::from_config(
                &config,
                handle.range(),
                32.0,
                Vec2::ZERO,
                0.0,
            );
            let src = vec![Slot::INACTIVE; slots];
            let mut dst = vec![Slot::INACTIVE; slots];
            let mut frame = 0u32;
            b.iter(|| {
                frame += 16;
                sim::step(&src, &mut dst, 0.016, std::slice::from_ref(&request), frame);
                black_box(&dst);
            })
        });
    }

    group.finish();
}

fn bench_shader_generation(c: &mut Criterion) {
    c.bench_function("step_shader_source", |b| {
        b.iter(|| black_box(cinder::step_shader_source()))
    });
}

criterion_group!(
    benches,
    bench_allocator_churn,
    bench_reference_step,
    bench_shader_generation,
);
criterion_main!(benches);
