// SPDX-License-Identifier: AGPL-3.0-or-later
//! Benchmark for wraparound-aware energy counter accumulation.
//!
//! Measures the cost of `CounterManager::update` under steady-state
//! (no wraparound) and wraparound-heavy access patterns.

use criterion::{criterion_group, criterion_main, Criterion};
use nemblib::counter::CounterManager;

fn bench_steady_state_update(c: &mut Criterion) {
    let manager = CounterManager::new();
    let mut raw = 0u64;
    c.bench_function("counter_manager_steady_state_update", |b| {
        b.iter(|| {
            raw = raw.wrapping_add(1_000);
            manager.update("package:0", raw, 32)
        });
    });
}

fn bench_wraparound_heavy_update(c: &mut Criterion) {
    let manager = CounterManager::new();
    let bits = 16u32;
    let span = 1u64 << bits;
    let mut raw = 0u64;
    c.bench_function("counter_manager_wraparound_heavy_update", |b| {
        b.iter(|| {
            raw = (raw + span - 100) % span;
            manager.update("wrap", raw, bits)
        });
    });
}

fn bench_update_batch(c: &mut Criterion) {
    let manager = CounterManager::new();
    let readings: Vec<(&str, u64, u32)> =
        vec![("package:0", 1_000, 32), ("core:0", 2_000, 32), ("dram:0", 3_000, 32)];
    c.bench_function("counter_manager_update_batch", |b| {
        b.iter(|| manager.update_batch(&readings));
    });
}

criterion_group!(benches, bench_steady_state_update, bench_wraparound_heavy_update, bench_update_batch);
criterion_main!(benches);
