// SPDX-License-Identifier: AGPL-3.0-or-later
//! Benchmark for the coordinator's fixed-capacity ring buffer.
//!
//! Measures steady-state push throughput once the buffer has wrapped, and
//! the cost of draining it into chronological order.

use criterion::{criterion_group, criterion_main, Criterion};
use nemblib::coordinator::{RingBuffer, SynchronizedReading};

fn sample(i: u64) -> SynchronizedReading {
    SynchronizedReading {
        common_timestamp_ns: i,
        total_system_energy_joules: i as f64,
        ..SynchronizedReading::default()
    }
}

fn bench_push_after_wraparound(c: &mut Criterion) {
    let mut buffer: RingBuffer<SynchronizedReading> = RingBuffer::new(3_600);
    for i in 0..4_000u64 {
        buffer.push(sample(i));
    }
    let mut i = 4_000u64;
    c.bench_function("ring_buffer_push_after_wraparound", |b| {
        b.iter(|| {
            i += 1;
            buffer.push(sample(i));
        });
    });
}

fn bench_chronological_drain(c: &mut Criterion) {
    let mut buffer: RingBuffer<SynchronizedReading> = RingBuffer::new(3_600);
    for i in 0..5_000u64 {
        buffer.push(sample(i));
    }
    c.bench_function("ring_buffer_chronological_drain", |b| {
        b.iter(|| buffer.chronological());
    });
}

criterion_group!(benches, bench_push_after_wraparound, bench_chronological_drain);
criterion_main!(benches);
