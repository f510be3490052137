// SPDX-License-Identifier: AGPL-3.0-or-later
//! Benchmark for checkpoint correlation.
//!
//! Measures `CorrelatorSession::finish` across a session with enough
//! checkpoints to exercise overhead compensation and statistical filtering.

use criterion::{criterion_group, criterion_main, Criterion};
use nemblib::correlator::{Checkpoint, CheckpointType, CorrelatorSession};

fn build_session(checkpoint_count: usize) -> CorrelatorSession {
    let mut session = CorrelatorSession::start("bench.py", "python", 0);
    let mut energy = 0.0;
    for i in 0..checkpoint_count {
        energy += 1e-3;
        session.record_checkpoint(
            Checkpoint {
                id: format!("c{i}"),
                checkpoint_type: if i % 5 == 0 { CheckpointType::LoopStart } else { CheckpointType::Call },
                name: "hot_loop".to_string(),
                line: (i % 50) + 1,
                column: 0,
                context: String::new(),
            },
            (i as u64) * 1_000_000,
            Some(energy),
        );
    }
    session
}

fn bench_finish_small_session(c: &mut Criterion) {
    c.bench_function("correlator_finish_100_checkpoints", |b| {
        b.iter_batched(
            || build_session(100),
            |session| session.finish(100_000_000, Some(0.2)),
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_finish_large_session(c: &mut Criterion) {
    c.bench_function("correlator_finish_5000_checkpoints", |b| {
        b.iter_batched(
            || build_session(5_000),
            |session| session.finish(5_000_000_000, Some(5.0)),
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_finish_small_session, bench_finish_large_session);
criterion_main!(benches);
