// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 taskchan contributors
//
// Throughput benchmarks for the buffered and rendezvous channel paths.
//
// Run with:
//   cargo bench --bench throughput
//
// Groups:
//   buffered_send_recv     — single-thread enqueue/dequeue at varying capacity
//   rendezvous_ping_pong   — two-thread unbuffered hand-off round trip

use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use taskchan::channel;

const CAPACITIES: &[usize] = &[1, 8, 64, 256];

fn bench_buffered(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffered_send_recv");
    for &cap in CAPACITIES {
        group.bench_with_input(BenchmarkId::from_parameter(cap), &cap, |b, &cap| {
            let (tx, rx) = channel::<u64>(cap);
            b.iter(|| {
                tx.try_send(black_box(1)).ok();
                black_box(rx.try_recv().ok());
            });
        });
    }
    group.finish();
}

fn bench_rendezvous(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendezvous_ping_pong");
    group.bench_function("pairs_1000", |b| {
        b.iter(|| {
            let (tx, rx) = channel::<u64>(0);
            let sender = thread::spawn(move || {
                for i in 0..1000u64 {
                    tx.send(i).unwrap();
                }
            });
            for _ in 0..1000u64 {
                black_box(rx.recv().unwrap());
            }
            sender.join().unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_buffered, bench_rendezvous);
criterion_main!(benches);
