//! Benchmarks for idle passes

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cadence_core::{Priority, TaskStatus};
use cadence_idle::{IdleQueue, IdleQueueConfig};
use cadence_test::FakeHost;

fn bench_single_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("idle_single_pass");

    for tasks in [16usize, 256, 4096] {
        let host = Arc::new(FakeHost::new());
        let queue = IdleQueue::new(host, IdleQueueConfig::default()).unwrap();
        let task = queue.register(|n: &u64| Ok(TaskStatus::from(*n > 0))).unwrap();

        group.throughput(Throughput::Elements(tasks as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            b.iter(|| {
                for i in 0..tasks {
                    let priority = Priority::ALL[i % 3];
                    queue.add(priority, task, 1, false).unwrap();
                }
                black_box(queue.on_idle().unwrap())
            })
        });
    }

    group.finish();
}

fn bench_round_robin_incomplete(c: &mut Criterion) {
    let host = Arc::new(FakeHost::new());
    let queue = IdleQueue::new(host, IdleQueueConfig::default()).unwrap();
    let ids: Vec<_> = (0..32)
        .map(|_| queue.register(|_: &u64| Ok(TaskStatus::Incomplete)).unwrap())
        .collect();
    for id in &ids {
        queue.add(Priority::Medium, *id, 0, false).unwrap();
    }

    c.bench_function("idle_round_robin_32_incomplete", |b| {
        b.iter(|| black_box(queue.on_idle().unwrap()))
    });
}

fn bench_dedup_update(c: &mut Criterion) {
    let host = Arc::new(FakeHost::new());
    let queue = IdleQueue::new(host, IdleQueueConfig::default()).unwrap();
    let ids: Vec<_> = (0..128)
        .map(|_| queue.register(|_: &u64| Ok(TaskStatus::Complete)).unwrap())
        .collect();
    for id in &ids {
        queue.add(Priority::Low, *id, 0, false).unwrap();
    }
    let last = ids[ids.len() - 1];

    c.bench_function("idle_add_update_tail_of_128", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            queue.add(Priority::Low, last, black_box(n), true).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_single_pass,
    bench_round_robin_incomplete,
    bench_dedup_update
);
criterion_main!(benches);
