//! Benchmarks for sequencer dispatch and drain

use std::cell::Cell;
use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use cadence_core::{codes, CadenceResult, SequencedEvent};
use cadence_runtime::RuntimeConfig;
use cadence_sequencer::{FnHandler, Sequencer};
use cadence_test::{tag_payload, ReentrancySimulator, ScriptedHandler, SimulatorConfig, Step};

fn bench_dispatch_idle_path(c: &mut Criterion) {
    let sequencer = Sequencer::default();
    let count = Cell::new(0u64);
    let handler = FnHandler::new(|_: &SequencedEvent| -> CadenceResult<()> {
        count.set(count.get() + 1);
        Ok(())
    });
    let event = SequencedEvent::new(codes::CHAR, &b"k"[..]);

    c.bench_function("sequencer_dispatch_uncontended", |b| {
        b.iter(|| {
            sequencer
                .dispatch(black_box(event.clone()), &handler)
                .unwrap()
        })
    });
}

fn bench_fan_out_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequencer_fan_out_drain");

    for fan_out in [8u32, 64, 512] {
        let steps = (1..=fan_out)
            .map(|tag| Step::Send {
                code: codes::CHAR,
                tag,
            })
            .collect();
        let mut script = HashMap::new();
        script.insert(0, steps);
        let bridge = ScriptedHandler::bridge(&RuntimeConfig::default(), script).unwrap();

        group.throughput(Throughput::Elements(u64::from(fan_out) + 1));
        group.bench_with_input(BenchmarkId::from_parameter(fan_out), &fan_out, |b, _| {
            b.iter(|| {
                bridge.handler().clear_log();
                bridge
                    .notify_event(codes::KEY_DOWN, tag_payload(0))
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_simulated_forest(c: &mut Criterion) {
    c.bench_function("sequencer_simulated_forest", |b| {
        b.iter(|| {
            let mut simulator = ReentrancySimulator::new(SimulatorConfig::default());
            black_box(simulator.run().unwrap().events_sent)
        })
    });
}

criterion_group!(
    benches,
    bench_dispatch_idle_path,
    bench_fan_out_drain,
    bench_simulated_forest
);
criterion_main!(benches);
