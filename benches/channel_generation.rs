//! Benchmarks for CDL channel generation
//!
//! Run with: cargo bench --bench channel_generation

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mmwave_channel::antenna::AntennaArray;
use mmwave_channel::channel::ChannelGenerator;
use mmwave_channel::clock::ManualClock;
use mmwave_channel::config::ChannelConfig;
use mmwave_channel::device::{Endpoint, NodeId};
use mmwave_channel::geometry::Vector3;
use mmwave_channel::propagation::ChannelCondition;

fn make_endpoints() -> (Endpoint, Endpoint) {
    (
        Endpoint::new(NodeId(1), Vector3::new(0.0, 0.0, 25.0)),
        Endpoint::new(NodeId(2), Vector3::new(80.0, 30.0, 1.5)),
    )
}

// ============================================================================
// Fresh realizations
// ============================================================================

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    let (a, b) = make_endpoints();

    for (name, condition) in [("los", ChannelCondition::LOS), ("nlos", ChannelCondition::NLOS)] {
        for dims in [(2usize, 2usize), (4, 8), (8, 8)] {
            let clock = ManualClock::shared();
            let config = ChannelConfig {
                update_period_ms: 1.0,
                ..ChannelConfig::default()
            };
            let mut generator = ChannelGenerator::new(&config, clock.clone()).unwrap();
            let tx = AntennaArray::new(dims.0, dims.1);
            let rx = AntennaArray::new(2, 2);

            let id = format!("{}x{}", dims.0, dims.1);
            group.bench_with_input(BenchmarkId::new(name, id), &dims, |bench, _| {
                bench.iter(|| {
                    // Step past the coherence period so every call regenerates
                    clock.advance(Duration::from_millis(2));
                    black_box(generator.get_channel(&a, &b, &tx, &rx, condition))
                })
            });
        }
    }

    group.finish();
}

// ============================================================================
// Cache hits
// ============================================================================

fn bench_cached(c: &mut Criterion) {
    let (a, b) = make_endpoints();
    let clock = ManualClock::shared();
    let mut generator = ChannelGenerator::new(&ChannelConfig::default(), clock).unwrap();
    let tx = AntennaArray::new(4, 8);
    let rx = AntennaArray::new(2, 2);

    c.bench_function("cached_reverse_lookup", |bench| {
        bench.iter(|| black_box(generator.get_channel(&b, &a, &rx, &tx, ChannelCondition::NLOS)))
    });
}

criterion_group!(benches, bench_generate, bench_cached);
criterion_main!(benches);
