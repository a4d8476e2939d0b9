//! Scan Benchmarks
//!
//! Compares the scan engines on the CPU execution unit:
//! - Decoupled lookback (single pass)
//! - Cooperative (two grid barriers)
//! - Two-pass (prescan, host scan of totals, propagate)
//! - Host (sequential baseline)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use gridscan::prelude::*;
use gridscan_cpu::CpuExecutionUnit;

const SIZES: [usize; 3] = [1 << 12, 1 << 16, 1 << 20];

fn primitives(strategy: ScanStrategy) -> ParallelPrimitives<CpuExecutionUnit> {
    let config = ConfigBuilder::new()
        .strategy(strategy)
        .build()
        .expect("valid config");
    ParallelPrimitives::with_config(CpuExecutionUnit::new(), config).expect("valid unit")
}

/// Benchmark host-slice inclusive sums, including transfers
fn bench_scan_engines(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan/inclusive_sum_u32");

    for strategy in [
        ScanStrategy::DecoupledLookback,
        ScanStrategy::Cooperative,
        ScanStrategy::TwoPass,
        ScanStrategy::Host,
    ] {
        let prims = primitives(strategy);
        for size in SIZES {
            let input: Vec<u32> = (0..size as u32).collect();
            let mut output = vec![0u32; size];
            group.throughput(Throughput::Elements(size as u64));
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), size),
                &input,
                |b, input| {
                    b.iter(|| {
                        prims
                            .scan(ReductionOp::Sum, ScanType::Inclusive, input, &mut output)
                            .unwrap();
                        black_box(output[size - 1]);
                    });
                },
            );
        }
    }

    group.finish();
}

/// Benchmark device-resident scans, packed versus fenced descriptors
fn bench_device_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan/device");
    let prims = primitives(ScanStrategy::DecoupledLookback);
    let unit = prims.unit();
    let size = 1 << 20;

    let mut in_u32 = unit.alloc::<u32>(size).unwrap();
    let mut out_u32 = unit.alloc::<u32>(size).unwrap();
    unit.copy_to_device(&mut in_u32, &vec![1u32; size]).unwrap();

    let mut in_f64 = unit.alloc::<f64>(size).unwrap();
    let mut out_f64 = unit.alloc::<f64>(size).unwrap();
    unit.copy_to_device(&mut in_f64, &vec![1.0f64; size]).unwrap();

    group.throughput(Throughput::Elements(size as u64));

    group.bench_function("packed_u32", |b| {
        b.iter(|| {
            prims
                .scan_device(ReductionOp::Sum, ScanType::Exclusive, &in_u32, &mut out_u32, size)
                .unwrap();
        });
    });

    group.bench_function("fenced_f64", |b| {
        b.iter(|| {
            prims
                .scan_device(ReductionOp::Sum, ScanType::Exclusive, &in_f64, &mut out_f64, size)
                .unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_scan_engines, bench_device_scan);
criterion_main!(benches);
