//! Reduction Benchmarks
//!
//! Measures the chunked device reduction against the host fold, and the
//! effect of the unroll factor list.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use gridscan::host::host_reduce;
use gridscan::prelude::*;
use gridscan_cpu::CpuExecutionUnit;

/// Benchmark device reduction versus the host fold
fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce/sum_u64");
    let prims = ParallelPrimitives::new(CpuExecutionUnit::new());

    for size in [1usize << 12, 1 << 16, 1 << 20, 1 << 22] {
        let input: Vec<u64> = (0..size as u64).collect();
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("device", size), &input, |b, input| {
            b.iter(|| black_box(prims.reduce(ReductionOp::Sum, input).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("host", size), &input, |b, input| {
            b.iter(|| black_box(host_reduce(ReductionOp::Sum, input)));
        });
    }

    group.finish();
}

/// Benchmark unroll factor lists on device-resident data
fn bench_unroll_factors(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce/unroll");
    let size = 1 << 22;

    for factors in [vec![1], vec![4, 1], vec![16, 4, 1], vec![64, 16, 4, 1]] {
        let config = ConfigBuilder::new()
            .unroll_factors(factors.clone())
            .build()
            .expect("valid config");
        let prims = ParallelPrimitives::with_config(CpuExecutionUnit::new(), config).unwrap();
        let unit = prims.unit();
        let mut input = unit.alloc::<f32>(size).unwrap();
        unit.copy_to_device(&mut input, &vec![0.5f32; size]).unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("{:?}", factors), |b| {
            b.iter(|| black_box(prims.reduce_device(ReductionOp::Max, &input, size).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reduce, bench_unroll_factors);
criterion_main!(benches);
