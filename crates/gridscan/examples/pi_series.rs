//! Approximating pi with parallel scans and reductions
//!
//! Two classic series, each evaluated on the CPU execution unit:
//!
//! ```text
//! Basel:   Σ 1/k²              = π²/6        (sum reduction)
//! Wallis:  Π 4k²/(4k² - 1)     = π/2         (product scan)
//! ```
//!
//! The Wallis product is scanned inclusively so that every prefix of the
//! output is the approximation after that many factors.
//!
//! # Running the Example
//!
//! ```bash
//! cargo run -p gridscan --example pi_series
//! ```

use std::error::Error;
use std::f64::consts::PI;

use gridscan::gridscan_core::{ExecutionUnit, ReductionOp, ScanType};
use gridscan::ParallelPrimitives;
use gridscan_cpu::CpuExecutionUnit;

const TERMS: u64 = 4_000_000;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let prims = ParallelPrimitives::new(CpuExecutionUnit::new());
    println!("Pi from parallel series on {}", prims.unit().info());
    println!("==========================================\n");

    basel(&prims)?;
    wallis(&prims)?;

    let metrics = prims.unit().metrics();
    println!("\n=== Summary ===");
    println!("Launches:        {}", metrics.launches);
    println!("Groups executed: {}", metrics.groups_executed);
    println!("Peak memory:     {} KiB", metrics.peak_bytes / 1024);

    Ok(())
}

fn basel(prims: &ParallelPrimitives<CpuExecutionUnit>) -> Result<(), Box<dyn Error>> {
    println!("Basel series (sum of 1/k^2, {} terms)", TERMS);

    let terms: Vec<f64> = (1..=TERMS).map(|k| 1.0 / (k as f64 * k as f64)).collect();
    let sum = prims.reduce(ReductionOp::Sum, &terms)?;
    let pi = (6.0 * sum).sqrt();

    println!("  pi ≈ {:.10}  (error {:.3e})", pi, (pi - PI).abs());
    Ok(())
}

fn wallis(prims: &ParallelPrimitives<CpuExecutionUnit>) -> Result<(), Box<dyn Error>> {
    println!("Wallis product ({} factors)", TERMS);

    let factors: Vec<f64> = (1..=TERMS)
        .map(|k| {
            let four_k2 = 4.0 * (k as f64) * (k as f64);
            four_k2 / (four_k2 - 1.0)
        })
        .collect();
    let mut partial = vec![0.0; factors.len()];
    prims.scan(ReductionOp::Product, ScanType::Inclusive, &factors, &mut partial)?;

    for n in [10usize, 1_000, 100_000, TERMS as usize] {
        let pi = 2.0 * partial[n - 1];
        println!("  after {:>8} factors: pi ≈ {:.10}  (error {:.3e})", n, pi, (pi - PI).abs());
    }
    Ok(())
}
