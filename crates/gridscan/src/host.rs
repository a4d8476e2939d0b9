//! Serial scan and reduction on host-addressable memory.

use gridscan_core::{ReductionOp, ReductionScalar, ScanType};

/// Sequential left-to-right scan of `input` into `output`.
pub fn host_scan<T: ReductionScalar>(
    op: ReductionOp,
    scan_type: ScanType,
    input: &[T],
    output: &mut [T],
) {
    debug_assert_eq!(input.len(), output.len());
    let mut acc = op.identity();
    for (out, &value) in output.iter_mut().zip(input) {
        match scan_type {
            ScanType::Inclusive => {
                acc = op.apply(acc, value);
                *out = acc;
            }
            ScanType::Exclusive => {
                *out = acc;
                acc = op.apply(acc, value);
            }
        }
    }
}

/// Sequential left fold of `input`.
#[inline]
pub fn host_reduce<T: ReductionScalar>(op: ReductionOp, input: &[T]) -> T {
    op.fold(input)
}
