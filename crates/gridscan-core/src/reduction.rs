//! Combining operators and the scalar types they act on.
//!
//! Operators form a closed set. Each one carries a statically known identity
//! per scalar type, so every primitive can pad, seed and initialise with it:
//!
//! | Operator  | Integers      | Floats  |
//! |-----------|---------------|---------|
//! | `Sum`     | `0`           | `0.0`   |
//! | `Product` | `1`           | `1.0`   |
//! | `Min`     | `MAX`         | `+inf`  |
//! | `Max`     | `MIN`         | `-inf`  |
//! | `And`     | all ones      | n/a     |
//! | `Or`      | `0`           | n/a     |
//! | `Xor`     | `0`           | n/a     |

use std::fmt;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::error::{GridScanError, Result};

/// Associative combining operator with a known identity.
///
/// All operators are also commutative, which the reduction dispatcher relies
/// on. Scans only rely on associativity and always combine left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionOp {
    /// Addition (`plus`).
    Sum,
    /// Multiplication (`multiplies`).
    Product,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
}

impl ReductionOp {
    /// Every built-in operator.
    pub const ALL: [ReductionOp; 7] = [
        ReductionOp::Sum,
        ReductionOp::Product,
        ReductionOp::Min,
        ReductionOp::Max,
        ReductionOp::And,
        ReductionOp::Or,
        ReductionOp::Xor,
    ];

    /// Conventional functor name (`plus`, `bit_and`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            ReductionOp::Sum => "plus",
            ReductionOp::Product => "multiplies",
            ReductionOp::Min => "min",
            ReductionOp::Max => "max",
            ReductionOp::And => "bit_and",
            ReductionOp::Or => "bit_or",
            ReductionOp::Xor => "bit_xor",
        }
    }

    /// Whether the operator acts on bit patterns.
    pub const fn is_bitwise(self) -> bool {
        matches!(self, ReductionOp::And | ReductionOp::Or | ReductionOp::Xor)
    }

    /// Fail unless `T` has an identity for this operator.
    ///
    /// Called by every entry point before anything is allocated or launched.
    pub fn check_supported<T: ReductionScalar>(self) -> Result<()> {
        if T::supports(self) {
            Ok(())
        } else {
            Err(GridScanError::UnsupportedOperator {
                op: self.name(),
                scalar: T::TYPE_NAME,
            })
        }
    }

    /// Identity element of this operator for `T`.
    #[inline]
    pub fn identity<T: ReductionScalar>(self) -> T {
        T::identity(self)
    }

    /// Combine two values, `lhs` first.
    #[inline]
    pub fn apply<T: ReductionScalar>(self, lhs: T, rhs: T) -> T {
        T::combine(lhs, rhs, self)
    }

    /// Left fold of `values`, starting from the identity.
    pub fn fold<T: ReductionScalar>(self, values: &[T]) -> T {
        values
            .iter()
            .fold(self.identity(), |acc, &value| self.apply(acc, value))
    }
}

impl fmt::Display for ReductionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar element type usable by the primitives.
///
/// `Pod` lets device copies move raw bytes; `Send + Sync` lets worker groups
/// share descriptors and buffers of it.
pub trait ReductionScalar: Pod + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Type name used in diagnostics.
    const TYPE_NAME: &'static str;

    /// Identity element for `op`.
    fn identity(op: ReductionOp) -> Self;

    /// Apply `op` to `a` and `b`.
    fn combine(a: Self, b: Self, op: ReductionOp) -> Self;

    /// Whether `op` has a known identity for this type.
    fn supports(op: ReductionOp) -> bool;
}

macro_rules! impl_integer_scalar {
    ($($ty:ty),*) => {
        $(
            impl ReductionScalar for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                #[inline]
                fn identity(op: ReductionOp) -> Self {
                    match op {
                        ReductionOp::Sum | ReductionOp::Or | ReductionOp::Xor => 0,
                        ReductionOp::Product => 1,
                        ReductionOp::Min => <$ty>::MAX,
                        ReductionOp::Max => <$ty>::MIN,
                        ReductionOp::And => !0,
                    }
                }

                // Wrapping keeps Sum and Product associative on overflow.
                #[inline]
                fn combine(a: Self, b: Self, op: ReductionOp) -> Self {
                    match op {
                        ReductionOp::Sum => a.wrapping_add(b),
                        ReductionOp::Product => a.wrapping_mul(b),
                        ReductionOp::Min => a.min(b),
                        ReductionOp::Max => a.max(b),
                        ReductionOp::And => a & b,
                        ReductionOp::Or => a | b,
                        ReductionOp::Xor => a ^ b,
                    }
                }

                #[inline]
                fn supports(_op: ReductionOp) -> bool {
                    true
                }
            }
        )*
    };
}

macro_rules! impl_float_scalar {
    ($($ty:ty),*) => {
        $(
            impl ReductionScalar for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                #[inline]
                fn identity(op: ReductionOp) -> Self {
                    match op {
                        ReductionOp::Sum => 0.0,
                        ReductionOp::Product => 1.0,
                        ReductionOp::Min => <$ty>::INFINITY,
                        ReductionOp::Max => <$ty>::NEG_INFINITY,
                        ReductionOp::Or | ReductionOp::Xor => <$ty>::from_bits(0),
                        ReductionOp::And => <$ty>::from_bits(!0),
                    }
                }

                #[inline]
                fn combine(a: Self, b: Self, op: ReductionOp) -> Self {
                    match op {
                        ReductionOp::Sum => a + b,
                        ReductionOp::Product => a * b,
                        ReductionOp::Min => a.min(b),
                        ReductionOp::Max => a.max(b),
                        // Rejected by `supports`; defined on the bit pattern.
                        ReductionOp::And => <$ty>::from_bits(a.to_bits() & b.to_bits()),
                        ReductionOp::Or => <$ty>::from_bits(a.to_bits() | b.to_bits()),
                        ReductionOp::Xor => <$ty>::from_bits(a.to_bits() ^ b.to_bits()),
                    }
                }

                #[inline]
                fn supports(op: ReductionOp) -> bool {
                    !op.is_bitwise()
                }
            }
        )*
    };
}

impl_integer_scalar!(i32, i64, u32, u64);
impl_float_scalar!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_integer_identities() {
        assert_eq!(ReductionOp::Sum.identity::<u64>(), 0);
        assert_eq!(ReductionOp::Product.identity::<i32>(), 1);
        assert_eq!(ReductionOp::Min.identity::<u32>(), u32::MAX);
        assert_eq!(ReductionOp::Max.identity::<i64>(), i64::MIN);
        assert_eq!(ReductionOp::And.identity::<u32>(), u32::MAX);
        assert_eq!(ReductionOp::And.identity::<i32>(), -1);
        assert_eq!(ReductionOp::Xor.identity::<u64>(), 0);
    }

    #[test]
    fn test_float_identities() {
        assert_eq!(ReductionOp::Sum.identity::<f32>(), 0.0);
        assert_eq!(ReductionOp::Product.identity::<f64>(), 1.0);
        assert_eq!(ReductionOp::Min.identity::<f64>(), f64::INFINITY);
        assert_eq!(ReductionOp::Max.identity::<f32>(), f32::NEG_INFINITY);
    }

    #[test]
    fn test_bitwise_rejected_for_floats() {
        for op in ReductionOp::ALL {
            assert_eq!(f32::supports(op), !op.is_bitwise());
            assert!(u64::supports(op));
        }

        let err = ReductionOp::Xor.check_supported::<f64>().unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(err.to_string(), "Operator bit_xor is not defined for f64");
    }

    #[test]
    fn test_wrapping_sum() {
        assert_eq!(ReductionOp::Sum.apply(u32::MAX, 2u32), 1);
        assert_eq!(ReductionOp::Product.apply(i32::MAX, 2), -2);
    }

    #[test]
    fn test_fold() {
        assert_eq!(ReductionOp::Sum.fold(&[1u64, 2, 3, 4]), 10);
        assert_eq!(ReductionOp::Max.fold(&[3i32, -7, 9, 2]), 9);
        assert_eq!(ReductionOp::Min.fold::<f64>(&[]), f64::INFINITY);
    }

    #[test]
    fn test_op_display() {
        for op in ReductionOp::ALL {
            assert_eq!(op.to_string(), op.name());
        }
        let names: Vec<_> = ReductionOp::ALL.iter().map(|op| op.name()).collect();
        assert_eq!(
            names,
            ["plus", "multiplies", "min", "max", "bit_and", "bit_or", "bit_xor"]
        );
    }

    proptest! {
        #[test]
        fn identity_is_neutral_for_integers(x in any::<i64>()) {
            for op in ReductionOp::ALL {
                prop_assert_eq!(op.apply(op.identity(), x), x);
                prop_assert_eq!(op.apply(x, op.identity()), x);
            }
        }

        #[test]
        fn identity_is_neutral_for_unsigned(x in any::<u32>()) {
            for op in ReductionOp::ALL {
                prop_assert_eq!(op.apply(op.identity(), x), x);
                prop_assert_eq!(op.apply(x, op.identity()), x);
            }
        }

        #[test]
        fn identity_is_neutral_for_floats(x in -1.0e30f64..1.0e30) {
            for op in ReductionOp::ALL.into_iter().filter(|op| !op.is_bitwise()) {
                prop_assert_eq!(op.apply(op.identity(), x), x);
                prop_assert_eq!(op.apply(x, op.identity()), x);
            }
        }
    }
}
