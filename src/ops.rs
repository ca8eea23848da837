//! The static catalogue of supported binary operations.
//!
//! Each operation is a thin binding of the generic executor to one binary
//! function. The catalogue is closed and known at compile time; there is no
//! runtime registration. Comparison operations yield `T::one()` or
//! `T::zero()` so the result stays within the operand's element type.

use num_traits::Num;

use crate::executor::{apply_with, ApplyOptions};
use crate::operand::Operand;
use crate::{ArrayLike, Result};

/// Element bounds required by the operation catalogue.
///
/// Blanket-implemented for every numeric type with arithmetic, ordering,
/// and zero/one constants (all primitive integers and floats qualify).
pub trait Element: Copy + Send + Sync + PartialOrd + Num {}

impl<T> Element for T where T: Copy + Send + Sync + PartialOrd + Num {}

/// A supported elementwise binary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Minimum,
    Maximum,
}

impl BinaryOp {
    /// Every operation in the catalogue, in declaration order.
    pub const ALL: [BinaryOp; 10] = [
        BinaryOp::Add,
        BinaryOp::Subtract,
        BinaryOp::Multiply,
        BinaryOp::Divide,
        BinaryOp::Greater,
        BinaryOp::GreaterEqual,
        BinaryOp::Less,
        BinaryOp::LessEqual,
        BinaryOp::Minimum,
        BinaryOp::Maximum,
    ];

    /// The operation's name.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "divide",
            BinaryOp::Greater => "greater",
            BinaryOp::GreaterEqual => "greater_equal",
            BinaryOp::Less => "less",
            BinaryOp::LessEqual => "less_equal",
            BinaryOp::Minimum => "minimum",
            BinaryOp::Maximum => "maximum",
        }
    }

    /// Apply the operation to one pair of values.
    ///
    /// Comparisons with NaN are false under `PartialOrd`, so the comparison
    /// operations yield zero for NaN inputs, matching numpy.
    pub fn apply<T: Element>(self, a: T, b: T) -> T {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => a / b,
            BinaryOp::Greater => bool_to_elem(a > b),
            BinaryOp::GreaterEqual => bool_to_elem(a >= b),
            BinaryOp::Less => bool_to_elem(a < b),
            BinaryOp::LessEqual => bool_to_elem(a <= b),
            BinaryOp::Minimum => {
                if b < a {
                    b
                } else {
                    a
                }
            }
            BinaryOp::Maximum => {
                if b > a {
                    b
                } else {
                    a
                }
            }
        }
    }
}

fn bool_to_elem<T: Element>(v: bool) -> T {
    if v {
        T::one()
    } else {
        T::zero()
    }
}

/// Apply a catalogued operation blockwise and in parallel.
pub fn apply_operation<'a, T: Element>(
    x: &'a dyn ArrayLike<Elem = T>,
    y: Operand<'a, T>,
    op: BinaryOp,
    opts: &ApplyOptions<'a, T>,
) -> Result<&'a dyn ArrayLike<Elem = T>> {
    apply_with(x, y, move |a, b| op.apply(a, b), opts)
}

macro_rules! operation_fn {
    ($(#[$doc:meta])* $name:ident, $variant:ident) => {
        $(#[$doc])*
        pub fn $name<'a, T: Element>(
            x: &'a dyn ArrayLike<Elem = T>,
            y: Operand<'a, T>,
            opts: &ApplyOptions<'a, T>,
        ) -> Result<&'a dyn ArrayLike<Elem = T>> {
            apply_operation(x, y, BinaryOp::$variant, opts)
        }
    };
}

operation_fn!(
    /// Blockwise parallel elementwise addition.
    add, Add
);
operation_fn!(
    /// Blockwise parallel elementwise subtraction.
    subtract, Subtract
);
operation_fn!(
    /// Blockwise parallel elementwise multiplication.
    multiply, Multiply
);
operation_fn!(
    /// Blockwise parallel elementwise division.
    divide, Divide
);
operation_fn!(
    /// Blockwise parallel elementwise `x > y`, yielding one/zero.
    greater, Greater
);
operation_fn!(
    /// Blockwise parallel elementwise `x >= y`, yielding one/zero.
    greater_equal, GreaterEqual
);
operation_fn!(
    /// Blockwise parallel elementwise `x < y`, yielding one/zero.
    less, Less
);
operation_fn!(
    /// Blockwise parallel elementwise `x <= y`, yielding one/zero.
    less_equal, LessEqual
);
operation_fn!(
    /// Blockwise parallel elementwise minimum.
    minimum, Minimum
);
operation_fn!(
    /// Blockwise parallel elementwise maximum.
    maximum, Maximum
);
