//! Classification of the second operand as scalar or array-like.

use crate::{ArrayLike, BlockwiseError, Result};

/// The second operand of a blockwise operation.
///
/// A scalar is broadcast unchanged to every block; an array-like must have
/// exactly the shape of the first operand. No partial-dimension broadcasting
/// is attempted.
#[derive(Clone, Copy)]
pub enum Operand<'a, T> {
    /// A single value applied identically to every block.
    Scalar(T),
    /// A shape-matching array-like, read block by block.
    Array(&'a dyn ArrayLike<Elem = T>),
}

impl<'a, T: Copy + Send + Sync> Operand<'a, T> {
    /// Wrap a scalar value.
    pub fn scalar(value: T) -> Self {
        Operand::Scalar(value)
    }

    /// Wrap an array-like operand.
    pub fn array(array: &'a dyn ArrayLike<Elem = T>) -> Self {
        Operand::Array(array)
    }

    /// Check the operand against the domain shape of the first operand.
    ///
    /// Scalars always pass. A rank-0 array against a rank>0 domain is not a
    /// usable operand at all ([`BlockwiseError::UnsupportedOperand`]); any
    /// other shape difference is a [`BlockwiseError::ShapeMismatch`].
    pub fn validate(&self, domain_shape: &[usize]) -> Result<()> {
        match self {
            Operand::Scalar(_) => Ok(()),
            Operand::Array(array) => {
                let shape = array.shape();
                if shape.is_empty() && !domain_shape.is_empty() {
                    Err(BlockwiseError::UnsupportedOperand(domain_shape.to_vec()))
                } else if shape != domain_shape {
                    Err(BlockwiseError::ShapeMismatch(
                        domain_shape.to_vec(),
                        shape.to_vec(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}
