//! Mask gate: per-block decision to skip, run unmasked, or merge.
//!
//! Skipping a block whose mask is all-false avoids every read and write for
//! that block, which is the point for sparse masks over disk-backed
//! operands. A fully-true block runs the unmasked fast path. Both are pure
//! optimizations; a partially-true block merges per position.

use crate::array::BoundingBox;
use crate::{ArrayLike, BlockwiseError, Result};

/// Boolean-convertible mask element.
pub trait Truthy: Copy {
    /// Whether the value counts as inside the mask.
    fn truthy(self) -> bool;
}

impl Truthy for bool {
    fn truthy(self) -> bool {
        self
    }
}

macro_rules! impl_truthy_int {
    ($($t:ty),*) => {
        $(impl Truthy for $t {
            fn truthy(self) -> bool {
                self != 0
            }
        })*
    };
}

impl_truthy_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl Truthy for f32 {
    fn truthy(self) -> bool {
        self != 0.0
    }
}

impl Truthy for f64 {
    fn truthy(self) -> bool {
        self != 0.0
    }
}

/// Object-safe view of a mask operand.
///
/// Implemented for every [`ArrayLike`] whose element type is [`Truthy`], so
/// a `u8` label volume works as a mask just as well as a `bool` array.
pub trait MaskArray: Send + Sync {
    /// Extent along each axis; must equal the domain shape.
    ///
    /// Named apart from [`ArrayLike::shape`] so a type implementing both
    /// traits keeps an unambiguous `shape()` method.
    fn mask_shape(&self) -> &[usize];

    /// Read the region and coerce each value to boolean.
    fn read_mask(&self, bounds: &BoundingBox) -> Result<Vec<bool>>;
}

impl<A> MaskArray for A
where
    A: ArrayLike,
    A::Elem: Truthy,
{
    fn mask_shape(&self) -> &[usize] {
        ArrayLike::shape(self)
    }

    fn read_mask(&self, bounds: &BoundingBox) -> Result<Vec<bool>> {
        Ok(self
            .read(bounds)?
            .into_iter()
            .map(Truthy::truthy)
            .collect())
    }
}

/// Classification of one block against the mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockMask {
    /// No position inside the mask: skip all reads and writes.
    Empty,
    /// Every position inside the mask: run the unmasked fast path.
    Full,
    /// Mixed: true positions take the computed value, false positions keep
    /// the first operand's values.
    Partial(Vec<bool>),
}

/// Read and classify the mask sub-block at `bounds`.
pub fn read_block_mask(mask: &dyn MaskArray, bounds: &BoundingBox) -> Result<BlockMask> {
    let bits = mask.read_mask(bounds)?;
    if bits.len() != bounds.num_elements() {
        return Err(BlockwiseError::Storage(format!(
            "mask read returned {} values for region {bounds} of {} elements",
            bits.len(),
            bounds.num_elements()
        )));
    }
    let hits = bits.iter().filter(|&&b| b).count();
    if hits == 0 {
        Ok(BlockMask::Empty)
    } else if hits == bits.len() {
        Ok(BlockMask::Full)
    } else {
        Ok(BlockMask::Partial(bits))
    }
}
