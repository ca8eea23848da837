//! Partitioning of a domain shape into a grid of rectangular blocks.
//!
//! The grid is deterministic and ordered: block `k` sits at the row-major
//! position `k` of the per-axis grid, and trailing blocks are clipped to the
//! domain boundary when the shape is not an exact multiple of the block
//! shape. The blocks are pairwise disjoint and their union is the full
//! domain, which is what makes lock-free concurrent write-back safe.

use crate::array::BoundingBox;
use crate::{ArrayLike, BlockwiseError, Result, DEFAULT_BLOCK_EDGE};

/// One block of the grid: its index and bounding box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Row-major index in the block grid.
    pub index: usize,
    /// Half-open region covered by this block, clipped to the domain.
    pub bounds: BoundingBox,
}

/// A covering, non-overlapping grid of blocks over a domain shape.
#[derive(Debug, Clone)]
pub struct Blocking {
    shape: Vec<usize>,
    block_shape: Vec<usize>,
    blocks_per_axis: Vec<usize>,
    n_blocks: usize,
}

impl Blocking {
    /// Build the grid for `shape` with nominal `block_shape`.
    ///
    /// Fails with [`BlockwiseError::InvalidBlockShape`] if the block shape
    /// has zero entries or its rank differs from the domain rank.
    pub fn new(shape: Vec<usize>, block_shape: Vec<usize>) -> Result<Self> {
        if block_shape.len() != shape.len() || block_shape.iter().any(|&b| b == 0) {
            return Err(BlockwiseError::InvalidBlockShape {
                block_shape,
                rank: shape.len(),
            });
        }
        let blocks_per_axis: Vec<usize> = shape
            .iter()
            .zip(&block_shape)
            .map(|(&s, &b)| s.div_ceil(b))
            .collect();
        let n_blocks = blocks_per_axis.iter().product();
        Ok(Self {
            shape,
            block_shape,
            blocks_per_axis,
            n_blocks,
        })
    }

    /// Domain shape the grid covers.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Nominal block shape before boundary clipping.
    pub fn block_shape(&self) -> &[usize] {
        &self.block_shape
    }

    /// Number of blocks per axis.
    pub fn blocks_per_axis(&self) -> &[usize] {
        &self.blocks_per_axis
    }

    /// Total number of blocks in the grid.
    pub fn n_blocks(&self) -> usize {
        self.n_blocks
    }

    /// Decode the block at a row-major grid index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= n_blocks()`.
    pub fn block(&self, index: usize) -> Block {
        assert!(index < self.n_blocks, "block index {index} out of range");
        let rank = self.shape.len();
        let mut coords = vec![0usize; rank];
        let mut rem = index;
        for axis in (0..rank).rev() {
            coords[axis] = rem % self.blocks_per_axis[axis];
            rem /= self.blocks_per_axis[axis];
        }
        let begin: Vec<usize> = coords
            .iter()
            .zip(&self.block_shape)
            .map(|(&c, &b)| c * b)
            .collect();
        let end: Vec<usize> = begin
            .iter()
            .zip(&self.block_shape)
            .zip(&self.shape)
            .map(|((&beg, &b), &s)| (beg + b).min(s))
            .collect();
        Block {
            index,
            bounds: BoundingBox::new(begin, end),
        }
    }

    /// Iterate over all blocks in row-major order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        (0..self.n_blocks).map(|i| self.block(i))
    }
}

/// Pick the block shape for a call: the explicit one if given, else the
/// operand's native chunk shape, else [`DEFAULT_BLOCK_EDGE`] along each axis.
pub fn resolve_block_shape<T: Copy + Send + Sync>(
    x: &dyn ArrayLike<Elem = T>,
    explicit: Option<&[usize]>,
) -> Result<Vec<usize>> {
    let rank = x.shape().len();
    let block_shape = match explicit {
        Some(bs) => bs.to_vec(),
        None => match x.chunks() {
            Some(chunks) => chunks.to_vec(),
            None => vec![DEFAULT_BLOCK_EDGE; rank],
        },
    };
    if block_shape.len() != rank || block_shape.iter().any(|&b| b == 0) {
        return Err(BlockwiseError::InvalidBlockShape { block_shape, rank });
    }
    Ok(block_shape)
}
