//! Blockwise parallel elementwise operations for larger-than-memory arrays.
//!
//! This crate applies binary operations (add, compare, min/max, ...) to
//! array-like datasets that cannot or should not be loaded at once, by
//! partitioning the domain into rectangular blocks and executing the
//! operation on each block concurrently on a scoped worker pool.
//!
//! # Core Types
//!
//! - [`ArrayLike`]: the capability contract an operand must expose: shape,
//!   element type, bounding-box read/write. Disk-backed datasets (HDF5, N5,
//!   Zarr, ...) implement this outside the crate; [`MemoryArray`] is the
//!   built-in dense in-memory implementation.
//! - [`Blocking`] / [`Block`]: a deterministic, non-overlapping, covering
//!   grid of rectangular blocks over the domain.
//! - [`Operand`]: the second operand, either a scalar broadcast to every
//!   block or an array-like of identical shape.
//! - [`ApplyOptions`]: per-call configuration (output target, block shape,
//!   worker count, mask, verbosity).
//! - [`BinaryOp`]: the static catalogue of supported operations.
//!
//! # Primary API
//!
//! One free function per operation ([`add`], [`subtract`], [`multiply`],
//! [`divide`], [`greater`], [`greater_equal`], [`less`], [`less_equal`],
//! [`minimum`], [`maximum`]), plus the generic entry points
//! [`apply_operation`] (catalogued op) and [`apply_with`] (arbitrary binary
//! function).
//!
//! By default the operation is applied in place to the first operand; pass a
//! distinct `out` to keep the inputs untouched. An optional boolean mask
//! restricts which positions are updated, and lets the engine skip whole
//! blocks whose mask is empty without touching storage.
//!
//! # Example
//!
//! ```rust
//! use blockwise_rs::{add, ApplyOptions, MemoryArray, Operand};
//!
//! let x = MemoryArray::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let opts = ApplyOptions::new().block_shape(vec![1, 1]);
//! add(&x, Operand::scalar(5.0), &opts).unwrap();
//! assert_eq!(x.to_vec().unwrap(), vec![6.0, 7.0, 8.0, 9.0]);
//! ```
//!
//! # Concurrency
//!
//! Block bounding boxes are disjoint and cover the domain exactly once, so
//! concurrent writes never target overlapping regions and no locking is
//! needed for the output, even when it aliases the first operand. Backends
//! must tolerate concurrent reads. A failing block task aborts the whole
//! call and surfaces the failing block's bounding box; blocks already
//! written stay written.

mod array;
mod blocking;
mod executor;
mod mask;
mod operand;
mod ops;

// ============================================================================
// Array-like capability and in-memory backend
// ============================================================================
pub use array::{ArrayLike, BoundingBox, MemoryArray};

// ============================================================================
// Block partitioning
// ============================================================================
pub use blocking::{resolve_block_shape, Block, Blocking};

// ============================================================================
// Operand classification
// ============================================================================
pub use operand::Operand;

// ============================================================================
// Mask gate
// ============================================================================
pub use mask::{read_block_mask, BlockMask, MaskArray, Truthy};

// ============================================================================
// Executor and operation catalogue
// ============================================================================
pub use executor::{apply_with, ApplyOptions};
pub use ops::{
    add, apply_operation, divide, greater, greater_equal, less, less_equal, maximum, minimum,
    multiply, subtract, BinaryOp, Element,
};

// ============================================================================
// Constants
// ============================================================================

/// Default block edge length per axis, used when the caller supplies no block
/// shape and the operand exposes no native chunk shape.
pub const DEFAULT_BLOCK_EDGE: usize = 64;

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur during blockwise operations.
#[derive(Debug, thiserror::Error)]
pub enum BlockwiseError {
    /// Block shape has non-positive entries or does not match the domain rank.
    #[error("invalid block shape {block_shape:?} for domain of rank {rank}")]
    InvalidBlockShape {
        block_shape: Vec<usize>,
        rank: usize,
    },

    /// An operand, output, or mask shape differs from the domain shape.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// Second operand is neither a scalar nor a shape-matching array-like.
    #[error("unsupported second operand: expected a scalar or an array-like of shape {0:?}")]
    UnsupportedOperand(Vec<usize>),

    /// Worker count of zero; pass `None` for host parallelism instead.
    #[error("n_threads must be a positive worker count")]
    InvalidThreadCount,

    /// A bounding box does not fit inside the array shape.
    #[error("bounding box {bounds} out of range for shape {shape:?}")]
    OutOfBounds {
        bounds: BoundingBox,
        shape: Vec<usize>,
    },

    /// Processing one block failed; the whole operation is aborted.
    #[error("block {index} {bounds} failed: {source}")]
    BlockTask {
        index: usize,
        bounds: BoundingBox,
        #[source]
        source: Box<BlockwiseError>,
    },

    /// The worker pool could not be constructed.
    #[error("worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A storage backend reported a failure.
    #[error("storage backend: {0}")]
    Storage(String),
}

/// Result type for blockwise operations.
pub type Result<T> = std::result::Result<T, BlockwiseError>;
