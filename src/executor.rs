//! The blockwise execution engine: option surface, per-call worker pool,
//! and the per-block read → compute → write pipeline.
//!
//! All argument validation happens eagerly, before any block is scheduled;
//! a call that fails validation performs no I/O at all. During execution the
//! first failing block task short-circuits the remaining tasks and the error
//! propagates to the caller, wrapped with the failing block's bounding box.
//! Blocks already written before the failure stay written.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::blocking::{resolve_block_shape, Block, Blocking};
use crate::mask::{read_block_mask, BlockMask, MaskArray};
use crate::operand::Operand;
use crate::{ArrayLike, BlockwiseError, BoundingBox, Result};

/// Per-call configuration for a blockwise operation.
///
/// The defaults reproduce the plain call: write into the first operand, use
/// its native chunk shape (or the crate default) as block shape, use the
/// host's full parallelism, no mask, no progress reporting.
pub struct ApplyOptions<'a, T> {
    /// Output target; `None` mutates the first operand in place.
    pub out: Option<&'a dyn ArrayLike<Elem = T>>,
    /// Nominal block shape; `None` derives it from the first operand.
    pub block_shape: Option<Vec<usize>>,
    /// Worker count; must be positive. `None` uses the host's available
    /// parallelism.
    pub n_threads: Option<usize>,
    /// Positions outside the mask are left untouched.
    pub mask: Option<&'a dyn MaskArray>,
    /// Emit a progress line per completed block. No effect on results.
    pub verbose: bool,
}

impl<'a, T> ApplyOptions<'a, T> {
    pub fn new() -> Self {
        Self {
            out: None,
            block_shape: None,
            n_threads: None,
            mask: None,
            verbose: false,
        }
    }

    /// Write results to a distinct target instead of the first operand.
    pub fn out(mut self, out: &'a dyn ArrayLike<Elem = T>) -> Self {
        self.out = Some(out);
        self
    }

    /// Use an explicit block shape.
    pub fn block_shape(mut self, block_shape: Vec<usize>) -> Self {
        self.block_shape = Some(block_shape);
        self
    }

    /// Use a fixed worker count. Zero is rejected when the call runs.
    pub fn n_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    /// Restrict updates to positions where the mask is true.
    pub fn mask(mut self, mask: &'a dyn MaskArray) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Toggle per-block progress reporting.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl<'a, T> Default for ApplyOptions<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply an arbitrary binary function blockwise and in parallel.
///
/// `x` is the first operand and the default output target; `y` is a scalar
/// or a shape-matching array-like. One task runs per block of the grid; the
/// returned handle is the output array-like (`opts.out` if given, else `x`).
pub fn apply_with<'a, T, F>(
    x: &'a dyn ArrayLike<Elem = T>,
    y: Operand<'a, T>,
    f: F,
    opts: &ApplyOptions<'a, T>,
) -> Result<&'a dyn ArrayLike<Elem = T>>
where
    T: Copy + Send + Sync,
    F: Fn(T, T) -> T + Sync,
{
    let shape = x.shape();
    let out = opts.out.unwrap_or(x);
    if out.shape() != shape {
        return Err(BlockwiseError::ShapeMismatch(
            shape.to_vec(),
            out.shape().to_vec(),
        ));
    }
    y.validate(shape)?;
    if opts.n_threads == Some(0) {
        return Err(BlockwiseError::InvalidThreadCount);
    }
    if let Some(mask) = opts.mask {
        if mask.mask_shape() != shape {
            return Err(BlockwiseError::ShapeMismatch(
                shape.to_vec(),
                mask.mask_shape().to_vec(),
            ));
        }
    }

    let block_shape = resolve_block_shape(x, opts.block_shape.as_deref())?;
    let blocking = Blocking::new(shape.to_vec(), block_shape)?;
    let n_blocks = blocking.n_blocks();

    // The pool lives for this call only and is torn down on every exit path.
    // rayon reads a thread count of 0 as "host parallelism", which is the
    // None default here; an explicit 0 was rejected above.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.n_threads.unwrap_or(0))
        .build()?;
    log::debug!(
        "blockwise apply: shape {:?}, block shape {:?}, {} blocks, {} workers",
        shape,
        blocking.block_shape(),
        n_blocks,
        pool.current_num_threads()
    );

    let completed = AtomicUsize::new(0);
    pool.install(|| {
        (0..n_blocks).into_par_iter().try_for_each(|index| {
            let block = blocking.block(index);
            if let Err(source) = process_block(x, &y, out, opts.mask, &f, &block) {
                return Err(BlockwiseError::BlockTask {
                    index,
                    bounds: block.bounds,
                    source: Box::new(source),
                });
            }
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if opts.verbose {
                log::info!("processed block {done}/{n_blocks}");
            }
            Ok(())
        })
    })?;

    Ok(out)
}

/// Run one block: mask gate, reads, elementwise compute, masked merge,
/// write-back. Blocks share no state, so tasks may run in any order.
fn process_block<T, F>(
    x: &dyn ArrayLike<Elem = T>,
    y: &Operand<'_, T>,
    out: &dyn ArrayLike<Elem = T>,
    mask: Option<&dyn MaskArray>,
    f: &F,
    block: &Block,
) -> Result<()>
where
    T: Copy + Send + Sync,
    F: Fn(T, T) -> T + Sync,
{
    let bounds = &block.bounds;
    let gate = match mask {
        Some(m) => read_block_mask(m, bounds)?,
        None => BlockMask::Full,
    };
    if matches!(gate, BlockMask::Empty) {
        // Nothing inside the mask: no reads of x/y, no write to out.
        return Ok(());
    }

    let xs = x.read(bounds)?;
    ensure_block_len(xs.len(), bounds)?;

    let result: Vec<T> = match y {
        Operand::Scalar(s) => match &gate {
            BlockMask::Partial(bits) => xs
                .iter()
                .zip(bits)
                .map(|(&a, &m)| if m { f(a, *s) } else { a })
                .collect(),
            _ => xs.iter().map(|&a| f(a, *s)).collect(),
        },
        Operand::Array(arr) => {
            let ys = arr.read(bounds)?;
            ensure_block_len(ys.len(), bounds)?;
            match &gate {
                BlockMask::Partial(bits) => xs
                    .iter()
                    .zip(&ys)
                    .zip(bits)
                    .map(|((&a, &b), &m)| if m { f(a, b) } else { a })
                    .collect(),
                _ => xs.iter().zip(&ys).map(|(&a, &b)| f(a, b)).collect(),
            }
        }
    };

    out.write(bounds, &result)
}

fn ensure_block_len(len: usize, bounds: &BoundingBox) -> Result<()> {
    if len == bounds.num_elements() {
        Ok(())
    } else {
        Err(BlockwiseError::Storage(format!(
            "read returned {len} values for region {bounds} of {} elements",
            bounds.num_elements()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryArray;

    /// Backend whose reads always fail, for failure-propagation tests.
    struct BrokenArray {
        shape: Vec<usize>,
    }

    impl ArrayLike for BrokenArray {
        type Elem = f64;

        fn shape(&self) -> &[usize] {
            &self.shape
        }

        fn read(&self, _bounds: &BoundingBox) -> Result<Vec<f64>> {
            Err(BlockwiseError::Storage("simulated read failure".into()))
        }

        fn write(&self, _bounds: &BoundingBox, _data: &[f64]) -> Result<()> {
            Err(BlockwiseError::Storage("simulated write failure".into()))
        }
    }

    /// Wrapper counting bounding-box reads, for skip-path tests.
    struct CountingArray {
        inner: MemoryArray<f64>,
        reads: AtomicUsize,
    }

    impl ArrayLike for CountingArray {
        type Elem = f64;

        fn shape(&self) -> &[usize] {
            ArrayLike::shape(&self.inner)
        }

        fn read(&self, bounds: &BoundingBox) -> Result<Vec<f64>> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            self.inner.read(bounds)
        }

        fn write(&self, bounds: &BoundingBox, data: &[f64]) -> Result<()> {
            self.inner.write(bounds, data)
        }
    }

    #[test]
    fn test_in_place_scalar() {
        let x = MemoryArray::from_vec(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let opts = ApplyOptions::new().block_shape(vec![2, 2]);
        apply_with(&x, Operand::scalar(1.0), |a, b| a + b, &opts).unwrap();
        assert_eq!(x.to_vec().unwrap(), vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_distinct_out_leaves_x_untouched() {
        let x = MemoryArray::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = MemoryArray::fill(vec![2, 2], 0.0);
        let opts = ApplyOptions::new().out(&out).block_shape(vec![1, 2]);
        apply_with(&x, Operand::scalar(10.0), |a, b| a * b, &opts).unwrap();
        assert_eq!(x.to_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(out.to_vec().unwrap(), vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_out_shape_checked_eagerly() {
        let x = MemoryArray::fill(vec![4, 4], 1.0);
        let out = MemoryArray::fill(vec![4, 3], 0.0);
        let opts = ApplyOptions::new().out(&out);
        let err = apply_with(&x, Operand::scalar(1.0), |a, b| a + b, &opts)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, BlockwiseError::ShapeMismatch(_, _)));
        // No partial work: out untouched.
        assert!(out.to_vec().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_mask_shape_checked_eagerly() {
        let x = MemoryArray::fill(vec![4, 4], 1.0);
        let mask = MemoryArray::fill(vec![4, 3], true);
        let opts = ApplyOptions::new().mask(&mask);
        let err = apply_with(&x, Operand::scalar(1.0), |a, b| a + b, &opts)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, BlockwiseError::ShapeMismatch(_, _)));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let x = MemoryArray::fill(vec![4, 4], 1.0);
        let before = x.to_vec().unwrap();
        let opts = ApplyOptions::new().n_threads(0);
        let err = apply_with(&x, Operand::scalar(1.0), |a, b| a + b, &opts)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, BlockwiseError::InvalidThreadCount));
        assert_eq!(x.to_vec().unwrap(), before);
    }

    #[test]
    fn test_block_task_failure_carries_bounds() {
        let x = MemoryArray::fill(vec![4], 1.0);
        let y = BrokenArray { shape: vec![4] };
        let opts = ApplyOptions::new().block_shape(vec![4]).n_threads(1);
        let err = apply_with(&x, Operand::array(&y), |a, b| a + b, &opts)
            .map(|_| ())
            .unwrap_err();
        match err {
            BlockwiseError::BlockTask { index, bounds, .. } => {
                assert_eq!(index, 0);
                assert_eq!(bounds, BoundingBox::new(vec![0], vec![4]));
            }
            other => panic!("expected BlockTask, got {other}"),
        }
    }

    #[test]
    fn test_failure_identical_when_verbose() {
        let x = MemoryArray::fill(vec![4], 1.0);
        let y = BrokenArray { shape: vec![4] };
        let opts = ApplyOptions::new()
            .block_shape(vec![4])
            .n_threads(1)
            .verbose(true);
        let err = apply_with(&x, Operand::array(&y), |a, b| a + b, &opts)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, BlockwiseError::BlockTask { .. }));
    }

    #[test]
    fn test_all_false_mask_skips_reads() {
        let x = CountingArray {
            inner: MemoryArray::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
            reads: AtomicUsize::new(0),
        };
        let mask = MemoryArray::fill(vec![2, 2], false);
        let opts = ApplyOptions::new().block_shape(vec![1, 1]).mask(&mask);
        apply_with(&x, Operand::scalar(100.0), |a, b| a + b, &opts).unwrap();
        assert_eq!(x.reads.load(Ordering::Relaxed), 0);
        assert_eq!(x.inner.to_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_partial_mask_merges_from_x() {
        // With a distinct out, unmasked positions take x's values.
        let x = MemoryArray::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = MemoryArray::fill(vec![2, 2], -1.0);
        let mask = MemoryArray::from_vec(vec![2, 2], vec![true, false, false, true]).unwrap();
        let opts = ApplyOptions::new()
            .out(&out)
            .mask(&mask)
            .block_shape(vec![2, 2]);
        apply_with(&x, Operand::scalar(100.0), |a, b| a + b, &opts).unwrap();
        assert_eq!(out.to_vec().unwrap(), vec![101.0, 2.0, 3.0, 104.0]);
    }

    #[test]
    fn test_empty_domain_is_a_noop() {
        let x = MemoryArray::fill(vec![0, 5], 1.0);
        let opts = ApplyOptions::new().block_shape(vec![2, 2]);
        apply_with(&x, Operand::scalar(1.0), |a, b| a + b, &opts).unwrap();
    }
}
