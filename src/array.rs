//! Array-like capability contract and the dense in-memory backend.
//!
//! Operands are opaque handles: the engine only ever asks for their shape,
//! an optional native chunk shape, and bounding-box reads/writes of dense
//! blocks. Anything that can answer those (an HDF5 dataset, a Zarr/N5
//! array, a memory-mapped volume) can participate. [`MemoryArray`] is the
//! built-in implementation used by tests and small in-core workloads.

use std::fmt;
use std::sync::RwLock;

use crate::{BlockwiseError, Result};

/// A rectangular region of the domain, as half-open per-axis ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundingBox {
    /// Inclusive start coordinate per axis.
    pub begin: Vec<usize>,
    /// Exclusive end coordinate per axis.
    pub end: Vec<usize>,
}

impl BoundingBox {
    /// Create a bounding box from begin/end coordinates.
    ///
    /// `begin` and `end` must have equal length with `begin[i] <= end[i]`.
    pub fn new(begin: Vec<usize>, end: Vec<usize>) -> Self {
        debug_assert_eq!(begin.len(), end.len());
        debug_assert!(begin.iter().zip(&end).all(|(b, e)| b <= e));
        Self { begin, end }
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.begin.len()
    }

    /// Extent of the region along each axis.
    pub fn shape(&self) -> Vec<usize> {
        self.begin
            .iter()
            .zip(&self.end)
            .map(|(&b, &e)| e - b)
            .collect()
    }

    /// Number of positions inside the region.
    pub fn num_elements(&self) -> usize {
        self.begin
            .iter()
            .zip(&self.end)
            .map(|(&b, &e)| e - b)
            .product()
    }

    /// Check that the region lies inside an array of the given shape.
    pub fn check_within(&self, shape: &[usize]) -> Result<()> {
        let inside = self.rank() == shape.len()
            && self.end.iter().zip(shape).all(|(&e, &s)| e <= s);
        if inside {
            Ok(())
        } else {
            Err(BlockwiseError::OutOfBounds {
                bounds: self.clone(),
                shape: shape.to_vec(),
            })
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (b, e)) in self.begin.iter().zip(&self.end).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{b}..{e}")?;
        }
        write!(f, "]")
    }
}

/// Capability contract for operands of blockwise operations.
///
/// Implementations must tolerate concurrent reads, and concurrent writes to
/// disjoint bounding boxes; the engine never issues overlapping writes.
/// Writes take `&self` so that the output may alias the first operand while
/// block tasks run in parallel.
pub trait ArrayLike: Send + Sync {
    /// Element type, fixed for the call's duration.
    type Elem: Copy + Send + Sync;

    /// Extent along each axis.
    fn shape(&self) -> &[usize];

    /// Native chunk shape of the backing store, if it has one.
    ///
    /// Used only as the default block shape when the caller supplies none.
    fn chunks(&self) -> Option<&[usize]> {
        None
    }

    /// Read the region into a dense row-major block.
    fn read(&self, bounds: &BoundingBox) -> Result<Vec<Self::Elem>>;

    /// Store a dense row-major block at the region.
    fn write(&self, bounds: &BoundingBox, data: &[Self::Elem]) -> Result<()>;
}

/// Dense row-major in-memory array with interior mutability.
///
/// The element buffer sits behind an `RwLock` so that reads from concurrent
/// block tasks proceed in parallel while writes serialize briefly.
pub struct MemoryArray<T> {
    shape: Vec<usize>,
    chunks: Option<Vec<usize>>,
    data: RwLock<Vec<T>>,
}

impl<T: Copy + Send + Sync> MemoryArray<T> {
    /// Create an array of the given shape, filled with one value.
    pub fn fill(shape: Vec<usize>, value: T) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            chunks: None,
            data: RwLock::new(vec![value; len]),
        }
    }

    /// Create an array from existing row-major data.
    ///
    /// Fails with [`BlockwiseError::ShapeMismatch`] if the data length does
    /// not match the shape.
    pub fn from_vec(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        let len: usize = shape.iter().product();
        if data.len() != len {
            return Err(BlockwiseError::ShapeMismatch(
                shape.clone(),
                vec![data.len()],
            ));
        }
        Ok(Self {
            shape,
            chunks: None,
            data: RwLock::new(data),
        })
    }

    /// Declare a native chunk shape, reported through [`ArrayLike::chunks`].
    pub fn with_chunks(mut self, chunks: Vec<usize>) -> Self {
        self.chunks = Some(chunks);
        self
    }

    /// Snapshot the full contents as a row-major vector.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        Ok(self.lock_read()?.clone())
    }

    fn lock_read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<T>>> {
        self.data
            .read()
            .map_err(|_| BlockwiseError::Storage("memory array lock poisoned".into()))
    }

    fn lock_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<T>>> {
        self.data
            .write()
            .map_err(|_| BlockwiseError::Storage("memory array lock poisoned".into()))
    }
}

impl<T: Copy + Send + Sync> ArrayLike for MemoryArray<T> {
    type Elem = T;

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn chunks(&self) -> Option<&[usize]> {
        self.chunks.as_deref()
    }

    fn read(&self, bounds: &BoundingBox) -> Result<Vec<T>> {
        bounds.check_within(&self.shape)?;
        let data = self.lock_read()?;
        let mut block = Vec::with_capacity(bounds.num_elements());
        for_each_run(&self.shape, bounds, |offset, len| {
            block.extend_from_slice(&data[offset..offset + len]);
        });
        Ok(block)
    }

    fn write(&self, bounds: &BoundingBox, block: &[T]) -> Result<()> {
        bounds.check_within(&self.shape)?;
        if block.len() != bounds.num_elements() {
            return Err(BlockwiseError::Storage(format!(
                "write of {} elements into region {bounds} of {} elements",
                block.len(),
                bounds.num_elements()
            )));
        }
        let mut data = self.lock_write()?;
        let mut pos = 0;
        for_each_run(&self.shape, bounds, |offset, len| {
            data[offset..offset + len].copy_from_slice(&block[pos..pos + len]);
            pos += len;
        });
        Ok(())
    }
}

/// Visit the region as contiguous row-major runs of the flat buffer.
///
/// Calls `f(start_offset, len)` once per innermost-axis run, in row-major
/// order of the region. The innermost axis is contiguous in a dense array,
/// so copies move whole runs instead of single elements.
pub(crate) fn for_each_run(
    shape: &[usize],
    bounds: &BoundingBox,
    mut f: impl FnMut(usize, usize),
) {
    let rank = shape.len();
    if bounds.num_elements() == 0 {
        return;
    }
    if rank == 0 {
        // A rank-0 array holds exactly one element.
        f(0, 1);
        return;
    }

    let mut strides = vec![1usize; rank];
    for i in (0..rank - 1).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }

    let run_len = bounds.end[rank - 1] - bounds.begin[rank - 1];
    let mut idx = bounds.begin.clone();
    loop {
        let base: usize = idx.iter().zip(&strides).map(|(&i, &s)| i * s).sum();
        f(base, run_len);

        // Advance the odometer over the outer axes; the innermost axis is
        // consumed by the run itself.
        let mut axis = rank - 1;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < bounds.end[axis] {
                break;
            }
            idx[axis] = bounds.begin[axis];
            if axis == 0 {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_accessors() {
        let bb = BoundingBox::new(vec![1, 2], vec![3, 5]);
        assert_eq!(bb.rank(), 2);
        assert_eq!(bb.shape(), vec![2, 3]);
        assert_eq!(bb.num_elements(), 6);
        assert_eq!(bb.to_string(), "[1..3, 2..5]");
    }

    #[test]
    fn test_bounding_box_check_within() {
        let bb = BoundingBox::new(vec![0, 0], vec![2, 4]);
        assert!(bb.check_within(&[2, 4]).is_ok());
        assert!(bb.check_within(&[2, 3]).is_err());
        assert!(bb.check_within(&[2, 4, 1]).is_err());
    }

    #[test]
    fn test_memory_array_read_region() {
        // 3x4 array, values 0..12
        let x = MemoryArray::from_vec(vec![3, 4], (0..12).collect()).unwrap();

        let bb = BoundingBox::new(vec![1, 1], vec![3, 3]);
        let block = x.read(&bb).unwrap();
        assert_eq!(block, vec![5, 6, 9, 10]);
    }

    #[test]
    fn test_memory_array_write_region() {
        let x = MemoryArray::fill(vec![3, 4], 0i32);

        let bb = BoundingBox::new(vec![0, 2], vec![2, 4]);
        x.write(&bb, &[1, 2, 3, 4]).unwrap();

        assert_eq!(x.to_vec().unwrap(), vec![0, 0, 1, 2, 0, 0, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn test_memory_array_roundtrip_3d() {
        let x = MemoryArray::from_vec(vec![2, 3, 4], (0..24).collect()).unwrap();

        let bb = BoundingBox::new(vec![0, 1, 1], vec![2, 3, 3]);
        let block = x.read(&bb).unwrap();
        assert_eq!(block, vec![5, 6, 9, 10, 17, 18, 21, 22]);

        // Write the same block back, contents unchanged.
        x.write(&bb, &block).unwrap();
        assert_eq!(x.to_vec().unwrap(), (0..24).collect::<Vec<_>>());
    }

    #[test]
    fn test_memory_array_from_vec_length_mismatch() {
        let res = MemoryArray::from_vec(vec![2, 2], vec![1.0, 2.0, 3.0]);
        assert!(res.is_err());
    }

    #[test]
    fn test_memory_array_write_wrong_block_len() {
        let x = MemoryArray::fill(vec![2, 2], 0u8);
        let bb = BoundingBox::new(vec![0, 0], vec![2, 2]);
        assert!(x.write(&bb, &[1, 2]).is_err());
    }

    #[test]
    fn test_read_out_of_bounds() {
        let x = MemoryArray::fill(vec![2, 2], 0u8);
        let bb = BoundingBox::new(vec![0, 0], vec![3, 2]);
        assert!(matches!(
            x.read(&bb),
            Err(BlockwiseError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_empty_region() {
        let x = MemoryArray::from_vec(vec![2, 2], vec![1, 2, 3, 4]).unwrap();
        let bb = BoundingBox::new(vec![1, 1], vec![1, 2]);
        assert_eq!(x.read(&bb).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn test_chunks_declaration() {
        let x = MemoryArray::fill(vec![8, 8], 0.0f32).with_chunks(vec![4, 4]);
        assert_eq!(x.chunks(), Some(&[4usize, 4][..]));
        let y = MemoryArray::fill(vec![8, 8], 0.0f32);
        assert_eq!(y.chunks(), None);
    }
}
