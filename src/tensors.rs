//! Core tensor data structures.
//!
//! # Core Tensor Utilities
//!
//! Every buffer the engine touches is a [`Tensor`]: a flat, contiguous `f32`
//! buffer described by a four dimensional [`Shape`] of
//! `(batch, channels, width, height)`.
//!
//! It supports:
//! - Construction of zeroed or literal tensors with a row-major, channel-major layout
//! - Constant fill and shape-preserving copies between tensors
//! - Per batch-row views used by the dispatcher to partition work
//! - A [`TensorArena`] that owns every tensor of a network, addressed by [`TensorId`]
//!
//! ## Layout
//!
//! The linear offset of element `(b, c, r, col)` is
//! `b·C·W·H + c·W·H + r·W + col`, see [`Shape::index`].
//!
//! ## Limitations
//! - Shapes are not validated by the operations that consume them; callers
//!   guarantee compatibility. Mismatches surface as slice-index panics.
//!
//! ## Example
//!
//! ```rust
//! use minicnn::tensors::{Shape, Tensor};
//! let t = Tensor::from_data(Shape::new(2, 3, 1, 1), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape().one_batch_size(), 3);
//! assert_eq!(t.row(1), &[4.0, 5.0, 6.0]);
//! ```

use core::fmt;

/// A `(batch, channels, width, height)` tensor descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    /// Leading dimension; the unit of parallel partitioning.
    pub batch: usize,
    /// Channels per batch row.
    pub channels: usize,
    /// Columns per channel plane.
    pub width: usize,
    /// Rows per channel plane.
    pub height: usize,
}

impl Shape {
    /// Creates a shape from its four dimensions.
    #[must_use]
    pub const fn new(batch: usize, channels: usize, width: usize, height: usize) -> Self {
        Self {
            batch,
            channels,
            width,
            height,
        }
    }

    /// Number of elements described by the whole shape.
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.batch * self.channels * self.width * self.height
    }

    /// Number of elements in a single batch row.
    #[must_use]
    pub const fn one_batch_size(&self) -> usize {
        self.channels * self.width * self.height
    }

    /// Number of elements in a single channel plane.
    #[must_use]
    pub const fn one_channel_size(&self) -> usize {
        self.width * self.height
    }

    /// Returns the same per-row shape with another batch count.
    #[must_use]
    pub const fn with_batch(self, batch: usize) -> Self {
        Self { batch, ..self }
    }

    /// Linear offset of `(batch, channel, row, col)`.
    #[must_use]
    pub const fn index(&self, batch: usize, channel: usize, row: usize, col: usize) -> usize {
        batch * self.one_batch_size() + self.index_in_batch(channel, row, col)
    }

    /// Linear offset of `(channel, row, col)` inside one batch row.
    #[must_use]
    pub const fn index_in_batch(&self, channel: usize, row: usize, col: usize) -> usize {
        channel * self.one_channel_size() + row * self.width + col
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.batch, self.channels, self.width, self.height
        )
    }
}

/// A shaped, contiguous `f32` buffer.
///
/// - `shape` describes the logical layout.
/// - `data` holds at least `shape.total_size()` values in row-major order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f32>,
}

impl Tensor {
    /// Allocates a zero-filled tensor for `shape`.
    #[must_use]
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.total_size()],
        }
    }

    /// Creates a tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape.
    #[must_use]
    pub fn from_data(shape: Shape, data: Vec<f32>) -> Self {
        assert_eq!(
            shape.total_size(),
            data.len(),
            "shape {shape} is incompatible with {} data elements",
            data.len()
        );
        Self { shape, data }
    }

    /// The shape currently describing this tensor.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// The values covered by the shape.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data[..self.shape.total_size()]
    }

    /// Mutable access to the values covered by the shape.
    pub fn data_mut(&mut self) -> &mut [f32] {
        let len = self.shape.total_size();
        &mut self.data[..len]
    }

    /// Sets every element to `value`.
    pub fn fill(&mut self, value: f32) {
        self.data_mut().fill(value);
    }

    /// Overwrites `target`'s shape and leading values with this tensor's.
    ///
    /// No resizing happens: the caller guarantees that `target`'s buffer
    /// holds at least `self.shape().total_size()` values.
    ///
    /// # Panics
    /// Panics if `target`'s buffer is too small.
    pub fn copy_to(&self, target: &mut Self) {
        let len = self.shape.total_size();
        target.data[..len].copy_from_slice(&self.data[..len]);
        target.shape = self.shape;
    }

    /// The values of batch row `batch`.
    #[must_use]
    pub fn row(&self, batch: usize) -> &[f32] {
        let len = self.shape.one_batch_size();
        &self.data[batch * len..(batch + 1) * len]
    }

    /// Mutable values of batch row `batch`.
    pub fn row_mut(&mut self, batch: usize) -> &mut [f32] {
        let len = self.shape.one_batch_size();
        &mut self.data[batch * len..(batch + 1) * len]
    }

    /// Index of the largest value in batch row `batch` (first wins on ties).
    #[must_use]
    pub fn row_argmax(&self, batch: usize) -> usize {
        let row = self.row(batch);
        let mut best = 0;
        for (i, &v) in row.iter().enumerate() {
            if v > row[best] {
                best = i;
            }
        }
        best
    }
}

/// Handle of a tensor stored in a [`TensorArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(usize);

impl TensorId {
    /// Position of the tensor inside its arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Exclusive owner of every tensor in a network.
///
/// Layers and optimizers never hold tensors themselves, only [`TensorId`]s.
/// A handle stays valid for the arena's lifetime; reallocating a tensor
/// through [`TensorArena::replace`] keeps its handle.
#[derive(Debug, Clone, Default)]
pub struct TensorArena {
    tensors: Vec<Tensor>,
}

impl TensorArena {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tensors: Vec::new(),
        }
    }

    /// Moves `tensor` into the arena and returns its handle.
    pub fn alloc(&mut self, tensor: Tensor) -> TensorId {
        self.tensors.push(tensor);
        TensorId(self.tensors.len() - 1)
    }

    /// Borrows the tensor behind `id`.
    #[must_use]
    pub fn get(&self, id: TensorId) -> &Tensor {
        &self.tensors[id.0]
    }

    /// Mutably borrows the tensor behind `id`.
    pub fn get_mut(&mut self, id: TensorId) -> &mut Tensor {
        &mut self.tensors[id.0]
    }

    /// Swaps a freshly allocated tensor in behind an existing handle.
    pub fn replace(&mut self, id: TensorId, tensor: Tensor) {
        self.tensors[id.0] = tensor;
    }

    /// Runs `f` with the tensor behind `id` detached from the arena.
    ///
    /// Inside `f` the rest of the arena stays readable, which lets one tensor
    /// be written while its neighbours are read. The detached slot reads as an
    /// empty tensor until `f` returns.
    pub fn with_taken<R>(&mut self, id: TensorId, f: impl FnOnce(&Self, &mut Tensor) -> R) -> R {
        let mut tensor = core::mem::take(&mut self.tensors[id.0]);
        let out = f(self, &mut tensor);
        self.tensors[id.0] = tensor;
        out
    }

    /// Number of tensors held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether the arena holds no tensors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Drops every tensor, invalidating all handles.
    pub fn clear(&mut self) {
        self.tensors.clear();
    }
}

/// Defines a `(batch, channels, 1, 1)` tensor from nested literal rows.
///
/// # Example
/// ```
/// use minicnn::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape(), minicnn::tensors::Shape::new(2, 2, 1, 1));
/// ```
#[macro_export]
macro_rules! tensor {
    ([ $( [ $( $v:expr ),+ $(,)? ] ),+ $(,)? ]) => {{
        let rows: ::std::vec::Vec<::std::vec::Vec<f32>> = vec![ $( vec![ $( $v as f32 ),+ ] ),+ ];
        let width = rows[0].len();
        assert!(rows.iter().all(|r| r.len() == width),
            "ragged tensor literal (rows have mismatched lengths)");
        let shape = $crate::tensors::Shape::new(rows.len(), width, 1, 1);
        $crate::tensors::Tensor::from_data(shape, rows.into_iter().flatten().collect())
    }};
}
