//! # Operation Layer
//!
//! Row kernels and the machinery that spreads them over the worker pool.
//!
//! ## Submodules
//!
//! - [`cpu`]: sequential slice kernels (activations, affine map, softmax)
//! - [`dispatch`]: batch-row partitioning over the [`WorkerPool`](crate::backend::WorkerPool)
//!
//! ## Extending
//!
//! To add a new layer computation:
//!
//! 1. Write the per-row kernel in `cpu`
//! 2. Call it from the layer through `dispatch::dispatch_rows`, one partition of rows at a time
//! 3. Keep shape checks with the caller; kernels trust their slice lengths

pub mod cpu;
pub mod dispatch;
