//! Row-wise softmax.

use super::{Links, Pass, Propagate};
use crate::error::Result;
use crate::ops::cpu::{softmax_row, softmax_row_backward};
use crate::ops::dispatch::dispatch_rows;
use crate::tensors::TensorId;

/// Turns each batch row into a probability distribution.
///
/// Backward applies the full softmax Jacobian per row, so it composes with
/// any loss, not just cross-entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Softmax;

impl Softmax {
    /// Serialization tag.
    pub const TAG: &'static str = "SoftmaxLayer";
}

impl Propagate for Softmax {
    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn forward(&self, pass: Pass<'_>, prev: TensorId, next: TensorId) -> Result<()> {
        let pool = pass.pool;
        pass.arena.with_taken(next, |arena, output| {
            let input = arena.get(prev);
            let rows = input.shape().batch;
            let len = input.shape().one_batch_size();
            let x = input.data();

            dispatch_rows(pool, rows, len, output.data_mut(), |range, chunk| {
                for (k, y) in range.zip(chunk.chunks_exact_mut(len)) {
                    softmax_row(&x[k * len..(k + 1) * len], y);
                }
            })
        })
    }

    fn backward(&self, pass: Pass<'_>, links: Links) -> Result<()> {
        let pool = pass.pool;
        pass.arena.with_taken(links.prev_grad, |arena, prev_grad| {
            let rows = arena.get(links.prev).shape().batch;
            let len = prev_grad.shape().one_batch_size();
            let p = arena.get(links.next).data();
            let dy = arena.get(links.next_grad).data();

            dispatch_rows(pool, rows, len, prev_grad.data_mut(), |range, chunk| {
                chunk.fill(0.0);
                for (k, g) in range.zip(chunk.chunks_exact_mut(len)) {
                    let span = k * len..(k + 1) * len;
                    softmax_row_backward(&p[span.clone()], &dy[span], g);
                }
            })
        })
    }
}
