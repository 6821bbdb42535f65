//! Elementwise activations.
//!
//! Both derivatives are taken from the forward *output*, so backward only
//! needs the activation the layer produced.

use super::{Links, Pass, Propagate};
use crate::error::Result;
use crate::ops::cpu::{df_relu, df_sigmoid, mul_inplace, relu, sigmoid};
use crate::ops::dispatch::dispatch_rows;
use crate::tensors::TensorId;

type Kernel = fn(&[f32], &mut [f32]);

/// `y = 1 / (1 + e^-x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sigmoid;

impl Sigmoid {
    /// Serialization tag.
    pub const TAG: &'static str = "SigmoidLayer";
}

impl Propagate for Sigmoid {
    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn forward(&self, pass: Pass<'_>, prev: TensorId, next: TensorId) -> Result<()> {
        elementwise_forward(pass, prev, next, sigmoid)
    }

    fn backward(&self, pass: Pass<'_>, links: Links) -> Result<()> {
        elementwise_backward(pass, links, df_sigmoid)
    }
}

/// `y = max(x, 0)`, with a 0.01 slope in backward where `y <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Relu;

impl Relu {
    /// Serialization tag.
    pub const TAG: &'static str = "ReluLayer";
}

impl Propagate for Relu {
    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn forward(&self, pass: Pass<'_>, prev: TensorId, next: TensorId) -> Result<()> {
        elementwise_forward(pass, prev, next, relu)
    }

    fn backward(&self, pass: Pass<'_>, links: Links) -> Result<()> {
        elementwise_backward(pass, links, df_relu)
    }
}

fn elementwise_forward(
    pass: Pass<'_>,
    prev: TensorId,
    next: TensorId,
    kernel: Kernel,
) -> Result<()> {
    let pool = pass.pool;
    pass.arena.with_taken(next, |arena, output| {
        let input = arena.get(prev);
        let rows = input.shape().batch;
        let len = input.shape().one_batch_size();
        let x = input.data();

        dispatch_rows(pool, rows, len, output.data_mut(), |range, chunk| {
            kernel(&x[range.start * len..range.end * len], chunk);
        })
    })
}

/// `prev_grad = f'(next) * next_grad`, written row partition by row partition.
fn elementwise_backward(pass: Pass<'_>, links: Links, derivative: Kernel) -> Result<()> {
    let pool = pass.pool;
    pass.arena.with_taken(links.prev_grad, |arena, prev_grad| {
        prev_grad.fill(0.0);
        let rows = arena.get(links.prev).shape().batch;
        let len = prev_grad.shape().one_batch_size();
        let y = arena.get(links.next).data();
        let dy = arena.get(links.next_grad).data();

        dispatch_rows(pool, rows, len, prev_grad.data_mut(), |range, chunk| {
            let span = range.start * len..range.end * len;
            derivative(&y[span.clone()], chunk);
            mul_inplace(chunk, &dy[span]);
        })
    })
}
