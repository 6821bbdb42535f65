//! Fully-connected (dense) layer.

use rand::rngs::StdRng;

use super::{Links, Pass, Propagate, next_field};
use crate::error::Result;
use crate::init::WeightInit;
use crate::ops::cpu::{div_inplace, fully_connect};
use crate::ops::dispatch::dispatch_rows;
use crate::tensors::{Shape, TensorId};

/// `y = W·x + b` over each flattened batch row.
///
/// The weight is stored as one flat tensor of shape `(1, in·out, 1, 1)`, with
/// `weight[i·in + j]` connecting input `j` to output `i`. The optional bias has
/// shape `(1, outputs, 1, 1)` and starts at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FullyConnected {
    param_shape: Shape,
    bias: bool,
    init: WeightInit,
}

impl FullyConnected {
    /// Serialization tag.
    pub const TAG: &'static str = "FullyConnectedLayer";

    /// `outputs` units, with or without a bias term.
    #[must_use]
    pub const fn new(outputs: usize, bias: bool) -> Self {
        Self::with_shape(Shape::new(1, outputs, 1, 1), bias)
    }

    /// Output described by a full per-sample shape.
    ///
    /// The bias, when enabled, holds one value per output element
    /// (`param_shape.one_batch_size()`), so spatial outputs get their own term.
    #[must_use]
    pub const fn with_shape(param_shape: Shape, bias: bool) -> Self {
        Self {
            param_shape,
            bias,
            init: WeightInit::Default,
        }
    }

    /// Replaces the weight initializer.
    #[must_use]
    pub const fn with_init(mut self, init: WeightInit) -> Self {
        self.init = init;
        self
    }

    /// Number of output units per sample.
    #[must_use]
    pub const fn outputs(&self) -> usize {
        self.param_shape.one_batch_size()
    }

    /// Whether a bias tensor is allocated.
    #[must_use]
    pub const fn has_bias(&self) -> bool {
        self.bias
    }
}

impl Default for FullyConnected {
    fn default() -> Self {
        Self::new(0, false)
    }
}

impl Propagate for FullyConnected {
    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn output_shape(&self, input: Shape) -> Shape {
        self.param_shape.with_batch(input.batch)
    }

    fn param_shapes(&self, input: Shape, output: Shape) -> Vec<Shape> {
        let mut shapes = vec![Shape::new(
            1,
            input.one_batch_size() * output.one_batch_size(),
            1,
            1,
        )];
        if self.bias {
            shapes.push(Shape::new(1, output.one_batch_size(), 1, 1));
        }
        shapes
    }

    fn init_param(
        &self,
        index: usize,
        data: &mut [f32],
        input: Shape,
        output: Shape,
        rng: &mut StdRng,
    ) -> Result<()> {
        match index {
            0 => self
                .init
                .fill(data, input.one_batch_size(), output.one_batch_size(), rng),
            _ => Ok(()),
        }
    }

    fn forward(&self, pass: Pass<'_>, prev: TensorId, next: TensorId) -> Result<()> {
        let pool = pass.pool;
        let weight = pass.params[0];
        let bias = self.bias.then(|| pass.params[1]);

        pass.arena.with_taken(next, |arena, output| {
            let input = arena.get(prev);
            let rows = input.shape().batch;
            let in_len = input.shape().one_batch_size();
            let out_len = output.shape().one_batch_size();
            let x = input.data();
            let w = arena.get(weight).data();
            let b = bias.map(|id| arena.get(id).data());

            dispatch_rows(pool, rows, out_len, output.data_mut(), |range, chunk| {
                let x = &x[range.start * in_len..range.end * in_len];
                fully_connect(x, w, b, chunk, range.len(), in_len, out_len);
            })
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn backward(&self, pass: Pass<'_>, links: Links) -> Result<()> {
        let pool = pass.pool;
        let weight = pass.params[0];
        let weight_grad = pass.param_grads[0];
        let arena = pass.arena;

        // prev_grad[k][j] = Σ_i W[i][j] · next_grad[k][i]
        arena.with_taken(links.prev_grad, |arena, prev_grad| {
            prev_grad.fill(0.0);
            let rows = arena.get(links.prev).shape().batch;
            let in_len = prev_grad.shape().one_batch_size();
            let next_grad = arena.get(links.next_grad);
            let out_len = next_grad.shape().one_batch_size();
            let dy = next_grad.data();
            let w = arena.get(weight).data();

            dispatch_rows(pool, rows, in_len, prev_grad.data_mut(), |range, chunk| {
                for (k, g) in range.zip(chunk.chunks_exact_mut(in_len)) {
                    let dy = &dy[k * out_len..(k + 1) * out_len];
                    for (i, &d) in dy.iter().enumerate() {
                        let w = &w[i * in_len..(i + 1) * in_len];
                        for (g, &w) in g.iter_mut().zip(w) {
                            *g += w * d;
                        }
                    }
                }
            })
        })?;

        let batch = arena.get(links.next).shape().batch;

        // weight_grad[i][j] = mean_k x[k][j] · next_grad[k][i]
        arena.with_taken(weight_grad, |arena, grad| {
            grad.fill(0.0);
            let input = arena.get(links.prev);
            let next_grad = arena.get(links.next_grad);
            let in_len = input.shape().one_batch_size();
            let g = grad.data_mut();

            for k in 0..batch {
                let x = input.row(k);
                for (i, &d) in next_grad.row(k).iter().enumerate() {
                    for (g, &x) in g[i * in_len..(i + 1) * in_len].iter_mut().zip(x) {
                        *g += x * d;
                    }
                }
            }
            if batch > 0 {
                div_inplace(g, batch as f32);
            }
        });

        // The bias gradient is the batch mean of the layer's own output.
        if self.bias {
            arena.with_taken(pass.param_grads[1], |arena, grad| {
                grad.fill(0.0);
                let output = arena.get(links.next);
                let g = grad.data_mut();

                for k in 0..batch {
                    for (g, &y) in g.iter_mut().zip(output.row(k)) {
                        *g += y;
                    }
                }
                if batch > 0 {
                div_inplace(g, batch as f32);
            }
            });
        }
        Ok(())
    }

    fn write_fields(&self, _input: Shape) -> Vec<String> {
        let shape = self.param_shape;
        vec![
            shape.batch.to_string(),
            shape.channels.to_string(),
            shape.width.to_string(),
            shape.height.to_string(),
            u8::from(self.bias).to_string(),
        ]
    }

    fn read_fields(
        &mut self,
        fields: &mut dyn Iterator<Item = &str>,
    ) -> core::result::Result<(), String> {
        let batch = next_field(fields, "batch")?;
        let channels = next_field(fields, "channels")?;
        let width = next_field(fields, "width")?;
        let height = next_field(fields, "height")?;
        let bias = match fields.next() {
            Some("1" | "true") => true,
            Some("0" | "false") => false,
            Some(other) => return Err(format!("field `bias` has invalid value `{other}`")),
            None => return Err("missing field `bias`".to_string()),
        };

        self.param_shape = Shape::new(batch, channels, width, height);
        self.bias = bias;
        Ok(())
    }
}
