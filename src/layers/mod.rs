//! Network layers.
//!
//! A [`Layer`] pairs the bookkeeping every layer shares (input and output
//! shape, train/test state, parameter handles) with a [`LayerKind`]: the
//! closed set of variants the engine knows how to run and persist.
//!
//! # Variants
//!
//! | Kind | Tag | Parameters |
//! |------|-----|------------|
//! | [`Input`] | `InputLayer` | none |
//! | [`FullyConnected`] | `FullyConnectedLayer` | weight, optional bias |
//! | [`Sigmoid`] | `SigmoidLayer` | none |
//! | [`Relu`] | `ReluLayer` | none |
//! | [`Softmax`] | `SoftmaxLayer` | none |
//!
//! Every variant implements [`Propagate`]. Parameters live in the owning
//! network's [`TensorArena`]; a layer only keeps their [`TensorId`]s, paired
//! 1:1 with the ids of their gradients.

use core::str::FromStr;

use rand::rngs::StdRng;

use crate::backend::WorkerPool;
use crate::error::Result;
use crate::tensors::{Shape, Tensor, TensorArena, TensorId};

pub mod activation;
pub mod dense;
pub mod input;
pub mod softmax;

pub use activation::{Relu, Sigmoid};
pub use dense::FullyConnected;
pub use input::Input;
pub use softmax::Softmax;

/// Whether the network is training or evaluating.
///
/// No current layer changes its math with the state; it is threaded through
/// so stateful layers can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Forward and backward passes with parameter updates.
    #[default]
    Train,
    /// Forward passes only.
    Test,
}

/// Everything a layer may touch during one propagation step.
pub struct Pass<'a> {
    /// All tensors of the network.
    pub arena: &'a mut TensorArena,
    /// Executor for batch-row partitions.
    pub pool: &'a WorkerPool,
    /// This layer's parameter handles.
    pub params: &'a [TensorId],
    /// Gradient handles paired with `params`.
    pub param_grads: &'a [TensorId],
    /// Current network state.
    pub state: State,
}

/// The four buffers surrounding a layer during backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Links {
    /// Activation fed into the layer.
    pub prev: TensorId,
    /// Activation the layer produced.
    pub next: TensorId,
    /// Gradient to write for the previous layer.
    pub prev_grad: TensorId,
    /// Gradient arriving from the next layer.
    pub next_grad: TensorId,
}

/// Capabilities shared by every layer variant.
pub trait Propagate {
    /// Serialization tag, the first token of a model line.
    fn tag(&self) -> &'static str;

    /// Output shape for a given input shape.
    fn output_shape(&self, input: Shape) -> Shape {
        input
    }

    /// Shapes of the parameter tensors, in persistence order.
    fn param_shapes(&self, _input: Shape, _output: Shape) -> Vec<Shape> {
        Vec::new()
    }

    /// Fills parameter `index` right after it is allocated.
    ///
    /// # Errors
    /// Fails if the configured initializer is invalid.
    fn init_param(
        &self,
        _index: usize,
        _data: &mut [f32],
        _input: Shape,
        _output: Shape,
        _rng: &mut StdRng,
    ) -> Result<()> {
        Ok(())
    }

    /// Computes `next` from `prev`.
    ///
    /// # Errors
    /// Fails only if the worker pool was shut down.
    fn forward(&self, pass: Pass<'_>, prev: TensorId, next: TensorId) -> Result<()>;

    /// Writes `prev_grad` from `next_grad` and fills the parameter gradients.
    ///
    /// # Errors
    /// Fails only if the worker pool was shut down.
    fn backward(&self, pass: Pass<'_>, links: Links) -> Result<()>;

    /// Layer-specific fields written after the tag.
    fn write_fields(&self, _input: Shape) -> Vec<String> {
        Vec::new()
    }

    /// Reads the fields written by [`Propagate::write_fields`].
    ///
    /// # Errors
    /// Returns a description of the first missing or malformed field.
    fn read_fields(
        &mut self,
        _fields: &mut dyn Iterator<Item = &str>,
    ) -> core::result::Result<(), String> {
        Ok(())
    }
}

/// Pulls the next whitespace field and parses it.
pub(crate) fn next_field<T: FromStr>(
    fields: &mut dyn Iterator<Item = &str>,
    name: &str,
) -> core::result::Result<T, String> {
    let raw = fields.next().ok_or_else(|| format!("missing field `{name}`"))?;
    raw.parse()
        .map_err(|_| format!("field `{name}` has invalid value `{raw}`"))
}

/// The closed set of layer variants.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Copies the network input through.
    Input(Input),
    /// Dense affine map.
    FullyConnected(FullyConnected),
    /// Logistic activation.
    Sigmoid(Sigmoid),
    /// Rectifier activation.
    Relu(Relu),
    /// Row-wise probability normalization.
    Softmax(Softmax),
}

impl LayerKind {
    /// The variant as its shared capability set.
    #[must_use]
    pub fn as_propagate(&self) -> &dyn Propagate {
        match self {
            Self::Input(l) => l,
            Self::FullyConnected(l) => l,
            Self::Sigmoid(l) => l,
            Self::Relu(l) => l,
            Self::Softmax(l) => l,
        }
    }

    /// Mutable access to the variant's capability set.
    pub fn as_propagate_mut(&mut self) -> &mut dyn Propagate {
        match self {
            Self::Input(l) => l,
            Self::FullyConnected(l) => l,
            Self::Sigmoid(l) => l,
            Self::Relu(l) => l,
            Self::Softmax(l) => l,
        }
    }

    /// Builds an unconfigured layer from its serialization tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        REGISTRY
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, make)| make())
    }
}

/// Tag → constructor table used when loading models.
pub const REGISTRY: &[(&str, fn() -> LayerKind)] = &[
    (Input::TAG, || LayerKind::Input(Input::default())),
    (FullyConnected::TAG, || {
        LayerKind::FullyConnected(FullyConnected::default())
    }),
    (Sigmoid::TAG, || LayerKind::Sigmoid(Sigmoid)),
    (Relu::TAG, || LayerKind::Relu(Relu)),
    (Softmax::TAG, || LayerKind::Softmax(Softmax)),
];

macro_rules! impl_into_kind {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for LayerKind {
                fn from(layer: $variant) -> Self {
                    Self::$variant(layer)
                }
            }
        )*
    };
}

impl_into_kind!(Input, FullyConnected, Sigmoid, Relu, Softmax);

/// A layer attached (or about to be attached) to a network.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    kind: LayerKind,
    input_shape: Shape,
    output_shape: Shape,
    state: State,
    params: Vec<TensorId>,
    param_grads: Vec<TensorId>,
}

impl Layer {
    /// Wraps a variant; shapes are resolved when the layer joins a network.
    pub fn new(kind: impl Into<LayerKind>) -> Self {
        Self {
            kind: kind.into(),
            input_shape: Shape::default(),
            output_shape: Shape::default(),
            state: State::Train,
            params: Vec::new(),
            param_grads: Vec::new(),
        }
    }

    /// The variant.
    #[must_use]
    pub const fn kind(&self) -> &LayerKind {
        &self.kind
    }

    /// Serialization tag of the variant.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        self.kind.as_propagate().tag()
    }

    /// Shape of the activation fed into this layer.
    #[must_use]
    pub const fn input_shape(&self) -> Shape {
        self.input_shape
    }

    /// Shape of the activation this layer produces.
    #[must_use]
    pub const fn output_shape(&self) -> Shape {
        self.output_shape
    }

    /// State last assigned by the network.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Parameter handles, in persistence order.
    #[must_use]
    pub fn params(&self) -> &[TensorId] {
        &self.params
    }

    /// Gradient handles paired with [`Layer::params`].
    #[must_use]
    pub fn param_grads(&self) -> &[TensorId] {
        &self.param_grads
    }

    /// Total number of parameter values held in `arena`.
    #[must_use]
    pub fn param_count(&self, arena: &TensorArena) -> usize {
        self.params
            .iter()
            .map(|&id| arena.get(id).shape().total_size())
            .sum()
    }

    pub(crate) const fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub(crate) const fn set_input_shape(&mut self, shape: Shape) {
        self.input_shape = shape;
    }

    /// Derives the output shape and allocates parameters on first use.
    ///
    /// Parameters and their zeroed gradients are allocated once; later calls
    /// (for instance after a batch-size change) only refresh the output shape.
    ///
    /// # Errors
    /// Fails if the variant's initializer is invalid.
    pub fn solve_inner_params(&mut self, arena: &mut TensorArena, rng: &mut StdRng) -> Result<()> {
        let layer = self.kind.as_propagate();
        self.output_shape = layer.output_shape(self.input_shape);

        if self.params.is_empty() {
            for (i, shape) in layer
                .param_shapes(self.input_shape, self.output_shape)
                .into_iter()
                .enumerate()
            {
                let mut param = Tensor::new(shape);
                layer.init_param(i, param.data_mut(), self.input_shape, self.output_shape, rng)?;
                self.params.push(arena.alloc(param));
                self.param_grads.push(arena.alloc(Tensor::new(shape)));
            }
        }
        Ok(())
    }

    /// Runs the variant's forward pass.
    ///
    /// # Errors
    /// Fails only if the worker pool was shut down.
    pub fn forward(
        &self,
        arena: &mut TensorArena,
        pool: &WorkerPool,
        prev: TensorId,
        next: TensorId,
    ) -> Result<()> {
        self.kind.as_propagate().forward(self.pass(arena, pool), prev, next)
    }

    /// Runs the variant's backward pass.
    ///
    /// # Errors
    /// Fails only if the worker pool was shut down.
    pub fn backward(&self, arena: &mut TensorArena, pool: &WorkerPool, links: Links) -> Result<()> {
        self.kind.as_propagate().backward(self.pass(arena, pool), links)
    }

    fn pass<'a>(&'a self, arena: &'a mut TensorArena, pool: &'a WorkerPool) -> Pass<'a> {
        Pass {
            arena,
            pool,
            params: &self.params,
            param_grads: &self.param_grads,
            state: self.state,
        }
    }

    /// One model line: tag, layer fields, then every parameter value.
    #[must_use]
    pub fn save(&self, arena: &TensorArena) -> String {
        let fields = self.kind.as_propagate().write_fields(self.input_shape);
        let mut line = String::from(self.tag());
        if fields.is_empty() && self.params.is_empty() {
            return line;
        }

        line.push(' ');
        for field in fields {
            line.push_str(&field);
            line.push(' ');
        }
        for &id in &self.params {
            for v in arena.get(id).data() {
                line.push_str(&v.to_string());
                line.push(' ');
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_every_tag() {
        for (tag, _) in REGISTRY {
            let kind = LayerKind::from_tag(tag).unwrap();
            assert_eq!(kind.as_propagate().tag(), *tag);
        }
        assert!(LayerKind::from_tag("ConvolutionLayer").is_none());
    }

    #[test]
    fn next_field_reports_missing_and_malformed() {
        let mut fields = "3 x".split_whitespace();
        assert_eq!(next_field::<usize>(&mut fields, "a"), Ok(3));
        assert!(next_field::<usize>(&mut fields, "b").unwrap_err().contains("`x`"));
        assert!(next_field::<usize>(&mut fields, "c").unwrap_err().contains("missing"));
    }
}
