//! The training driver.
//!
//! A [`Network`] owns its layers, every tensor they touch, and the chain of
//! activation and gradient buffers between them:
//!
//! ```text
//! activations[0] ─layers[0]→ activations[1] ─layers[1]→ … → activations[L]
//! gradients[0]  ←layers[0]─ gradients[1]  ←layers[1]─ … ← gradients[L]
//! ```
//!
//! Backward runs in two phases. First every layer computes its gradients
//! from the same forward snapshot, last layer first. Only then does the
//! optimizer touch any parameter, again in reverse layer order.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use minicnn::backend::WorkerPool;
//! use minicnn::layers::{FullyConnected, Input, Softmax};
//! use minicnn::loss::CrossEntropy;
//! use minicnn::network::Network;
//! use minicnn::optim::Sgd;
//! use minicnn::tensor;
//! use minicnn::tensors::Shape;
//!
//! # fn main() -> minicnn::error::Result<()> {
//! let mut net = Network::with_seed(Arc::new(WorkerPool::single_threaded()), 1);
//! net.set_input_size(Shape::new(1, 2, 1, 1));
//! net.add_layer(Input::new())?;
//! net.add_layer(FullyConnected::new(2, true))?;
//! net.add_layer(Softmax)?;
//! net.set_loss_function(CrossEntropy);
//! net.set_optimizer(Sgd::new(0.1));
//!
//! let loss = net.train_batch(&tensor!([[1.0, 2.0]]), &tensor!([[1.0, 0.0]]))?;
//! assert!(loss.is_finite());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::backend::WorkerPool;
use crate::error::{Error, Result};
use crate::layers::{Layer, LayerKind, Links, State};
use crate::loss::LossFunction;
use crate::modelio;
use crate::optim::Optimizer;
use crate::tensors::{Shape, Tensor, TensorArena, TensorId};

/// An ordered stack of layers with its buffers, loss and optimizer.
pub struct Network {
    state: State,
    layers: Vec<Layer>,
    activations: Vec<TensorId>,
    gradients: Vec<TensorId>,
    arena: TensorArena,
    loss: Option<Box<dyn LossFunction>>,
    optimizer: Option<Box<dyn Optimizer>>,
    pool: Arc<WorkerPool>,
    rng: StdRng,
}

impl Network {
    /// An empty network running on `pool`, with weights seeded from the OS.
    #[must_use]
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self::with_rng(pool, StdRng::from_os_rng())
    }

    /// An empty network whose weight initialization is reproducible.
    #[must_use]
    pub fn with_seed(pool: Arc<WorkerPool>, seed: u64) -> Self {
        Self::with_rng(pool, StdRng::seed_from_u64(seed))
    }

    fn with_rng(pool: Arc<WorkerPool>, rng: StdRng) -> Self {
        Self {
            state: State::Train,
            layers: Vec::new(),
            activations: Vec::new(),
            gradients: Vec::new(),
            arena: TensorArena::new(),
            loss: None,
            optimizer: None,
            pool,
            rng,
        }
    }

    /// Reseeds the generator used for layers added from now on.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Allocates the input buffer and its gradient.
    ///
    /// Must precede the first [`Network::add_layer`]; the first layer added
    /// is normally an [`Input`](crate::layers::Input).
    pub fn set_input_size(&mut self, shape: Shape) {
        self.activations.push(self.arena.alloc(Tensor::new(shape)));
        self.gradients.push(self.arena.alloc(Tensor::new(shape)));
    }

    /// Appends a layer fed by the current last activation.
    ///
    /// # Errors
    /// [`Error::MissingInput`] if no input size was set, or an initializer
    /// error from the layer's parameters.
    pub fn add_layer(&mut self, layer: impl Into<LayerKind>) -> Result<()> {
        self.push_layer(Layer::new(layer)).map(|_| ())
    }

    pub(crate) fn push_layer(&mut self, mut layer: Layer) -> Result<&Layer> {
        let &last = self.activations.last().ok_or(Error::MissingInput)?;
        let input_shape = self.arena.get(last).shape();

        layer.set_state(self.state);
        layer.set_input_shape(input_shape);
        layer.solve_inner_params(&mut self.arena, &mut self.rng)?;

        let output_shape = layer.output_shape();
        self.activations.push(self.arena.alloc(Tensor::new(output_shape)));
        self.gradients.push(self.arena.alloc(Tensor::new(output_shape)));
        debug!(
            "added {} #{}: {input_shape} -> {output_shape}, {} params",
            layer.tag(),
            self.layers.len(),
            layer.param_count(&self.arena),
        );

        self.layers.push(layer);
        Ok(&self.layers[self.layers.len() - 1])
    }

    /// Drops every layer and buffer, and any optimizer state tied to them.
    pub fn clear(&mut self) {
        self.layers.clear();
        self.activations.clear();
        self.gradients.clear();
        self.arena.clear();
        if let Some(optimizer) = self.optimizer.as_mut() {
            optimizer.reset();
        }
    }

    /// Sets the loss used by [`Network::backward`].
    pub fn set_loss_function(&mut self, loss: impl LossFunction + 'static) {
        self.loss = Some(Box::new(loss));
    }

    /// Sets the update rule used by [`Network::backward`].
    pub fn set_optimizer(&mut self, optimizer: impl Optimizer + 'static) {
        self.optimizer = Some(Box::new(optimizer));
    }

    /// Forwards a new learning rate to the optimizer.
    ///
    /// # Errors
    /// [`Error::MissingOptimizer`] if none is configured.
    pub fn set_learning_rate(&mut self, lr: f32) -> Result<()> {
        let optimizer = self.optimizer.as_mut().ok_or(Error::MissingOptimizer)?;
        optimizer.set_learning_rate(lr);
        Ok(())
    }

    /// Loss of `output` against `label`, or `0.0` without a loss function.
    #[must_use]
    pub fn get_loss(&self, label: &Tensor, output: &Tensor) -> f32 {
        self.loss.as_ref().map_or(0.0, |loss| loss.loss(label, output))
    }

    /// Switches the network and every layer to `state`.
    pub fn set_state(&mut self, state: State) {
        self.state = state;
        for layer in &mut self.layers {
            layer.set_state(state);
        }
    }

    /// Runs `input` through every layer and returns the final activation.
    ///
    /// A batch count different from the current one reallocates the whole
    /// activation chain first; layer parameters are kept.
    ///
    /// # Errors
    /// [`Error::MissingInput`] if no input size was set, or
    /// [`Error::PoolStopped`] if the worker pool was shut down.
    ///
    /// # Panics
    /// Panics if `input`'s per-sample size differs from the input size.
    pub fn forward(&mut self, input: &Tensor) -> Result<&Tensor> {
        let &first = self.activations.first().ok_or(Error::MissingInput)?;

        let batch = input.shape().batch;
        if self.arena.get(first).shape().batch != batch {
            self.rebatch(batch)?;
        }
        input.copy_to(self.arena.get_mut(first));

        let last = self.layers.len();
        for (i, layer) in self.layers.iter().enumerate() {
            let (prev, next) = (self.activations[i], self.activations[i + 1]);
            if i + 1 < last {
                self.arena.get_mut(next).fill(0.0);
            }
            layer.forward(&mut self.arena, &self.pool, prev, next)?;
        }

        Ok(self.arena.get(self.activations[last]))
    }

    fn rebatch(&mut self, batch: usize) -> Result<()> {
        debug!("batch size changed to {batch}; reallocating activations");
        for &id in &self.activations {
            let shape = self.arena.get(id).shape().with_batch(batch);
            self.arena.replace(id, Tensor::new(shape));
        }
        for layer in &mut self.layers {
            layer.set_input_shape(layer.input_shape().with_batch(batch));
            layer.solve_inner_params(&mut self.arena, &mut self.rng)?;
        }
        Ok(())
    }

    /// Backpropagates from `label` and applies one optimizer step.
    ///
    /// Returns the loss of the current output, measured before any update.
    /// An empty batch yields zero gradients and skips the optimizer step.
    ///
    /// # Errors
    /// [`Error::MissingLoss`] or [`Error::MissingOptimizer`] if either is not
    /// configured, or [`Error::PoolStopped`] if the worker pool was shut down.
    pub fn backward(&mut self, label: &Tensor) -> Result<f32> {
        let loss_fn = self.loss.as_deref().ok_or(Error::MissingLoss)?;
        let optimizer = self.optimizer.as_deref_mut().ok_or(Error::MissingOptimizer)?;
        let (Some(&output), Some(&output_grad)) = (self.activations.last(), self.gradients.last())
        else {
            return Err(Error::MissingInput);
        };
        let arena = &mut self.arena;

        let loss = loss_fn.loss(label, arena.get(output));

        for (&act, &grad) in self.activations.iter().zip(&self.gradients) {
            let shape = arena.get(act).shape();
            if arena.get(grad).shape() != shape {
                debug!("reallocating gradient {} as {shape}", grad.index());
                arena.replace(grad, Tensor::new(shape));
            }
        }
        if arena.get(output_grad).shape() != label.shape() {
            arena.replace(output_grad, Tensor::new(label.shape()));
        }
        arena.with_taken(output_grad, |arena, grad| {
            loss_fn.gradient(label, arena.get(output), grad);
        });

        for (i, layer) in self.layers.iter().enumerate().rev() {
            arena.get_mut(self.gradients[i]).fill(0.0);
            let links = Links {
                prev: self.activations[i],
                next: self.activations[i + 1],
                prev_grad: self.gradients[i],
                next_grad: self.gradients[i + 1],
            };
            layer.backward(arena, &self.pool, links)?;
        }

        if label.shape().batch == 0 {
            debug!("empty batch; parameters left unchanged");
            return Ok(loss);
        }
        for layer in self.layers.iter().rev() {
            optimizer.update(arena, layer.params(), layer.param_grads());
        }

        Ok(loss)
    }

    /// Forward then backward in [`State::Train`]; returns the batch loss.
    ///
    /// # Errors
    /// See [`Network::forward`] and [`Network::backward`].
    pub fn train_batch(&mut self, input: &Tensor, label: &Tensor) -> Result<f32> {
        self.set_state(State::Train);
        self.forward(input)?;
        self.backward(label)
    }

    /// Forward only, in [`State::Test`].
    ///
    /// # Errors
    /// See [`Network::forward`].
    pub fn test_batch(&mut self, input: &Tensor) -> Result<&Tensor> {
        self.set_state(State::Test);
        self.forward(input)
    }

    /// Writes every layer to a text model file.
    ///
    /// # Errors
    /// Fails if the file cannot be created or written.
    pub fn save_model(&self, path: impl AsRef<Path>) -> Result<()> {
        modelio::save_model(self, path)
    }

    /// Replaces this network's layers with those of a text model file and
    /// switches to [`State::Test`].
    ///
    /// # Errors
    /// Fails if the file cannot be read, a line is malformed, or a layer
    /// carries the wrong number of parameter values.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<()> {
        modelio::load_model(self, path)
    }

    /// The layers, in forward order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Current train/test state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// The last activation, if an input size was set.
    #[must_use]
    pub fn output(&self) -> Option<&Tensor> {
        self.activations.last().map(|&id| self.arena.get(id))
    }

    /// Handles of the activation chain, input first.
    #[must_use]
    pub fn activations(&self) -> &[TensorId] {
        &self.activations
    }

    /// Handles of the gradient chain, paired with [`Network::activations`].
    #[must_use]
    pub fn gradients(&self) -> &[TensorId] {
        &self.gradients
    }

    /// Any tensor owned by this network.
    ///
    /// # Panics
    /// Panics if `id` was not issued by this network.
    #[must_use]
    pub fn tensor(&self, id: TensorId) -> &Tensor {
        self.arena.get(id)
    }

    /// Mutable access to a tensor owned by this network, e.g. to set weights.
    ///
    /// # Panics
    /// Panics if `id` was not issued by this network.
    pub fn tensor_mut(&mut self, id: TensorId) -> &mut Tensor {
        self.arena.get_mut(id)
    }

    pub(crate) const fn arena(&self) -> &TensorArena {
        &self.arena
    }

    /// The configured optimizer.
    #[must_use]
    pub fn optimizer(&self) -> Option<&dyn Optimizer> {
        self.optimizer.as_deref()
    }

    /// The worker pool this network dispatches onto.
    #[must_use]
    pub const fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("state", &self.state)
            .field("layers", &self.layers.iter().map(Layer::tag).collect::<Vec<_>>())
            .field("tensors", &self.arena.len())
            .field("has_loss", &self.loss.is_some())
            .field("has_optimizer", &self.optimizer.is_some())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{FullyConnected, Input, Relu};
    use crate::loss::Mse;
    use crate::optim::Sgd;
    use crate::tensor;

    fn net() -> Network {
        Network::with_seed(Arc::new(WorkerPool::single_threaded()), 11)
    }

    #[test]
    fn add_layer_requires_input() {
        let mut net = net();
        assert!(matches!(net.add_layer(Input::new()), Err(Error::MissingInput)));
    }

    #[test]
    fn chain_shapes_follow_layers() {
        let mut net = net();
        net.set_input_size(Shape::new(1, 3, 1, 1));
        net.add_layer(Input::new()).unwrap();
        net.add_layer(FullyConnected::new(4, true)).unwrap();
        net.add_layer(Relu).unwrap();

        assert_eq!(net.activations().len(), net.layers().len() + 1);
        for (i, layer) in net.layers().iter().enumerate() {
            let next = net.tensor(net.activations()[i + 1]).shape();
            assert_eq!(next, layer.output_shape());
        }
        assert_eq!(net.layers()[1].param_count(&net.arena), 3 * 4 + 4);
    }

    #[test]
    fn rebatch_keeps_parameters() {
        let mut net = net();
        net.set_input_size(Shape::new(1, 2, 1, 1));
        net.add_layer(Input::new()).unwrap();
        net.add_layer(FullyConnected::new(1, false)).unwrap();
        let weight = net.layers()[1].params()[0];
        let before = net.tensor(weight).clone();

        let out = net.forward(&tensor!([[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]])).unwrap();
        assert_eq!(out.shape().batch, 3);
        assert_eq!(net.tensor(weight), &before);
        assert_eq!(net.layers()[1].output_shape().batch, 3);
    }

    #[test]
    fn backward_requires_loss_and_optimizer() {
        let mut net = net();
        net.set_input_size(Shape::new(1, 1, 1, 1));
        net.add_layer(Input::new()).unwrap();
        net.forward(&tensor!([[1.0]])).unwrap();
        assert!(matches!(net.backward(&tensor!([[1.0]])), Err(Error::MissingLoss)));

        net.set_loss_function(Mse);
        assert!(matches!(net.backward(&tensor!([[1.0]])), Err(Error::MissingOptimizer)));

        net.set_optimizer(Sgd::new(0.1));
        assert!(net.backward(&tensor!([[1.0]])).is_ok());
    }

    #[test]
    fn state_follows_batch_kind() {
        let mut net = net();
        net.set_input_size(Shape::new(1, 1, 1, 1));
        net.add_layer(Input::new()).unwrap();
        net.set_loss_function(Mse);
        net.set_optimizer(Sgd::new(0.1));

        net.test_batch(&tensor!([[1.0]])).unwrap();
        assert_eq!(net.state(), State::Test);
        assert!(net.layers().iter().all(|l| l.state() == State::Test));

        net.train_batch(&tensor!([[1.0]]), &tensor!([[0.0]])).unwrap();
        assert_eq!(net.state(), State::Train);
    }
}
