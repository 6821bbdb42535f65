//! Parameter update rules.
//!
//! An [`Optimizer`] updates one layer's parameters at a time from the paired
//! gradients. Per-parameter state such as momentum velocity is keyed by the
//! parameter's [`TensorId`], so it follows the parameter regardless of the
//! order layers are visited in.

use std::collections::HashMap;

use log::warn;

use crate::tensors::{Tensor, TensorArena, TensorId};

/// A gradient-descent update rule.
pub trait Optimizer: Send {
    /// Updates one parameter tensor in place from its gradient.
    fn step(&mut self, id: TensorId, value: &mut Tensor, grad: &Tensor);

    /// Updates every parameter in `params` from the gradient at the same position.
    fn update(&mut self, arena: &mut TensorArena, params: &[TensorId], grads: &[TensorId]) {
        for (&param, &grad) in params.iter().zip(grads) {
            arena.with_taken(param, |arena, value| self.step(param, value, arena.get(grad)));
        }
    }

    /// Current learning rate.
    fn learning_rate(&self) -> f32;

    /// Replaces the learning rate for subsequent updates.
    fn set_learning_rate(&mut self, lr: f32);

    /// Drops any per-parameter state.
    fn reset(&mut self) {}
}

/// Plain stochastic gradient descent: `w ← w − lr·g`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sgd {
    lr: f32,
}

impl Sgd {
    /// SGD with the given learning rate.
    #[must_use]
    pub const fn new(lr: f32) -> Self {
        Self { lr }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, _id: TensorId, value: &mut Tensor, grad: &Tensor) {
        for (w, &g) in value.data_mut().iter_mut().zip(grad.data()) {
            *w -= self.lr * g;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// SGD with classical momentum: `v ← μ·v − lr·g; w ← w + v`.
///
/// A velocity starts at zero and is reallocated, again at zero, whenever its
/// parameter's shape changes.
#[derive(Debug, Clone, PartialEq)]
pub struct SgdMomentum {
    lr: f32,
    momentum: f32,
    velocity: HashMap<TensorId, Tensor>,
}

impl SgdMomentum {
    /// Momentum SGD with learning rate `lr` and momentum coefficient `momentum`.
    #[must_use]
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            velocity: HashMap::new(),
        }
    }

    /// The momentum coefficient.
    #[must_use]
    pub const fn momentum(&self) -> f32 {
        self.momentum
    }

    /// Velocity currently tracked for `id`, if any.
    #[must_use]
    pub fn velocity(&self, id: TensorId) -> Option<&Tensor> {
        self.velocity.get(&id)
    }
}

impl Optimizer for SgdMomentum {
    fn step(&mut self, id: TensorId, value: &mut Tensor, grad: &Tensor) {
        let shape = value.shape();
        let velocity = self.velocity.entry(id).or_insert_with(|| Tensor::new(shape));
        if velocity.shape() != shape {
            warn!("parameter {} changed shape to {shape}; resetting its velocity", id.index());
            *velocity = Tensor::new(shape);
        }

        for ((w, v), &g) in value
            .data_mut()
            .iter_mut()
            .zip(velocity.data_mut())
            .zip(grad.data())
        {
            *v = self.momentum * *v - self.lr * g;
            *w += *v;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn reset(&mut self) {
        self.velocity.clear();
    }
}
