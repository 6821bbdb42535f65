//! minicnn: a minimal minibatch neural-network training engine.
//!
//! Tensors, a small family of layers, a forward/backward driver and
//! gradient-descent optimizers, with per-batch-row work spread over an
//! explicit worker pool.
//!
//! # Features
//!
//! - Four-dimensional `(batch, channels, width, height)` tensors held in a
//!   per-network arena and addressed by handle.
//! - Input, fully-connected, sigmoid, relu and softmax layers.
//! - Cross-entropy and MSE losses; SGD with or without momentum.
//! - Deterministic batch-row partitioning over a resizable worker pool.
//! - Line-oriented text model files.
//!
//! # Modules
//!
//! - [`tensors`]: shapes, tensors and the tensor arena.
//! - [`backend`]: the worker pool.
//! - [`ops`]: row kernels and their dispatch.
//! - [`init`]: parameter initializers.
//! - [`layers`]: the layer variants and their shared interface.
//! - [`loss`]: loss functions and metric helpers.
//! - [`optim`]: update rules.
//! - [`network`]: the training driver.
//! - [`modelio`]: model save/load.
//! - [`config`]: JSON engine configuration.
//! - [`error`]: the crate error type.
//!
//! # Example
//!
//! ```rust
//! use minicnn::config::EngineConfig;
//! use minicnn::layers::{FullyConnected, Input, Sigmoid};
//! use minicnn::tensor;
//! use minicnn::tensors::Shape;
//!
//! # fn main() -> minicnn::error::Result<()> {
//! let config = EngineConfig::from_json(r#"{"threads": 1, "seed": 5, "loss": "mse"}"#)?;
//! let mut net = config.build_network(config.build_pool()?);
//! net.set_input_size(Shape::new(1, 2, 1, 1));
//! net.add_layer(Input::new())?;
//! net.add_layer(FullyConnected::new(1, true))?;
//! net.add_layer(Sigmoid)?;
//!
//! let loss = net.train_batch(&tensor!([[0.0, 1.0]]), &tensor!([[1.0]]))?;
//! assert!(loss >= 0.0);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod error;
pub mod init;
pub mod layers;
pub mod loss;
pub mod modelio;
pub mod network;
pub mod ops;
pub mod optim;
pub mod tensors;
