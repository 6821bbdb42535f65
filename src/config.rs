//! Engine configuration.
//!
//! A small JSON document selects the worker count, seed, loss and optimizer:
//!
//! ```json
//! {
//!   "threads": 4,
//!   "seed": 7,
//!   "loss": "cross_entropy",
//!   "optimizer": { "type": "momentum", "learning_rate": 0.01, "momentum": 0.9 }
//! }
//! ```
//!
//! Every field is optional; the defaults are two threads, an OS-seeded
//! generator, cross-entropy and plain SGD at learning rate 0.01.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use serde::Deserialize;

use crate::backend::{DEFAULT_THREADS, WorkerPool};
use crate::error::{Error, Result};
use crate::loss::{CrossEntropy, Mse};
use crate::network::Network;
use crate::optim::{Sgd, SgdMomentum};

/// Learning rate used when the configuration names none.
pub const DEFAULT_LEARNING_RATE: f32 = 0.01;

/// Which loss the network trains against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// [`CrossEntropy`].
    #[default]
    CrossEntropy,
    /// [`Mse`].
    Mse,
}

/// Optimizer selection and hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    /// [`Sgd`].
    Sgd {
        /// Step size.
        learning_rate: f32,
    },
    /// [`SgdMomentum`].
    Momentum {
        /// Step size.
        learning_rate: f32,
        /// Velocity decay, in `[0, 1)`.
        momentum: f32,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Sgd {
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

/// Runtime settings for a [`Network`] and its [`WorkerPool`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Worker threads; `1` runs every dispatch inline.
    pub threads: usize,
    /// Seed for weight initialization; `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Loss function.
    pub loss: LossKind,
    /// Update rule.
    pub optimizer: OptimizerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            seed: None,
            loss: LossKind::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    /// Fails on malformed JSON or out-of-range values.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let (lr, momentum) = match self.optimizer {
            OptimizerConfig::Sgd { learning_rate } => (learning_rate, 0.0),
            OptimizerConfig::Momentum {
                learning_rate,
                momentum,
            } => (learning_rate, momentum),
        };
        if !lr.is_finite() || lr < 0.0 {
            return Err(Error::ConfigValue(format!(
                "learning_rate must be non-negative, got {lr}"
            )));
        }
        if !(0.0..1.0).contains(&momentum) {
            return Err(Error::ConfigValue(format!(
                "momentum must be in [0, 1), got {momentum}"
            )));
        }
        Ok(())
    }

    /// Starts a worker pool of the configured size.
    ///
    /// # Errors
    /// Fails if the threads cannot be spawned.
    pub fn build_pool(&self) -> Result<Arc<WorkerPool>> {
        Ok(Arc::new(WorkerPool::new(self.threads)?))
    }

    /// An empty network on `pool` with the configured seed, loss and optimizer.
    #[must_use]
    pub fn build_network(&self, pool: Arc<WorkerPool>) -> Network {
        let mut net = match self.seed {
            Some(seed) => Network::with_seed(pool, seed),
            None => Network::new(pool),
        };

        match self.loss {
            LossKind::CrossEntropy => net.set_loss_function(CrossEntropy),
            LossKind::Mse => net.set_loss_function(Mse),
        }
        match self.optimizer {
            OptimizerConfig::Sgd { learning_rate } => net.set_optimizer(Sgd::new(learning_rate)),
            OptimizerConfig::Momentum {
                learning_rate,
                momentum,
            } => net.set_optimizer(SgdMomentum::new(learning_rate, momentum)),
        }
        debug!("built network from {self:?}");
        net
    }
}

/// Loads an [`EngineConfig`] from a JSON file.
///
/// # Errors
/// Fails if the file cannot be read, is not valid JSON, or holds
/// out-of-range values.
///
/// # Examples
///
/// ```no_run
/// use minicnn::config::load_config;
///
/// let cfg = load_config("engine.json").unwrap();
/// let net = cfg.build_network(cfg.build_pool().unwrap());
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let contents = fs::read_to_string(path)?;
    EngineConfig::from_json(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.threads, 2);
    }

    #[test]
    fn parses_tagged_optimizer() {
        let config = EngineConfig::from_json(
            r#"{"threads":1,"seed":3,"loss":"mse",
                "optimizer":{"type":"momentum","learning_rate":0.5,"momentum":0.9}}"#,
        )
        .unwrap();
        assert_eq!(config.loss, LossKind::Mse);
        assert_eq!(config.seed, Some(3));
        assert_eq!(
            config.optimizer,
            OptimizerConfig::Momentum {
                learning_rate: 0.5,
                momentum: 0.9
            }
        );

        let net = config.build_network(config.build_pool().unwrap());
        assert_eq!(net.optimizer().unwrap().learning_rate(), 0.5);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"optimizer":{"type":"sgd","learning_rate":-1}}"#),
            Err(Error::ConfigValue(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(
                r#"{"optimizer":{"type":"momentum","learning_rate":0.1,"momentum":1.5}}"#
            ),
            Err(Error::ConfigValue(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"loss":"hinge"}"#),
            Err(Error::Config(_))
        ));
    }
}
