//! Error types shared by the whole engine.
//!
//! Shape compatibility is a caller contract and never produces an [`Error`];
//! only the worker pool, persistence, configuration and initialization can fail.

use briny::prelude::ValidationError;
use thiserror::Error;

/// Errors that can occur while building, running or persisting a network.
#[derive(Debug, Error)]
pub enum Error {
    /// Work was submitted to a worker pool after it was shut down.
    #[error("work submitted to a stopped worker pool")]
    PoolStopped,

    /// The operating system refused to start the worker threads.
    #[error("failed to start worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),

    /// A model or configuration file could not be opened, read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A model line starts with a tag that no layer is registered under.
    #[error("unknown layer type `{tag}`")]
    UnknownLayer {
        /// The unrecognized tag.
        tag: String,
    },

    /// A model line is missing fields or holds unparsable text.
    #[error("malformed model line {line}: {message}")]
    Parse {
        /// 1-based line number in the model file.
        line: usize,
        /// What was wrong with it.
        message: String,
    },

    /// A parsed layer record carries the wrong number of parameter values.
    #[error("layer record failed validation: {0}")]
    Validation(#[from] ValidationError),

    /// Gaussian initializer parameters were rejected.
    #[error("invalid normal distribution: {0}")]
    Normal(#[from] rand_distr::NormalError),

    /// Uniform initializer bounds were rejected.
    #[error("invalid uniform distribution: {0}")]
    Uniform(#[from] rand::distr::uniform::Error),

    /// The engine configuration is not valid JSON for [`crate::config::EngineConfig`].
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A configuration field holds a value outside its valid range.
    #[error("invalid configuration value: {0}")]
    ConfigValue(String),

    /// A layer was added before the network's input size was set.
    #[error("input size must be set before adding layers")]
    MissingInput,

    /// Backward was requested without a loss function.
    #[error("no loss function configured")]
    MissingLoss,

    /// Backward was requested without an optimizer.
    #[error("no optimizer configured")]
    MissingOptimizer,
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
