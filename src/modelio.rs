//! Text model persistence.
//!
//! # Format
//!
//! One line per layer, fields separated by single spaces. The first token is
//! the layer tag; the rest are the layer's own fields followed by every
//! parameter value (all weights, then all biases):
//!
//! ```text
//! InputLayer 784 1 1
//! FullyConnectedLayer 1 10 1 1 1 0.013 -0.2 … 0 0 …
//! SoftmaxLayer
//! ```
//!
//! | Tag | Fields |
//! |-----|--------|
//! | `InputLayer` | channels width height |
//! | `FullyConnectedLayer` | batch channels width height bias(0/1), weights, biases |
//! | `SigmoidLayer`, `ReluLayer`, `SoftmaxLayer` | none |
//!
//! The first layer must be an `InputLayer`; it fixes the per-sample input
//! shape. Lines of two characters or fewer are skipped. Floats are written
//! in shortest round-trip form, so a save/load cycle is exact.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use minicnn::backend::WorkerPool;
//! use minicnn::layers::{Input, Sigmoid};
//! use minicnn::modelio::{read_model, write_model};
//! use minicnn::network::Network;
//! use minicnn::tensors::Shape;
//!
//! # fn main() -> minicnn::error::Result<()> {
//! let pool = Arc::new(WorkerPool::single_threaded());
//! let mut net = Network::new(pool.clone());
//! net.set_input_size(Shape::new(1, 3, 1, 1));
//! net.add_layer(Input::new())?;
//! net.add_layer(Sigmoid)?;
//!
//! let mut text = Vec::new();
//! write_model(&net, &mut text)?;
//! assert_eq!(text, b"InputLayer 3 1 1 \nSigmoidLayer\n");
//!
//! let mut copy = Network::new(pool);
//! read_model(&mut copy, text.as_slice())?;
//! assert_eq!(copy.layers().len(), 2);
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use briny::prelude::*;
use log::{debug, info};

use crate::error::{Error, Result};
use crate::layers::{Layer, LayerKind, State};
use crate::network::Network;

/// A parsed layer line together with the parameter count its shapes demand.
struct LayerRecord {
    kind: LayerKind,
    values: Vec<f32>,
    expected: usize,
}

impl Validate for LayerRecord {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        if self.values.len() != self.expected {
            return Err(ValidationError);
        }
        Ok(())
    }
}

/// Writes `net` to the file at `path`, one line per layer.
///
/// # Errors
/// Fails if the file cannot be created or written.
pub fn save_model(net: &Network, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut file = BufWriter::new(File::create(path)?);
    write_model(net, &mut file)?;
    file.flush()?;
    info!("saved {} layers to {}", net.layers().len(), path.display());
    Ok(())
}

/// Writes `net` in model text form to any writer.
///
/// # Errors
/// Fails if the writer does.
pub fn write_model(net: &Network, mut out: impl Write) -> Result<()> {
    for layer in net.layers() {
        writeln!(out, "{}", layer.save(net.arena()))?;
    }
    Ok(())
}

/// Replaces the layers of `net` with those stored at `path`.
///
/// The network ends in [`State::Test`]. On error it keeps the layers read
/// before the offending line.
///
/// # Errors
/// Fails if the file cannot be read, a line is malformed or names an unknown
/// layer, or a layer carries the wrong number of parameter values.
pub fn load_model(net: &mut Network, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    read_model(net, BufReader::new(File::open(path)?))?;
    info!("loaded {} layers from {}", net.layers().len(), path.display());
    Ok(())
}

/// Reads model text from any buffered reader into `net`.
///
/// # Errors
/// See [`load_model`].
pub fn read_model(net: &mut Network, input: impl BufRead) -> Result<()> {
    net.clear();

    for (i, line) in input.lines().enumerate() {
        let line = line?;
        let number = i + 1;
        if line.trim_end().len() <= 2 {
            continue;
        }

        let record = parse_line(net, &line, number)?;
        let record = TrustedData::new(record)?.into_inner();

        if let LayerKind::Input(input) = &record.kind {
            if !net.layers().is_empty() {
                return Err(parse_error(number, "InputLayer after the first layer"));
            }
            let shape = input
                .declared_shape()
                .ok_or_else(|| parse_error(number, "InputLayer without a shape"))?;
            net.set_input_size(shape);
        }

        let params = net.push_layer(Layer::new(record.kind))?.params().to_vec();
        let mut values = record.values.as_slice();
        for id in params {
            let data = net.tensor_mut(id).data_mut();
            let (head, rest) = values.split_at(data.len());
            data.copy_from_slice(head);
            values = rest;
        }
        debug!("read layer on line {number}");
    }

    net.set_state(State::Test);
    Ok(())
}

fn parse_line(net: &Network, line: &str, number: usize) -> Result<LayerRecord> {
    let mut tokens = line.split_whitespace();
    let tag = tokens.next().unwrap_or_default();
    let mut kind = LayerKind::from_tag(tag).ok_or_else(|| Error::UnknownLayer {
        tag: tag.to_string(),
    })?;
    kind.as_propagate_mut()
        .read_fields(&mut tokens)
        .map_err(|message| Error::Parse { line: number, message })?;

    let input_shape = match (&kind, net.output()) {
        (LayerKind::Input(input), _) => input.declared_shape().unwrap_or_default(),
        (_, Some(prev)) => prev.shape(),
        (_, None) => return Err(parse_error(number, "the first layer must be an InputLayer")),
    };
    let layer = kind.as_propagate();
    let output_shape = layer.output_shape(input_shape);
    let expected = layer
        .param_shapes(input_shape, output_shape)
        .iter()
        .map(|s| s.total_size())
        .sum();

    let values = tokens
        .map(|t| {
            t.parse::<f32>()
                .map_err(|_| parse_error(number, &format!("`{t}` is not a number")))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(LayerRecord {
        kind,
        values,
        expected,
    })
}

fn parse_error(line: usize, message: &str) -> Error {
    Error::Parse {
        line,
        message: message.to_string(),
    }
}
