//! Entry layer.

use super::{Links, Pass, Propagate, next_field};
use crate::error::Result;
use crate::tensors::{Shape, TensorId};

/// Copies the network input into its own activation slot.
///
/// A network normally starts with one, added right after
/// [`Network::set_input_size`](crate::network::Network::set_input_size). In a
/// model file it records the per-sample input shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Input {
    declared: Option<Shape>,
}

impl Input {
    /// Serialization tag.
    pub const TAG: &'static str = "InputLayer";

    /// An input layer whose shape comes from the network.
    #[must_use]
    pub const fn new() -> Self {
        Self { declared: None }
    }

    /// Per-sample shape (batch 1) read from a model file, if any.
    #[must_use]
    pub const fn declared_shape(&self) -> Option<Shape> {
        self.declared
    }
}

impl Propagate for Input {
    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn forward(&self, pass: Pass<'_>, prev: TensorId, next: TensorId) -> Result<()> {
        pass.arena
            .with_taken(next, |arena, next| arena.get(prev).copy_to(next));
        Ok(())
    }

    fn backward(&self, _pass: Pass<'_>, _links: Links) -> Result<()> {
        Ok(())
    }

    fn write_fields(&self, input: Shape) -> Vec<String> {
        vec![
            input.channels.to_string(),
            input.width.to_string(),
            input.height.to_string(),
        ]
    }

    fn read_fields(
        &mut self,
        fields: &mut dyn Iterator<Item = &str>,
    ) -> core::result::Result<(), String> {
        let channels = next_field(fields, "channels")?;
        let width = next_field(fields, "width")?;
        let height = next_field(fields, "height")?;
        self.declared = Some(Shape::new(1, channels, width, height));
        Ok(())
    }
}
