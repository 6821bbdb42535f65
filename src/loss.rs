//! Loss functions and evaluation helpers.
//!
//! Both losses report the moving average of the per-element loss over the
//! whole batch, scaled by the per-sample element count. Their gradients are
//! written into a zeroed buffer shaped like the label.

use crate::tensors::Tensor;

/// Scores a network output against a label.
pub trait LossFunction: Send {
    /// Scalar loss for the batch.
    fn loss(&self, label: &Tensor, output: &Tensor) -> f32;

    /// Overwrites `grad` with `∂loss/∂output`.
    fn gradient(&self, label: &Tensor, output: &Tensor, grad: &mut Tensor);
}

/// `-Σ label · ln(output)`, for probability outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrossEntropy;

impl LossFunction for CrossEntropy {
    fn loss(&self, label: &Tensor, output: &Tensor) -> f32 {
        scaled_average(label, output, |l, o| -l * o.ln())
    }

    fn gradient(&self, label: &Tensor, output: &Tensor, grad: &mut Tensor) {
        per_element_gradient(label, output, grad, |l, o| -l / o);
    }
}

/// Mean squared error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mse;

impl LossFunction for Mse {
    fn loss(&self, label: &Tensor, output: &Tensor) -> f32 {
        scaled_average(label, output, |l, o| (l - o) * (l - o))
    }

    fn gradient(&self, label: &Tensor, output: &Tensor, grad: &mut Tensor) {
        per_element_gradient(label, output, grad, |l, o| 2.0 * (o - l));
    }
}

#[allow(clippy::cast_precision_loss)]
fn scaled_average(label: &Tensor, output: &Tensor, f: impl Fn(f32, f32) -> f32) -> f32 {
    let mut avg = 0.0;
    for (n, (&l, &o)) in label.data().iter().zip(output.data()).enumerate() {
        avg = moving_average(avg, n + 1, f(l, o));
    }
    avg * output.shape().one_batch_size() as f32
}

fn per_element_gradient(
    label: &Tensor,
    output: &Tensor,
    grad: &mut Tensor,
    f: impl Fn(f32, f32) -> f32,
) {
    grad.fill(0.0);
    let len = grad.shape().one_batch_size();
    for k in 0..output.shape().batch {
        let (l, o) = (label.row(k), output.row(k));
        for (i, g) in grad.row_mut(k)[..len].iter_mut().enumerate() {
            *g += f(l[i], o[i]);
        }
    }
}

/// Incremental mean: the average of `n` values given the average of the
/// first `n - 1` and the `n`-th value (`n` is 1-based).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn moving_average(avg: f32, n: usize, value: f32) -> f32 {
    let n = n as f32;
    avg - avg / n + value / n
}

/// Fraction of batch rows whose predicted class matches the label's.
///
/// Classes are compared by argmax of each row.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn accuracy(prediction: &Tensor, label: &Tensor) -> f32 {
    let rows = prediction.shape().batch;
    if rows == 0 {
        return 0.0;
    }
    let hits = (0..rows)
        .filter(|&k| prediction.row_argmax(k) == label.row_argmax(k))
        .count();
    hits as f32 / rows as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor;
    use approx::assert_relative_eq;

    #[test]
    fn moving_average_matches_mean() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0];
        let mut avg = 0.0;
        for (i, &v) in values.iter().enumerate() {
            avg = moving_average(avg, i + 1, v);
        }
        assert_relative_eq!(avg, 2.8, epsilon = 1e-6);
    }

    #[test]
    fn cross_entropy_loss_and_gradient() {
        let label = tensor!([[1.0, 0.0]]);
        let output = tensor!([[0.5, 0.5]]);

        // mean(-ln 0.5, 0) * 2
        assert_relative_eq!(CrossEntropy.loss(&label, &output), 2f32.ln(), epsilon = 1e-6);

        let mut grad = Tensor::new(label.shape());
        CrossEntropy.gradient(&label, &output, &mut grad);
        assert_eq!(grad.data(), &[-2.0, 0.0]);
    }

    #[test]
    fn mse_loss_and_gradient() {
        let label = tensor!([[1.0, 0.0], [0.0, 1.0]]);
        let output = tensor!([[0.5, 0.0], [0.0, 0.0]]);

        // mean(0.25, 0, 0, 1) * 2
        assert_relative_eq!(Mse.loss(&label, &output), 0.625, epsilon = 1e-6);

        let mut grad = Tensor::new(label.shape());
        grad.fill(9.0);
        Mse.gradient(&label, &output, &mut grad);
        assert_eq!(grad.data(), &[-1.0, 0.0, 0.0, -2.0]);
    }

    #[test]
    fn accuracy_counts_matching_rows() {
        let prediction = tensor!([[0.9, 0.1], [0.2, 0.8], [0.6, 0.4]]);
        let label = tensor!([[1.0, 0.0], [1.0, 0.0], [1.0, 0.0]]);
        assert_relative_eq!(accuracy(&prediction, &label), 2.0 / 3.0);
    }
}
