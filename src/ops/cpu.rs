//! Sequential CPU kernels.
//!
//! # CPU Kernels
//!
//! The elementwise and per-row math used by the layers. Each kernel works on
//! plain slices covering one dispatched partition; parallelism is added one
//! level up by [`dispatch`](super::dispatch).
//!
//! ## Implemented Ops
//!
//! - `sigmoid` / `df_sigmoid`: logistic activation and its derivative from the output
//! - `relu` / `df_relu`: rectifier and its leaky derivative from the output
//! - `fully_connect`: row-wise `y = W·x + b`
//! - `softmax_row` / `softmax_row_backward`: stable softmax and its Jacobian-vector product
//! - `mul_inplace` / `div_inplace`: elementwise helpers

/// Derivative used by [`df_relu`] where the output is not positive.
pub const RELU_NEGATIVE_SLOPE: f32 = 0.01;

/// `y = 1 / (1 + e^-x)` elementwise.
pub fn sigmoid(x: &[f32], y: &mut [f32]) {
    for (y, &x) in y.iter_mut().zip(x) {
        *y = 1.0 / (1.0 + (-x).exp());
    }
}

/// Sigmoid derivative expressed through the forward output: `y·(1-y)`.
pub fn df_sigmoid(y: &[f32], dy: &mut [f32]) {
    for (d, &y) in dy.iter_mut().zip(y) {
        *d = y * (1.0 - y);
    }
}

/// `y = max(x, 0)` elementwise.
pub fn relu(x: &[f32], y: &mut [f32]) {
    for (y, &x) in y.iter_mut().zip(x) {
        *y = if x > 0.0 { x } else { 0.0 };
    }
}

/// Rectifier derivative keyed on the forward output:
/// [`RELU_NEGATIVE_SLOPE`] where `y <= 0`, else `1`.
pub fn df_relu(y: &[f32], dy: &mut [f32]) {
    for (d, &y) in dy.iter_mut().zip(y) {
        *d = if y <= 0.0 { RELU_NEGATIVE_SLOPE } else { 1.0 };
    }
}

/// `a *= b` elementwise.
pub fn mul_inplace(a: &mut [f32], b: &[f32]) {
    for (a, &b) in a.iter_mut().zip(b) {
        *a *= b;
    }
}

/// `a /= b` elementwise.
pub fn div_inplace(a: &mut [f32], b: f32) {
    for a in a {
        *a /= b;
    }
}

/// Row-wise affine map `output[k][i] = Σ_j input[k][j]·weight[i·in_len + j] + bias[i]`.
///
/// `weight` is the flattened `(out_len × in_len)` matrix; `rows` batch rows
/// are read from `input` and written to `output`.
pub fn fully_connect(
    input: &[f32],
    weight: &[f32],
    bias: Option<&[f32]>,
    output: &mut [f32],
    rows: usize,
    in_len: usize,
    out_len: usize,
) {
    for k in 0..rows {
        let x = &input[k * in_len..(k + 1) * in_len];
        let y = &mut output[k * out_len..(k + 1) * out_len];

        for (i, y) in y.iter_mut().enumerate() {
            let w = &weight[i * in_len..(i + 1) * in_len];
            let mut sum = 0.0;
            for (&x, &w) in x.iter().zip(w) {
                sum += x * w;
            }
            if let Some(bias) = bias {
                sum += bias[i];
            }
            *y = sum;
        }
    }
}

/// Softmax of one row with the row maximum subtracted first.
pub fn softmax_row(x: &[f32], y: &mut [f32]) {
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0;
    for (y, &x) in y.iter_mut().zip(x) {
        *y = (x - max).exp();
        sum += *y;
    }
    div_inplace(y, sum);
}

/// Full Jacobian-vector product of softmax for one row.
///
/// `prev_grad[i] += Σ_j (i == j ? p_i·(1-p_i) : -p_i·p_j) · next_grad[j]`.
pub fn softmax_row_backward(p: &[f32], next_grad: &[f32], prev_grad: &mut [f32]) {
    for (i, g) in prev_grad.iter_mut().enumerate() {
        let pi = p[i];
        for (j, (&pj, &dj)) in p.iter().zip(next_grad).enumerate() {
            if i == j {
                *g += pi * (1.0 - pi) * dj;
            } else {
                *g -= pi * pj * dj;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sigmoid_and_derivative() {
        let mut y = [0.0; 3];
        sigmoid(&[0.0, 100.0, -100.0], &mut y);
        assert_abs_diff_eq!(y[0], 0.5);
        assert_abs_diff_eq!(y[1], 1.0);
        assert_abs_diff_eq!(y[2], 0.0);

        let mut d = [0.0; 3];
        df_sigmoid(&y, &mut d);
        assert_abs_diff_eq!(d[0], 0.25);
    }

    #[test]
    fn relu_derivative_is_leaky_on_output() {
        let mut y = [0.0; 3];
        relu(&[-2.0, 0.0, 3.0], &mut y);
        assert_eq!(y, [0.0, 0.0, 3.0]);

        let mut d = [0.0; 3];
        df_relu(&y, &mut d);
        assert_eq!(d, [0.01, 0.01, 1.0]);
    }

    #[test]
    fn fully_connect_with_and_without_bias() {
        // 2 rows, 3 inputs, 2 outputs
        let input = [1.0, 2.0, 3.0, 0.0, 1.0, 0.0];
        let weight = [1.0, 0.0, 1.0, 0.5, 0.5, 0.5];
        let mut out = [0.0; 4];
        fully_connect(&input, &weight, None, &mut out, 2, 3, 2);
        assert_eq!(out, [4.0, 3.0, 0.0, 0.5]);

        fully_connect(&input, &weight, Some(&[1.0, -1.0]), &mut out, 2, 3, 2);
        assert_eq!(out, [5.0, 2.0, 1.0, -0.5]);
    }

    #[test]
    fn softmax_row_sums_to_one() {
        let mut y = [0.0; 4];
        softmax_row(&[1000.0, 1001.0, 1002.0, 999.0], &mut y);
        assert_abs_diff_eq!(y.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(y[2] > y[1] && y[1] > y[0] && y[0] > y[3]);
    }
}
