//! Parameter initializers.
//!
//! All random initializers draw from a caller-supplied generator. A
//! [`Network`](crate::network::Network) seeds its generator from the OS by
//! default and accepts an explicit seed for reproducible runs.

use rand::Rng;
use rand::distr::{Distribution, Uniform};
use rand_distr::Normal;

use crate::error::Result;

/// Mean of the default fully-connected weight distribution.
pub const DEFAULT_WEIGHT_MEAN: f32 = 0.0;

/// Standard deviation of the default fully-connected weight distribution.
pub const DEFAULT_WEIGHT_STD: f32 = 0.1;

/// How a weight tensor is filled when first allocated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WeightInit {
    /// Gaussian with the given mean and standard deviation.
    Normal {
        /// Distribution mean.
        mean: f32,
        /// Standard deviation.
        std: f32,
    },
    /// Uniform in `[-b, b]` with `b = sqrt(6 / (fan_in + fan_out))`.
    Xavier,
    /// Every value set to the constant.
    Constant(f32),
    /// Gaussian `N(0, 0.1)`.
    #[default]
    Default,
}

impl WeightInit {
    /// Fills `data` for a weight with the given fan-in and fan-out.
    ///
    /// # Errors
    /// Fails if the distribution parameters are not finite.
    pub fn fill<R: Rng + ?Sized>(
        self,
        data: &mut [f32],
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<()> {
        match self {
            Self::Normal { mean, std } => normal(data, mean, std, rng),
            Self::Xavier => xavier(data, fan_in, fan_out, rng),
            Self::Constant(value) => {
                constant(data, value);
                Ok(())
            }
            Self::Default => normal(data, DEFAULT_WEIGHT_MEAN, DEFAULT_WEIGHT_STD, rng),
        }
    }
}

/// Draws every value from `N(mean, std)`.
///
/// # Errors
/// Fails if `std` is negative or not finite.
pub fn normal<R: Rng + ?Sized>(data: &mut [f32], mean: f32, std: f32, rng: &mut R) -> Result<()> {
    let dist = Normal::new(mean, std)?;
    for v in data {
        *v = dist.sample(rng);
    }
    Ok(())
}

/// Draws every value uniformly from `[low, high)`.
///
/// # Errors
/// Fails if the range is empty or not finite.
pub fn uniform<R: Rng + ?Sized>(data: &mut [f32], low: f32, high: f32, rng: &mut R) -> Result<()> {
    let dist = Uniform::<f32>::new(low, high)?;
    for v in data {
        *v = dist.sample(rng);
    }
    Ok(())
}

/// Sets every value to `value`.
pub fn constant(data: &mut [f32], value: f32) {
    data.fill(value);
}

/// Xavier/Glorot uniform initialization.
///
/// # Errors
/// Fails when `fan_in + fan_out == 0`.
#[allow(clippy::cast_precision_loss)]
pub fn xavier<R: Rng + ?Sized>(
    data: &mut [f32],
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
) -> Result<()> {
    let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
    uniform(data, -bound, bound, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn xavier_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut data = vec![0.0; 1000];
        xavier(&mut data, 100, 50, &mut rng).unwrap();

        let bound = (6.0f32 / 150.0).sqrt();
        assert!(data.iter().all(|&w| (-bound..=bound).contains(&w)));
    }

    #[test]
    fn normal_is_roughly_centered() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut data = vec![0.0; 10_000];
        normal(&mut data, 0.0, 0.1, &mut rng).unwrap();

        let mean = data.iter().sum::<f32>() / data.len() as f32;
        assert!(mean.abs() < 0.01, "mean {mean}");
    }

    #[test]
    fn same_seed_same_values() {
        let mut a = vec![0.0; 16];
        let mut b = vec![0.0; 16];
        WeightInit::Default.fill(&mut a, 4, 4, &mut StdRng::seed_from_u64(3)).unwrap();
        WeightInit::Default.fill(&mut b, 4, 4, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_parameters_are_errors() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut data = [0.0; 2];
        assert!(normal(&mut data, 0.0, f32::NAN, &mut rng).is_err());
        assert!(uniform(&mut data, 1.0, 1.0, &mut rng).is_err());
    }
}
