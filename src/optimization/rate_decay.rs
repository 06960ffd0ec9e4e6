/// The exponents the rate decay is computed with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerData {
    pub minus_power_t: f32,
    pub minus_power_t_norm: f32,
    pub fast_inv_sqrt: bool,
}

impl PowerData {
    /// Creates a new `PowerData`.
    ///
    /// # Arguments
    /// * `power_t` - The learning rate decay exponent.
    /// * `adaptive` - Whether the adaptive rule is active.
    /// * `fast_inv_sqrt` - Whether to approximate `1/sqrt` with the bit trick.
    pub fn new(power_t: f32, adaptive: bool, fast_inv_sqrt: bool) -> Self {
        let adaptive_power = if adaptive { power_t } else { 0. };

        Self {
            minus_power_t: -power_t,
            minus_power_t_norm: adaptive_power - 1.,
            fast_inv_sqrt,
        }
    }
}

/// Approximates `1/sqrt(x)` with a magic constant and one Newton step.
///
/// The relative error is below `0.2%` for positive finite inputs.
#[inline]
pub fn fast_inv_sqrt(x: f32) -> f32 {
    let xhalf = 0.5 * x;
    let i = 0x5f37_59d5_u32.wrapping_sub(x.to_bits() >> 1);
    let y = f32::from_bits(i);
    y * (1.5 - xhalf * y * y)
}

/// The per-feature multiplier of the learning rate, read from the statistics of
/// the feature's weight group.
///
/// With neither the adaptive nor the normalized rule active this is `1`.
#[inline]
pub fn compute_rate_decay<const SQRT_RATE: bool, const ADAPTIVE: usize, const NORMALIZED: usize>(
    pd: &PowerData,
    w: &[f32],
) -> f32 {
    let mut rate_decay = 1.;

    if ADAPTIVE != 0 {
        rate_decay = if SQRT_RATE {
            if pd.fast_inv_sqrt {
                fast_inv_sqrt(w[ADAPTIVE])
            } else {
                1. / w[ADAPTIVE].sqrt()
            }
        } else {
            w[ADAPTIVE].powf(pd.minus_power_t)
        };
    }

    if NORMALIZED != 0 {
        if SQRT_RATE {
            let inv_norm = 1. / w[NORMALIZED];
            rate_decay *= if ADAPTIVE != 0 {
                inv_norm
            } else {
                inv_norm * inv_norm
            };
        } else {
            let norm = w[NORMALIZED];
            rate_decay *= (norm * norm).powf(pd.minus_power_t_norm);
        }
    }

    rate_decay
}
