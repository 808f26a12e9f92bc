//! Elementwise loss primitives on probabilities.

use crate::FocalParams;

/// Log terms are clamped here so that `p = 0` or `p = 1` stay finite.
const LOG_FLOOR: f32 = -100.0;

#[inline]
fn clamped_ln(x: f32) -> f32 {
    x.ln().max(LOG_FLOOR)
}

/// Binary cross-entropy of probability `p` against target `t`.
#[inline]
pub fn bce(p: f32, t: f32) -> f32 {
    -(t * clamped_ln(p) + (1.0 - t) * clamped_ln(1.0 - p))
}

/// Focal loss: BCE scaled by `alpha_t * (1 - p_t)^gamma`.
#[inline]
pub fn focal(p: f32, t: f32, params: &FocalParams) -> f32 {
    let p_t = t * p + (1.0 - t) * (1.0 - p);
    let alpha_t = t * params.alpha + (1.0 - t) * (1.0 - params.alpha);
    bce(p, t) * alpha_t * (1.0 - p_t).powf(params.gamma)
}

/// Smooth-L1 (Huber with beta 1).
#[inline]
pub fn smooth_l1(pred: f32, target: f32) -> f32 {
    let d = (pred - target).abs();
    if d < 1.0 {
        0.5 * d * d
    } else {
        d - 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bce_is_finite_at_saturation() {
        assert_abs_diff_eq!(bce(0.0, 1.0), 100.0);
        assert_abs_diff_eq!(bce(1.0, 0.0), 100.0);
        assert_abs_diff_eq!(bce(1.0, 1.0), 0.0);
        assert_abs_diff_eq!(bce(0.5, 1.0), std::f32::consts::LN_2, epsilon = 1e-6);
    }

    #[test]
    fn focal_downweights_easy_examples() {
        let params = FocalParams::default();
        let easy = focal(0.05, 0.0, &params);
        let hard = focal(0.95, 0.0, &params);
        assert!(easy < 5e-3 * bce(0.05, 0.0));
        assert!(hard > 0.5 * bce(0.95, 0.0));
    }

    #[test]
    fn focal_with_gamma_zero_is_weighted_bce() {
        let params = FocalParams {
            alpha: 0.25,
            gamma: 0.0,
        };
        assert_abs_diff_eq!(focal(0.3, 1.0, &params), 0.25 * bce(0.3, 1.0), epsilon = 1e-6);
        assert_abs_diff_eq!(focal(0.3, 0.0, &params), 0.75 * bce(0.3, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn smooth_l1_branches() {
        assert_abs_diff_eq!(smooth_l1(0.5, 0.0), 0.125);
        assert_abs_diff_eq!(smooth_l1(-3.0, 0.0), 2.5);
        assert_abs_diff_eq!(smooth_l1(1.0, 1.0), 0.0);
    }
}
