use serde::{Deserialize, Serialize};
use skewdet_core::InvalidParam;
use std::f32::consts::PI;

/// How per-element loss values are folded into one scalar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    #[default]
    Mean,
    Sum,
}

impl Reduction {
    /// Reduce a running `(sum, count)` pair. An empty set reduces to zero.
    #[inline]
    pub fn apply(self, sum: f32, count: usize) -> f32 {
        match self {
            Reduction::Mean if count == 0 => 0.0,
            Reduction::Mean => sum / count as f32,
            Reduction::Sum => sum,
        }
    }
}

/// Focal-loss shaping.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocalParams {
    /// Weight of the positive class; negatives get `1 - alpha`.
    pub alpha: f32,
    /// Focusing exponent on `(1 - p_t)`.
    pub gamma: f32,
}

impl Default for FocalParams {
    fn default() -> Self {
        Self {
            alpha: 0.25,
            gamma: 2.0,
        }
    }
}

/// Parameters of target assignment and the composite loss.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossParams {
    /// A cell whose anchor overlaps a ground truth by more than this is not
    /// penalised as background.
    pub ignore_thresh: f32,
    /// Secondary ignore band: anchor IoU above this *and* angle offset
    /// below [`LossParams::angle_ignore_offset`].
    pub angle_ignore_iou: f32,
    /// Angle offset (radians) of the secondary ignore band.
    pub angle_ignore_offset: f32,
    pub focal: FocalParams,
    pub lambda_coord: f32,
    pub lambda_conf: f32,
    pub lambda_cls: f32,
    pub reduction: Reduction,
}

impl Default for LossParams {
    fn default() -> Self {
        Self {
            ignore_thresh: 0.5,
            angle_ignore_iou: 0.4,
            angle_ignore_offset: PI / 12.0,
            focal: FocalParams::default(),
            lambda_coord: 1.0,
            lambda_conf: 1.0,
            lambda_cls: 1.0,
            reduction: Reduction::Mean,
        }
    }
}

impl LossParams {
    pub fn validate(&self) -> Result<(), InvalidParam> {
        unit_interval("loss.ignore_thresh", self.ignore_thresh)?;
        unit_interval("loss.angle_ignore_iou", self.angle_ignore_iou)?;
        unit_interval("loss.focal.alpha", self.focal.alpha)?;
        non_negative("loss.angle_ignore_offset", self.angle_ignore_offset)?;
        non_negative("loss.focal.gamma", self.focal.gamma)?;
        non_negative("loss.lambda_coord", self.lambda_coord)?;
        non_negative("loss.lambda_conf", self.lambda_conf)?;
        non_negative("loss.lambda_cls", self.lambda_cls)?;
        Ok(())
    }
}

fn unit_interval(field: &'static str, v: f32) -> Result<(), InvalidParam> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(InvalidParam::new(field, format!("{v} is outside [0, 1]")))
    }
}

fn non_negative(field: &'static str, v: f32) -> Result<(), InvalidParam> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(InvalidParam::new(field, format!("{v} must be finite and >= 0")))
    }
}
