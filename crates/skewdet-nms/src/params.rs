use serde::{Deserialize, Serialize};
use skewdet_core::{InvalidParam, AA_PREFILTER_IOU};

/// How the per-image detection cap picks survivors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapPolicy {
    /// Keep the first `max_det` in class-then-score order.
    #[default]
    ClassOrder,
    /// Keep the `max_det` highest scores across all classes.
    GlobalScore,
}

/// Post-processing thresholds and caps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NmsParams {
    /// Candidates with objectness below this are dropped.
    pub conf_thres: f32,
    /// Same-class candidates overlapping the kept box by more than this
    /// skew-IoU are merged into it.
    pub nms_thres: f32,
    /// Working-set size per image before suppression.
    pub max_nms: usize,
    /// Detections returned per image.
    pub max_det: usize,
    /// Axis-aligned IoU a pair must exceed before exact skew-IoU is computed.
    pub prefilter_iou: f32,
    pub cap_policy: CapPolicy,
}

impl Default for NmsParams {
    fn default() -> Self {
        Self {
            conf_thres: 0.5,
            nms_thres: 0.4,
            max_nms: 500,
            max_det: 300,
            prefilter_iou: AA_PREFILTER_IOU,
            cap_policy: CapPolicy::ClassOrder,
        }
    }
}

impl NmsParams {
    pub fn validate(&self) -> Result<(), InvalidParam> {
        for (field, v) in [
            ("nms.conf_thres", self.conf_thres),
            ("nms.nms_thres", self.nms_thres),
            ("nms.prefilter_iou", self.prefilter_iou),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(InvalidParam::new(field, format!("{v} is outside [0, 1]")));
            }
        }
        if self.max_nms == 0 {
            return Err(InvalidParam::new("nms.max_nms", "must be at least 1"));
        }
        if self.max_det == 0 {
            return Err(InvalidParam::new("nms.max_det", "must be at least 1"));
        }
        Ok(())
    }
}
