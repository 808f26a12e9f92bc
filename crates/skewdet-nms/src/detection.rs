use serde::{Deserialize, Serialize};
use skewdet_core::OrientedBox;

/// A post-processed detection, box in image pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: OrientedBox,
    pub object_conf: f32,
    /// Probability of `class_id`.
    pub class_conf: f32,
    pub class_id: usize,
}

impl Detection {
    pub const fn new(bbox: OrientedBox, object_conf: f32, class_conf: f32, class_id: usize) -> Self {
        Self {
            bbox,
            object_conf,
            class_conf,
            class_id,
        }
    }

    /// Ranking score `object_conf · class_conf`.
    #[inline]
    pub fn score(&self) -> f32 {
        self.object_conf * self.class_conf
    }

    /// `[cx, cy, w, h, theta, object_conf, class_conf, class_id]`.
    pub fn to_array(&self) -> [f32; 8] {
        let b = self.bbox;
        [
            b.cx,
            b.cy,
            b.w,
            b.h,
            b.theta,
            self.object_conf,
            self.class_conf,
            self.class_id as f32,
        ]
    }
}

/// Stable descending sort by [`Detection::score`].
pub(crate) fn sort_by_score(dets: &mut [Detection]) {
    dets.sort_by(|a, b| b.score().total_cmp(&a.score()));
}
