use serde::{Deserialize, Serialize};
use skewdet_core::DecodedScale;

use crate::AssignmentResult;

const CONF_HIT: f32 = 0.5;
const DIV_EPS: f32 = 1e-16;

/// Per-scale training diagnostics. Reported alongside the loss, never part
/// of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentMetrics {
    /// Fraction of matched cells whose argmax class is correct.
    pub cls_acc: f32,
    pub recall50: f32,
    pub recall75: f32,
    pub precision: f32,
    /// Mean predicted objectness on matched cells.
    pub conf_obj: f32,
    /// Mean predicted objectness on background cells.
    pub conf_noobj: f32,
    pub num_obj: usize,
    pub num_noobj: usize,
}

impl AssignmentMetrics {
    pub fn compute(pred: &DecodedScale, assignment: &AssignmentResult) -> Self {
        let mut m = Self::default();
        let mut class_hits = 0usize;
        let mut hits50 = 0usize;
        let mut hits75 = 0usize;
        let mut confident = 0usize;
        let mut conf_obj = 0.0f32;
        let mut conf_noobj = 0.0f32;

        for (c, &obj) in assignment.obj_mask.iter() {
            let conf = pred.objectness(c);
            if conf > CONF_HIT {
                confident += 1;
            }
            if assignment.noobj_mask[c] {
                m.num_noobj += 1;
                conf_noobj += conf;
            }
            if !obj {
                continue;
            }
            m.num_obj += 1;
            conf_obj += conf;
            let class_ok = assignment.class_mask[c];
            if class_ok {
                class_hits += 1;
            }
            let detected = conf > CONF_HIT && class_ok && assignment.target_conf[c] > 0.0;
            if detected {
                let iou = assignment.iou_scores[c];
                hits50 += usize::from(iou > 0.5);
                hits75 += usize::from(iou > 0.75);
            }
        }

        let n_obj = m.num_obj as f32;
        m.cls_acc = mean(class_hits as f32, m.num_obj);
        m.recall50 = hits50 as f32 / (n_obj + DIV_EPS);
        m.recall75 = hits75 as f32 / (n_obj + DIV_EPS);
        m.precision = hits50 as f32 / (confident as f32 + DIV_EPS);
        m.conf_obj = mean(conf_obj, m.num_obj);
        m.conf_noobj = mean(conf_noobj, m.num_noobj);
        m
    }
}

fn mean(sum: f32, n: usize) -> f32 {
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}
