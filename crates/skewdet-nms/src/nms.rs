//! Greedy per-class suppression with weighted merging.

use std::collections::BTreeSet;

use log::debug;
use skewdet_core::{skew_iou_gated, OrientedBox};

use crate::detection::sort_by_score;
use crate::{CapPolicy, Detection, NmsError, NmsParams};

/// Suppress overlapping same-class candidates of one image.
///
/// Candidates are ranked by score (stable, so equal scores keep input
/// order) and classes are visited in ascending id. Within a class the best
/// remaining candidate absorbs every other whose skew-IoU with it exceeds
/// `nms_thres`: its `(cx, cy, w, h)` become the objectness-weighted mean of
/// itself and the absorbed boxes, everything else is left as is.
pub fn rotated_nms(
    candidates: &[Detection],
    params: &NmsParams,
) -> Result<Vec<Detection>, NmsError> {
    for c in candidates {
        c.bbox.polygon()?;
    }

    let mut ranked = candidates.to_vec();
    sort_by_score(&mut ranked);

    let classes: BTreeSet<usize> = ranked.iter().map(|d| d.class_id).collect();
    let mut kept = Vec::new();
    for class_id in classes {
        let mut remaining: Vec<Detection> = ranked
            .iter()
            .filter(|d| d.class_id == class_id)
            .copied()
            .collect();
        let before = remaining.len();
        let mut class_kept = 0usize;

        while !remaining.is_empty() {
            let mut best = remaining.remove(0);
            let mut absorbed = Vec::new();
            let mut survivors = Vec::with_capacity(remaining.len());
            for d in remaining {
                if skew_iou_gated(&best.bbox, &d.bbox, params.prefilter_iou)? > params.nms_thres {
                    absorbed.push(d);
                } else {
                    survivors.push(d);
                }
            }
            if !absorbed.is_empty() {
                best.bbox = merge(&best, &absorbed);
            }
            kept.push(best);
            class_kept += 1;
            remaining = survivors;
        }
        debug!("class {class_id}: kept {class_kept} of {before}");
    }

    if kept.len() > params.max_det {
        if params.cap_policy == CapPolicy::GlobalScore {
            sort_by_score(&mut kept);
        }
        kept.truncate(params.max_det);
    }
    Ok(kept)
}

/// Objectness-weighted mean of the center and size of `best` and `absorbed`.
fn merge(best: &Detection, absorbed: &[Detection]) -> OrientedBox {
    let total: f32 = best.object_conf + absorbed.iter().map(|d| d.object_conf).sum::<f32>();
    if total <= 0.0 {
        return best.bbox;
    }
    let mut acc = [0.0f32; 4];
    for d in std::iter::once(best).chain(absorbed) {
        let w = d.object_conf;
        acc[0] += w * d.bbox.cx;
        acc[1] += w * d.bbox.cy;
        acc[2] += w * d.bbox.w;
        acc[3] += w * d.bbox.h;
    }
    OrientedBox::new(
        acc[0] / total,
        acc[1] / total,
        acc[2] / total,
        acc[3] / total,
        best.bbox.theta,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use skewdet_core::skew_iou;

    fn det(cx: f32, cy: f32, theta: f32, conf: f32, class_id: usize) -> Detection {
        Detection::new(OrientedBox::new(cx, cy, 10.0, 10.0, theta), conf, 1.0, class_id)
    }

    #[test]
    fn overlapping_pair_merges_toward_confident_box() {
        let a = det(0.0, 0.0, 0.0, 0.9, 0);
        let b = det(0.5, 0.0, 0.0, 0.3, 0);
        assert!(skew_iou(&a.bbox, &b.bbox).unwrap() > 0.9);

        let out = rotated_nms(&[b, a], &NmsParams::default()).unwrap();
        assert_eq!(out.len(), 1);
        let m = out[0];
        assert_abs_diff_eq!(m.bbox.cx, 0.125, epsilon = 1e-6);
        assert_abs_diff_eq!(m.bbox.w, 10.0, epsilon = 1e-5);
        assert_eq!(m.object_conf, 0.9);
        assert_eq!(m.bbox.theta, 0.0);
    }

    #[test]
    fn merge_keeps_angle_of_best() {
        let a = det(0.0, 0.0, 0.2, 0.8, 1);
        let b = det(0.2, 0.2, 0.25, 0.8, 1);
        let out = rotated_nms(&[a, b], &NmsParams::default()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox.theta, 0.2);
        assert_abs_diff_eq!(out[0].bbox.cx, 0.1, epsilon = 1e-6);
    }

    #[test]
    fn different_classes_never_suppress_each_other() {
        let out = rotated_nms(
            &[det(0.0, 0.0, 0.0, 0.9, 1), det(0.0, 0.0, 0.0, 0.8, 0)],
            &NmsParams::default(),
        )
        .unwrap();
        assert_eq!(out.len(), 2);
        // Ascending class order.
        assert_eq!(out[0].class_id, 0);
        assert_eq!(out[1].class_id, 1);
    }

    #[test]
    fn crossed_boxes_survive_with_low_skew_iou() {
        // Same axis-aligned footprint passes the gate, but at 90 degrees a
        // thin bar overlaps its twin by 1/7.
        let a = Detection::new(OrientedBox::new(0.0, 0.0, 40.0, 10.0, 0.0), 0.9, 1.0, 0);
        let b = Detection::new(
            OrientedBox::new(0.0, 0.0, 40.0, 10.0, std::f32::consts::FRAC_PI_2),
            0.8,
            1.0,
            0,
        );
        let out = rotated_nms(&[a, b], &NmsParams::default()).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn class_order_cap_truncates_after_concatenation() {
        let cands = [
            det(0.0, 0.0, 0.0, 0.6, 0),
            det(100.0, 0.0, 0.0, 0.7, 0),
            det(0.0, 100.0, 0.0, 0.95, 1),
        ];
        let mut params = NmsParams {
            max_det: 2,
            ..NmsParams::default()
        };
        let out = rotated_nms(&cands, &params).unwrap();
        assert_eq!(out.iter().map(|d| d.class_id).collect::<Vec<_>>(), [0, 0]);

        params.cap_policy = CapPolicy::GlobalScore;
        let out = rotated_nms(&cands, &params).unwrap();
        assert_eq!(out[0].object_conf, 0.95);
        assert_eq!(out[1].object_conf, 0.7);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(rotated_nms(&[], &NmsParams::default()).unwrap().is_empty());
    }

    #[test]
    fn thin_box_does_not_abort_other_classes() {
        let good = det(100.0, 100.0, 0.0, 0.9, 0);
        let thin = Detection::new(
            OrientedBox::new(305.92, 251.76, 20.0, 1e-5, -1.2488),
            0.8,
            1.0,
            1,
        );
        let near = Detection::new(
            OrientedBox::new(305.92, 251.76, 20.0, 1e-3, -1.2488),
            0.7,
            1.0,
            1,
        );
        let out = rotated_nms(&[good, thin, near], &NmsParams::default()).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], good);
    }

    #[test]
    fn non_finite_box_is_an_error() {
        let bad = det(f32::NAN, 0.0, 0.0, 0.9, 0);
        assert!(matches!(
            rotated_nms(&[bad], &NmsParams::default()),
            Err(NmsError::Geometry(_))
        ));
    }
}
