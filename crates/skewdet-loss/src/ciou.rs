//! Complete-IoU between oriented boxes, with an angular quality factor.

use skewdet_core::{ensure_len, OrientedBox, ShapeError, IOU_EPS};
use std::f32::consts::PI;

/// Intermediate CIoU quantities for one box pair.
///
/// `alpha` is a constant weighting of the aspect term, not a differentiable
/// path; it is reported so an external autodiff layer can rebuild the graph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CiouTerms {
    /// Axis-aligned IoU of the corner forms.
    pub iou: f32,
    /// Squared center distance over squared enclosing diagonal.
    pub u: f32,
    /// Aspect-ratio consistency.
    pub v: f32,
    pub alpha: f32,
    /// `|cos(θ_pred - θ_target)|`.
    pub angle_factor: f32,
    /// `iou - (u + alpha·v)`, clamped to `[-1, 1]`.
    pub ciou: f32,
}

impl CiouTerms {
    /// Overlap quality weighted by angular agreement.
    #[inline]
    pub fn quality(&self) -> f32 {
        self.iou * self.angle_factor
    }
}

/// CIoU terms of a single `(pred, target)` pair.
pub fn ciou_terms(pred: &OrientedBox, target: &OrientedBox) -> CiouTerms {
    let [px1, py1, px2, py2, _] = pred.to_corner_form();
    let [tx1, ty1, tx2, ty2, _] = target.to_corner_form();

    let area_p = (px2 - px1) * (py2 - py1);
    let area_t = (tx2 - tx1) * (ty2 - ty1);

    let iw = (px2.min(tx2) - px1.max(tx1)).max(0.0);
    let ih = (py2.min(ty2) - py1.max(ty1)).max(0.0);
    let inter = iw * ih;
    let union = area_p + area_t - inter;
    let iou = inter / (union + IOU_EPS);

    let ew = (px2.max(tx2) - px1.min(tx1)).max(0.0);
    let eh = (py2.max(ty2) - py1.min(ty1)).max(0.0);
    let diag2 = ew * ew + eh * eh;
    let dx = target.cx - pred.cx;
    let dy = target.cy - pred.cy;
    let u = (dx * dx + dy * dy) / (diag2 + IOU_EPS);

    let ar_t = (target.w / (target.h + IOU_EPS)).atan();
    let ar_p = (pred.w / (pred.h + IOU_EPS)).atan();
    let v = (4.0 / (PI * PI)) * (ar_t - ar_p).powi(2);
    let alpha = v / ((1.0 - iou) + v + IOU_EPS);

    let ciou = (iou - (u + alpha * v)).clamp(-1.0, 1.0);
    let angle_factor = (pred.theta - target.theta).cos().abs();

    CiouTerms {
        iou,
        u,
        v,
        alpha,
        angle_factor,
        ciou,
    }
}

/// Batched CIoU: one `(quality, ciou)` pair per index.
///
/// `quality = iou · |cos Δθ|`. Both slices must have the same length.
pub fn bbox_xywha_ciou(
    pred: &[OrientedBox],
    target: &[OrientedBox],
) -> Result<Vec<(f32, f32)>, ShapeError> {
    ensure_len("ciou target boxes", pred.len(), target.len())?;
    Ok(pred
        .iter()
        .zip(target)
        .map(|(p, t)| {
            let terms = ciou_terms(p, t);
            (terms.quality(), terms.ciou)
        })
        .collect())
}
