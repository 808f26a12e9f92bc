//! Composite detection loss.
//!
//! Per scale, with `M` the matched cells and `B` the background cells:
//!
//! ```text
//! reg  = reduce_M( w · (smooth_l1(ta_pred, ta) + ciou_loss) ),  w = skew_iou / (angle + ciou_loss)
//! conf = reduce_M( focal(p, 1) ) + reduce_B( focal(p, 0) )
//! cls  = reduce_{M×C}( bce(p_k, onehot_k) )
//! ```
//!
//! `w` is a constant per cell. Each term is scaled by its lambda, then the
//! scales are summed.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
#[cfg(feature = "tracing")]
use tracing::instrument;

use skewdet_core::{ensure_len, AnchorConfig, CellIndex, DecodedScale, IOU_EPS};

use crate::functional::{bce, focal, smooth_l1};
use crate::{build_targets, AssignmentMetrics, AssignmentResult, GroundTruth, LossError, LossParams};

/// Regression contribution of one matched cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionTerm {
    pub cell: CellIndex,
    pub angle_loss: f32,
    pub ciou_loss: f32,
    /// Constant weight `skew_iou / (angle_loss + ciou_loss)`.
    pub weight: f32,
}

impl RegressionTerm {
    #[inline]
    pub fn value(&self) -> f32 {
        self.weight * (self.angle_loss + self.ciou_loss)
    }
}

/// Loss terms of one scale, already scaled by their lambdas.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleLoss {
    pub reg_loss: f32,
    pub conf_loss: f32,
    pub cls_loss: f32,
    pub regression: Vec<RegressionTerm>,
    pub metrics: AssignmentMetrics,
}

impl ScaleLoss {
    #[inline]
    pub fn total(&self) -> f32 {
        self.reg_loss + self.conf_loss + self.cls_loss
    }
}

/// Multi-scale loss with its breakdown.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LossReport {
    pub total: f32,
    pub reg_loss: f32,
    pub conf_loss: f32,
    pub cls_loss: f32,
    pub scales: Vec<ScaleLoss>,
}

impl LossReport {
    /// Named scalars: `loss`, `reg_loss`, `conf_loss`, `cls_loss`.
    pub fn items(&self) -> BTreeMap<String, f32> {
        BTreeMap::from([
            ("loss".to_string(), self.total),
            ("reg_loss".to_string(), self.reg_loss),
            ("conf_loss".to_string(), self.conf_loss),
            ("cls_loss".to_string(), self.cls_loss),
        ])
    }
}

/// Loss of one scale from its predictions and assignment.
pub fn scale_loss(
    pred: &DecodedScale,
    assignment: &AssignmentResult,
    params: &LossParams,
) -> Result<ScaleLoss, LossError> {
    let shape = pred.shape();
    ensure_len("assignment cells", shape.cells(), assignment.shape().cells())?;
    ensure_len("assignment classes", pred.num_classes(), assignment.num_classes())?;
    let reduce = params.reduction;

    let regression: Vec<RegressionTerm> = assignment
        .matches()
        .iter()
        .map(|m| {
            let c = m.cell;
            let angle_loss = smooth_l1(pred.angle_residual(c), assignment.target_angle[c]);
            let ciou_loss = assignment.ciou_loss[c];
            let weight = assignment.skew_iou[c] / (angle_loss + ciou_loss + IOU_EPS);
            RegressionTerm {
                cell: c,
                angle_loss,
                ciou_loss,
                weight,
            }
        })
        .collect();
    let reg_sum: f32 = regression.iter().map(RegressionTerm::value).sum();
    let reg_loss = reduce.apply(reg_sum, regression.len());

    let mut obj_sum = 0.0f32;
    let mut cls_sum = 0.0f32;
    for m in assignment.matches() {
        let cell = pred.cell(m.cell);
        obj_sum += focal(cell.objectness, 1.0, &params.focal);
        cls_sum += cell
            .class_probs
            .iter()
            .zip(assignment.target_class(m.cell))
            .map(|(&p, &t)| bce(p, t))
            .sum::<f32>();
    }
    let n_obj = assignment.matches().len();

    let mut noobj_sum = 0.0f32;
    let mut n_noobj = 0usize;
    for (c, &bg) in assignment.noobj_mask.iter() {
        if bg {
            noobj_sum += focal(pred.objectness(c), 0.0, &params.focal);
            n_noobj += 1;
        }
    }

    let conf_loss = reduce.apply(obj_sum, n_obj) + reduce.apply(noobj_sum, n_noobj);
    let cls_loss = reduce.apply(cls_sum, n_obj * pred.num_classes());

    Ok(ScaleLoss {
        reg_loss: params.lambda_coord * reg_loss,
        conf_loss: params.lambda_conf * conf_loss,
        cls_loss: params.lambda_cls * cls_loss,
        regression,
        metrics: AssignmentMetrics::compute(pred, assignment),
    })
}

/// Assign targets on every scale and sum the per-scale losses.
///
/// `preds` and `anchors.scales` are paired by position.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(scales = preds.len(), targets = targets.len()))
)]
pub fn compute_loss(
    preds: &[DecodedScale],
    targets: &[GroundTruth],
    anchors: &AnchorConfig,
    params: &LossParams,
) -> Result<LossReport, LossError> {
    ensure_len("scales", anchors.num_scales(), preds.len())?;

    let mut report = LossReport::default();
    for (pred, scale_anchors) in preds.iter().zip(&anchors.scales) {
        let assignment = build_targets(pred, targets, scale_anchors, params)?;
        let scale = scale_loss(pred, &assignment, params)?;
        report.reg_loss += scale.reg_loss;
        report.conf_loss += scale.conf_loss;
        report.cls_loss += scale.cls_loss;
        report.scales.push(scale);
    }
    report.total = report.reg_loss + report.conf_loss + report.cls_loss;

    debug!(
        "loss {:.4} (reg {:.4}, conf {:.4}, cls {:.4}) over {} scales",
        report.total,
        report.reg_loss,
        report.conf_loss,
        report.cls_loss,
        report.scales.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Reduction;
    use approx::assert_abs_diff_eq;
    use skewdet_core::{decode_head, Anchor, GridShape, HeadTensor, ScaleAnchors};
    use std::f32::consts::LN_2;

    fn setup(batch: usize) -> (Vec<DecodedScale>, AnchorConfig) {
        let anchors = AnchorConfig::new(vec![
            ScaleAnchors::new(vec![Anchor::new(8.0, 8.0, 0.0), Anchor::new(16.0, 8.0, 0.5)]),
            ScaleAnchors::new(vec![Anchor::new(24.0, 24.0, 0.0), Anchor::new(32.0, 16.0, -0.5)]),
        ]);
        let preds = [(8usize, 0usize), (4, 1)]
            .iter()
            .map(|&(grid, s)| {
                let head = HeadTensor::zeros(GridShape::new(batch, 2, grid), 2);
                decode_head(&head, &anchors.scales[s], 64.0).unwrap()
            })
            .collect();
        (preds, anchors)
    }

    // focal(0.5, 0) with the default alpha/gamma: ln2 · 0.75 · 0.25.
    const BG_FOCAL: f32 = LN_2 * 0.1875;

    #[test]
    fn no_targets_leaves_only_background_confidence() {
        let (preds, anchors) = setup(2);
        let report = compute_loss(&preds, &[], &anchors, &LossParams::default()).unwrap();
        assert_eq!(report.reg_loss, 0.0);
        assert_eq!(report.cls_loss, 0.0);
        assert_abs_diff_eq!(report.conf_loss, 2.0 * BG_FOCAL, epsilon = 1e-5);
        assert_abs_diff_eq!(report.total, report.conf_loss);
        for s in &report.scales {
            assert!(s.regression.is_empty());
            assert_eq!(s.metrics.num_obj, 0);
        }
    }

    #[test]
    fn lambdas_scale_their_terms() {
        let (preds, anchors) = setup(1);
        let targets = [GroundTruth::new(0, 1, 0.3, 0.6, 0.2, 0.15, 0.1)];
        let base = compute_loss(&preds, &targets, &anchors, &LossParams::default()).unwrap();
        let params = LossParams {
            lambda_coord: 2.0,
            lambda_conf: 0.5,
            lambda_cls: 0.0,
            ..LossParams::default()
        };
        let scaled = compute_loss(&preds, &targets, &anchors, &params).unwrap();
        assert_abs_diff_eq!(scaled.reg_loss, 2.0 * base.reg_loss, epsilon = 1e-6);
        assert_abs_diff_eq!(scaled.conf_loss, 0.5 * base.conf_loss, epsilon = 1e-6);
        assert_eq!(scaled.cls_loss, 0.0);
        assert!(base.total.is_finite() && base.total > 0.0);
    }

    #[test]
    fn regression_weight_reproduces_skew_iou() {
        let (preds, anchors) = setup(1);
        let targets = [GroundTruth::new(0, 0, 0.55, 0.45, 0.3, 0.1, -0.2)];
        let report = compute_loss(&preds, &targets, &anchors, &LossParams::default()).unwrap();
        for scale in &report.scales {
            assert_eq!(scale.regression.len(), 1);
            let term = scale.regression[0];
            assert!(term.weight > 0.0);
            assert_abs_diff_eq!(scale.reg_loss, term.value(), epsilon = 1e-6);
        }
    }

    #[test]
    fn classification_uses_mean_over_matched_class_slots() {
        let (preds, anchors) = setup(1);
        let targets = [GroundTruth::new(0, 1, 0.5, 0.5, 0.25, 0.25, 0.0)];
        let report = compute_loss(&preds, &targets, &anchors, &LossParams::default()).unwrap();
        // Every class probability is 0.5, so each slot costs ln 2.
        for scale in &report.scales {
            assert_abs_diff_eq!(scale.cls_loss, LN_2, epsilon = 1e-6);
        }
    }

    #[test]
    fn sum_reduction_grows_with_cell_count() {
        let (preds, anchors) = setup(1);
        let params = LossParams {
            reduction: Reduction::Sum,
            ..LossParams::default()
        };
        let report = compute_loss(&preds, &[], &anchors, &params).unwrap();
        let cells: usize = preds.iter().map(|p| p.shape().cells()).sum();
        assert_abs_diff_eq!(report.conf_loss, cells as f32 * BG_FOCAL, epsilon = 1e-3);
    }

    #[test]
    fn scale_count_must_match_anchor_config() {
        let (preds, anchors) = setup(1);
        let err = compute_loss(&preds[..1], &[], &anchors, &LossParams::default()).unwrap_err();
        assert!(matches!(err, LossError::Shape(_)));
    }

    #[test]
    fn report_items_are_named() {
        let (preds, anchors) = setup(1);
        let report = compute_loss(&preds, &[], &anchors, &LossParams::default()).unwrap();
        let items = report.items();
        let keys: Vec<&str> = items.keys().map(String::as_str).collect();
        assert_eq!(keys, ["cls_loss", "conf_loss", "loss", "reg_loss"]);
        assert_eq!(items["loss"], report.total);
    }

    #[test]
    fn metrics_report_half_confidence_everywhere() {
        let (preds, anchors) = setup(1);
        let targets = [GroundTruth::new(0, 0, 0.2, 0.2, 0.1, 0.1, 0.0)];
        let report = compute_loss(&preds, &targets, &anchors, &LossParams::default()).unwrap();
        let m = report.scales[0].metrics;
        assert_eq!(m.num_obj, 1);
        assert_abs_diff_eq!(m.conf_obj, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(m.conf_noobj, 0.5, epsilon = 1e-6);
        // Nothing is above the 0.5 confidence bar.
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall50, 0.0);
        // Ties on equal class probabilities resolve to class 0.
        assert_eq!(m.cls_acc, 1.0);
    }
}
