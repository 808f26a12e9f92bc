//! Per-scale target assignment.
//!
//! Each ground truth is matched to the anchor whose `wh_iou · |cos Δθ|`
//! score is highest, at the cell containing its center. Cells are written
//! in input order, so when two ground truths land on the same
//! `(batch, anchor, gy, gx)` the later one owns every target at that cell.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
#[cfg(feature = "tracing")]
use tracing::instrument;

use skewdet_core::{
    ensure_len, wh_iou, CellIndex, DecodedScale, Grid4, GridShape, OrientedBox, ScaleAnchors,
};

use crate::ciou::ciou_terms;
use crate::{LossError, LossParams};

/// One labelled object, coordinates normalized to `[0, 1]` of the image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub batch_index: usize,
    pub class_id: usize,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub theta: f32,
}

impl GroundTruth {
    pub const fn new(
        batch_index: usize,
        class_id: usize,
        cx: f32,
        cy: f32,
        w: f32,
        h: f32,
        theta: f32,
    ) -> Self {
        Self {
            batch_index,
            class_id,
            cx,
            cy,
            w,
            h,
            theta,
        }
    }

    /// Build from a loader row `[batch_index, class_id, cx, cy, w, h, theta]`.
    ///
    /// The two index columns are truncated toward zero.
    pub fn from_row(row: [f32; 7]) -> Self {
        Self::new(
            row[0] as usize,
            row[1] as usize,
            row[2],
            row[3],
            row[4],
            row[5],
            row[6],
        )
    }

    /// Box in grid-cell units of a `grid`×`grid` map.
    pub fn to_grid(&self, grid: usize) -> OrientedBox {
        let g = grid as f32;
        OrientedBox::new(self.cx * g, self.cy * g, self.w * g, self.h * g, self.theta)
    }

    fn is_valid(&self) -> bool {
        let v = [self.cx, self.cy, self.w, self.h, self.theta];
        v.iter().all(|x| x.is_finite()) && self.w >= 0.0 && self.h >= 0.0
    }
}

/// Winning ground truth of one matched cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchedCell {
    pub cell: CellIndex,
    /// Index into the ground-truth slice passed to [`build_targets`].
    pub target: usize,
    pub class_id: usize,
}

/// Dense targets of one detection scale.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignmentResult {
    pub obj_mask: Grid4<bool>,
    pub noobj_mask: Grid4<bool>,
    /// Predicted argmax class equals the ground-truth class. Diagnostic only.
    pub class_mask: Grid4<bool>,
    /// `gt_θ - anchor_θ`, unwrapped.
    pub target_angle: Grid4<f32>,
    pub target_conf: Grid4<f32>,
    /// `iou · |cos Δθ|` of the prediction at each matched cell.
    pub iou_scores: Grid4<f32>,
    /// Regression magnitude `exp(1 - iou_score) - 1`.
    pub skew_iou: Grid4<f32>,
    /// `bbox_loss_scale · (1 - ciou)`.
    pub ciou_loss: Grid4<f32>,
    target_class: Vec<f32>,
    num_classes: usize,
    matches: Vec<MatchedCell>,
}

impl AssignmentResult {
    fn empty(shape: GridShape, num_classes: usize) -> Self {
        Self {
            obj_mask: Grid4::filled(shape, false),
            noobj_mask: Grid4::filled(shape, true),
            class_mask: Grid4::filled(shape, false),
            target_angle: Grid4::filled(shape, 0.0),
            target_conf: Grid4::filled(shape, 0.0),
            iou_scores: Grid4::filled(shape, 0.0),
            skew_iou: Grid4::filled(shape, 0.0),
            ciou_loss: Grid4::filled(shape, 0.0),
            target_class: vec![0.0; shape.cells() * num_classes],
            num_classes,
            matches: Vec::new(),
        }
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        self.obj_mask.shape()
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// One-hot class target at `c` (all zeros off matched cells).
    pub fn target_class(&self, c: CellIndex) -> &[f32] {
        let i = self.shape().index(c) * self.num_classes;
        &self.target_class[i..i + self.num_classes]
    }

    fn target_class_mut(&mut self, c: CellIndex) -> &mut [f32] {
        let i = self.shape().index(c) * self.num_classes;
        &mut self.target_class[i..i + self.num_classes]
    }

    /// Matched cells in `(batch, anchor, gy, gx)` order, one per cell.
    #[inline]
    pub fn matches(&self) -> &[MatchedCell] {
        &self.matches
    }
}

/// Anchor scores of one ground truth.
struct AnchorMatch {
    /// `wh_iou · |cos Δθ|` per anchor.
    scores: Vec<f32>,
    /// `|anchor_θ - gt_θ|` per anchor.
    offsets: Vec<f32>,
    best: usize,
}

fn match_anchors(anchors: &[skewdet_core::Anchor], gt: &OrientedBox) -> AnchorMatch {
    let mut scores = Vec::with_capacity(anchors.len());
    let mut offsets = Vec::with_capacity(anchors.len());
    let mut best = 0usize;
    for (i, a) in anchors.iter().enumerate() {
        let offset = (a.theta - gt.theta).abs();
        let score = wh_iou(a.w, a.h, gt.w, gt.h) * offset.cos().abs();
        if score > scores.get(best).copied().unwrap_or(f32::NEG_INFINITY) {
            best = i;
        }
        scores.push(score);
        offsets.push(offset);
    }
    AnchorMatch {
        scores,
        offsets,
        best,
    }
}

#[inline]
fn cell_coord(v: f32, grid: usize) -> usize {
    // Saturating cast: negatives land on 0.
    (v as usize).min(grid.saturating_sub(1))
}

fn validate_targets(
    targets: &[GroundTruth],
    batch: usize,
    num_classes: usize,
) -> Result<(), LossError> {
    for (index, gt) in targets.iter().enumerate() {
        if gt.batch_index >= batch {
            return Err(LossError::BatchIndexOutOfRange {
                index,
                batch_index: gt.batch_index,
                batch,
            });
        }
        if gt.class_id >= num_classes {
            return Err(LossError::UnknownClass {
                index,
                class_id: gt.class_id,
                num_classes,
            });
        }
        if !gt.is_valid() {
            return Err(LossError::InvalidTarget { index });
        }
    }
    Ok(())
}

/// Build the dense targets of one scale.
///
/// `pred` supplies the grid shape, the predicted boxes used for CIoU and
/// the class probabilities used for `class_mask`. All targets are
/// validated before anything is written.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(grid = pred.shape().grid, targets = targets.len()))
)]
pub fn build_targets(
    pred: &DecodedScale,
    targets: &[GroundTruth],
    anchors: &ScaleAnchors,
    params: &LossParams,
) -> Result<AssignmentResult, LossError> {
    let shape = pred.shape();
    let nc = pred.num_classes();
    ensure_len("anchors per scale", shape.anchors, anchors.len())?;
    validate_targets(targets, shape.batch, nc)?;

    let mut out = AssignmentResult::empty(shape, nc);
    if targets.is_empty() {
        return Ok(out);
    }

    let grid = shape.grid;
    let grid_anchors = anchors.in_grid_units(pred.image_size(), grid);
    let gt_boxes: Vec<OrientedBox> = targets.iter().map(|t| t.to_grid(grid)).collect();
    let matched: Vec<AnchorMatch> = gt_boxes
        .iter()
        .map(|g| match_anchors(&grid_anchors, g))
        .collect();

    let cells: Vec<CellIndex> = targets
        .iter()
        .zip(&gt_boxes)
        .zip(&matched)
        .map(|((t, g), m)| {
            CellIndex::new(
                t.batch_index,
                m.best,
                cell_coord(g.cy, grid),
                cell_coord(g.cx, grid),
            )
        })
        .collect();

    for &c in &cells {
        out.obj_mask[c] = true;
        out.noobj_mask[c] = false;
    }

    // Ignore band: near-miss anchors at the same cell are not background.
    for (c, m) in cells.iter().zip(&matched) {
        for (a, (&score, &offset)) in m.scores.iter().zip(&m.offsets).enumerate() {
            let near_angle = score > params.angle_ignore_iou && offset < params.angle_ignore_offset;
            if score > params.ignore_thresh || near_angle {
                out.noobj_mask[CellIndex { anchor: a, ..*c }] = false;
            }
        }
    }

    let mut owners: BTreeMap<CellIndex, usize> = BTreeMap::new();
    for (i, (&c, t)) in cells.iter().zip(targets).enumerate() {
        let g = gt_boxes[i];
        let anchor = grid_anchors[c.anchor];
        let cell = pred.cell(c);
        let terms = ciou_terms(&cell.bbox, &g);
        let quality = terms.quality();
        let bbox_loss_scale = 2.0 - t.w * t.h;

        out.target_angle[c] = g.theta - anchor.theta;
        out.target_conf[c] = 1.0;
        let onehot = out.target_class_mut(c);
        onehot.fill(0.0);
        onehot[t.class_id] = 1.0;
        out.iou_scores[c] = quality;
        out.skew_iou[c] = (1.0 - quality).exp() - 1.0;
        out.ciou_loss[c] = bbox_loss_scale * (1.0 - terms.ciou);
        out.class_mask[c] = cell.best_class().0 == t.class_id;

        if let Some(prev) = owners.insert(c, i) {
            debug!(
                "ground truth #{} overwrites #{} at anchor {} cell ({}, {})",
                i, prev, c.anchor, c.gx, c.gy
            );
        }
    }

    out.matches = owners
        .into_iter()
        .map(|(cell, target)| MatchedCell {
            cell,
            target,
            class_id: targets[target].class_id,
        })
        .collect();

    debug!(
        "grid {}: {} targets -> {} matched cells, {} background",
        grid,
        targets.len(),
        out.matches.len(),
        out.noobj_mask.count()
    );
    Ok(out)
}
