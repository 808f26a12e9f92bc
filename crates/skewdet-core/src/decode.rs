//! Head decoding: raw logits to oriented boxes and probabilities.
//!
//! For a cell `(gx, gy)` with grid-unit anchor `(aw, ah, aθ)`:
//!
//! ```text
//! cx = σ(tx) + gx      w = exp(tw) · aw      θ = ta + aθ
//! cy = σ(ty) + gy      h = exp(th) · ah      conf = σ(tconf), cls_k = σ(cls_k)
//! ```
//!
//! The raw residual `ta` is kept next to the decoded box: the angle loss
//! regresses it directly against `gt_θ - aθ`.

use log::debug;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::tensor::{CLASS_OFFSET, OBJ_CHANNEL};
use crate::{CellIndex, GridShape, HeadTensor, OrientedBox, ScaleAnchors, ShapeError};

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decoded predictions of one scale, boxes in grid-cell units.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedScale {
    shape: GridShape,
    num_classes: usize,
    image_size: f32,
    boxes: Vec<OrientedBox>,
    angle_residual: Vec<f32>,
    objectness: Vec<f32>,
    class_probs: Vec<f32>,
}

/// Borrowed view of one decoded cell.
#[derive(Clone, Copy, Debug)]
pub struct CellPrediction<'a> {
    pub bbox: OrientedBox,
    pub angle_residual: f32,
    pub objectness: f32,
    pub class_probs: &'a [f32],
}

impl CellPrediction<'_> {
    /// Highest class probability and its index; first index wins ties.
    pub fn best_class(&self) -> (usize, f32) {
        argmax(self.class_probs)
    }
}

pub(crate) fn argmax(values: &[f32]) -> (usize, f32) {
    let mut best = (0usize, f32::NEG_INFINITY);
    for (i, &v) in values.iter().enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}

impl DecodedScale {
    /// Assemble already-decoded predictions (e.g. from a network whose head
    /// applies the transform itself).
    pub fn from_parts(
        shape: GridShape,
        num_classes: usize,
        image_size: f32,
        boxes: Vec<OrientedBox>,
        angle_residual: Vec<f32>,
        objectness: Vec<f32>,
        class_probs: Vec<f32>,
    ) -> Result<Self, ShapeError> {
        let n = shape.cells();
        ShapeError::check("decoded boxes", n, boxes.len())?;
        ShapeError::check("decoded angle residuals", n, angle_residual.len())?;
        ShapeError::check("decoded objectness", n, objectness.len())?;
        ShapeError::check("decoded class probabilities", n * num_classes, class_probs.len())?;
        Ok(Self {
            shape,
            num_classes,
            image_size,
            boxes,
            angle_residual,
            objectness,
            class_probs,
        })
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[inline]
    pub fn image_size(&self) -> f32 {
        self.image_size
    }

    /// Pixels per grid cell.
    #[inline]
    pub fn stride(&self) -> f32 {
        self.image_size / self.shape.grid as f32
    }

    #[inline]
    pub fn bbox(&self, c: CellIndex) -> OrientedBox {
        self.boxes[self.shape.index(c)]
    }

    #[inline]
    pub fn angle_residual(&self, c: CellIndex) -> f32 {
        self.angle_residual[self.shape.index(c)]
    }

    #[inline]
    pub fn objectness(&self, c: CellIndex) -> f32 {
        self.objectness[self.shape.index(c)]
    }

    #[inline]
    pub fn class_probs(&self, c: CellIndex) -> &[f32] {
        let i = self.shape.index(c) * self.num_classes;
        &self.class_probs[i..i + self.num_classes]
    }

    pub fn cell(&self, c: CellIndex) -> CellPrediction<'_> {
        self.flat_cell(self.shape.index(c))
    }

    /// Cell by flat index in `(batch, anchor, gy, gx)` order.
    pub fn flat_cell(&self, i: usize) -> CellPrediction<'_> {
        let k = i * self.num_classes;
        CellPrediction {
            bbox: self.boxes[i],
            angle_residual: self.angle_residual[i],
            objectness: self.objectness[i],
            class_probs: &self.class_probs[k..k + self.num_classes],
        }
    }

    /// Cells of image `batch` in flat order; empty past the last image.
    pub fn image_cells(&self, batch: usize) -> impl Iterator<Item = CellPrediction<'_>> + '_ {
        let per = self.shape.per_image();
        let range = if batch < self.shape.batch {
            batch * per..(batch + 1) * per
        } else {
            0..0
        };
        range.map(move |i| self.flat_cell(i))
    }
}

/// Decode one raw head tensor with the anchors of its scale.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(head, anchors), fields(grid = head.shape().grid))
)]
pub fn decode_head(
    head: &HeadTensor,
    anchors: &ScaleAnchors,
    image_size: f32,
) -> Result<DecodedScale, ShapeError> {
    let shape = head.shape();
    ShapeError::check("anchors per scale", shape.anchors, anchors.len())?;

    let grid_anchors = anchors.in_grid_units(image_size, shape.grid);
    let n = shape.cells();
    let nc = head.num_classes();

    let mut boxes = Vec::with_capacity(n);
    let mut angle_residual = Vec::with_capacity(n);
    let mut objectness = Vec::with_capacity(n);
    let mut class_probs = Vec::with_capacity(n * nc);

    for flat in 0..n {
        let c = shape.unravel(flat);
        let v = head.cell(c);
        let a = grid_anchors[c.anchor];
        boxes.push(OrientedBox::new(
            sigmoid(v[0]) + c.gx as f32,
            sigmoid(v[1]) + c.gy as f32,
            v[2].exp() * a.w,
            v[3].exp() * a.h,
            v[4] + a.theta,
        ));
        angle_residual.push(v[4]);
        objectness.push(sigmoid(v[OBJ_CHANNEL]));
        class_probs.extend(v[CLASS_OFFSET..].iter().map(|&x| sigmoid(x)));
    }

    debug!(
        "decoded {} cells on a {}x{} grid ({} anchors, {} classes)",
        n, shape.grid, shape.grid, shape.anchors, nc
    );

    Ok(DecodedScale {
        shape,
        num_classes: nc,
        image_size,
        boxes,
        angle_residual,
        objectness,
        class_probs,
    })
}
