//! Overlap measures between oriented boxes.
//!
//! - [`aa_iou`]: rotation ignored, each box treated as an axis-aligned
//!   rectangle about its own center. Cheap; used as a prefilter.
//! - [`wh_iou`]: width/height only, both boxes centered at the origin
//!   (anchor matching).
//! - [`skew_iou`]: exact intersection-over-union of the rotated rectangles.

use nalgebra::DMatrix;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{GeometryError, OrientedBox};

/// Additive guard on IoU denominators.
pub const IOU_EPS: f32 = 1e-15;

/// Axis-aligned IoU above which exact skew-IoU is worth computing.
pub const AA_PREFILTER_IOU: f32 = 0.3;

/// Axis-aligned IoU of two boxes, rotation ignored.
pub fn aa_iou(a: &OrientedBox, b: &OrientedBox) -> f32 {
    let [ax1, ay1, ax2, ay2, _] = a.to_corner_form();
    let [bx1, by1, bx2, by2, _] = b.to_corner_form();

    let iw = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
    let ih = (ay2.min(by2) - ay1.max(by1)).max(0.0);
    let inter = iw * ih;
    let union = a.w * a.h + b.w * b.h - inter;
    inter / (union + IOU_EPS)
}

/// IoU of two `(w, h)` extents sharing a center.
pub fn wh_iou(w1: f32, h1: f32, w2: f32, h2: f32) -> f32 {
    let inter = w1.min(w2) * h1.min(h2);
    let union = w1 * h1 + w2 * h2 - inter;
    inter / (union + IOU_EPS)
}

/// Exact IoU of two rotated rectangles via convex polygon intersection.
///
/// Degenerate boxes (zero width or height, or a negligible side) give
/// `0.0`. Non-finite parameters are reported as [`GeometryError`].
pub fn skew_iou(a: &OrientedBox, b: &OrientedBox) -> Result<f32, GeometryError> {
    let pa = a.polygon()?;
    let pb = b.polygon()?;
    if a.is_degenerate() || b.is_degenerate() || pa.is_degenerate() || pb.is_degenerate() {
        return Ok(0.0);
    }
    let inter = pa.intersection_area(&pb);
    if inter <= 0.0 {
        return Ok(0.0);
    }
    let union = pa.area() + pb.area() - inter;
    Ok((inter / union).clamp(0.0, 1.0) as f32)
}

/// Skew-IoU computed only when the axis-aligned overlap exceeds `gate`;
/// otherwise `0.0`.
pub fn skew_iou_gated(a: &OrientedBox, b: &OrientedBox, gate: f32) -> Result<f32, GeometryError> {
    if aa_iou(a, b) > gate {
        skew_iou(a, b)
    } else {
        Ok(0.0)
    }
}

/// Pairwise skew-IoU, shape `[a.len(), b.len()]`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(n = a.len(), m = b.len()))
)]
pub fn skew_iou_matrix(a: &[OrientedBox], b: &[OrientedBox]) -> Result<DMatrix<f32>, GeometryError> {
    pairwise(a, b, skew_iou)
}

/// Pairwise gated skew-IoU, shape `[a.len(), b.len()]`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(a, b), fields(n = a.len(), m = b.len()))
)]
pub fn skew_iou_matrix_gated(
    a: &[OrientedBox],
    b: &[OrientedBox],
    gate: f32,
) -> Result<DMatrix<f32>, GeometryError> {
    pairwise(a, b, |x, y| skew_iou_gated(x, y, gate))
}

fn pairwise<F>(a: &[OrientedBox], b: &[OrientedBox], f: F) -> Result<DMatrix<f32>, GeometryError>
where
    F: Fn(&OrientedBox, &OrientedBox) -> Result<f32, GeometryError>,
{
    // Validate every polygon once up front so the error does not depend on
    // which pairs the gate happened to skip.
    for bx in a.iter().chain(b) {
        bx.polygon()?;
    }
    let mut out = DMatrix::<f32>::zeros(a.len(), b.len());
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[(i, j)] = f(x, y)?;
        }
    }
    Ok(out)
}
