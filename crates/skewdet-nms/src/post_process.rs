use log::debug;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

use skewdet_core::{ensure_len, DecodedScale, OrientedBox};

use crate::detection::sort_by_score;
use crate::{rotated_nms, Detection, NmsError, NmsParams};

/// Confident cells of image `batch` across all scales, boxes rescaled to
/// image pixels, best score first and capped at `max_nms`.
///
/// Cells whose box overflowed during decoding are skipped, as are scales
/// that hold no image `batch`.
pub fn image_candidates(
    scales: &[DecodedScale],
    batch: usize,
    params: &NmsParams,
) -> Vec<Detection> {
    let mut out = Vec::new();
    let mut overflowed = 0usize;
    for scale in scales {
        let stride = scale.stride();
        for cell in scale.image_cells(batch) {
            if cell.objectness.is_nan() || cell.objectness < params.conf_thres {
                continue;
            }
            let b = cell.bbox;
            let bbox = OrientedBox::new(
                b.cx * stride,
                b.cy * stride,
                b.w * stride,
                b.h * stride,
                b.theta,
            );
            if !bbox.is_finite() {
                overflowed += 1;
                continue;
            }
            let (class_id, class_conf) = cell.best_class();
            out.push(Detection::new(bbox, cell.objectness, class_conf, class_id));
        }
    }
    if overflowed > 0 {
        debug!("image {batch}: skipped {overflowed} candidates with non-finite boxes");
    }
    sort_by_score(&mut out);
    out.truncate(params.max_nms);
    out
}

fn process_image(
    scales: &[DecodedScale],
    batch: usize,
    params: &NmsParams,
) -> Result<Vec<Detection>, NmsError> {
    let candidates = image_candidates(scales, batch, params);
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let kept = rotated_nms(&candidates, params)?;
    debug!(
        "image {batch}: {} candidates -> {} detections",
        candidates.len(),
        kept.len()
    );
    Ok(kept)
}

/// Turn decoded multi-scale predictions into per-image detections.
///
/// Every scale must carry the same batch size. Images are independent;
/// with the `parallel` feature they are processed on the rayon pool.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(scales = scales.len()))
)]
pub fn post_process(
    scales: &[DecodedScale],
    params: &NmsParams,
) -> Result<Vec<Vec<Detection>>, NmsError> {
    let Some(first) = scales.first() else {
        return Ok(Vec::new());
    };
    let batch = first.shape().batch;
    for s in &scales[1..] {
        ensure_len("scale batch size", batch, s.shape().batch)?;
    }

    #[cfg(feature = "parallel")]
    {
        (0..batch)
            .into_par_iter()
            .map(|b| process_image(scales, b, params))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..batch).map(|b| process_image(scales, b, params)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use skewdet_core::{CellIndex, GridShape};

    /// One-image scale with a single confident cell at `(gx, gy)`.
    fn scale(grid: usize, gx: usize, gy: usize, obj: f32, probs: [f32; 2]) -> DecodedScale {
        let shape = GridShape::new(1, 1, grid);
        let n = shape.cells();
        let mut boxes = vec![OrientedBox::new(0.5, 0.5, 1.0, 1.0, 0.0); n];
        let mut objectness = vec![0.01; n];
        let mut class_probs = vec![0.5; n * 2];
        let i = shape.index(CellIndex::new(0, 0, gy, gx));
        boxes[i] = OrientedBox::new(gx as f32 + 0.5, gy as f32 + 0.5, 2.0, 1.0, 0.3);
        objectness[i] = obj;
        class_probs[2 * i..2 * i + 2].copy_from_slice(&probs);
        DecodedScale::from_parts(shape, 2, 64.0, boxes, vec![0.0; n], objectness, class_probs)
            .unwrap()
    }

    #[test]
    fn low_confidence_candidate_yields_no_detections() {
        let out = post_process(&[scale(4, 1, 1, 0.4, [0.1, 0.9])], &NmsParams::default()).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_empty());
    }

    #[test]
    fn candidates_are_rescaled_to_pixels() {
        let dets = image_candidates(&[scale(4, 2, 1, 0.8, [0.1, 0.9])], 0, &NmsParams::default());
        assert_eq!(dets.len(), 1);
        let d = dets[0];
        assert_abs_diff_eq!(d.bbox.cx, 40.0);
        assert_abs_diff_eq!(d.bbox.cy, 24.0);
        assert_abs_diff_eq!(d.bbox.w, 32.0);
        assert_abs_diff_eq!(d.bbox.h, 16.0);
        assert_eq!(d.bbox.theta, 0.3);
        assert_eq!(d.class_id, 1);
        assert_abs_diff_eq!(d.score(), 0.72, epsilon = 1e-6);
    }

    #[test]
    fn working_set_is_capped_by_score() {
        let scales = [scale(4, 0, 0, 0.6, [0.9, 0.1]), scale(2, 1, 1, 0.9, [0.9, 0.1])];
        let params = NmsParams {
            max_nms: 1,
            ..NmsParams::default()
        };
        let dets = image_candidates(&scales, 0, &params);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].object_conf, 0.9);
    }

    #[test]
    fn overflowed_box_is_skipped_not_fatal() {
        let shape = GridShape::new(1, 1, 4);
        let n = shape.cells();
        let mut boxes = vec![OrientedBox::new(0.5, 0.5, 1.0, 1.0, 0.0); n];
        let mut objectness = vec![0.01; n];
        let good = shape.index(CellIndex::new(0, 0, 0, 0));
        let wide = shape.index(CellIndex::new(0, 0, 3, 3));
        objectness[good] = 0.8;
        objectness[wide] = 0.99;
        boxes[wide] = OrientedBox::new(3.5, 3.5, f32::INFINITY, 1.0, 0.0);
        let scale =
            DecodedScale::from_parts(shape, 2, 64.0, boxes, vec![0.0; n], objectness, vec![0.5; 2 * n])
                .unwrap();

        let out = post_process(&[scale], &NmsParams::default()).unwrap();
        assert_eq!(out[0].len(), 1);
        assert_abs_diff_eq!(out[0][0].bbox.cx, 8.0);
        assert_eq!(out[0][0].object_conf, 0.8);
    }

    #[test]
    fn missing_image_yields_no_candidates() {
        let dets = image_candidates(&[scale(4, 1, 1, 0.9, [1.0, 0.0])], 5, &NmsParams::default());
        assert!(dets.is_empty());
    }

    #[test]
    fn scales_must_agree_on_batch() {
        let a = scale(4, 0, 0, 0.9, [1.0, 0.0]);
        let shape = GridShape::new(2, 1, 1);
        let b = DecodedScale::from_parts(
            shape,
            2,
            64.0,
            vec![OrientedBox::default(); 2],
            vec![0.0; 2],
            vec![0.0; 2],
            vec![0.0; 4],
        )
        .unwrap();
        assert!(matches!(
            post_process(&[a, b], &NmsParams::default()),
            Err(NmsError::Shape(_))
        ));
    }

    #[test]
    fn no_scales_no_images() {
        assert!(post_process(&[], &NmsParams::default()).unwrap().is_empty());
    }
}
